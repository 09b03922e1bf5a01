use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fmt::Display,
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::{error, warn};

pub const DEFAULT_PREFIX: &str = "gr10-";

#[derive(Debug, Deserialize)]
struct ExportBlob {
    data: BTreeMap<String, Value>,
}

/// Namespaced key-value store over a JSON storage area on disk.
///
/// The area holds raw text values keyed by full key, the same shape as a
/// browser `localStorage`. Keys outside this store's prefix are preserved
/// untouched. When the area cannot be read or written the store keeps
/// working from its in-memory copy and stops touching the disk.
#[derive(Debug)]
pub struct KvStore {
    prefix: String,
    area: Option<PathBuf>,
    entries: BTreeMap<String, String>,
}

impl KvStore {
    pub fn in_memory(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            area: None,
            entries: BTreeMap::new(),
        }
    }

    pub async fn open(path: &Path, prefix: impl Into<String>) -> Self {
        let mut store = Self {
            prefix: prefix.into(),
            area: Some(path.to_path_buf()),
            entries: BTreeMap::new(),
        };

        match fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(raw)) => {
                    store.entries = raw
                        .into_iter()
                        .map(|(key, value)| match value {
                            Value::String(text) => (key, text),
                            other => (key, other.to_string()),
                        })
                        .collect();
                }
                Ok(_) => store.degrade(format!("{} is not a JSON object", path.display())),
                Err(err) => {
                    error!("failed to parse storage area {}: {err}", path.display());
                    store.degrade(err);
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    if let Err(err) = fs::create_dir_all(parent).await {
                        store.degrade(err);
                        return store;
                    }
                }
                store.flush().await;
            }
            Err(err) => store.degrade(err),
        }

        store
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_persistent(&self) -> bool {
        self.area.is_some()
    }

    pub async fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> bool {
        let serialized = match serde_json::to_string(value) {
            Ok(serialized) => serialized,
            Err(err) => {
                error!("failed to serialize value for {key}: {err}");
                return false;
            }
        };
        self.entries.insert(self.full_key(key), serialized);
        self.flush().await;
        true
    }

    /// Typed read. Absent and malformed values both yield `default`.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let Some(raw) = self.entries.get(&self.full_key(key)) else {
            return default;
        };
        match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => {
                warn!("malformed value under {key}, using default: {err}");
                default
            }
        }
    }

    /// Untyped read. Text that is not JSON comes back as an opaque string.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.entries
            .get(&self.full_key(key))
            .map(|raw| serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())))
    }

    /// Returns whether the key was present.
    pub async fn remove(&mut self, key: &str) -> bool {
        if self.entries.remove(&self.full_key(key)).is_none() {
            return false;
        }
        self.flush().await;
        true
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(&self.full_key(key))
    }

    /// Logical keys currently held under this store's prefix.
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .keys()
            .filter_map(|key| key.strip_prefix(&self.prefix))
            .map(str::to_string)
            .collect()
    }

    pub async fn clear(&mut self) -> bool {
        let prefix = self.prefix.clone();
        self.entries.retain(|key, _| !key.starts_with(&prefix));
        self.flush().await;
        true
    }

    pub fn export_all(&self) -> String {
        let data: serde_json::Map<String, Value> = self
            .keys()
            .into_iter()
            .filter_map(|key| self.get_value(&key).map(|value| (key, value)))
            .collect();
        let blob = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "data": data,
        });
        format!("{blob:#}")
    }

    /// Replaces the namespace with the content of an `export_all` blob.
    /// A blob that fails to parse leaves the store untouched.
    pub async fn import_all(&mut self, blob: &str) -> bool {
        let parsed: ExportBlob = match serde_json::from_str(blob) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("rejected import blob: {err}");
                return false;
            }
        };

        let prefix = self.prefix.clone();
        self.entries.retain(|key, _| !key.starts_with(&prefix));
        for (key, value) in parsed.data {
            self.entries.insert(self.full_key(&key), value.to_string());
        }
        self.flush().await;
        true
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    async fn flush(&mut self) {
        let Some(path) = &self.area else {
            return;
        };
        let payload = match serde_json::to_vec_pretty(&self.entries) {
            Ok(payload) => payload,
            Err(err) => {
                error!("failed to serialize storage area: {err}");
                return;
            }
        };
        if let Err(err) = fs::write(path, payload).await {
            self.degrade(err);
        }
    }

    fn degrade(&mut self, err: impl Display) {
        if let Some(path) = self.area.take() {
            warn!(
                "storage area {} unavailable, keeping data in memory only: {err}",
                path.display()
            );
        }
    }
}
