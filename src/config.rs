use crate::storage::DEFAULT_PREFIX;
use chrono::NaiveDate;
use std::{env, path::PathBuf, str::FromStr, time::Duration};
use tracing::warn;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATA_PATH: &str = "data/state.json";
pub const DEFAULT_MIRROR_USER: &str = "anonymous";
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_LISTEN_SECS: u64 = 30;

pub fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, 8).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MirrorKind {
    #[default]
    None,
    Memory,
    Firebase,
    Supabase,
}

impl FromStr for MirrorKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "off" => Ok(MirrorKind::None),
            "memory" => Ok(MirrorKind::Memory),
            "firebase" => Ok(MirrorKind::Firebase),
            "supabase" => Ok(MirrorKind::Supabase),
            other => Err(format!("unknown mirror backend `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    pub kind: MirrorKind,
    pub url: Option<String>,
    pub key: Option<String>,
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_path: PathBuf,
    pub key_prefix: String,
    pub stages_path: Option<PathBuf>,
    pub stages_url: Option<String>,
    pub mirror: MirrorConfig,
    pub remote_timeout: Duration,
    /// `None` turns the remote listener off.
    pub listen_every: Option<Duration>,
    pub start_date: NaiveDate,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let listen_secs = parsed(&text, "GR10_LISTEN_SECS", DEFAULT_LISTEN_SECS);

        Self {
            port: parsed(&text, "PORT", DEFAULT_PORT),
            data_path: text("GR10_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_PATH)),
            key_prefix: text("GR10_KEY_PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            stages_path: text("GR10_STAGES_PATH").map(PathBuf::from),
            stages_url: text("GR10_STAGES_URL"),
            mirror: MirrorConfig {
                kind: parsed(&text, "GR10_MIRROR", MirrorKind::None),
                url: text("GR10_MIRROR_URL"),
                key: text("GR10_MIRROR_KEY"),
                user: text("GR10_MIRROR_USER").unwrap_or_else(|| DEFAULT_MIRROR_USER.to_string()),
            },
            remote_timeout: Duration::from_secs(parsed(
                &text,
                "GR10_REMOTE_TIMEOUT_SECS",
                DEFAULT_REMOTE_TIMEOUT_SECS,
            )),
            listen_every: (listen_secs > 0).then(|| Duration::from_secs(listen_secs)),
            start_date: parsed(&text, "GR10_START_DATE", default_start_date()),
        }
    }
}

fn parsed<T>(text: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = text(name) else {
        return default;
    };
    match value.parse() {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!("ignoring invalid {name}={value}: {err}");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_without_environment() {
        let config = config(&[]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.data_path, PathBuf::from("data/state.json"));
        assert_eq!(config.key_prefix, "gr10-");
        assert_eq!(config.mirror.kind, MirrorKind::None);
        assert_eq!(config.mirror.user, "anonymous");
        assert_eq!(config.remote_timeout, Duration::from_secs(5));
        assert_eq!(config.listen_every, Some(Duration::from_secs(30)));
        assert_eq!(config.start_date.to_string(), "2025-09-08");
    }

    #[test]
    fn values_are_read_from_lookup() {
        let config = config(&[
            ("PORT", "9090"),
            ("GR10_DATA_PATH", "/tmp/gr10.json"),
            ("GR10_MIRROR", "Supabase"),
            ("GR10_MIRROR_URL", "https://demo.supabase.co"),
            ("GR10_MIRROR_KEY", "anon"),
            ("GR10_LISTEN_SECS", "0"),
            ("GR10_START_DATE", "2026-06-01"),
        ]);
        assert_eq!(config.port, 9090);
        assert_eq!(config.data_path, PathBuf::from("/tmp/gr10.json"));
        assert_eq!(config.mirror.kind, MirrorKind::Supabase);
        assert_eq!(config.mirror.key.as_deref(), Some("anon"));
        assert_eq!(config.listen_every, None);
        assert_eq!(config.start_date.to_string(), "2026-06-01");
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let config = config(&[
            ("PORT", "eighty"),
            ("GR10_MIRROR", "dropbox"),
            ("GR10_REMOTE_TIMEOUT_SECS", "-1"),
            ("GR10_START_DATE", "08/09/2025"),
            ("GR10_KEY_PREFIX", "   "),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.mirror.kind, MirrorKind::None);
        assert_eq!(config.remote_timeout, Duration::from_secs(5));
        assert_eq!(config.start_date, default_start_date());
        assert_eq!(config.key_prefix, "gr10-");
    }
}
