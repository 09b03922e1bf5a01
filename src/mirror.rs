use crate::config::{MirrorConfig, MirrorKind};
use crate::models::{Comment, ProgressRecord, RatingCategory, StageRecord};
use chrono::Utc;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Best-effort remote copy of the local progress.
///
/// Every operation reports failure as `false` or `None` instead of an
/// error: an unreachable backend just means "offline" and local state
/// stays authoritative.
pub trait RemoteMirror: Send + Sync {
    fn name(&self) -> &'static str;

    fn save_progress(&self, day: u32, record: &ProgressRecord) -> impl Future<Output = bool> + Send;

    fn get_progress(&self, day: u32) -> impl Future<Output = Option<ProgressRecord>> + Send;

    fn fetch_all_progress(
        &self,
    ) -> impl Future<Output = Option<BTreeMap<u32, ProgressRecord>>> + Send;

    fn save_stage(&self, day: u32, stage: &StageRecord) -> impl Future<Output = bool> + Send;

    fn get_stages(&self) -> impl Future<Output = Option<Vec<StageRecord>>> + Send;
}

async fn send_ok(backend: &str, what: &str, request: RequestBuilder) -> bool {
    let result = async { request.send().await?.error_for_status() }.await;
    match result {
        Ok(_) => {
            debug!("{backend}: {what} saved");
            true
        }
        Err(err) => {
            warn!("{backend}: {what} not saved: {err}");
            false
        }
    }
}

async fn fetch_json<T: DeserializeOwned + Send>(
    backend: &str,
    what: &str,
    request: RequestBuilder,
) -> Option<T> {
    let result = async { request.send().await?.error_for_status()?.json::<T>().await }.await;
    result
        .map_err(|err| warn!("{backend}: {what} unavailable: {err}"))
        .ok()
}

/// In-process mirror, handy for demos and tests.
#[derive(Default)]
pub struct MemoryMirror {
    progress: Mutex<BTreeMap<u32, ProgressRecord>>,
    stages: Mutex<BTreeMap<u32, StageRecord>>,
}

impl RemoteMirror for MemoryMirror {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn save_progress(&self, day: u32, record: &ProgressRecord) -> bool {
        self.progress.lock().await.insert(day, record.clone());
        true
    }

    async fn get_progress(&self, day: u32) -> Option<ProgressRecord> {
        self.progress.lock().await.get(&day).cloned()
    }

    async fn fetch_all_progress(&self) -> Option<BTreeMap<u32, ProgressRecord>> {
        Some(self.progress.lock().await.clone())
    }

    async fn save_stage(&self, day: u32, stage: &StageRecord) -> bool {
        self.stages.lock().await.insert(day, stage.clone());
        true
    }

    async fn get_stages(&self) -> Option<Vec<StageRecord>> {
        Some(self.stages.lock().await.values().cloned().collect())
    }
}

/// Firebase Realtime Database over its REST interface. Documents live at
/// `gr10-progress/stage-<day>` and `gr10-stages/stage-<day>`.
pub struct FirebaseMirror {
    client: Client,
    base_url: String,
    auth: Option<String>,
}

impl FirebaseMirror {
    pub fn new(client: Client, base_url: &str, auth: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, format!("{}/{path}.json", self.base_url));
        match &self.auth {
            Some(auth) => request.query(&[("auth", auth)]),
            None => request,
        }
    }
}

impl RemoteMirror for FirebaseMirror {
    fn name(&self) -> &'static str {
        "firebase"
    }

    async fn save_progress(&self, day: u32, record: &ProgressRecord) -> bool {
        let request = self
            .request(reqwest::Method::PUT, &format!("gr10-progress/stage-{day}"))
            .json(record);
        send_ok(self.name(), &format!("progress for day {day}"), request).await
    }

    async fn get_progress(&self, day: u32) -> Option<ProgressRecord> {
        let request = self.request(reqwest::Method::GET, &format!("gr10-progress/stage-{day}"));
        fetch_json::<Option<ProgressRecord>>(self.name(), "progress", request)
            .await
            .flatten()
    }

    async fn fetch_all_progress(&self) -> Option<BTreeMap<u32, ProgressRecord>> {
        let request = self.request(reqwest::Method::GET, "gr10-progress");
        let documents: Option<BTreeMap<String, ProgressRecord>> =
            fetch_json(self.name(), "all progress", request).await?;
        Some(
            documents
                .unwrap_or_default()
                .into_values()
                .map(|record| (record.day, record))
                .collect(),
        )
    }

    async fn save_stage(&self, day: u32, stage: &StageRecord) -> bool {
        let request = self
            .request(reqwest::Method::PUT, &format!("gr10-stages/stage-{day}"))
            .json(stage);
        send_ok(self.name(), &format!("stage {day}"), request).await
    }

    async fn get_stages(&self) -> Option<Vec<StageRecord>> {
        let request = self.request(reqwest::Method::GET, "gr10-stages");
        let documents: Option<BTreeMap<String, StageRecord>> =
            fetch_json(self.name(), "stages", request).await?;
        let mut stages: Vec<StageRecord> = documents.unwrap_or_default().into_values().collect();
        stages.sort_by_key(|stage| stage.day);
        Some(stages)
    }
}

/// Row layout of the `gr10_progress` table.
#[derive(Debug, Serialize, Deserialize)]
struct ProgressRow {
    stage_id: String,
    user_id: String,
    completed: bool,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    rating: Option<u8>,
    #[serde(default)]
    detailed_rating: Option<BTreeMap<RatingCategory, u8>>,
    #[serde(default)]
    photos: Option<Vec<String>>,
    #[serde(default)]
    comments: Option<Vec<Comment>>,
    #[serde(default)]
    updated_at: Option<String>,
}

impl ProgressRow {
    fn from_record(user_id: &str, record: &ProgressRecord) -> Self {
        Self {
            stage_id: record.day.to_string(),
            user_id: user_id.to_string(),
            completed: record.completed,
            notes: Some(record.notes.clone()),
            rating: Some(record.rating),
            detailed_rating: Some(record.detailed_ratings.clone()),
            photos: Some(record.photos.clone()),
            comments: Some(record.comments.clone()),
            updated_at: Some(Utc::now().to_rfc3339()),
        }
    }

    fn into_record(self) -> Option<ProgressRecord> {
        Some(ProgressRecord {
            day: self.stage_id.parse().ok()?,
            completed: self.completed,
            notes: self.notes.unwrap_or_default(),
            rating: self.rating.unwrap_or_default(),
            detailed_ratings: self.detailed_rating.unwrap_or_default(),
            photos: self.photos.unwrap_or_default(),
            comments: self.comments.unwrap_or_default(),
        })
    }
}

/// Supabase through PostgREST, tables `gr10_progress` and `gr10_stages`.
pub struct SupabaseMirror {
    client: Client,
    base_url: String,
    api_key: String,
    user_id: String,
}

impl SupabaseMirror {
    pub fn new(client: Client, base_url: &str, api_key: String, user_id: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            user_id,
        }
    }

    fn request(&self, method: reqwest::Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/rest/v1/{table}", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    fn upsert(&self, table: &str, conflict: &str) -> RequestBuilder {
        self.request(reqwest::Method::POST, table)
            .query(&[("on_conflict", conflict)])
            .header("Prefer", "resolution=merge-duplicates")
    }
}

impl RemoteMirror for SupabaseMirror {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn save_progress(&self, day: u32, record: &ProgressRecord) -> bool {
        let row = ProgressRow::from_record(&self.user_id, record);
        let request = self.upsert("gr10_progress", "stage_id,user_id").json(&[row]);
        send_ok(self.name(), &format!("progress for day {day}"), request).await
    }

    async fn get_progress(&self, day: u32) -> Option<ProgressRecord> {
        let stage_filter = format!("eq.{day}");
        let user_filter = format!("eq.{}", self.user_id);
        let request = self.request(reqwest::Method::GET, "gr10_progress").query(&[
            ("select", "*"),
            ("stage_id", stage_filter.as_str()),
            ("user_id", user_filter.as_str()),
        ]);
        let rows: Vec<ProgressRow> = fetch_json(self.name(), "progress", request).await?;
        rows.into_iter().find_map(ProgressRow::into_record)
    }

    async fn fetch_all_progress(&self) -> Option<BTreeMap<u32, ProgressRecord>> {
        let user_filter = format!("eq.{}", self.user_id);
        let request = self
            .request(reqwest::Method::GET, "gr10_progress")
            .query(&[("select", "*"), ("user_id", user_filter.as_str())]);
        let rows: Vec<ProgressRow> = fetch_json(self.name(), "all progress", request).await?;
        Some(
            rows.into_iter()
                .filter_map(ProgressRow::into_record)
                .map(|record| (record.day, record))
                .collect(),
        )
    }

    async fn save_stage(&self, day: u32, stage: &StageRecord) -> bool {
        let request = self.upsert("gr10_stages", "day").json(&[stage]);
        send_ok(self.name(), &format!("stage {day}"), request).await
    }

    async fn get_stages(&self) -> Option<Vec<StageRecord>> {
        let request = self
            .request(reqwest::Method::GET, "gr10_stages")
            .query(&[("select", "*"), ("order", "day.asc")]);
        fetch_json(self.name(), "stages", request).await
    }
}

/// The configured backend.
pub enum Mirror {
    Disabled,
    Memory(MemoryMirror),
    Firebase(FirebaseMirror),
    Supabase(SupabaseMirror),
}

impl Mirror {
    pub fn from_config(config: &MirrorConfig, client: Client) -> Self {
        match (config.kind, &config.url, &config.key) {
            (MirrorKind::None, _, _) => Mirror::Disabled,
            (MirrorKind::Memory, _, _) => Mirror::Memory(MemoryMirror::default()),
            (MirrorKind::Firebase, Some(url), key) => {
                Mirror::Firebase(FirebaseMirror::new(client, url, key.clone()))
            }
            (MirrorKind::Supabase, Some(url), Some(key)) => Mirror::Supabase(SupabaseMirror::new(
                client,
                url,
                key.clone(),
                config.user.clone(),
            )),
            (kind, _, _) => {
                warn!("{kind:?} mirror is missing its url or key, mirroring disabled");
                Mirror::Disabled
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Mirror::Disabled)
    }
}

impl RemoteMirror for Mirror {
    fn name(&self) -> &'static str {
        match self {
            Mirror::Disabled => "none",
            Mirror::Memory(mirror) => mirror.name(),
            Mirror::Firebase(mirror) => mirror.name(),
            Mirror::Supabase(mirror) => mirror.name(),
        }
    }

    async fn save_progress(&self, day: u32, record: &ProgressRecord) -> bool {
        match self {
            Mirror::Disabled => false,
            Mirror::Memory(mirror) => mirror.save_progress(day, record).await,
            Mirror::Firebase(mirror) => mirror.save_progress(day, record).await,
            Mirror::Supabase(mirror) => mirror.save_progress(day, record).await,
        }
    }

    async fn get_progress(&self, day: u32) -> Option<ProgressRecord> {
        match self {
            Mirror::Disabled => None,
            Mirror::Memory(mirror) => mirror.get_progress(day).await,
            Mirror::Firebase(mirror) => mirror.get_progress(day).await,
            Mirror::Supabase(mirror) => mirror.get_progress(day).await,
        }
    }

    async fn fetch_all_progress(&self) -> Option<BTreeMap<u32, ProgressRecord>> {
        match self {
            Mirror::Disabled => None,
            Mirror::Memory(mirror) => mirror.fetch_all_progress().await,
            Mirror::Firebase(mirror) => mirror.fetch_all_progress().await,
            Mirror::Supabase(mirror) => mirror.fetch_all_progress().await,
        }
    }

    async fn save_stage(&self, day: u32, stage: &StageRecord) -> bool {
        match self {
            Mirror::Disabled => false,
            Mirror::Memory(mirror) => mirror.save_stage(day, stage).await,
            Mirror::Firebase(mirror) => mirror.save_stage(day, stage).await,
            Mirror::Supabase(mirror) => mirror.save_stage(day, stage).await,
        }
    }

    async fn get_stages(&self) -> Option<Vec<StageRecord>> {
        match self {
            Mirror::Disabled => None,
            Mirror::Memory(mirror) => mirror.get_stages().await,
            Mirror::Firebase(mirror) => mirror.get_stages().await,
            Mirror::Supabase(mirror) => mirror.get_stages().await,
        }
    }
}
