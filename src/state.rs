use crate::catalog::{StageCatalog, EMBEDDED_STAGES};
use crate::config::Config;
use crate::errors::{ProgressError, ValidationError};
use crate::journal::Journal;
use crate::mirror::Mirror;
use crate::models::{Comment, ProgressRecord, ProgressResponse, RatingCategory};
use crate::progress::{self, ProgressEvent, ProgressTracker, Toggle};
use crate::storage::KvStore;
use chrono::NaiveDate;
use std::{collections::BTreeMap, sync::Arc};
use tokio::{
    fs,
    sync::{broadcast, watch, Mutex},
};
use tracing::{info, warn};

const EVENT_CAPACITY: usize = 64;

pub type RemoteSnapshot = Option<BTreeMap<u32, ProgressRecord>>;

/// Owns every piece of local state. Handlers reach it through
/// [`AppState`] and a single mutex, so each request runs to completion.
pub struct Dashboard {
    pub store: KvStore,
    pub catalog: StageCatalog,
    pub tracker: ProgressTracker,
    pub journal: Journal,
}

impl Dashboard {
    pub fn new(store: KvStore, catalog: StageCatalog) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let tracker = ProgressTracker::load(&store, events.clone());
        Self {
            store,
            catalog,
            tracker,
            journal: Journal::new(events),
        }
    }

    pub async fn open(config: &Config, client: reqwest::Client) -> Self {
        let store = KvStore::open(&config.data_path, config.key_prefix.clone()).await;

        let dataset = match &config.stages_path {
            Some(path) => match fs::read_to_string(path).await {
                Ok(text) => Some(text),
                Err(err) => {
                    warn!("failed to read stage dataset {}: {err}", path.display());
                    None
                }
            },
            None => Some(EMBEDDED_STAGES.to_string()),
        };
        let mut catalog = StageCatalog::new(dataset, config.stages_url.clone(), client);
        let count = catalog.load().await.len();
        info!("dashboard ready with {count} stages");

        Self::new(store, catalog)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tracker.subscribe()
    }

    pub fn total_stages(&self) -> usize {
        progress::total_stages(&self.catalog)
    }

    pub fn record(&self, day: u32) -> ProgressRecord {
        self.journal.record(&self.store, &self.tracker, day)
    }

    /// Days that have anything worth mirroring.
    pub fn known_days(&self) -> Vec<u32> {
        let mut days = self.tracker.completed();
        days.extend(self.journal.known_days(&self.store));
        days.sort_unstable();
        days.dedup();
        days
    }

    pub fn progress(&self) -> ProgressResponse {
        ProgressResponse {
            completed_days: self.tracker.completed(),
            next_eligible_day: self.tracker.next_eligible_day(),
            stats: self.tracker.stats(&self.catalog),
        }
    }

    pub async fn toggle(&mut self, day: u32) -> Result<Toggle, ProgressError> {
        self.tracker.toggle_completion(day, &mut self.store).await
    }

    pub async fn set_notes(&mut self, day: u32, notes: &str) -> Result<(), ValidationError> {
        self.journal.set_notes(&mut self.store, day, notes).await
    }

    pub async fn set_rating(&mut self, day: u32, rating: u8) -> Result<(), ValidationError> {
        self.journal.set_rating(&mut self.store, day, rating).await
    }

    pub async fn set_detailed_rating(
        &mut self,
        day: u32,
        category: RatingCategory,
        value: u8,
    ) -> Result<(), ValidationError> {
        self.journal
            .set_detailed_rating(&mut self.store, day, category, value)
            .await
    }

    pub async fn add_photo(&mut self, day: u32, uri: String) -> usize {
        self.journal.add_photo(&mut self.store, day, uri).await
    }

    pub async fn remove_photo(&mut self, day: u32, index: usize) -> bool {
        self.journal.remove_photo(&mut self.store, day, index).await
    }

    pub async fn add_comment(
        &mut self,
        day: u32,
        author: &str,
        text: &str,
    ) -> Result<Comment, ValidationError> {
        self.journal
            .add_comment(&mut self.store, day, author, text)
            .await
    }

    pub fn all_comments(&self) -> BTreeMap<u32, Vec<Comment>> {
        self.journal.all_comments(&self.store)
    }

    pub fn export(&self) -> String {
        self.store.export_all()
    }

    /// Replaces local state with an exported blob and re-reads progress.
    pub async fn import(&mut self, blob: &str) -> bool {
        if !self.store.import_all(blob).await {
            return false;
        }
        self.tracker.reload(&self.store);
        true
    }
}

#[derive(Clone)]
pub struct AppState {
    pub dashboard: Arc<Mutex<Dashboard>>,
    pub mirror: Arc<Mirror>,
    pub remote: watch::Receiver<RemoteSnapshot>,
    pub start_date: NaiveDate,
}

impl AppState {
    pub fn new(
        dashboard: Dashboard,
        mirror: Mirror,
        remote: watch::Receiver<RemoteSnapshot>,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            dashboard: Arc::new(Mutex::new(dashboard)),
            mirror: Arc::new(mirror),
            remote,
            start_date,
        }
    }
}
