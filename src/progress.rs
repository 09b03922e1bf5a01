use crate::catalog::StageCatalog;
use crate::errors::ProgressError;
use crate::models::ProgressStats;
use crate::storage::KvStore;
use std::collections::BTreeSet;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub const COMPLETED_KEY: &str = "completed-stages";

/// Stage count assumed when the catalog could not be loaded.
pub const DEFAULT_TOTAL_STAGES: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// `affected` lists every day whose completion flag flipped.
    CompletionChanged {
        day: u32,
        completed: bool,
        affected: Vec<u32>,
    },
    RecordChanged {
        day: u32,
    },
    /// The whole state was replaced, e.g. by an import.
    Reloaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toggle {
    Completed(u32),
    Uncompleted(Vec<u32>),
}

pub fn total_stages(catalog: &StageCatalog) -> usize {
    if catalog.is_empty() {
        DEFAULT_TOTAL_STAGES
    } else {
        catalog.len()
    }
}

/// Completion state of every stage, under the sequential-prefix rule:
/// day D can only be completed once D-1 is, and undoing D undoes every
/// completed day after it.
pub struct ProgressTracker {
    completed: BTreeSet<u32>,
    events: broadcast::Sender<ProgressEvent>,
}

impl ProgressTracker {
    pub fn load(store: &KvStore, events: broadcast::Sender<ProgressEvent>) -> Self {
        Self {
            completed: read_completed(store),
            events,
        }
    }

    pub fn reload(&mut self, store: &KvStore) {
        self.completed = read_completed(store);
        info!("progress reloaded with {} completed stages", self.completed.len());
        let _ = self.events.send(ProgressEvent::Reloaded);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    pub fn completed(&self) -> Vec<u32> {
        self.completed.iter().copied().collect()
    }

    pub fn is_completed(&self, day: u32) -> bool {
        self.completed.contains(&day)
    }

    pub fn can_complete(&self, day: u32) -> bool {
        day == 1 || (day > 1 && self.completed.contains(&(day - 1)))
    }

    pub async fn toggle_completion(
        &mut self,
        day: u32,
        store: &mut KvStore,
    ) -> Result<Toggle, ProgressError> {
        let toggle = if self.completed.contains(&day) {
            let undone: Vec<u32> = self.completed.range(day..).copied().collect();
            for stage in &undone {
                self.completed.remove(stage);
            }
            Toggle::Uncompleted(undone)
        } else {
            if !self.can_complete(day) {
                return Err(ProgressError::SequenceViolation {
                    day,
                    required_day: day.saturating_sub(1),
                });
            }
            self.completed.insert(day);
            Toggle::Completed(day)
        };

        store.set(COMPLETED_KEY, &self.completed()).await;

        let event = match &toggle {
            Toggle::Completed(day) => ProgressEvent::CompletionChanged {
                day: *day,
                completed: true,
                affected: vec![*day],
            },
            Toggle::Uncompleted(undone) => ProgressEvent::CompletionChanged {
                day,
                completed: false,
                affected: undone.clone(),
            },
        };
        let _ = self.events.send(event);

        Ok(toggle)
    }

    /// Smallest day not yet completed.
    pub fn next_eligible_day(&self) -> u32 {
        (1u32..)
            .find(|day| !self.completed.contains(day))
            .unwrap_or(1)
    }

    pub fn stats(&self, catalog: &StageCatalog) -> ProgressStats {
        let total = total_stages(catalog);
        let completed = self.completed.len();

        let mut cumulative_distance_km = 0.0;
        let mut cumulative_elevation_gain_m = 0u64;
        let mut cumulative_elevation_loss_m = 0u64;
        for stage in self.completed.iter().filter_map(|day| catalog.get_by_day(*day)) {
            cumulative_distance_km += stage.distance_km;
            cumulative_elevation_gain_m += u64::from(stage.elevation_gain_m);
            cumulative_elevation_loss_m += u64::from(stage.elevation_loss_m);
        }

        let percentage = ((completed as f64 * 100.0) / total as f64).round() as u32;

        ProgressStats {
            completed,
            remaining: total.saturating_sub(completed),
            total,
            percentage: percentage.min(100),
            cumulative_distance_km,
            cumulative_elevation_gain_m,
            cumulative_elevation_loss_m,
        }
    }
}

fn read_completed(store: &KvStore) -> BTreeSet<u32> {
    let completed: BTreeSet<u32> = store
        .get::<Vec<u32>>(COMPLETED_KEY, Vec::new())
        .into_iter()
        .filter(|day| *day > 0)
        .collect();
    let is_prefix = completed.iter().zip(1u32..).all(|(day, expected)| *day == expected);
    if !is_prefix {
        warn!("stored completed stages are not a prefix run from day 1: {completed:?}");
    }
    completed
}
