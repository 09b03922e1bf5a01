use crate::models::{MigrationReport, ProgressRecord, StageRecord};
use crate::mirror::RemoteMirror;
use crate::progress::ProgressEvent;
use crate::state::Dashboard;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

/// Forwards every local change to the mirror. Records are snapshotted
/// under the lock and handed to a single writer task, so a slow backend
/// never holds up the dashboard and saves for a day land in order.
pub fn spawn_mirror_pump<M>(
    dashboard: Arc<Mutex<Dashboard>>,
    mirror: Arc<M>,
    mut events: broadcast::Receiver<ProgressEvent>,
) -> JoinHandle<()>
where
    M: RemoteMirror + 'static,
{
    let (snapshots, pending) = mpsc::unbounded_channel();
    tokio::spawn(write_snapshots(mirror, pending));

    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("mirror pump skipped {skipped} events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let records: Vec<ProgressRecord> = {
                let dashboard = dashboard.lock().await;
                let days = match &event {
                    ProgressEvent::CompletionChanged { affected, .. } => affected.clone(),
                    ProgressEvent::RecordChanged { day } => vec![*day],
                    ProgressEvent::Reloaded => dashboard.known_days(),
                };
                days.into_iter().map(|day| dashboard.record(day)).collect()
            };

            for record in records {
                if snapshots.send(record).is_err() {
                    warn!("mirror writer stopped, pump exiting");
                    return;
                }
            }
        }
        debug!("mirror pump stopped");
    })
}

/// Saves snapshots one at a time. Whatever queued up during a save is
/// collapsed to the newest snapshot per day before the next round.
async fn write_snapshots<M: RemoteMirror>(
    mirror: Arc<M>,
    mut pending: mpsc::UnboundedReceiver<ProgressRecord>,
) {
    while let Some(first) = pending.recv().await {
        let mut batch = BTreeMap::from([(first.day, first)]);
        while let Ok(record) = pending.try_recv() {
            batch.insert(record.day, record);
        }
        for (day, record) in batch {
            if !mirror.save_progress(day, &record).await {
                debug!("day {day} stays local until the next change");
            }
        }
    }
}

/// Polls the mirror every `every` and calls `on_change` whenever the
/// remote snapshot differs from the last one seen.
pub fn listen_to_all_progress<M, F>(mirror: Arc<M>, every: Duration, mut on_change: F) -> JoinHandle<()>
where
    M: RemoteMirror + 'static,
    F: FnMut(BTreeMap<u32, ProgressRecord>) + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_seen = None;
        loop {
            ticker.tick().await;
            let Some(snapshot) = mirror.fetch_all_progress().await else {
                continue;
            };
            if last_seen.as_ref() != Some(&snapshot) {
                debug!("remote snapshot changed, {} records", snapshot.len());
                last_seen = Some(snapshot.clone());
                on_change(snapshot);
            }
        }
    })
}

/// Pushes the stage catalog to a mirror that holds no stages yet.
pub async fn migrate_stages<M: RemoteMirror>(mirror: &M, stages: &[StageRecord]) -> MigrationReport {
    match mirror.get_stages().await {
        Some(existing) if !existing.is_empty() => {
            info!("{} already holds {} stages, migration skipped", mirror.name(), existing.len());
            return MigrationReport {
                skipped: true,
                ..MigrationReport::default()
            };
        }
        Some(_) => {}
        None => {
            warn!("{} unreachable, no stage migrated", mirror.name());
            return MigrationReport {
                failed: stages.len(),
                ..MigrationReport::default()
            };
        }
    }

    let mut report = MigrationReport::default();
    for stage in stages {
        if mirror.save_stage(stage.day, stage).await {
            report.pushed += 1;
        } else {
            report.failed += 1;
        }
    }
    info!(
        "stage migration to {}: {} pushed, {} failed",
        mirror.name(),
        report.pushed,
        report.failed
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{sample_stages, StageCatalog};
    use crate::mirror::{Mirror, MemoryMirror};
    use crate::storage::{KvStore, DEFAULT_PREFIX};
    use tokio::time::{sleep, timeout};

    fn dashboard() -> Arc<Mutex<Dashboard>> {
        Arc::new(Mutex::new(Dashboard::new(
            KvStore::in_memory(DEFAULT_PREFIX),
            StageCatalog::from_stages(sample_stages()),
        )))
    }

    async fn wait_for_remote(mirror: &MemoryMirror, expected: usize) -> BTreeMap<u32, ProgressRecord> {
        timeout(Duration::from_secs(2), async {
            loop {
                let remote = mirror.fetch_all_progress().await.unwrap_or_default();
                if remote.len() >= expected {
                    return remote;
                }
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn pump_delivers_changed_records() {
        let dashboard = dashboard();
        let mirror = Arc::new(MemoryMirror::default());
        let events = dashboard.lock().await.subscribe();
        spawn_mirror_pump(Arc::clone(&dashboard), Arc::clone(&mirror), events);

        {
            let mut dashboard = dashboard.lock().await;
            dashboard.toggle(1).await.unwrap();
            dashboard.set_notes(3, "Orage annoncé").await.unwrap();
        }

        let remote = wait_for_remote(&mirror, 2).await;
        assert!(remote[&1].completed);
        assert_eq!(remote[&3].notes, "Orage annoncé");
    }

    #[tokio::test]
    async fn cascade_marks_every_undone_day() {
        let dashboard = dashboard();
        let mirror = Arc::new(MemoryMirror::default());
        let events = dashboard.lock().await.subscribe();
        spawn_mirror_pump(Arc::clone(&dashboard), Arc::clone(&mirror), events);

        {
            let mut dashboard = dashboard.lock().await;
            for day in 1..=3 {
                dashboard.toggle(day).await.unwrap();
            }
            dashboard.toggle(2).await.unwrap();
        }

        timeout(Duration::from_secs(2), async {
            loop {
                let remote = mirror.fetch_all_progress().await.unwrap_or_default();
                let undone = [2, 3]
                    .iter()
                    .all(|day| remote.get(day).is_some_and(|record| !record.completed));
                if undone && remote.get(&1).is_some_and(|record| record.completed) {
                    break;
                }
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    /// Lags on completed records, so a stale "done" save would land last
    /// if saves ran concurrently.
    #[derive(Default)]
    struct SlowOnCompleted {
        inner: MemoryMirror,
    }

    impl RemoteMirror for SlowOnCompleted {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn save_progress(&self, day: u32, record: &ProgressRecord) -> bool {
            if record.completed {
                sleep(Duration::from_millis(200)).await;
            }
            self.inner.save_progress(day, record).await
        }

        async fn get_progress(&self, day: u32) -> Option<ProgressRecord> {
            self.inner.get_progress(day).await
        }

        async fn fetch_all_progress(&self) -> Option<BTreeMap<u32, ProgressRecord>> {
            self.inner.fetch_all_progress().await
        }

        async fn save_stage(&self, day: u32, stage: &StageRecord) -> bool {
            self.inner.save_stage(day, stage).await
        }

        async fn get_stages(&self) -> Option<Vec<StageRecord>> {
            self.inner.get_stages().await
        }
    }

    #[tokio::test]
    async fn slow_save_never_overwrites_newer_state() {
        let dashboard = dashboard();
        let mirror = Arc::new(SlowOnCompleted::default());
        let events = dashboard.lock().await.subscribe();
        spawn_mirror_pump(Arc::clone(&dashboard), Arc::clone(&mirror), events);

        dashboard.lock().await.toggle(1).await.unwrap();
        sleep(Duration::from_millis(30)).await;
        dashboard.lock().await.toggle(1).await.unwrap();

        timeout(Duration::from_secs(2), async {
            while mirror.get_progress(1).await.is_none_or(|record| record.completed) {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        sleep(Duration::from_millis(300)).await;
        assert!(!dashboard.lock().await.tracker.is_completed(1));
        assert_eq!(mirror.get_progress(1).await.map(|record| record.completed), Some(false));
    }

    #[tokio::test]
    async fn listener_reports_changes_once() {
        let mirror = Arc::new(MemoryMirror::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        listen_to_all_progress(Arc::clone(&mirror), Duration::from_millis(10), move |snapshot| {
            let _ = tx.send(snapshot);
        });

        let first = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert!(first.is_empty());

        let record = ProgressRecord {
            day: 1,
            completed: true,
            ..ProgressRecord::default()
        };
        mirror.save_progress(1, &record).await;
        let second = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(second.get(&1), Some(&record));

        sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn migration_runs_once() {
        let mirror = MemoryMirror::default();
        let stages = sample_stages();

        let report = migrate_stages(&mirror, &stages).await;
        assert_eq!(
            report,
            MigrationReport {
                pushed: 4,
                failed: 0,
                skipped: false
            }
        );
        assert_eq!(mirror.get_stages().await.map(|s| s.len()), Some(4));

        let again = migrate_stages(&mirror, &stages).await;
        assert!(again.skipped);
        assert_eq!(again.pushed, 0);
    }

    #[tokio::test]
    async fn disabled_mirror_fails_migration() {
        let report = migrate_stages(&Mirror::Disabled, &sample_stages()).await;
        assert_eq!(report.failed, 4);
        assert!(!report.skipped);
    }
}
