//! Property tests for the sequential completion rule.

use gr10_dashboard::progress::{ProgressTracker, Toggle, COMPLETED_KEY};
use gr10_dashboard::storage::{KvStore, DEFAULT_PREFIX};
use proptest::collection::vec;
use proptest::prelude::*;
use tokio::sync::broadcast;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
        .block_on(future)
}

fn is_prefix_run(days: &[u32]) -> bool {
    days.iter().zip(1u32..).all(|(day, expected)| *day == expected)
}

proptest! {
    /// Whatever days are clicked, the completed set stays {1..=k}.
    #[test]
    fn completed_days_always_form_a_prefix(clicks in vec(1u32..=12, 0..60)) {
        let (completed, stored) = block_on(async {
            let mut store = KvStore::in_memory(DEFAULT_PREFIX);
            let (events, _) = broadcast::channel(256);
            let mut tracker = ProgressTracker::load(&store, events);
            for day in clicks {
                let _ = tracker.toggle_completion(day, &mut store).await;
            }
            let stored: Vec<u32> = store.get(COMPLETED_KEY, Vec::new());
            (tracker.completed(), stored)
        });

        prop_assert!(is_prefix_run(&completed));
        prop_assert_eq!(&completed, &stored);
    }

    /// A rejected toggle leaves the state exactly as it was.
    #[test]
    fn rejected_toggle_changes_nothing(done in 0u32..10, gap in 2u32..5) {
        let (rejected, before, after) = block_on(async {
            let mut store = KvStore::in_memory(DEFAULT_PREFIX);
            let (events, _) = broadcast::channel(64);
            let mut tracker = ProgressTracker::load(&store, events);
            for day in 1..=done {
                tracker.toggle_completion(day, &mut store).await.expect("in order");
            }
            let before = tracker.completed();
            let rejected = tracker.toggle_completion(done + gap, &mut store).await.is_err();
            (rejected, before, tracker.completed())
        });

        prop_assert!(rejected);
        prop_assert_eq!(after, before);
    }

    /// Undoing day d drops exactly the days from d onwards.
    #[test]
    fn uncompleting_cascades(done in 1u32..15, pick in 0u32..15) {
        let undo = pick % done + 1;
        let (toggle, completed) = block_on(async {
            let mut store = KvStore::in_memory(DEFAULT_PREFIX);
            let (events, _) = broadcast::channel(64);
            let mut tracker = ProgressTracker::load(&store, events);
            for day in 1..=done {
                tracker.toggle_completion(day, &mut store).await.expect("in order");
            }
            let toggle = tracker.toggle_completion(undo, &mut store).await.expect("undo");
            (toggle, tracker.completed())
        });

        prop_assert_eq!(toggle, Toggle::Uncompleted((undo..=done).collect()));
        prop_assert_eq!(completed, (1..undo).collect::<Vec<u32>>());
    }
}
