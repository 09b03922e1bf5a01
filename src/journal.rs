use crate::errors::ValidationError;
use crate::models::{Comment, ProgressRecord, RatingCategory};
use crate::progress::{ProgressEvent, ProgressTracker};
use crate::storage::KvStore;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use tokio::sync::broadcast;

pub const NOTES_KEY: &str = "stage-notes";
pub const RATINGS_KEY: &str = "stage-ratings";
pub const DETAILED_RATINGS_KEY: &str = "detailed-ratings";
pub const PHOTOS_KEY: &str = "stage-photos";
pub const COMMENTS_KEY: &str = "stage-comments";

pub const MAX_NOTES_LEN: usize = 5000;
pub const MAX_AUTHOR_LEN: usize = 50;
pub const MAX_COMMENT_LEN: usize = 500;
pub const MAX_RATING: u8 = 5;

pub fn validate_rating(value: u8) -> Result<(), ValidationError> {
    if value > MAX_RATING {
        return Err(ValidationError::RatingOutOfRange {
            value,
            max: MAX_RATING,
        });
    }
    Ok(())
}

fn validate_text(field: &'static str, text: &str, max: usize) -> Result<(), ValidationError> {
    if text.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

/// Packs raw image bytes into a `data:` URI.
pub fn encode_photo(bytes: &[u8], content_type: &str) -> String {
    format!("data:{content_type};base64,{}", STANDARD.encode(bytes))
}

fn day_map<T: DeserializeOwned>(store: &KvStore, key: &str) -> BTreeMap<u32, T> {
    store.get(key, BTreeMap::new())
}

/// Per-stage notes, ratings, photos and comments. Each field lives under
/// its own store key as a map from day to value.
pub struct Journal {
    events: broadcast::Sender<ProgressEvent>,
}

impl Journal {
    pub fn new(events: broadcast::Sender<ProgressEvent>) -> Self {
        Self { events }
    }

    pub fn record(&self, store: &KvStore, tracker: &ProgressTracker, day: u32) -> ProgressRecord {
        ProgressRecord {
            day,
            completed: tracker.is_completed(day),
            notes: day_map::<String>(store, NOTES_KEY)
                .remove(&day)
                .unwrap_or_default(),
            rating: day_map::<u8>(store, RATINGS_KEY)
                .remove(&day)
                .unwrap_or_default(),
            detailed_ratings: day_map(store, DETAILED_RATINGS_KEY)
                .remove(&day)
                .unwrap_or_default(),
            photos: day_map(store, PHOTOS_KEY).remove(&day).unwrap_or_default(),
            comments: day_map(store, COMMENTS_KEY).remove(&day).unwrap_or_default(),
        }
    }

    /// Days with at least one journal field set.
    pub fn known_days(&self, store: &KvStore) -> Vec<u32> {
        let mut days: Vec<u32> = [NOTES_KEY, RATINGS_KEY, DETAILED_RATINGS_KEY, PHOTOS_KEY, COMMENTS_KEY]
            .into_iter()
            .flat_map(|key| day_map::<serde_json::Value>(store, key).into_keys())
            .collect();
        days.sort_unstable();
        days.dedup();
        days
    }

    pub async fn set_notes(
        &self,
        store: &mut KvStore,
        day: u32,
        notes: &str,
    ) -> Result<(), ValidationError> {
        validate_text("notes", notes, MAX_NOTES_LEN)?;
        let notes = notes.to_string();
        self.update(store, NOTES_KEY, day, |entry: &mut String| *entry = notes)
            .await;
        Ok(())
    }

    pub async fn set_rating(
        &self,
        store: &mut KvStore,
        day: u32,
        rating: u8,
    ) -> Result<(), ValidationError> {
        validate_rating(rating)?;
        self.update(store, RATINGS_KEY, day, |entry: &mut u8| *entry = rating)
            .await;
        Ok(())
    }

    pub async fn set_detailed_rating(
        &self,
        store: &mut KvStore,
        day: u32,
        category: RatingCategory,
        value: u8,
    ) -> Result<(), ValidationError> {
        validate_rating(value)?;
        self.update(
            store,
            DETAILED_RATINGS_KEY,
            day,
            |entry: &mut BTreeMap<RatingCategory, u8>| {
                entry.insert(category, value);
            },
        )
        .await;
        Ok(())
    }

    /// Appends a photo and returns its index.
    pub async fn add_photo(&self, store: &mut KvStore, day: u32, uri: String) -> usize {
        let mut index = 0;
        self.update(store, PHOTOS_KEY, day, |photos: &mut Vec<String>| {
            photos.push(uri);
            index = photos.len() - 1;
        })
        .await;
        index
    }

    pub async fn remove_photo(&self, store: &mut KvStore, day: u32, index: usize) -> bool {
        let mut photos: BTreeMap<u32, Vec<String>> = day_map(store, PHOTOS_KEY);
        let Some(list) = photos.get_mut(&day).filter(|list| index < list.len()) else {
            return false;
        };
        list.remove(index);
        store.set(PHOTOS_KEY, &photos).await;
        self.notify(day);
        true
    }

    pub async fn add_comment(
        &self,
        store: &mut KvStore,
        day: u32,
        author: &str,
        text: &str,
    ) -> Result<Comment, ValidationError> {
        self.add_comment_at(store, day, author, text, Utc::now()).await
    }

    /// Newest comments come first.
    pub async fn add_comment_at(
        &self,
        store: &mut KvStore,
        day: u32,
        author: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Comment, ValidationError> {
        let author = author.trim();
        let text = text.trim();
        if author.is_empty() {
            return Err(ValidationError::Empty { field: "author" });
        }
        if text.is_empty() {
            return Err(ValidationError::Empty { field: "comment" });
        }
        validate_text("author", author, MAX_AUTHOR_LEN)?;
        validate_text("comment", text, MAX_COMMENT_LEN)?;

        let comment = Comment {
            author: author.to_string(),
            text: text.to_string(),
            timestamp: now.to_rfc3339(),
        };
        let stored = comment.clone();
        self.update(store, COMMENTS_KEY, day, |comments: &mut Vec<Comment>| {
            comments.insert(0, stored)
        })
        .await;
        Ok(comment)
    }

    pub fn all_comments(&self, store: &KvStore) -> BTreeMap<u32, Vec<Comment>> {
        day_map::<Vec<Comment>>(store, COMMENTS_KEY)
            .into_iter()
            .filter(|(_, comments)| !comments.is_empty())
            .collect()
    }

    async fn update<T, F>(&self, store: &mut KvStore, key: &str, day: u32, apply: F)
    where
        T: Default + Serialize + DeserializeOwned,
        F: FnOnce(&mut T),
    {
        let mut map: BTreeMap<u32, T> = day_map(store, key);
        apply(map.entry(day).or_default());
        store.set(key, &map).await;
        self.notify(day);
    }

    fn notify(&self, day: u32) {
        let _ = self.events.send(ProgressEvent::RecordChanged { day });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DEFAULT_PREFIX;
    use chrono::TimeZone;

    fn setup() -> (KvStore, ProgressTracker, Journal) {
        let store = KvStore::in_memory(DEFAULT_PREFIX);
        let (events, _) = broadcast::channel(16);
        let tracker = ProgressTracker::load(&store, events.clone());
        (store, tracker, Journal::new(events))
    }

    #[tokio::test]
    async fn untouched_day_yields_blank_record() {
        let (store, tracker, journal) = setup();
        let record = journal.record(&store, &tracker, 7);
        assert_eq!(
            record,
            ProgressRecord {
                day: 7,
                ..ProgressRecord::default()
            }
        );
        assert!(journal.known_days(&store).is_empty());
    }

    #[tokio::test]
    async fn fields_are_assembled_into_one_record() {
        let (mut store, mut tracker, journal) = setup();
        tracker.toggle_completion(1, &mut store).await.unwrap();
        journal.set_notes(&mut store, 1, "Brouillard sur la Rhune").await.unwrap();
        journal.set_rating(&mut store, 1, 4).await.unwrap();
        journal
            .set_detailed_rating(&mut store, 1, RatingCategory::Balisage, 5)
            .await
            .unwrap();
        journal
            .add_photo(&mut store, 1, "https://example.org/rhune.jpg".into())
            .await;

        let record = journal.record(&store, &tracker, 1);
        assert!(record.completed);
        assert_eq!(record.notes, "Brouillard sur la Rhune");
        assert_eq!(record.rating, 4);
        assert_eq!(record.detailed_ratings.get(&RatingCategory::Balisage), Some(&5));
        assert_eq!(record.photos.len(), 1);
        assert_eq!(journal.known_days(&store), vec![1]);
        assert!(store.has(NOTES_KEY));
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_without_writing() {
        let (mut store, _tracker, journal) = setup();
        assert_eq!(
            journal.set_rating(&mut store, 2, 6).await,
            Err(ValidationError::RatingOutOfRange { value: 6, max: 5 })
        );
        let long_notes = "a".repeat(MAX_NOTES_LEN + 1);
        assert!(journal.set_notes(&mut store, 2, &long_notes).await.is_err());
        assert_eq!(
            journal.add_comment(&mut store, 2, "  ", "Superbe").await,
            Err(ValidationError::Empty { field: "author" })
        );
        let long_author = "é".repeat(MAX_AUTHOR_LEN + 1);
        assert!(journal.add_comment(&mut store, 2, &long_author, "ok").await.is_err());
        let long_comment = "x".repeat(MAX_COMMENT_LEN + 1);
        assert_eq!(
            journal.add_comment(&mut store, 2, "Ana", &long_comment).await,
            Err(ValidationError::TooLong {
                field: "comment",
                max: MAX_COMMENT_LEN
            })
        );
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn comments_are_kept_newest_first() {
        let (mut store, tracker, journal) = setup();
        let first = Utc.with_ymd_and_hms(2025, 9, 10, 8, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2025, 9, 10, 19, 30, 0).unwrap();
        journal
            .add_comment_at(&mut store, 3, " Ana ", "Départ sous la pluie", first)
            .await
            .unwrap();
        journal
            .add_comment_at(&mut store, 3, "Iñaki", "Arrivée au soleil", second)
            .await
            .unwrap();

        let record = journal.record(&store, &tracker, 3);
        let authors: Vec<&str> = record.comments.iter().map(|c| c.author.as_str()).collect();
        assert_eq!(authors, vec!["Iñaki", "Ana"]);

        let all = journal.all_comments(&store);
        assert_eq!(all.len(), 1);
        assert_eq!(all[&3].len(), 2);
    }

    #[tokio::test]
    async fn photos_can_be_removed_by_index() {
        let (mut store, tracker, journal) = setup();
        assert_eq!(journal.add_photo(&mut store, 5, "a".into()).await, 0);
        assert_eq!(journal.add_photo(&mut store, 5, "b".into()).await, 1);

        assert!(!journal.remove_photo(&mut store, 5, 2).await);
        assert!(!journal.remove_photo(&mut store, 6, 0).await);
        assert!(journal.remove_photo(&mut store, 5, 0).await);
        assert_eq!(journal.record(&store, &tracker, 5).photos, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn mutations_emit_record_events() {
        let (mut store, tracker, journal) = setup();
        let mut events = tracker.subscribe();
        journal.set_notes(&mut store, 9, "").await.unwrap();
        assert_eq!(events.recv().await.unwrap(), ProgressEvent::RecordChanged { day: 9 });
    }

    #[test]
    fn photo_bytes_become_data_uri() {
        assert_eq!(encode_photo(b"hi", "image/png"), "data:image/png;base64,aGk=");
    }
}
