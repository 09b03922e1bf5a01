use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Simple,
    Moyenne,
    Difficile,
    Repos,
    Transport,
}

impl Difficulty {
    pub const ALL: [Difficulty; 5] = [
        Difficulty::Simple,
        Difficulty::Moyenne,
        Difficulty::Difficile,
        Difficulty::Repos,
        Difficulty::Transport,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Difficulty::Simple => "Simple",
            Difficulty::Moyenne => "Moyenne",
            Difficulty::Difficile => "Difficile",
            Difficulty::Repos => "Repos",
            Difficulty::Transport => "Transport",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Difficulty::ALL
            .into_iter()
            .find(|level| level.label().eq_ignore_ascii_case(value))
            .ok_or_else(|| value.to_string())
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One day of the itinerary, with distance and elevation already parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub day: u32,
    pub date: String,
    pub from: String,
    pub to: String,
    pub distance_km: f64,
    pub elevation_gain_m: u32,
    pub elevation_loss_m: u32,
    pub duration: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub terrain: String,
    #[serde(default)]
    pub lodging: String,
    #[serde(default)]
    pub water: String,
    #[serde(default)]
    pub resupply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingCategory {
    Paysage,
    Technique,
    Balisage,
    Hebergement,
    Meteo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub text: String,
    pub timestamp: String,
}

/// Everything the hiker recorded about a single stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProgressRecord {
    pub day: u32,
    pub completed: bool,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub rating: u8,
    #[serde(default)]
    pub detailed_ratings: BTreeMap<RatingCategory, u8>,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    pub total_stages: usize,
    pub total_distance_km: f64,
    pub total_elevation_gain_m: u64,
    pub total_elevation_loss_m: u64,
    pub counts_by_difficulty: BTreeMap<Difficulty, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressStats {
    pub completed: usize,
    pub remaining: usize,
    pub total: usize,
    pub percentage: u32,
    pub cumulative_distance_km: f64,
    pub cumulative_elevation_gain_m: u64,
    pub cumulative_elevation_loss_m: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsResponse {
    pub days_elapsed: i64,
    pub average_pace_per_week: f64,
    pub estimated_days_remaining: Option<i64>,
    pub difficult_stages_ahead: usize,
    pub planned_by_today: usize,
    pub ahead_by: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub completed_days: Vec<u32>,
    pub next_eligible_day: u32,
    pub stats: ProgressStats,
}

#[derive(Debug, Deserialize)]
pub struct StageQuery {
    pub difficulty: Option<String>,
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotesRequest {
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub rating: Option<u8>,
    #[serde(default)]
    pub detailed: BTreeMap<RatingCategory, u8>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub author: String,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PhotoResponse {
    pub day: u32,
    pub index: usize,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MirrorStatus {
    pub backend: String,
    pub remote_records: Option<usize>,
    pub remote_completed: Option<Vec<u32>>,
}

#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub pushed: usize,
    pub failed: usize,
    pub skipped: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_parses_case_insensitively() {
        assert_eq!("difficile".parse::<Difficulty>(), Ok(Difficulty::Difficile));
        assert_eq!(" Simple ".parse::<Difficulty>(), Ok(Difficulty::Simple));
        assert!("extreme".parse::<Difficulty>().is_err());
    }

    #[test]
    fn difficulty_map_keys_serialize_lowercase() {
        let mut counts = BTreeMap::new();
        counts.insert(Difficulty::Repos, 2usize);
        let json = serde_json::to_string(&counts).unwrap();
        assert_eq!(json, r#"{"repos":2}"#);
    }
}
