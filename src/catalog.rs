use crate::errors::CatalogError;
use crate::models::{Difficulty, GlobalStats, StageRecord};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// The itinerary shipped with the binary.
pub const EMBEDDED_STAGES: &str = include_str!("../data/gr10-stages.json");

/// Stage as written in the dataset, with free-text distance and elevation.
#[derive(Debug, Deserialize)]
struct RawStage {
    day: u32,
    #[serde(default)]
    date: String,
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    distance: String,
    #[serde(default)]
    elevation: String,
    #[serde(default)]
    duration: String,
    #[serde(default)]
    difficulty: String,
    #[serde(default)]
    terrain: String,
    #[serde(default, alias = "refuge")]
    lodging: String,
    #[serde(default)]
    water: String,
    #[serde(default)]
    resupply: String,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    network: Option<String>,
}

impl RawStage {
    fn into_stage(self) -> Result<StageRecord, CatalogError> {
        let required = [
            ("date", &self.date),
            ("from", &self.from),
            ("to", &self.to),
            ("distance", &self.distance),
            ("elevation", &self.elevation),
            ("duration", &self.duration),
        ];
        if let Some(&(field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(CatalogError::MissingField {
                day: self.day,
                field,
            });
        }

        let difficulty: Difficulty = self
            .difficulty
            .parse()
            .map_err(|label| CatalogError::UnknownDifficulty { day: self.day, label })?;
        let (elevation_gain_m, elevation_loss_m) = parse_elevation(&self.elevation);

        Ok(StageRecord {
            day: self.day,
            distance_km: parse_distance_km(&self.distance),
            elevation_gain_m,
            elevation_loss_m,
            date: self.date,
            from: self.from,
            to: self.to,
            duration: self.duration,
            difficulty,
            terrain: self.terrain,
            lodging: self.lodging,
            water: self.water,
            resupply: self.resupply,
            phone: self.phone,
            network: self.network,
        })
    }
}

/// Leading decimal number of a text like `"15 km"` or `"12,5 km"`. 0 when absent.
pub fn parse_distance_km(text: &str) -> f64 {
    let Some(start) = text.find(|c: char| c.is_ascii_digit()) else {
        return 0.0;
    };
    let mut number = String::new();
    let mut seen_separator = false;
    for c in text[start..].chars() {
        match c {
            '0'..='9' => number.push(c),
            '.' | ',' if !seen_separator => {
                seen_separator = true;
                number.push('.');
            }
            _ => break,
        }
    }
    number.trim_end_matches('.').parse().unwrap_or(0.0)
}

/// Gain and loss from a text like `"+850m / -450m"`. Missing parts are 0.
pub fn parse_elevation(text: &str) -> (u32, u32) {
    (number_after(text, '+'), number_after(text, '-'))
}

fn number_after(text: &str, sign: char) -> u32 {
    text.match_indices(sign)
        .find_map(|(idx, _)| {
            let digits: String = text[idx + sign.len_utf8()..]
                .trim_start()
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            digits.parse().ok()
        })
        .unwrap_or(0)
}

fn parse_dataset(raw: Vec<RawStage>) -> Result<Vec<StageRecord>, CatalogError> {
    let mut seen = BTreeSet::new();
    let mut stages = Vec::with_capacity(raw.len());
    for stage in raw {
        if !seen.insert(stage.day) {
            return Err(CatalogError::DuplicateDay(stage.day));
        }
        stages.push(stage.into_stage()?);
    }
    stages.sort_by_key(|stage| stage.day);
    Ok(stages)
}

/// Read-only stage reference data, loaded once.
pub struct StageCatalog {
    preloaded: Option<String>,
    remote_url: Option<String>,
    client: reqwest::Client,
    stages: Vec<StageRecord>,
    loaded: bool,
}

impl StageCatalog {
    pub fn new(
        preloaded: Option<String>,
        remote_url: Option<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            preloaded,
            remote_url,
            client,
            stages: Vec::new(),
            loaded: false,
        }
    }

    pub fn from_stages(mut stages: Vec<StageRecord>) -> Self {
        stages.sort_by_key(|stage| stage.day);
        Self {
            preloaded: None,
            remote_url: None,
            client: reqwest::Client::new(),
            stages,
            loaded: true,
        }
    }

    /// Loads the dataset on first call. A failed load leaves the catalog
    /// empty and is retried on the next call.
    pub async fn load(&mut self) -> &[StageRecord] {
        if !self.loaded {
            match self.fetch_stages().await {
                Some(stages) => {
                    self.stages = stages;
                    self.loaded = true;
                }
                None => {
                    warn!("no stage dataset available, catalog stays empty");
                    self.stages.clear();
                }
            }
        }
        &self.stages
    }

    async fn fetch_stages(&self) -> Option<Vec<StageRecord>> {
        if let Some(text) = &self.preloaded {
            match serde_json::from_str(text)
                .map_err(CatalogError::from)
                .and_then(parse_dataset)
            {
                Ok(stages) => {
                    info!("{} stages loaded from preloaded dataset", stages.len());
                    return Some(stages);
                }
                Err(err) => warn!("preloaded stage dataset rejected: {err}"),
            }
        }

        if let Some(url) = &self.remote_url {
            match self.fetch_remote(url).await {
                Ok(stages) => {
                    info!("{} stages loaded from {url}", stages.len());
                    return Some(stages);
                }
                Err(err) => warn!("remote stage dataset rejected: {err}"),
            }
        }

        None
    }

    async fn fetch_remote(&self, url: &str) -> Result<Vec<StageRecord>, CatalogError> {
        let raw: Vec<RawStage> = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_dataset(raw)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn get_by_day(&self, day: u32) -> Option<&StageRecord> {
        self.stages
            .binary_search_by_key(&day, |stage| stage.day)
            .ok()
            .map(|idx| &self.stages[idx])
    }

    pub fn filter_by_difficulty(&self, level: Difficulty) -> Vec<&StageRecord> {
        self.stages
            .iter()
            .filter(|stage| stage.difficulty == level)
            .collect()
    }

    /// Case-insensitive match on departure, arrival, terrain and lodging.
    pub fn search(&self, text: &str) -> Vec<&StageRecord> {
        let needle = text.trim().to_lowercase();
        self.stages
            .iter()
            .filter(|stage| {
                [&stage.from, &stage.to, &stage.terrain, &stage.lodging]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            })
            .collect()
    }

    pub fn compute_global_stats(&self) -> GlobalStats {
        let mut counts_by_difficulty: BTreeMap<Difficulty, usize> =
            Difficulty::ALL.into_iter().map(|level| (level, 0)).collect();
        let mut total_distance_km = 0.0;
        let mut total_elevation_gain_m = 0u64;
        let mut total_elevation_loss_m = 0u64;

        for stage in &self.stages {
            total_distance_km += stage.distance_km;
            total_elevation_gain_m += u64::from(stage.elevation_gain_m);
            total_elevation_loss_m += u64::from(stage.elevation_loss_m);
            *counts_by_difficulty.entry(stage.difficulty).or_default() += 1;
        }

        GlobalStats {
            total_stages: self.stages.len(),
            total_distance_km,
            total_elevation_gain_m,
            total_elevation_loss_m,
            counts_by_difficulty,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_stages() -> Vec<StageRecord> {
    let raw = r#"[
        {"day": 1, "date": "2025-09-08", "from": "Hendaye", "to": "Olhette", "distance": "15 km",
         "elevation": "+850m / -450m", "duration": "5h30", "difficulty": "Simple", "terrain": "Sentier côtier"},
        {"day": 2, "date": "2025-09-09", "from": "Olhette", "to": "Aïnhoa", "distance": "20,5 km",
         "elevation": "+1200m / -1100m", "duration": "7h", "difficulty": "Difficile", "refuge": "Gîte du col"},
        {"day": 3, "date": "2025-09-10", "from": "Aïnhoa", "to": "Bidarray", "distance": "env. 18km",
         "elevation": "+900m", "duration": "6h", "difficulty": "moyenne"},
        {"day": 4, "date": "2025-09-11", "from": "Bidarray", "to": "Bidarray", "distance": "0 km",
         "elevation": "n/a", "duration": "repos", "difficulty": "Repos"}
    ]"#;
    let raw: Vec<RawStage> = serde_json::from_str(raw).unwrap();
    parse_dataset(raw).unwrap()
}
