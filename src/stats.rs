use crate::catalog::StageCatalog;
use crate::models::{AnalyticsResponse, Difficulty};
use crate::progress::ProgressTracker;
use chrono::{Local, NaiveDate};

pub fn build_analytics(
    start: NaiveDate,
    tracker: &ProgressTracker,
    catalog: &StageCatalog,
) -> AnalyticsResponse {
    build_analytics_at(Local::now().date_naive(), start, tracker, catalog)
}

/// Pace and schedule figures as of `today`. Elapsed time counts at least
/// one day so a trek started today still gets a pace.
pub fn build_analytics_at(
    today: NaiveDate,
    start: NaiveDate,
    tracker: &ProgressTracker,
    catalog: &StageCatalog,
) -> AnalyticsResponse {
    let stats = tracker.stats(catalog);
    let completed = stats.completed as i64;
    let days_elapsed = (today - start).num_days().max(1);

    let average_pace_per_week = round1(completed as f64 * 7.0 / days_elapsed as f64);
    let estimated_days_remaining = (completed > 0)
        .then(|| (stats.remaining as i64 * days_elapsed + completed - 1) / completed);

    let difficult_stages_ahead = catalog
        .filter_by_difficulty(Difficulty::Difficile)
        .into_iter()
        .filter(|stage| !tracker.is_completed(stage.day))
        .count();

    let planned_by_today = catalog
        .stages()
        .iter()
        .filter(|stage| {
            NaiveDate::parse_from_str(&stage.date, "%Y-%m-%d")
                .map(|date| date <= today)
                .unwrap_or(false)
        })
        .count();

    AnalyticsResponse {
        days_elapsed,
        average_pace_per_week,
        estimated_days_remaining,
        difficult_stages_ahead,
        planned_by_today,
        ahead_by: completed - planned_by_today as i64,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
