use crate::errors::AppError;
use crate::journal::{encode_photo, validate_rating};
use crate::mirror::RemoteMirror;
use crate::models::{
    AnalyticsResponse, Comment, CommentRequest, Difficulty, GlobalStats, MigrationReport,
    MirrorStatus, NotesRequest, PhotoResponse, ProgressRecord, ProgressResponse, RatingRequest,
    StageQuery, StageRecord,
};
use crate::state::{AppState, Dashboard};
use crate::stats::build_analytics;
use crate::sync::migrate_stages;
use crate::ui::render_index;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse},
    Json,
};
use std::collections::BTreeMap;
use tracing::info;

pub async fn index(State(state): State<AppState>) -> Html<String> {
    let dashboard = state.dashboard.lock().await;
    Html(render_index(&dashboard.progress(), dashboard.catalog.stages()))
}

pub async fn list_stages(
    State(state): State<AppState>,
    Query(query): Query<StageQuery>,
) -> Result<Json<Vec<StageRecord>>, AppError> {
    let level = match query.difficulty.as_deref().filter(|value| !value.trim().is_empty()) {
        Some(value) => Some(
            value
                .parse::<Difficulty>()
                .map_err(|label| AppError::bad_request(format!("unknown difficulty `{label}`")))?,
        ),
        None => None,
    };

    let dashboard = state.dashboard.lock().await;
    let catalog = &dashboard.catalog;
    let mut stages: Vec<&StageRecord> = match query.q.as_deref() {
        Some(text) => catalog.search(text),
        None => catalog.stages().iter().collect(),
    };
    if let Some(level) = level {
        stages.retain(|stage| stage.difficulty == level);
    }

    Ok(Json(stages.into_iter().cloned().collect()))
}

pub async fn get_stage(
    State(state): State<AppState>,
    Path(day): Path<u32>,
) -> Result<Json<StageRecord>, AppError> {
    let dashboard = state.dashboard.lock().await;
    dashboard
        .catalog
        .get_by_day(day)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("no stage for day {day}")))
}

pub async fn catalog_stats(State(state): State<AppState>) -> Json<GlobalStats> {
    let dashboard = state.dashboard.lock().await;
    Json(dashboard.catalog.compute_global_stats())
}

pub async fn get_progress(State(state): State<AppState>) -> Json<ProgressResponse> {
    let dashboard = state.dashboard.lock().await;
    Json(dashboard.progress())
}

pub async fn toggle_stage(
    State(state): State<AppState>,
    Path(day): Path<u32>,
) -> Result<Json<ProgressResponse>, AppError> {
    let mut dashboard = state.dashboard.lock().await;
    check_day(&dashboard, day)?;
    let toggle = dashboard.toggle(day).await?;
    info!("day {day}: {toggle:?}");
    Ok(Json(dashboard.progress()))
}

pub async fn get_record(
    State(state): State<AppState>,
    Path(day): Path<u32>,
) -> Result<Json<ProgressRecord>, AppError> {
    let dashboard = state.dashboard.lock().await;
    check_day(&dashboard, day)?;
    Ok(Json(dashboard.record(day)))
}

pub async fn put_notes(
    State(state): State<AppState>,
    Path(day): Path<u32>,
    Json(payload): Json<NotesRequest>,
) -> Result<Json<ProgressRecord>, AppError> {
    let mut dashboard = state.dashboard.lock().await;
    check_day(&dashboard, day)?;
    dashboard.set_notes(day, &payload.notes).await?;
    Ok(Json(dashboard.record(day)))
}

pub async fn put_rating(
    State(state): State<AppState>,
    Path(day): Path<u32>,
    Json(payload): Json<RatingRequest>,
) -> Result<Json<ProgressRecord>, AppError> {
    if payload.rating.is_none() && payload.detailed.is_empty() {
        return Err(AppError::bad_request("rating or detailed ratings required"));
    }

    for value in payload.rating.iter().chain(payload.detailed.values()) {
        validate_rating(*value)?;
    }

    let mut dashboard = state.dashboard.lock().await;
    check_day(&dashboard, day)?;
    if let Some(rating) = payload.rating {
        dashboard.set_rating(day, rating).await?;
    }
    for (category, value) in payload.detailed {
        dashboard.set_detailed_rating(day, category, value).await?;
    }
    Ok(Json(dashboard.record(day)))
}

pub async fn add_photo(
    State(state): State<AppState>,
    Path(day): Path<u32>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<PhotoResponse>), AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .filter(|value| value.starts_with("image/"))
        .map(str::to_string)
        .ok_or_else(|| AppError::bad_request("photo upload needs an image/* content type"))?;
    if body.is_empty() {
        return Err(AppError::bad_request("photo upload is empty"));
    }

    {
        let dashboard = state.dashboard.lock().await;
        check_day(&dashboard, day)?;
    }
    let uri = tokio::task::spawn_blocking(move || encode_photo(&body, &content_type))
        .await
        .map_err(AppError::internal)?;

    let mut dashboard = state.dashboard.lock().await;
    let index = dashboard.add_photo(day, uri).await;
    Ok((
        StatusCode::CREATED,
        Json(PhotoResponse {
            day,
            index,
            count: index + 1,
        }),
    ))
}

pub async fn delete_photo(
    State(state): State<AppState>,
    Path((day, index)): Path<(u32, usize)>,
) -> Result<StatusCode, AppError> {
    let mut dashboard = state.dashboard.lock().await;
    check_day(&dashboard, day)?;
    if dashboard.remove_photo(day, index).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(format!("no photo {index} for day {day}")))
    }
}

pub async fn add_comment(
    State(state): State<AppState>,
    Path(day): Path<u32>,
    Json(payload): Json<CommentRequest>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let mut dashboard = state.dashboard.lock().await;
    check_day(&dashboard, day)?;
    let comment = dashboard
        .add_comment(day, &payload.author, &payload.text)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn all_comments(State(state): State<AppState>) -> Json<BTreeMap<u32, Vec<Comment>>> {
    let dashboard = state.dashboard.lock().await;
    Json(dashboard.all_comments())
}

pub async fn get_analytics(State(state): State<AppState>) -> Json<AnalyticsResponse> {
    let dashboard = state.dashboard.lock().await;
    Json(build_analytics(
        state.start_date,
        &dashboard.tracker,
        &dashboard.catalog,
    ))
}

pub async fn export(State(state): State<AppState>) -> impl IntoResponse {
    let dashboard = state.dashboard.lock().await;
    (
        [(header::CONTENT_TYPE, "application/json")],
        dashboard.export(),
    )
}

pub async fn import(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<ProgressResponse>, AppError> {
    let mut dashboard = state.dashboard.lock().await;
    if !dashboard.import(&body).await {
        return Err(AppError::bad_request("import blob is not a valid export"));
    }
    Ok(Json(dashboard.progress()))
}

pub async fn mirror_status(State(state): State<AppState>) -> Json<MirrorStatus> {
    let snapshot = state.remote.borrow().clone();
    Json(MirrorStatus {
        backend: state.mirror.name().to_string(),
        remote_records: snapshot.as_ref().map(BTreeMap::len),
        remote_completed: snapshot.map(|records| {
            records
                .values()
                .filter(|record| record.completed)
                .map(|record| record.day)
                .collect()
        }),
    })
}

pub async fn migrate(State(state): State<AppState>) -> Result<Json<MigrationReport>, AppError> {
    if !state.mirror.is_enabled() {
        return Err(AppError::bad_request("no remote mirror configured"));
    }
    let stages = {
        let dashboard = state.dashboard.lock().await;
        dashboard.catalog.stages().to_vec()
    };
    Ok(Json(migrate_stages(state.mirror.as_ref(), &stages).await))
}

fn check_day(dashboard: &Dashboard, day: u32) -> Result<(), AppError> {
    let total = dashboard.total_stages();
    if day == 0 || day as usize > total {
        return Err(AppError::not_found(format!(
            "day {day} is outside the itinerary (1-{total})"
        )));
    }
    Ok(())
}
