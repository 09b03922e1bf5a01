use crate::handlers;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};

/// Photos travel as raw bytes, well above axum's 2 MB default.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/api/stages", get(handlers::list_stages))
        .route("/api/stages/:day", get(handlers::get_stage))
        .route("/api/catalog/stats", get(handlers::catalog_stats))
        .route("/api/progress", get(handlers::get_progress))
        .route("/api/progress/:day/toggle", post(handlers::toggle_stage))
        .route("/api/stages/:day/record", get(handlers::get_record))
        .route("/api/stages/:day/notes", put(handlers::put_notes))
        .route("/api/stages/:day/rating", put(handlers::put_rating))
        .route("/api/stages/:day/photos", post(handlers::add_photo))
        .route("/api/stages/:day/photos/:index", delete(handlers::delete_photo))
        .route("/api/stages/:day/comments", post(handlers::add_comment))
        .route("/api/comments", get(handlers::all_comments))
        .route("/api/analytics", get(handlers::get_analytics))
        .route("/api/export", get(handlers::export))
        .route("/api/import", post(handlers::import))
        .route("/api/mirror", get(handlers::mirror_status))
        .route("/api/mirror/stages", post(handlers::migrate))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}
