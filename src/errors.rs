use axum::http::StatusCode;
use thiserror::Error;

/// Domain-rule violations raised by the progress tracker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressError {
    #[error("complete day {required_day} before validating day {day}")]
    SequenceViolation { day: u32, required_day: u32 },
}

/// Rejected user input on journal fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },
    #[error("{field} cannot exceed {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("rating must be between 0 and {max}, got {value}")]
    RatingOutOfRange { value: u8, max: u8 },
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid stage dataset: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("stage {day} is missing required field `{field}`")]
    MissingField { day: u32, field: &'static str },
    #[error("stage {day} has unknown difficulty `{label}`")]
    UnknownDifficulty { day: u32, label: String },
    #[error("stage {0} appears more than once")]
    DuplicateDay(u32),
    #[error("remote dataset unavailable: {0}")]
    Remote(#[from] reqwest::Error),
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(err: impl std::error::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<ProgressError> for AppError {
    fn from(err: ProgressError) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: err.to_string(),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}
