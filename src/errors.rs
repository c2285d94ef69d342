use crate::response::ApiResponse;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use deadpool_diesel::InteractError;
use deadpool_diesel::postgres::PoolError;
use thiserror::Error;
use tracing::error;

/// Typed failures of the grading workflow, as surfaced to callers.
/// Converted into `AppError` (and therefore an HTTP status) at the API
/// boundary, never leaked as raw store errors.
#[derive(Debug, Error, PartialEq)]
pub enum GradingError {
    #[error("Student {student_id} is already enrolled in course {course_id}")]
    AlreadyEnrolled { student_id: i64, course_id: i64 },

    #[error("Student {student_id} has no active enrollment in course {course_id}")]
    NotEnrolled { student_id: i64, course_id: i64 },

    #[error("Grade item with ID {item_id} not found")]
    ItemNotFound { item_id: i64 },

    #[error("Submission deadline {due_date} has passed")]
    PastDueDate { due_date: DateTime<Utc> },

    #[error("Score {score} is outside the accepted range [0, 100]")]
    InvalidScore { score: f64 },

    #[error("Category weights {attendance} + {assignment} + {exam} must sum to 100")]
    InvalidWeights {
        attendance: i32,
        assignment: i32,
        exam: i32,
    },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String), // 400

    #[error("Forbidden: {0}")]
    Forbidden(String), // 403

    #[error("Not Found: {0}")]
    NotFound(String), // 404

    #[error("Conflict: {0}")]
    Conflict(String), // 409

    #[error("Unprocessable Entity: {0}")]
    UnprocessableEntity(String), // 422

    #[error("Internal Server Error: {0}")]
    InternalServerError(#[from] anyhow::Error), // 500
}

impl From<GradingError> for AppError {
    fn from(err: GradingError) -> Self {
        let message = err.to_string();
        match err {
            GradingError::AlreadyEnrolled { .. } => AppError::Conflict(message),
            GradingError::NotEnrolled { .. } => AppError::Forbidden(message),
            GradingError::ItemNotFound { .. } => AppError::NotFound(message),
            GradingError::PastDueDate { .. }
            | GradingError::InvalidScore { .. }
            | GradingError::InvalidWeights { .. } => AppError::UnprocessableEntity(message),
        }
    }
}

impl From<PoolError> for AppError {
    fn from(err: PoolError) -> Self {
        error!("Database pool error encountered: {:?}", err);
        AppError::InternalServerError(anyhow::Error::new(err).context("Database pool error"))
    }
}

impl From<InteractError> for AppError {
    fn from(err: InteractError) -> Self {
        error!("Database interaction error encountered: {:?}", err);
        AppError::InternalServerError(anyhow::anyhow!("Database interaction error: {}", err))
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => {
                error!(
                    "Diesel NotFound error reached generic conversion: {:?}",
                    err
                );
                AppError::NotFound("Resource not found (database query)".to_string())
            }
            _ => {
                error!("Unhandled Diesel error encountered: {:?}", err);
                AppError::InternalServerError(
                    anyhow::Error::new(err).context("Database query error"),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Forbidden(message) => (StatusCode::FORBIDDEN, message),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            AppError::Conflict(message) => (StatusCode::CONFLICT, message),
            AppError::UnprocessableEntity(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),

            AppError::InternalServerError(source) => {
                error!(
                    "Responding with 500 Internal Server Error. Source: {:?}",
                    source
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = ApiResponse::<()> {
            status_code: status.as_u16(),
            status_message: error_message,
            data: None,
        };

        (status, body).into_response()
    }
}
