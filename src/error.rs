use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

/// Raised where untyped query parameters are turned into a typed query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("invalid sort key: {0}")]
    InvalidSortKey(String),

    #[error("invalid sort order: {0}")]
    InvalidSortOrder(String),

    #[error("invalid timeframe: {0}")]
    InvalidTimeframe(String),
}

/// Failures of a market source. These never reach the query pipeline: the
/// poller records them and keeps the last good snapshot.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("unknown symbol: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("No data available: {0}")]
    NoData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Query(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::Source(SourceError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            AppError::NoData(_) | AppError::Source(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
