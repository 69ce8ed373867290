use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Feed parse error: {0}")]
    FeedParse(#[from] feed_rs::parser::ParseFeedError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The model endpoint rejected our credentials. Needs an operator.
    #[error("Model access denied: {0}")]
    ModelAccessDenied(String),

    #[error("Model API error: {0}")]
    ModelApi(String),

    #[error("Webhook delivery failed: {0}")]
    Webhook(String),

    #[error("Secret resolution failed: {0}")]
    Secret(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn is_access_denied(&self) -> bool {
        matches!(self, AppError::ModelAccessDenied(_))
    }

    /// Failures that can go away on a later run without any change to the
    /// article: transport, upstream services and the local store.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Io(_)
                | AppError::Http(_)
                | AppError::Database(_)
                | AppError::Sqlite(_)
                | AppError::ModelAccessDenied(_)
                | AppError::ModelApi(_)
                | AppError::Webhook(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
