use thiserror::Error;

/// Errors surfaced by the recommendation core
#[derive(Error, Debug)]
pub enum RecommendError {
    /// The LLM call failed after retries, or its answer could not be used
    #[error("Generation error: {0}")]
    Generation(String),

    /// Any persistence failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// The operation targets a record id that does not exist
    #[error("Travel request {0} not found")]
    NotFound(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<sqlx::Error> for RecommendError {
    fn from(err: sqlx::Error) -> Self {
        RecommendError::Storage(err.to_string())
    }
}

impl RecommendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RecommendError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, RecommendError>;
