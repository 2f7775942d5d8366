use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("malformed order payload: {0}")]
    Malformed(#[from] serde_json::Error),
}
