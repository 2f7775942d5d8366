//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::order::{Order, OrderUid};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

/// Durable order storage.
///
/// `save` is insert-only: a second save of the same uid reports
/// [`RepoError::Duplicate`] and leaves the stored record untouched.
#[async_trait]
pub trait OrdersRepo: Send + Sync {
    async fn save(&self, order: &Order) -> Result<OrderUid, RepoError>;

    /// Up to `limit` orders, most recently touched first.
    async fn list_for_warmup(&self, limit: usize) -> Result<Vec<Order>, RepoError>;

    /// Refresh the recency marker of `uid`.
    async fn touch(&self, uid: &OrderUid) -> Result<(), RepoError>;
}
