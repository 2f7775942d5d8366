//! Per-message ingestion: decode, validate, persist, cache.
//!
//! Every message ends in exactly one [`IngestOutcome`]. Permanent failures
//! (malformed payloads, invalid orders) are acknowledged so they are not
//! redelivered forever; store failures are left unacknowledged so the
//! transport retries them.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use metrics::{counter, histogram};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::{
    application::repos::{OrdersRepo, RepoError},
    cache::OrderLookup,
    domain::{
        error::DomainError,
        order::{Order, OrderUid},
        validation::Problems,
    },
};

pub(crate) const METRIC_INGEST_OUTCOME: &str = "orderline_ingest_outcome_total";
pub(crate) const METRIC_INGEST_MS: &str = "orderline_ingest_ms";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to decode order payload: {0}")]
    Decode(#[from] DomainError),
    #[error("order `{uid}` failed validation: {problems}")]
    Validation { uid: OrderUid, problems: Problems },
    #[error("failed to persist order `{uid}`: {source}")]
    Store {
        uid: OrderUid,
        #[source]
        source: RepoError,
    },
}

/// What to tell the transport about a processed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Retry,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Stored { uid: OrderUid },
    /// Already persisted earlier; the cache was refreshed anyway.
    Duplicate { uid: OrderUid },
    DecodeFailed,
    ValidationFailed(Problems),
    PersistFailed,
}

impl IngestOutcome {
    pub fn disposition(&self) -> Disposition {
        match self {
            IngestOutcome::PersistFailed => Disposition::Retry,
            IngestOutcome::Stored { .. }
            | IngestOutcome::Duplicate { .. }
            | IngestOutcome::DecodeFailed
            | IngestOutcome::ValidationFailed(_) => Disposition::Ack,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            IngestOutcome::Stored { .. } => "stored",
            IngestOutcome::Duplicate { .. } => "duplicate",
            IngestOutcome::DecodeFailed => "decode_failed",
            IngestOutcome::ValidationFailed(_) => "validation_failed",
            IngestOutcome::PersistFailed => "persist_failed",
        }
    }
}

impl From<IngestError> for IngestOutcome {
    fn from(error: IngestError) -> Self {
        match error {
            IngestError::Decode(_) => IngestOutcome::DecodeFailed,
            IngestError::Validation { problems, .. } => IngestOutcome::ValidationFailed(problems),
            IngestError::Store { .. } => IngestOutcome::PersistFailed,
        }
    }
}

#[derive(Clone)]
pub struct IngestPipeline {
    repo: Arc<dyn OrdersRepo>,
    cache: Arc<dyn OrderLookup>,
    store_timeout: Duration,
}

impl IngestPipeline {
    pub fn new(
        repo: Arc<dyn OrdersRepo>,
        cache: Arc<dyn OrderLookup>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            cache,
            store_timeout,
        }
    }

    /// Run one payload through the pipeline and report how it ended.
    pub async fn process(&self, payload: &[u8]) -> IngestOutcome {
        let started_at = Instant::now();

        let outcome = match self.ingest(payload).await {
            Ok(outcome) => outcome,
            Err(err) => {
                log_failure(&err);
                IngestOutcome::from(err)
            }
        };

        counter!(METRIC_INGEST_OUTCOME, "outcome" => outcome.label()).increment(1);
        histogram!(METRIC_INGEST_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        outcome
    }

    async fn ingest(&self, payload: &[u8]) -> Result<IngestOutcome, IngestError> {
        let order = Order::decode(payload)?;

        let problems = order.problems();
        if !problems.is_empty() {
            return Err(IngestError::Validation {
                uid: order.uid,
                problems,
            });
        }

        let saved = match timeout(self.store_timeout, self.repo.save(&order)).await {
            Ok(result) => result,
            Err(_) => Err(RepoError::Timeout),
        };

        let outcome = match saved {
            Ok(uid) => {
                info!(order_uid = %uid, "Order stored");
                IngestOutcome::Stored { uid }
            }
            Err(RepoError::Duplicate { constraint }) => {
                info!(
                    order_uid = %order.uid,
                    constraint = %constraint,
                    "Order already stored; refreshing cache"
                );
                IngestOutcome::Duplicate {
                    uid: order.uid.clone(),
                }
            }
            Err(source) => {
                return Err(IngestError::Store {
                    uid: order.uid,
                    source,
                });
            }
        };

        self.cache.put(order.uid.clone(), Arc::new(order));
        Ok(outcome)
    }
}

fn log_failure(err: &IngestError) {
    match err {
        IngestError::Decode(source) => {
            error!(error = %source, "Dropping malformed order message");
        }
        IngestError::Validation { uid, problems } => {
            for (field, problem) in problems.iter() {
                warn!(order_uid = %uid, field, problem, "Order field is invalid");
            }
            error!(
                order_uid = %uid,
                problem_count = problems.len(),
                "Dropping invalid order"
            );
        }
        IngestError::Store { uid, source } => {
            error!(
                order_uid = %uid,
                error = %source,
                "Failed to persist order; leaving message for redelivery"
            );
        }
    }
}
