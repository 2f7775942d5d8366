//! Transport seam for order messages.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// One delivery of a message from the stream.
///
/// The same message may be delivered more than once; `attempt` starts at 1
/// and grows with every redelivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: u64,
    pub attempt: u32,
    pub payload: Bytes,
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream is closed")]
    Closed,
    #[error("delivery {id} is not in flight")]
    UnknownDelivery { id: u64 },
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
    #[error("order stream is closed")]
    Closed,
    #[error("failed to publish order: {0}")]
    Transport(String),
}

/// At-least-once message source with explicit acknowledgement.
///
/// A delivery that is neither acknowledged nor rejected within the
/// transport's ack wait is delivered again.
#[async_trait]
pub trait MessageStream: Send + Sync {
    /// Wait for the next delivery; `None` once the stream is closed and drained.
    ///
    /// Dropping the returned future before it resolves never loses a message.
    async fn next_delivery(&self) -> Option<Delivery>;

    /// Confirm processing. Acknowledging twice is not an error.
    async fn ack(&self, delivery: &Delivery) -> Result<(), StreamError>;

    /// Reject the delivery so the transport redelivers it later.
    async fn nak(&self, delivery: &Delivery) -> Result<(), StreamError>;
}

/// Producer side of the order stream, used by the HTTP publish endpoint.
#[async_trait]
pub trait OrderPublisher: Send + Sync {
    /// Append `payload` to the stream and return its sequence number.
    async fn publish(&self, payload: Bytes) -> Result<u64, PublishError>;

    fn max_payload_bytes(&self) -> usize;
}
