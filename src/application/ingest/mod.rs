//! Order ingestion from the message stream.

mod consumer;
mod pipeline;
mod stream;

pub use consumer::{ConsumerReport, IngestConsumer};
pub use pipeline::{Disposition, IngestError, IngestOutcome, IngestPipeline};
pub use stream::{Delivery, MessageStream, OrderPublisher, PublishError, StreamError};

pub(crate) use pipeline::{METRIC_INGEST_MS, METRIC_INGEST_OUTCOME};
