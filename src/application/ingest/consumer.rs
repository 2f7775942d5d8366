//! Subscription loop feeding deliveries through the pipeline.

use std::{future, sync::Arc};

use tokio::{
    sync::{Semaphore, watch},
    task::{JoinError, JoinSet},
};
use tracing::{Instrument, error, info, info_span, instrument, warn};

use super::{
    pipeline::{Disposition, IngestPipeline},
    stream::{Delivery, MessageStream},
};

/// Totals for one run of the consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerReport {
    pub received: u64,
    pub acked: u64,
    pub retried: u64,
    /// Deliveries whose ack/nak could not be sent, or whose task panicked.
    pub unsettled: u64,
}

impl ConsumerReport {
    fn record(&mut self, joined: Result<Settlement, JoinError>) {
        match joined {
            Ok(Settlement::Acked) => self.acked += 1,
            Ok(Settlement::Retried) => self.retried += 1,
            Ok(Settlement::Unsettled) => self.unsettled += 1,
            Err(err) => {
                error!(error = %err, "Ingest task aborted");
                self.unsettled += 1;
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Settlement {
    Acked,
    Retried,
    Unsettled,
}

pub struct IngestConsumer {
    pipeline: IngestPipeline,
    max_in_flight: usize,
}

impl IngestConsumer {
    pub fn new(pipeline: IngestPipeline, max_in_flight: usize) -> Self {
        Self {
            pipeline,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Consume until `shutdown` flips to `true` or the stream closes.
    ///
    /// At most `max_in_flight` deliveries are processed concurrently. Tasks
    /// already started are awaited before returning; deliveries not yet
    /// pulled stay with the transport.
    #[instrument(skip_all, fields(max_in_flight = self.max_in_flight))]
    pub async fn run(
        &self,
        stream: Arc<dyn MessageStream>,
        mut shutdown: watch::Receiver<bool>,
    ) -> ConsumerReport {
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();
        let mut report = ConsumerReport::default();

        info!("Order consumer started");

        loop {
            while let Some(joined) = tasks.try_join_next() {
                report.record(joined);
            }

            let permit = tokio::select! {
                biased;
                _ = stop_requested(&mut shutdown) => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let delivery = tokio::select! {
                biased;
                _ = stop_requested(&mut shutdown) => break,
                delivery = stream.next_delivery() => match delivery {
                    Some(delivery) => delivery,
                    None => {
                        info!("Order stream closed");
                        break;
                    }
                },
            };

            report.received += 1;
            let span = info_span!(
                "ingest_delivery",
                delivery_id = delivery.id,
                attempt = delivery.attempt
            );
            let pipeline = self.pipeline.clone();
            let stream = Arc::clone(&stream);
            tasks.spawn(
                async move {
                    let settlement = settle(&pipeline, stream.as_ref(), &delivery).await;
                    drop(permit);
                    settlement
                }
                .instrument(span),
            );
        }

        let draining = tasks.len();
        if draining > 0 {
            info!(in_flight = draining, "Waiting for in-flight orders");
        }
        while let Some(joined) = tasks.join_next().await {
            report.record(joined);
        }

        info!(
            received = report.received,
            acked = report.acked,
            retried = report.retried,
            unsettled = report.unsettled,
            "Order consumer stopped"
        );
        report
    }
}

async fn settle(
    pipeline: &IngestPipeline,
    stream: &dyn MessageStream,
    delivery: &Delivery,
) -> Settlement {
    let outcome = pipeline.process(&delivery.payload).await;

    match outcome.disposition() {
        Disposition::Ack => match stream.ack(delivery).await {
            Ok(()) => Settlement::Acked,
            Err(err) => {
                warn!(error = %err, outcome = outcome.label(), "Failed to acknowledge delivery");
                Settlement::Unsettled
            }
        },
        Disposition::Retry => match stream.nak(delivery).await {
            Ok(()) => Settlement::Retried,
            Err(err) => {
                warn!(error = %err, "Failed to request redelivery");
                Settlement::Unsettled
            }
        },
    }
}

/// Resolves once shutdown is signalled. A dropped sender never resolves, so
/// the consumer then runs until the stream closes.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        future::pending::<()>().await;
    }
}
