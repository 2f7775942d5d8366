//! NATS JetStream transport.
//!
//! Orders are published to a file-backed stream and consumed through a
//! durable pull consumer with explicit acknowledgement. The server redelivers
//! anything not acknowledged within the ack wait, so a crash between receipt
//! and ack loses nothing.

use std::{collections::HashMap, sync::Mutex, time::Duration};

use async_nats::jetstream::{
    self, AckKind,
    consumer::{AckPolicy, DeliverPolicy, PullConsumer, pull},
    stream::{self as js_stream, DiscardPolicy, RetentionPolicy, StorageType},
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, instrument, warn};

use crate::{
    application::ingest::{Delivery, MessageStream, OrderPublisher, PublishError, StreamError},
    cache::mutex_lock,
    config::{IngestSettings, NatsSettings},
};

const SOURCE: &str = "infra::nats";
const STREAM_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum NatsError {
    #[error("failed to connect to NATS at `{url}`: {message}")]
    Connect { url: String, message: String },
    #[error("failed to set up JetStream {what}: {message}")]
    Setup { what: &'static str, message: String },
}

impl NatsError {
    fn setup(what: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Setup {
            what,
            message: err.to_string(),
        }
    }
}

/// Both ends of the JetStream transport.
pub struct NatsTransport {
    pub stream: NatsStream,
    pub publisher: NatsPublisher,
}

/// Connect, make sure the stream and durable consumer exist, and open the
/// consumer's message feed.
#[instrument(skip_all, fields(url = %url, stream = %nats.stream, consumer = %nats.consumer))]
pub async fn connect(
    url: &str,
    nats: &NatsSettings,
    ingest: &IngestSettings,
) -> Result<NatsTransport, NatsError> {
    let client = async_nats::ConnectOptions::new()
        .connection_timeout(nats.connect_timeout)
        .event_callback(|event| async move {
            info!(event = %event, "NATS connection event");
        })
        .connect(url)
        .await
        .map_err(|err| NatsError::Connect {
            url: url.to_string(),
            message: err.to_string(),
        })?;
    let context = jetstream::new(client);

    let stream = context
        .get_or_create_stream(stream_config(nats, ingest))
        .await
        .map_err(|err| NatsError::setup("stream", err))?;
    let consumer: PullConsumer = stream
        .get_or_create_consumer(&nats.consumer, consumer_config(nats, ingest))
        .await
        .map_err(|err| NatsError::setup("consumer", err))?;
    let messages = consumer
        .messages()
        .await
        .map_err(|err| NatsError::setup("message feed", err))?;

    info!("JetStream consumer ready");

    Ok(NatsTransport {
        stream: NatsStream {
            messages: AsyncMutex::new(messages),
            in_flight: Mutex::new(HashMap::new()),
            redelivery_delay: ingest.redelivery_delay,
        },
        publisher: NatsPublisher {
            context,
            subject: nats.subject.clone(),
            max_payload_bytes: ingest.max_payload_bytes.get(),
        },
    })
}

fn stream_config(nats: &NatsSettings, ingest: &IngestSettings) -> js_stream::Config {
    js_stream::Config {
        name: nats.stream.clone(),
        subjects: vec![nats.subject.clone()],
        retention: RetentionPolicy::Interest,
        discard: DiscardPolicy::Old,
        max_age: STREAM_MAX_AGE,
        storage: StorageType::File,
        max_message_size: i32::try_from(ingest.max_payload_bytes.get()).unwrap_or(i32::MAX),
        ..Default::default()
    }
}

fn consumer_config(nats: &NatsSettings, ingest: &IngestSettings) -> pull::Config {
    pull::Config {
        durable_name: Some(nats.consumer.clone()),
        filter_subject: nats.subject.clone(),
        deliver_policy: DeliverPolicy::All,
        ack_policy: AckPolicy::Explicit,
        ack_wait: ingest.ack_wait,
        max_ack_pending: -1,
        ..Default::default()
    }
}

/// Messages taken from the durable consumer and not yet settled, keyed by
/// stream sequence.
pub struct NatsStream {
    messages: AsyncMutex<pull::Stream>,
    in_flight: Mutex<HashMap<u64, (u32, jetstream::Message)>>,
    redelivery_delay: Duration,
}

impl NatsStream {
    fn take(&self, delivery: &Delivery) -> Option<jetstream::Message> {
        let mut in_flight = mutex_lock(&self.in_flight, SOURCE, "take");
        let current = in_flight
            .get(&delivery.id)
            .is_some_and(|(attempt, _)| *attempt == delivery.attempt);
        if !current {
            return None;
        }
        in_flight.remove(&delivery.id).map(|(_, message)| message)
    }
}

#[async_trait]
impl MessageStream for NatsStream {
    async fn next_delivery(&self) -> Option<Delivery> {
        let mut messages = self.messages.lock().await;

        loop {
            let message = match messages.next().await? {
                Ok(message) => message,
                Err(err) => {
                    warn!(error = %err, "Failed to receive JetStream message");
                    continue;
                }
            };

            let (id, attempt) = match message.info() {
                Ok(info) => (
                    info.stream_sequence,
                    u32::try_from(info.delivered).unwrap_or(u32::MAX),
                ),
                Err(err) => {
                    // Left unacked; the server redelivers after the ack wait.
                    warn!(error = %err, "Dropping JetStream message without metadata");
                    continue;
                }
            };

            let delivery = Delivery {
                id,
                attempt,
                payload: message.payload.clone(),
            };
            mutex_lock(&self.in_flight, SOURCE, "next_delivery").insert(id, (attempt, message));
            return Some(delivery);
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), StreamError> {
        let Some(message) = self.take(delivery) else {
            return Ok(());
        };
        message
            .ack()
            .await
            .map_err(|err| StreamError::Transport(err.to_string()))
    }

    async fn nak(&self, delivery: &Delivery) -> Result<(), StreamError> {
        let message = self
            .take(delivery)
            .ok_or(StreamError::UnknownDelivery { id: delivery.id })?;
        message
            .ack_with(AckKind::Nak(Some(self.redelivery_delay)))
            .await
            .map_err(|err| StreamError::Transport(err.to_string()))
    }
}

#[derive(Clone)]
pub struct NatsPublisher {
    context: jetstream::Context,
    subject: String,
    max_payload_bytes: usize,
}

#[async_trait]
impl OrderPublisher for NatsPublisher {
    async fn publish(&self, payload: Bytes) -> Result<u64, PublishError> {
        if payload.len() > self.max_payload_bytes {
            return Err(PublishError::TooLarge {
                size: payload.len(),
                limit: self.max_payload_bytes,
            });
        }

        let ack = self
            .context
            .publish(self.subject.clone(), payload)
            .await
            .map_err(|err| PublishError::Transport(err.to_string()))?
            .await
            .map_err(|err| PublishError::Transport(err.to_string()))?;
        Ok(ack.sequence)
    }

    fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }
}

#[cfg(test)]
mod tests {
    use std::num::{NonZeroU32, NonZeroUsize};

    use super::*;

    fn settings() -> (NatsSettings, IngestSettings) {
        let nats = NatsSettings {
            url: Some("nats://127.0.0.1:4222".to_string()),
            stream: "ORDERS".to_string(),
            subject: "orders.created".to_string(),
            consumer: "orderline".to_string(),
            connect_timeout: Duration::from_secs(2),
        };
        let ingest = IngestSettings {
            max_in_flight: NonZeroU32::new(4).expect("non-zero"),
            redelivery_delay: Duration::from_secs(1),
            ack_wait: Duration::from_secs(5),
            max_payload_bytes: NonZeroUsize::new(4096).expect("non-zero"),
        };
        (nats, ingest)
    }

    #[test]
    fn stream_is_file_backed_and_bound_to_subject() {
        let (nats, ingest) = settings();
        let config = stream_config(&nats, &ingest);

        assert_eq!(config.name, "ORDERS");
        assert_eq!(config.subjects, ["orders.created"]);
        assert_eq!(config.storage, StorageType::File);
        assert_eq!(config.retention, RetentionPolicy::Interest);
        assert_eq!(config.max_message_size, 4096);
    }

    #[test]
    fn consumer_is_durable_with_explicit_ack() {
        let (nats, ingest) = settings();
        let config = consumer_config(&nats, &ingest);

        assert_eq!(config.durable_name.as_deref(), Some("orderline"));
        assert_eq!(config.filter_subject, "orders.created");
        assert_eq!(config.ack_policy, AckPolicy::Explicit);
        assert_eq!(config.deliver_policy, DeliverPolicy::All);
        assert_eq!(config.ack_wait, Duration::from_secs(5));
    }
}
