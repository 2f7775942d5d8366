//! In-process message stream with explicit acknowledgement.
//!
//! Messages published through a [`StreamPublisher`] are delivered one at a
//! time by [`ChannelStream::next_delivery`] and stay in flight until acked.
//! A nak'ed message is queued again and redelivered after the configured
//! delay with its attempt counter increased; a delivery left unsettled past
//! the ack wait is redelivered the same way. The stream reports closed only
//! once every publisher is gone and nothing is queued or in flight.
//!
//! Bookkeeping lives behind a blocking mutex that is never held across an
//! await, so a message is always in the channel, the retry queue or the
//! in-flight map.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{
    sync::{Mutex as AsyncMutex, Notify, mpsc},
    time::{Instant, sleep_until},
};
use tracing::{debug, warn};

use crate::{
    application::ingest::{Delivery, MessageStream, OrderPublisher, PublishError, StreamError},
    cache::mutex_lock,
};

const SOURCE: &str = "infra::stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
    pub redelivery_delay: Duration,
    /// How long a delivery may stay unsettled before it is redelivered.
    pub ack_wait: Duration,
    pub max_payload_bytes: usize,
}

#[derive(Debug, Clone)]
struct Message {
    id: u64,
    /// Attempt of the latest dispatch; 0 until first delivered.
    attempt: u32,
    payload: Bytes,
}

/// Cloneable producer side of a [`ChannelStream`].
#[derive(Clone)]
pub struct StreamPublisher {
    sender: mpsc::UnboundedSender<Message>,
    next_id: Arc<AtomicU64>,
    max_payload_bytes: usize,
}

impl StreamPublisher {
    /// Enqueue `payload` and return its message id.
    pub fn publish(&self, payload: impl Into<Bytes>) -> Result<u64, PublishError> {
        let payload = payload.into();
        if payload.len() > self.max_payload_bytes {
            return Err(PublishError::TooLarge {
                size: payload.len(),
                limit: self.max_payload_bytes,
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.sender
            .send(Message {
                id,
                attempt: 0,
                payload,
            })
            .map_err(|_| PublishError::Closed)?;
        Ok(id)
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }
}

#[async_trait]
impl OrderPublisher for StreamPublisher {
    async fn publish(&self, payload: Bytes) -> Result<u64, PublishError> {
        StreamPublisher::publish(self, payload)
    }

    fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }
}

struct InFlight {
    message: Message,
    ack_deadline: Instant,
}

#[derive(Default)]
struct Pending {
    in_flight: HashMap<u64, InFlight>,
    retries: VecDeque<(Instant, Message)>,
}

impl Pending {
    /// Requeue every delivery whose ack wait ran out; returns how many.
    fn expire(&mut self, now: Instant) -> usize {
        let expired: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, entry)| entry.ack_deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            if let Some(entry) = self.in_flight.remove(id) {
                self.retries.push_front((now, entry.message));
            }
        }
        expired.len()
    }

    fn take_due_retry(&mut self, now: Instant) -> Option<Message> {
        let due = self.retries.front().is_some_and(|(due, _)| *due <= now);
        if !due {
            return None;
        }
        self.retries.pop_front().map(|(_, message)| message)
    }

    fn next_wakeup(&self) -> Option<Instant> {
        let retry = self.retries.front().map(|(due, _)| *due);
        let deadline = self.in_flight.values().map(|entry| entry.ack_deadline).min();
        match (retry, deadline) {
            (Some(retry), Some(deadline)) => Some(retry.min(deadline)),
            (retry, deadline) => retry.or(deadline),
        }
    }

    fn is_idle(&self) -> bool {
        self.retries.is_empty() && self.in_flight.is_empty()
    }

    /// True when `delivery` is the latest dispatch of a message still held.
    fn holds(&self, delivery: &Delivery) -> bool {
        self.in_flight
            .get(&delivery.id)
            .is_some_and(|entry| entry.message.attempt == delivery.attempt)
    }
}

pub struct ChannelStream {
    receiver: AsyncMutex<mpsc::UnboundedReceiver<Message>>,
    pending: Mutex<Pending>,
    settled: Notify,
    publishers_gone: AtomicBool,
    options: ChannelOptions,
    acked: AtomicU64,
    redelivered: AtomicU64,
    expired: AtomicU64,
}

/// Create a connected publisher/stream pair.
pub fn channel(options: ChannelOptions) -> (StreamPublisher, Arc<ChannelStream>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let publisher = StreamPublisher {
        sender,
        next_id: Arc::new(AtomicU64::new(0)),
        max_payload_bytes: options.max_payload_bytes,
    };
    let stream = ChannelStream {
        receiver: AsyncMutex::new(receiver),
        pending: Mutex::new(Pending::default()),
        settled: Notify::new(),
        publishers_gone: AtomicBool::new(false),
        options,
        acked: AtomicU64::new(0),
        redelivered: AtomicU64::new(0),
        expired: AtomicU64::new(0),
    };
    (publisher, Arc::new(stream))
}

impl ChannelStream {
    pub fn in_flight(&self) -> usize {
        mutex_lock(&self.pending, SOURCE, "in_flight").in_flight.len()
    }

    pub fn acked(&self) -> u64 {
        self.acked.load(Ordering::Relaxed)
    }

    /// Messages queued again after a nak.
    pub fn redelivered(&self) -> u64 {
        self.redelivered.load(Ordering::Relaxed)
    }

    /// Deliveries requeued because their ack wait ran out.
    pub fn expired(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }

    fn dispatch(&self, pending: &mut Pending, mut message: Message, now: Instant) -> Delivery {
        message.attempt += 1;
        let delivery = Delivery {
            id: message.id,
            attempt: message.attempt,
            payload: message.payload.clone(),
        };
        pending.in_flight.insert(
            message.id,
            InFlight {
                message,
                ack_deadline: now + self.options.ack_wait,
            },
        );
        delivery
    }
}

#[async_trait]
impl MessageStream for ChannelStream {
    async fn next_delivery(&self) -> Option<Delivery> {
        let mut receiver = self.receiver.lock().await;

        loop {
            let next_wakeup = {
                let now = Instant::now();
                let mut pending = mutex_lock(&self.pending, SOURCE, "next_delivery");

                let expired = pending.expire(now);
                if expired > 0 {
                    self.expired.fetch_add(expired as u64, Ordering::Relaxed);
                    warn!(
                        expired,
                        ack_wait_ms = self.options.ack_wait.as_millis() as u64,
                        "Deliveries were not settled in time; redelivering"
                    );
                }

                if let Some(message) = pending.take_due_retry(now) {
                    return Some(self.dispatch(&mut pending, message, now));
                }
                if self.publishers_gone.load(Ordering::Acquire) && pending.is_idle() {
                    return None;
                }
                pending.next_wakeup()
            };

            let open = !self.publishers_gone.load(Ordering::Acquire);
            let wake_at = next_wakeup.unwrap_or_else(Instant::now);
            tokio::select! {
                received = receiver.recv(), if open => match received {
                    Some(message) => {
                        let mut pending = mutex_lock(&self.pending, SOURCE, "next_delivery");
                        return Some(self.dispatch(&mut pending, message, Instant::now()));
                    }
                    None => self.publishers_gone.store(true, Ordering::Release),
                },
                _ = sleep_until(wake_at), if next_wakeup.is_some() => {}
                _ = self.settled.notified(), if !open => {}
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), StreamError> {
        let settled = {
            let mut pending = mutex_lock(&self.pending, SOURCE, "ack");
            if pending.holds(delivery) {
                pending.in_flight.remove(&delivery.id);
                true
            } else {
                // A late ack still cancels a redelivery queued by ack-wait expiry.
                let queued = pending.retries.len();
                pending.retries.retain(|(_, message)| {
                    message.id != delivery.id || message.attempt != delivery.attempt
                });
                pending.retries.len() != queued
            }
        };

        if settled {
            self.acked.fetch_add(1, Ordering::Relaxed);
            self.settled.notify_one();
        }
        Ok(())
    }

    async fn nak(&self, delivery: &Delivery) -> Result<(), StreamError> {
        {
            let mut pending = mutex_lock(&self.pending, SOURCE, "nak");
            if !pending.holds(delivery) {
                return Err(StreamError::UnknownDelivery { id: delivery.id });
            }
            let Some(entry) = pending.in_flight.remove(&delivery.id) else {
                return Err(StreamError::UnknownDelivery { id: delivery.id });
            };

            let due = Instant::now() + self.options.redelivery_delay;
            debug!(
                delivery_id = entry.message.id,
                attempt = entry.message.attempt,
                "Queued delivery for redelivery"
            );
            pending.retries.push_back((due, entry.message));
        }

        self.redelivered.fetch_add(1, Ordering::Relaxed);
        self.settled.notify_one();
        Ok(())
    }
}
