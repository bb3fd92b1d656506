//! Broker client seam.
//!
//! [`BrokerClient`] is the narrow surface the alert consumer needs from a
//! Kafka client. [`KafkaBroker`] implements it on top of rdkafka's
//! `BaseConsumer`, which polls synchronously on the calling thread.

use crate::config::ConnectionConfig;
use crate::error::Result;
use rdkafka::consumer::{BaseConsumer, Consumer as RdkafkaConsumer};
use rdkafka::message::{BorrowedMessage as RdkafkaBorrowedMessage, Message as RdkafkaMessage};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A message slot as delivered by the broker, before decoding
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage {
    /// Kafka topic (empty when the broker could not attribute an error)
    pub topic: String,
    /// Kafka partition, `-1` when unknown
    pub partition: i32,
    /// Kafka offset, `-1` when unknown
    pub offset: i64,
    /// Message key (if any)
    pub key: Option<Vec<u8>>,
    /// Encoded message value
    pub payload: Vec<u8>,
    /// Error reported by the broker for this slot
    pub error: Option<String>,
}

impl RawMessage {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            payload,
            ..Default::default()
        }
    }

    /// A slot carrying only a broker error
    pub fn from_error(reason: impl Into<String>) -> Self {
        Self {
            partition: -1,
            offset: -1,
            error: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// Operations the alert consumer delegates to the broker client
///
/// A `timeout` of `None` blocks until a message arrives.
pub trait BrokerClient {
    fn subscribe(&mut self, topics: &[String]) -> Result<()>;

    /// Wait up to `timeout` for one message slot.
    fn poll(&mut self, timeout: Option<Duration>) -> Option<RawMessage>;

    /// Wait up to `timeout` for at most `max_count` message slots.
    fn consume(&mut self, max_count: usize, timeout: Option<Duration>) -> Vec<RawMessage>;

    /// Release the connection. Calling it again has no effect.
    fn close(&mut self);
}

/// rdkafka-backed broker client
pub struct KafkaBroker {
    consumer: Option<BaseConsumer>,
}

impl KafkaBroker {
    /// Create the underlying consumer. No network traffic happens until the
    /// first subscription or poll.
    pub fn connect(config: &ConnectionConfig) -> Result<Self> {
        let consumer: BaseConsumer = config.to_client_config().create()?;
        info!(
            "Kafka consumer created: group_id={:?} brokers={:?}",
            config.get("group.id"),
            config.get("bootstrap.servers")
        );
        Ok(Self {
            consumer: Some(consumer),
        })
    }

    /// Get the underlying consumer, `None` once closed
    pub fn inner(&self) -> Option<&BaseConsumer> {
        self.consumer.as_ref()
    }

    fn poll_once(consumer: &BaseConsumer, timeout: Option<Duration>) -> Option<RawMessage> {
        match consumer.poll(timeout)? {
            Ok(msg) => Some(to_raw_message(&msg)),
            Err(e) => Some(RawMessage::from_error(e.to_string())),
        }
    }
}

impl BrokerClient for KafkaBroker {
    fn subscribe(&mut self, topics: &[String]) -> Result<()> {
        if let Some(consumer) = &self.consumer {
            let topics: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer.subscribe(&topics)?;
            info!("Subscribed to topics: {:?}", topics);
        }
        Ok(())
    }

    fn poll(&mut self, timeout: Option<Duration>) -> Option<RawMessage> {
        let consumer = self.consumer.as_ref()?;
        Self::poll_once(consumer, timeout)
    }

    fn consume(&mut self, max_count: usize, timeout: Option<Duration>) -> Vec<RawMessage> {
        let mut messages = Vec::new();
        let Some(consumer) = self.consumer.as_ref() else {
            return messages;
        };
        let deadline = timeout.map(|t| Instant::now() + t);

        while messages.len() < max_count {
            let wait = match deadline {
                Some(deadline) => Some(deadline.saturating_duration_since(Instant::now())),
                // Without a deadline, block for the first message only and
                // then drain what is already buffered.
                None if messages.is_empty() => None,
                None => Some(Duration::ZERO),
            };

            match Self::poll_once(consumer, wait) {
                Some(msg) => messages.push(msg),
                None => break,
            }
        }

        debug!("Consumed {} message(s)", messages.len());
        messages
    }

    fn close(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            consumer.unsubscribe();
            drop(consumer);
            info!("Kafka consumer closed");
        }
    }
}

impl Drop for KafkaBroker {
    fn drop(&mut self) {
        self.close();
    }
}

fn to_raw_message(msg: &RdkafkaBorrowedMessage) -> RawMessage {
    RawMessage {
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        key: msg.key().map(|k| k.to_vec()),
        payload: msg.payload().map(|p| p.to_vec()).unwrap_or_default(),
        error: None,
    }
}
