//! Alert consumer combining connection settings, schema and broker client
//!
//! [`AlertConsumer`] decodes every message with the schema resolved once at
//! construction.

use crate::broker::{BrokerClient, KafkaBroker, RawMessage};
use crate::config::{ConnectionConfig, ConsumerOptions};
use crate::decoder::{AlertDecoder, Record};
use crate::error::{Error, Result};
use crate::schema::{AlertSchema, SchemaSource};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// A decoded alert and the topic it was received on
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub topic: String,
    pub record: Record,
}

/// Map a timeout in seconds to a poll timeout. Negative, NaN, infinite or
/// out of range values mean "wait indefinitely".
pub fn timeout_from_secs(secs: f64) -> Option<Duration> {
    if secs >= 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

/// High-level consumer of Avro-encoded alerts
///
/// Every message is decoded with the schema resolved when the consumer was
/// built. The broker connection is released by [`AlertConsumer::close`] or
/// when the consumer is dropped.
pub struct AlertConsumer<B: BrokerClient = KafkaBroker> {
    topics: Vec<String>,
    config: ConnectionConfig,
    schema: AlertSchema,
    decoder: AlertDecoder,
    broker: B,
    closed: bool,
}

impl AlertConsumer<KafkaBroker> {
    /// Create a consumer subscribed to `topics`.
    ///
    /// When `schema_path` is `None` the schema is fetched from the Fink
    /// servers, falling back to the bundled default.
    pub fn new<S: AsRef<str>>(
        topics: &[S],
        options: &ConsumerOptions,
        schema_path: Option<&Path>,
    ) -> Result<Self> {
        Self::with_source(topics, options, schema_path, &SchemaSource::default())
    }

    /// Same as [`AlertConsumer::new`] with explicit schema locations
    pub fn with_source<S: AsRef<str>>(
        topics: &[S],
        options: &ConsumerOptions,
        schema_path: Option<&Path>,
        source: &SchemaSource,
    ) -> Result<Self> {
        let config = ConnectionConfig::from_options(options)?;
        let schema = source.resolve(schema_path)?;
        let broker = KafkaBroker::connect(&config)?;
        Self::from_parts(topics, config, schema, broker)
    }
}

impl<B: BrokerClient> AlertConsumer<B> {
    /// Compose a consumer from an already created broker client and
    /// subscribe it to `topics`.
    pub fn from_parts<S: AsRef<str>>(
        topics: &[S],
        config: ConnectionConfig,
        schema: AlertSchema,
        mut broker: B,
    ) -> Result<Self> {
        let topics: Vec<String> = topics.iter().map(|t| t.as_ref().to_string()).collect();
        broker.subscribe(&topics)?;
        let decoder = AlertDecoder::new(schema.schema().clone());
        Ok(Self {
            topics,
            config,
            schema,
            decoder,
            broker,
            closed: false,
        })
    }

    /// Wait up to `timeout` for one alert (`None` waits indefinitely).
    ///
    /// Returns `Ok(None)` when nothing arrived in time. A message the broker
    /// flagged with an error is returned as [`Error::Broker`] without being
    /// decoded.
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<Option<Alert>> {
        self.ensure_open()?;
        let Some(msg) = self.broker.poll(timeout) else {
            return Ok(None);
        };

        if let Some(reason) = msg.error {
            return Err(Error::Broker {
                reason,
                topic: msg.topic,
                partition: msg.partition,
                offset: msg.offset,
                key: msg.key.map(|k| String::from_utf8_lossy(&k).into_owned()),
            });
        }

        self.decode(msg).map(Some)
    }

    /// Wait up to `timeout` for at most `max_count` alerts.
    ///
    /// Broker errors on individual messages are not inspected here; every
    /// slot is decoded as is. An errored slot carries an empty payload, so it
    /// fails the whole batch with [`Error::Decode`] and no alert of that
    /// batch is returned.
    pub fn consume(&mut self, max_count: usize, timeout: Option<Duration>) -> Result<Vec<Alert>> {
        self.ensure_open()?;
        if max_count == 0 {
            return Ok(Vec::new());
        }

        self.broker
            .consume(max_count, timeout)
            .into_iter()
            .take(max_count)
            .map(|msg| self.decode(msg))
            .collect()
    }

    /// Release the broker connection. Safe to call more than once.
    pub fn close(&mut self) {
        if !self.closed {
            self.broker.close();
            self.closed = true;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn connection_config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn schema(&self) -> &AlertSchema {
        &self.schema
    }

    /// Get the underlying broker client (for advanced use cases)
    pub fn broker(&self) -> &B {
        &self.broker
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    fn decode(&self, msg: RawMessage) -> Result<Alert> {
        debug!(
            "Decoding message from {}[{}] at offset {}",
            msg.topic, msg.partition, msg.offset
        );
        let record = self.decoder.decode(&msg.payload)?;
        Ok(Alert {
            topic: msg.topic,
            record,
        })
    }
}

impl<B: BrokerClient> Drop for AlertConsumer<B> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaOrigin;
    use apache_avro::types::Value;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    const SCHEMA: &str = r#"
    {
        "type": "record",
        "name": "alert",
        "fields": [
            {"name": "objectId", "type": "string"},
            {"name": "magpsf", "type": ["null", "float"], "default": null}
        ]
    }
    "#;

    #[derive(Default)]
    struct BrokerState {
        subscribed: Vec<String>,
        queue: VecDeque<RawMessage>,
        polls: usize,
        closes: usize,
    }

    /// In-memory broker with a shared handle for inspection after the
    /// consumer has taken ownership.
    #[derive(Clone, Default)]
    struct MockBroker(Rc<RefCell<BrokerState>>);

    impl MockBroker {
        fn with_messages(messages: Vec<RawMessage>) -> Self {
            let broker = Self::default();
            broker.0.borrow_mut().queue.extend(messages);
            broker
        }
    }

    impl BrokerClient for MockBroker {
        fn subscribe(&mut self, topics: &[String]) -> Result<()> {
            self.0.borrow_mut().subscribed = topics.to_vec();
            Ok(())
        }

        fn poll(&mut self, _timeout: Option<Duration>) -> Option<RawMessage> {
            let mut state = self.0.borrow_mut();
            state.polls += 1;
            state.queue.pop_front()
        }

        fn consume(&mut self, max_count: usize, _timeout: Option<Duration>) -> Vec<RawMessage> {
            let mut state = self.0.borrow_mut();
            let n = max_count.min(state.queue.len());
            state.queue.drain(..n).collect()
        }

        fn close(&mut self) {
            self.0.borrow_mut().closes += 1;
        }
    }

    fn schema() -> AlertSchema {
        AlertSchema::parse_str(SCHEMA, SchemaOrigin::Explicit("alert.avsc".into())).unwrap()
    }

    fn encode(object_id: &str, magpsf: Option<f32>) -> Vec<u8> {
        let magpsf = match magpsf {
            Some(m) => Value::Union(1, Box::new(Value::Float(m))),
            None => Value::Union(0, Box::new(Value::Null)),
        };
        let value = Value::Record(vec![
            ("objectId".to_string(), Value::String(object_id.to_string())),
            ("magpsf".to_string(), magpsf),
        ]);
        apache_avro::to_avro_datum(schema().schema(), value).unwrap()
    }

    fn new_consumer(broker: MockBroker) -> AlertConsumer<MockBroker> {
        let config = ConnectionConfig::from_options(&ConsumerOptions::new("g1")).unwrap();
        AlertConsumer::from_parts(&["rrlyr", "ebwuma"], config, schema(), broker).unwrap()
    }

    #[test]
    fn test_from_parts_subscribes() {
        let broker = MockBroker::default();
        let consumer = new_consumer(broker.clone());
        assert_eq!(broker.0.borrow().subscribed, vec!["rrlyr", "ebwuma"]);
        assert_eq!(consumer.topics(), ["rrlyr", "ebwuma"]);
    }

    #[test]
    fn test_poll_timeout_returns_none() {
        let mut consumer = new_consumer(MockBroker::default());
        assert_eq!(consumer.poll(Some(Duration::from_millis(10))).unwrap(), None);
        assert_eq!(consumer.poll(None).unwrap(), None);
    }

    #[test]
    fn test_poll_decodes_alert() {
        let broker = MockBroker::with_messages(vec![RawMessage::new(
            "rrlyr",
            0,
            7,
            encode("ZTF18abc", Some(17.5)),
        )]);
        let mut consumer = new_consumer(broker);

        let alert = consumer.poll(None).unwrap().unwrap();
        assert_eq!(alert.topic, "rrlyr");
        assert_eq!(
            alert.record.get("objectId"),
            Some(&Value::String("ZTF18abc".to_string()))
        );
        assert_eq!(alert.record.to_json()["magpsf"], 17.5);
    }

    #[test]
    fn test_poll_broker_error_skips_decode() {
        let mut errored = RawMessage::new("rrlyr", 3, 99, b"not avro".to_vec()).with_key("k1");
        errored.error = Some("Broker: Offset out of range".to_string());
        let mut consumer = new_consumer(MockBroker::with_messages(vec![errored]));

        match consumer.poll(None).unwrap_err() {
            Error::Broker {
                reason,
                topic,
                partition,
                offset,
                key,
            } => {
                assert_eq!(reason, "Broker: Offset out of range");
                assert_eq!(topic, "rrlyr");
                assert_eq!(partition, 3);
                assert_eq!(offset, 99);
                assert_eq!(key.as_deref(), Some("k1"));
            }
            other => panic!("expected broker error, got {other:?}"),
        }
    }

    #[test]
    fn test_poll_malformed_payload_is_decode_error() {
        let broker = MockBroker::with_messages(vec![RawMessage::new("rrlyr", 0, 0, vec![0x40])]);
        let mut consumer = new_consumer(broker);
        assert!(matches!(consumer.poll(None), Err(Error::Decode(_))));
    }

    #[test]
    fn test_consume_respects_max_count() {
        let messages = (0..5)
            .map(|i| RawMessage::new("ebwuma", 0, i, encode(&format!("ZTF{i}"), None)))
            .collect();
        let mut consumer = new_consumer(MockBroker::with_messages(messages));

        let alerts = consumer.consume(3, Some(Duration::from_millis(10))).unwrap();
        assert_eq!(alerts.len(), 3);
        assert_eq!(
            alerts[2].record.get("objectId"),
            Some(&Value::String("ZTF2".to_string()))
        );

        let rest = consumer.consume(10, Some(Duration::from_millis(10))).unwrap();
        assert_eq!(rest.len(), 2);
        assert!(consumer.consume(10, Some(Duration::ZERO)).unwrap().is_empty());
        assert!(consumer.consume(0, None).unwrap().is_empty());
    }

    #[test]
    fn test_consume_does_not_inspect_broker_errors() {
        let mut errored = RawMessage::new("rrlyr", 0, 1, encode("ZTF-err", None));
        errored.error = Some("Broker: transport failure".to_string());
        let mut consumer = new_consumer(MockBroker::with_messages(vec![errored]));

        let alerts = consumer.consume(1, None).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].topic, "rrlyr");
    }

    #[test]
    fn test_consume_fails_batch_on_error_slot() {
        let broker = MockBroker::with_messages(vec![
            RawMessage::new("rrlyr", 0, 1, encode("ZTF1", Some(18.0))),
            RawMessage::from_error("Local: Broker transport failure"),
            RawMessage::new("rrlyr", 0, 2, encode("ZTF2", None)),
        ]);
        let mut consumer = new_consumer(broker.clone());

        let err = consumer.consume(3, Some(Duration::from_millis(10))).unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "unexpected error: {err:?}");
        assert!(broker.0.borrow().queue.is_empty());
    }

    #[test]
    fn test_close_is_idempotent_and_runs_on_drop() {
        let broker = MockBroker::default();
        let mut consumer = new_consumer(broker.clone());

        consumer.close();
        consumer.close();
        assert!(consumer.is_closed());
        assert!(matches!(consumer.poll(None), Err(Error::Closed)));
        assert!(matches!(consumer.consume(1, None), Err(Error::Closed)));
        drop(consumer);
        assert_eq!(broker.0.borrow().closes, 1);

        let broker = MockBroker::default();
        {
            let _scoped = new_consumer(broker.clone());
        }
        assert_eq!(broker.0.borrow().closes, 1);
    }

    #[test]
    fn test_closed_consumer_does_not_poll_broker() {
        let broker = MockBroker::default();
        let mut consumer = new_consumer(broker.clone());
        consumer.close();
        let _ = consumer.poll(None);
        assert_eq!(broker.0.borrow().polls, 0);
    }

    #[test]
    fn test_timeout_from_secs() {
        assert_eq!(timeout_from_secs(-1.0), None);
        assert_eq!(timeout_from_secs(f64::NAN), None);
        assert_eq!(timeout_from_secs(0.0), Some(Duration::ZERO));
        assert_eq!(timeout_from_secs(1.5), Some(Duration::from_millis(1500)));
        assert_eq!(timeout_from_secs(f64::INFINITY), None);
        assert_eq!(timeout_from_secs(1e30), None);
    }
}
