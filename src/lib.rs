//! Fink client library
//!
//! A Kafka consumer for alert streams whose values are schemaless Avro
//! datums, as distributed by the Fink broker.
//!
//! # Features
//!
//! - Connection configuration: SASL/SCRAM credentials, consumer group and
//!   brokers from a handful of named options
//! - Schema resolution: explicit file, latest remote schema with an on-disk
//!   cache, or the bundled default
//! - Avro decoding: one structured record per message
//! - Blocking poll/consume API with the connection released on drop
//!
//! # Usage
//!
//! ```rust,no_run
//! use fink_client::{AlertConsumer, ConsumerOptions};
//! use std::path::Path;
//! use std::time::Duration;
//!
//! fn main() -> fink_client::Result<()> {
//!     let options = ConsumerOptions::new("my-group").with_credentials("Alice", "Alice-secret");
//!     let mut consumer = AlertConsumer::new(
//!         &["rrlyr", "ebwuma"],
//!         &options,
//!         Some(Path::new("schemas/fink_alert_schema.avsc")),
//!     )?;
//!
//!     if let Some(alert) = consumer.poll(Some(Duration::from_secs(5)))? {
//!         println!("{}: {}", alert.topic, alert.record.to_json());
//!     }
//!     Ok(())
//! }
//! ```

/// Broker client seam and its rdkafka implementation
pub mod broker;
pub mod config;
/// Alert consumer with poll/consume/close lifecycle
pub mod consumer;
pub mod decoder;
pub mod error;
pub mod schema;

// Re-export main types for easy access
pub use broker::{BrokerClient, KafkaBroker, RawMessage};
pub use config::{ConnectionConfig, ConsumerOptions};
pub use consumer::{timeout_from_secs, Alert, AlertConsumer};
pub use decoder::{AlertDecoder, Record};
pub use error::{Error, Result};
pub use schema::{fetch_remote, AlertSchema, FetchOutcome, SchemaOrigin, SchemaSource};
