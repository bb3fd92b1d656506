use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing required option: {0}")]
    MissingOption(&'static str),

    #[error("Failed to read schema file {}: {source}", .path.display())]
    SchemaRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid Avro schema from {origin}: {source}")]
    SchemaParse {
        origin: String,
        #[source]
        source: apache_avro::Error,
    },

    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Broker error: {reason} (topic: {topic}[{partition}] at offset: {offset} with key: {key:?})")]
    Broker {
        reason: String,
        topic: String,
        partition: i32,
        offset: i64,
        key: Option<String>,
    },

    #[error("Avro decode error: {0}")]
    Decode(#[source] apache_avro::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Consumer is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;
