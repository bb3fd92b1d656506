//! Connection configuration for the alert consumer.
//!
//! [`ConsumerOptions`] is the small set of user-facing options (credentials,
//! group id, brokers). [`ConnectionConfig`] is the librdkafka key/value map
//! derived from it.

use crate::error::{Error, Result};
use rdkafka::config::ClientConfig;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// Brokers used when no `bootstrap.servers` option is given.
pub const DEFAULT_BOOTSTRAP_SERVERS: [&str; 3] =
    ["localhost:9093", "localhost:9094", "localhost:9095"];

/// Offset reset policy applied to every consumer group.
pub const AUTO_OFFSET_RESET: &str = "earliest";

pub const SECURITY_PROTOCOL: &str = "sasl_plaintext";
pub const SASL_MECHANISM: &str = "SCRAM-SHA-512";

/// User-facing consumer options
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConsumerOptions {
    /// Username for SASL authentication
    pub username: Option<String>,
    /// Password for SASL authentication
    pub password: Option<String>,
    /// Consumer group ID (required)
    pub group_id: Option<String>,
    /// Kafka brokers (comma-separated list)
    #[serde(alias = "bootstrap.servers")]
    pub bootstrap_servers: Option<String>,
}

impl ConsumerOptions {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: Some(group_id.into()),
            ..Default::default()
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_bootstrap_servers(mut self, servers: impl Into<String>) -> Self {
        self.bootstrap_servers = Some(servers.into());
        self
    }

    /// Build options from a flat string map.
    ///
    /// Recognised keys are `username`, `password`, `group_id` and
    /// `bootstrap.servers`. Anything else is ignored.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        Self {
            username: map.get("username").cloned(),
            password: map.get("password").cloned(),
            group_id: map.get("group_id").cloned(),
            bootstrap_servers: map.get("bootstrap.servers").cloned(),
        }
    }

    /// Fill every option unset in `self` from `other`.
    pub fn or(self, other: ConsumerOptions) -> Self {
        Self {
            username: self.username.or(other.username),
            password: self.password.or(other.password),
            group_id: self.group_id.or(other.group_id),
            bootstrap_servers: self.bootstrap_servers.or(other.bootstrap_servers),
        }
    }
}

/// Configuration map handed to the broker client
///
/// Built once from [`ConsumerOptions`] and never mutated afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    entries: BTreeMap<String, String>,
}

impl ConnectionConfig {
    pub fn from_options(options: &ConsumerOptions) -> Result<Self> {
        let mut entries = BTreeMap::new();

        if let (Some(username), Some(password)) = (&options.username, &options.password) {
            entries.insert("security.protocol".to_string(), SECURITY_PROTOCOL.to_string());
            entries.insert("sasl.mechanism".to_string(), SASL_MECHANISM.to_string());
            entries.insert("sasl.username".to_string(), username.clone());
            entries.insert("sasl.password".to_string(), password.clone());
        }

        let group_id = options
            .group_id
            .as_deref()
            .filter(|g| !g.is_empty())
            .ok_or(Error::MissingOption("group_id"))?;
        entries.insert("group.id".to_string(), group_id.to_string());

        entries.insert(
            "auto.offset.reset".to_string(),
            AUTO_OFFSET_RESET.to_string(),
        );

        let servers = match &options.bootstrap_servers {
            Some(servers) => servers.clone(),
            None => DEFAULT_BOOTSTRAP_SERVERS.join(","),
        };
        entries.insert("bootstrap.servers".to_string(), servers);

        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether SASL credentials are configured
    pub fn is_authenticated(&self) -> bool {
        self.contains_key("sasl.username")
    }

    pub fn to_client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        for (key, value) in self.iter() {
            client_config.set(key, value);
        }
        client_config
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in self.iter() {
            if key == "sasl.password" {
                map.entry(&key, &"***");
            } else {
                map.entry(&key, &value);
            }
        }
        map.finish()
    }
}
