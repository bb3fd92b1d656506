//! Alert schema resolution.
//!
//! The schema is taken from, in order of preference:
//!
//! 1. an explicit local path given by the caller (no network access),
//! 2. the latest distribution schema published by the Fink broker, cached
//!    on disk after every successful fetch,
//! 3. the default schema bundled with this crate.
//!
//! A schema that fails to parse is always an error, whichever source it
//! came from.

use crate::error::{Error, Result};
use apache_avro::Schema;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Latest alert distribution schema published by the Fink broker
pub const DISTRIBUTION_SCHEMA_URL: &str =
    "https://raw.github.com/astrolabsoftware/fink-broker/master/schemas/distribution_schema.avsc";

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(1);

/// Where a resolved schema came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaOrigin {
    /// Caller-supplied schema file
    Explicit(PathBuf),
    /// Fetched from the remote source and written to `cache_path`
    Remote { url: String, cache_path: PathBuf },
    /// Bundled default, used because the remote fetch failed with `reason`
    BundledDefault { path: PathBuf, reason: String },
}

impl std::fmt::Display for SchemaOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaOrigin::Explicit(path) => write!(f, "{}", path.display()),
            SchemaOrigin::Remote { url, .. } => write!(f, "{url}"),
            SchemaOrigin::BundledDefault { path, .. } => {
                write!(f, "bundled default {}", path.display())
            }
        }
    }
}

/// A parsed Avro schema together with its origin
#[derive(Debug, Clone)]
pub struct AlertSchema {
    schema: Schema,
    origin: SchemaOrigin,
}

impl AlertSchema {
    /// Parse a schema definition
    pub fn parse_str(definition: &str, origin: SchemaOrigin) -> Result<Self> {
        let schema = Schema::parse_str(definition).map_err(|source| Error::SchemaParse {
            origin: origin.to_string(),
            source,
        })?;
        Ok(Self { schema, origin })
    }

    /// Read and parse a schema file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        Self::read(path, SchemaOrigin::Explicit(path.to_path_buf()))
    }

    fn read(path: &Path, origin: SchemaOrigin) -> Result<Self> {
        let definition = std::fs::read_to_string(path).map_err(|source| Error::SchemaRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_str(&definition, origin)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn origin(&self) -> &SchemaOrigin {
        &self.origin
    }

    pub fn into_schema(self) -> Schema {
        self.schema
    }
}

/// Result of a remote schema fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched(String),
    Unavailable(String),
}

/// GET `url` and return its body, or the reason it could not be obtained.
///
/// Timeouts, connection errors, non-2xx statuses and unreadable bodies all
/// map to [`FetchOutcome::Unavailable`].
pub fn fetch_remote(url: &str, timeout: Duration) -> FetchOutcome {
    let client = match reqwest::blocking::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => return FetchOutcome::Unavailable(format!("failed to build HTTP client: {e}")),
    };

    let response = match client.get(url).send() {
        Ok(response) => response,
        Err(e) => return FetchOutcome::Unavailable(format!("request to {url} failed: {e}")),
    };

    let status = response.status();
    if !status.is_success() {
        return FetchOutcome::Unavailable(format!("{url} returned status {status}"));
    }

    match response.text() {
        Ok(body) => FetchOutcome::Fetched(body),
        Err(e) => FetchOutcome::Unavailable(format!("failed to read body from {url}: {e}")),
    }
}

/// Locations used to resolve a schema when no explicit path is given
#[derive(Debug, Clone)]
pub struct SchemaSource {
    /// Remote schema definition to fetch
    pub remote_url: String,
    /// File the fetched definition is written to (overwritten every fetch)
    pub cache_path: PathBuf,
    /// Schema used when the remote fetch fails
    pub default_path: PathBuf,
    /// Timeout for the remote fetch
    pub fetch_timeout: Duration,
}

impl Default for SchemaSource {
    fn default() -> Self {
        let schemas_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("schemas");
        Self {
            remote_url: DISTRIBUTION_SCHEMA_URL.to_string(),
            cache_path: schemas_dir.join("distribution_schema.avsc"),
            default_path: schemas_dir.join("fink_alert_schema.avsc"),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl SchemaSource {
    /// Resolve the schema to decode alerts with.
    pub fn resolve(&self, explicit_path: Option<&Path>) -> Result<AlertSchema> {
        if let Some(path) = explicit_path {
            info!("Using schema from {}", path.display());
            return AlertSchema::from_file(path);
        }

        info!("Getting schema from {}", self.remote_url);
        match fetch_remote(&self.remote_url, self.fetch_timeout) {
            FetchOutcome::Fetched(definition) => {
                if let Some(parent) = self.cache_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&self.cache_path, &definition)?;
                info!("Schema cached at {}", self.cache_path.display());
                AlertSchema::parse_str(
                    &definition,
                    SchemaOrigin::Remote {
                        url: self.remote_url.clone(),
                        cache_path: self.cache_path.clone(),
                    },
                )
            }
            FetchOutcome::Unavailable(reason) => {
                warn!(
                    "Could not obtain schema from {} ({reason}). Using default schema available at: {}",
                    self.remote_url,
                    self.default_path.display()
                );
                AlertSchema::read(
                    &self.default_path,
                    SchemaOrigin::BundledDefault {
                        path: self.default_path.clone(),
                        reason,
                    },
                )
            }
        }
    }
}
