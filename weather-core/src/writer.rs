//! CSV artifact encoding and upload.

use std::{fmt, sync::Arc};

use chrono::{Local, NaiveDateTime};
use object_store::{ObjectStore, aws::AmazonS3Builder, path::Path};
use tracing::{error, info};

use crate::{
    config::StorageConfig,
    error::EtlError,
    model::TransformedRecord,
};

/// Environment variable names the binary reads credentials from.
pub const ACCESS_KEY_ID_VAR: &str = "AccessKeyId";
pub const SECRET_ACCESS_KEY_VAR: &str = "SecretAccessKey";
pub const SESSION_TOKEN_VAR: &str = "SessionToken";

/// Temporary storage credentials. Any of them may be absent; the writer
/// refuses to build until all three are present.
#[derive(Clone, Default)]
pub struct StorageCredentials {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

impl StorageCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: Some(access_key_id.into()),
            secret_access_key: Some(secret_access_key.into()),
            session_token: Some(session_token.into()),
        }
    }

    /// Read the three credential variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve credentials through `lookup`, treating empty values as absent.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
        Self {
            access_key_id: get(ACCESS_KEY_ID_VAR),
            secret_access_key: get(SECRET_ACCESS_KEY_VAR),
            session_token: get(SESSION_TOKEN_VAR),
        }
    }

    /// All three values, or `Authentication` naming the absent ones.
    fn resolve(&self) -> Result<(&str, &str, &str), EtlError> {
        match (
            self.access_key_id.as_deref(),
            self.secret_access_key.as_deref(),
            self.session_token.as_deref(),
        ) {
            (Some(key_id), Some(secret), Some(token)) => Ok((key_id, secret, token)),
            _ => Err(EtlError::Authentication(format!(
                "missing storage credentials: {}",
                self.missing().join(", ")
            ))),
        }
    }

    fn missing(&self) -> Vec<&'static str> {
        [
            (ACCESS_KEY_ID_VAR, &self.access_key_id),
            (SECRET_ACCESS_KEY_VAR, &self.secret_access_key),
            (SESSION_TOKEN_VAR, &self.session_token),
        ]
        .into_iter()
        .filter(|(_, v)| v.is_none())
        .map(|(name, _)| name)
        .collect()
    }
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("StorageCredentials")
            .field("access_key_id", &mask(&self.access_key_id))
            .field("secret_access_key", &mask(&self.secret_access_key))
            .field("session_token", &mask(&self.session_token))
            .finish()
    }
}

/// Object key an artifact was written under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    /// `<tag>_<city>_<DDMMYYYYHHMMSS>.csv`
    pub fn new(tag: &str, city: &str, at: NaiveDateTime) -> Self {
        Self(format!("{tag}_{}_{}.csv", city_slug(city), at.format("%d%m%Y%H%M%S")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn city_slug(city: &str) -> String {
    city.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Encode a single record as a CSV body: header row plus one data row.
pub fn encode_csv(record: &TransformedRecord) -> Result<Vec<u8>, EtlError> {
    let mut wtr = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    wtr.serialize(record)?;

    wtr.into_inner().map_err(|e| EtlError::Encode(e.into_error().into()))
}

/// Writes one record per call to a fixed bucket. Holds no mutable state, so a
/// single writer can be reused across retries.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    store: Arc<dyn ObjectStore>,
    location: String,
    tag: String,
    city: String,
}

impl ArtifactWriter {
    /// Writer over an arbitrary store. `location` is only used in log output.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        location: impl Into<String>,
        tag: impl Into<String>,
        city: impl Into<String>,
    ) -> Self {
        Self {
            store,
            location: location.into(),
            tag: tag.into(),
            city: city.into(),
        }
    }

    /// S3-backed writer for the configured bucket.
    pub fn s3(
        config: &StorageConfig,
        city: &str,
        credentials: &StorageCredentials,
    ) -> Result<Self, EtlError> {
        let (key_id, secret, token) = credentials.resolve().inspect_err(|err| {
            error!(error = %err, "cannot build S3 writer");
        })?;

        let store = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .with_access_key_id(key_id)
            .with_secret_access_key(secret)
            .with_token(token)
            .build()?;

        Ok(Self::new(
            Arc::new(store),
            format!("s3://{}", config.bucket),
            config.tag.clone(),
            city,
        ))
    }

    /// Write `record` under a key stamped with the current local time.
    pub async fn write(&self, record: &TransformedRecord) -> Result<ArtifactKey, EtlError> {
        self.write_at(record, Local::now().naive_local()).await
    }

    /// Write `record` under a key stamped with `at`. An existing object with
    /// the same key is overwritten.
    pub async fn write_at(
        &self,
        record: &TransformedRecord,
        at: NaiveDateTime,
    ) -> Result<ArtifactKey, EtlError> {
        let key = ArtifactKey::new(&self.tag, &self.city, at);
        let body = encode_csv(record)?;
        let bytes = body.len();

        self.store
            .put(&Path::from(key.as_str()), body.into())
            .await
            .map_err(EtlError::from)
            .inspect_err(|err| {
                error!(location = %self.location, key = %key, error = %err, "artifact upload failed");
            })?;

        info!(location = %self.location, key = %key, bytes, "artifact written");
        Ok(key)
    }
}
