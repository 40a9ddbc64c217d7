//! Error taxonomy for a single ETL run.

/// Everything that can abort a run. None of these are recovered locally; the
/// pipeline driver decides whether to retry.
#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    /// Upstream fetch produced no usable document (null / empty).
    #[error("no data retrieved from the weather API")]
    MissingData,

    /// Document present but a required field is absent or mistyped.
    #[error("malformed weather document: {reason}")]
    MalformedData { reason: String },

    /// Storage credentials absent or rejected by the store.
    #[error("storage authentication failed: {0}")]
    Authentication(String),

    /// Network or storage-service failure while writing the artifact.
    #[error("failed to write artifact: {0}")]
    StorageWrite(#[source] object_store::Error),

    /// Readiness probe never succeeded within its timeout.
    #[error("weather API not ready: {0}")]
    ApiUnavailable(String),

    /// HTTP fetch failed or returned a body that is not JSON.
    #[error("weather API fetch failed: {0}")]
    Fetch(String),

    #[error("failed to encode CSV: {0}")]
    Encode(#[from] csv::Error),
}

impl EtlError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedData { reason: reason.into() }
    }
}

impl From<object_store::Error> for EtlError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::Unauthenticated { .. }
            | object_store::Error::PermissionDenied { .. } => Self::Authentication(err.to_string()),
            other => Self::StorageWrite(other),
        }
    }
}
