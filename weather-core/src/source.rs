use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;

use crate::error::EtlError;

pub mod openweather;

pub use openweather::OpenWeatherSource;

/// Upstream of the pipeline: something that can say whether it is reachable
/// and hand over one raw weather document.
#[async_trait]
pub trait WeatherSource: Send + Sync + Debug {
    /// One readiness probe. `Ok(false)` means "not yet, ask again later".
    async fn check_ready(&self) -> Result<bool, EtlError>;

    /// Fetch the current observation as parsed JSON.
    async fn fetch(&self) -> Result<Value, EtlError>;
}
