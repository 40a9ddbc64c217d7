use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{config::ApiConfig, error::EtlError};

use super::WeatherSource;

const CURRENT_WEATHER_PATH: &str = "/data/2.5/weather";

/// Current-weather endpoint for a single city. Temperatures come back in
/// Kelvin because no `units` parameter is sent.
#[derive(Clone)]
pub struct OpenWeatherSource {
    base_url: String,
    city: String,
    api_key: String,
    http: Client,
}

impl OpenWeatherSource {
    pub fn new(base_url: impl Into<String>, city: impl Into<String>, api_key: String) -> Self {
        Self {
            base_url: base_url.into(),
            city: city.into(),
            api_key,
            http: Client::new(),
        }
    }

    pub fn from_config(config: &ApiConfig, api_key: &str) -> Self {
        Self::new(config.base_url.clone(), config.city.clone(), api_key.to_owned())
    }

    fn endpoint(&self) -> String {
        format!("{}{CURRENT_WEATHER_PATH}", self.base_url.trim_end_matches('/'))
    }

    async fn get(&self) -> Result<(StatusCode, String), EtlError> {
        let res = self
            .http
            .get(self.endpoint())
            .query(&[("q", self.city.as_str()), ("APPID", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| {
                EtlError::Fetch(format!("failed to send request to OpenWeather: {}", e.without_url()))
            })?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| {
                EtlError::Fetch(format!("failed to read OpenWeather response body: {}", e.without_url()))
            })?;

        Ok((status, body))
    }
}

impl fmt::Debug for OpenWeatherSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenWeatherSource")
            .field("base_url", &self.base_url)
            .field("city", &self.city)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherSource {
    async fn check_ready(&self) -> Result<bool, EtlError> {
        match self.get().await {
            Ok((status, _)) if status.is_success() => Ok(true),
            Ok((status, body)) => {
                debug!(%status, body = %truncate_body(&body), "OpenWeather not ready");
                Ok(false)
            }
            Err(err) => {
                warn!(error = %err, "OpenWeather readiness probe failed");
                Ok(false)
            }
        }
    }

    async fn fetch(&self) -> Result<Value, EtlError> {
        let (status, body) = self.get().await?;
        parse_response(status, &body)
    }
}

/// Turn an HTTP status and body into the raw document.
fn parse_response(status: StatusCode, body: &str) -> Result<Value, EtlError> {
    if !status.is_success() {
        return Err(EtlError::Fetch(format!(
            "OpenWeather request failed with status {}: {}",
            status,
            truncate_body(body),
        )));
    }

    debug!(body = %truncate_body(body), "OpenWeather response");

    serde_json::from_str(body)
        .map_err(|e| EtlError::Fetch(format!("failed to parse OpenWeather JSON: {e}")))
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
