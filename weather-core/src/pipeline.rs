//! Ordered stages of one ETL run: readiness → extract → transform-and-load.
//!
//! Each stage's output is handed to the next by value. A failed stage is
//! retried according to [`RetryPolicy`]; once retries are exhausted the run
//! stops with a [`StageError`] naming the stage.

use std::{fmt, future::Future, time::Duration};

use anyhow::Context;
use serde_json::Value;
use tokio::time::{Instant, sleep};
use tracing::{error, info, warn};

use crate::{
    config::{Config, ScheduleConfig},
    error::EtlError,
    model::TransformedRecord,
    source::{OpenWeatherSource, WeatherSource},
    transform::transform,
    writer::{ArtifactKey, ArtifactWriter, StorageCredentials},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Readiness,
    Extract,
    TransformLoad,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Readiness => "weather_api_readiness",
            Stage::Extract => "extract_weather_data",
            Stage::TransformLoad => "transform_load_weather_data",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage that kept failing after every allowed attempt.
#[derive(Debug, thiserror::Error)]
#[error("stage `{stage}` failed after {attempts} attempt(s): {source}")]
pub struct StageError {
    pub stage: Stage,
    pub attempts: u32,
    #[source]
    pub source: EtlError,
}

/// Fixed-delay retry: `retries` extra attempts, `delay` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        ScheduleConfig::default().retry_policy()
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self { retries: 0, delay: Duration::ZERO }
    }

    /// Run `op` until it succeeds or the attempts are used up.
    pub async fn run<T, F, Fut>(&self, stage: Stage, mut op: F) -> Result<T, StageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EtlError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt <= self.retries => {
                    warn!(
                        %stage,
                        attempt,
                        max_attempts = self.retries + 1,
                        error = %err,
                        "stage failed, retrying in {:?}",
                        self.delay
                    );
                    sleep(self.delay).await;
                }
                Err(err) => {
                    error!(%stage, attempts = attempt, error = %err, "stage failed, giving up");
                    return Err(StageError { stage, attempts: attempt, source: err });
                }
            }
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub record: TransformedRecord,
    pub key: ArtifactKey,
}

/// One city, one source, one bucket.
#[derive(Debug)]
pub struct Pipeline<S> {
    source: S,
    writer: ArtifactWriter,
    retry: RetryPolicy,
    poke_interval: Duration,
    readiness_timeout: Duration,
}

impl Pipeline<OpenWeatherSource> {
    /// Production wiring: OpenWeather in, S3 out.
    pub fn from_config(config: &Config, credentials: &StorageCredentials) -> anyhow::Result<Self> {
        let source = OpenWeatherSource::from_config(&config.api, config.api_key()?);
        let writer = ArtifactWriter::s3(&config.storage, &config.api.city, credentials)
            .context("Failed to set up artifact storage")?;

        Ok(Self::new(source, writer).with_schedule(&config.schedule))
    }
}

impl<S: WeatherSource> Pipeline<S> {
    pub fn new(source: S, writer: ArtifactWriter) -> Self {
        let schedule = ScheduleConfig::default();
        Self {
            source,
            writer,
            retry: schedule.retry_policy(),
            poke_interval: schedule.poke_interval(),
            readiness_timeout: schedule.readiness_timeout(),
        }
    }

    pub fn with_schedule(self, schedule: &ScheduleConfig) -> Self {
        self.with_retry(schedule.retry_policy())
            .with_readiness(schedule.poke_interval(), schedule.readiness_timeout())
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_readiness(mut self, poke_interval: Duration, timeout: Duration) -> Self {
        self.poke_interval = poke_interval;
        self.readiness_timeout = timeout;
        self
    }

    /// Execute every stage once, in order, retrying each as configured.
    pub async fn run_once(&self) -> Result<RunReport, StageError> {
        info!(source = ?self.source, "pipeline run started");

        self.retry.run(Stage::Readiness, || self.wait_ready()).await?;
        info!(stage = %Stage::Readiness, "stage succeeded");

        let document = self.retry.run(Stage::Extract, || self.source.fetch()).await?;
        info!(stage = %Stage::Extract, "stage succeeded");

        let report = self
            .retry
            .run(Stage::TransformLoad, || self.transform_load(&document))
            .await?;
        info!(stage = %Stage::TransformLoad, key = %report.key, "pipeline run finished");

        Ok(report)
    }

    /// Probe the source every `poke_interval` until it answers or the
    /// readiness timeout elapses.
    async fn wait_ready(&self) -> Result<(), EtlError> {
        let deadline = Instant::now() + self.readiness_timeout;
        loop {
            if self.source.check_ready().await? {
                return Ok(());
            }
            if Instant::now() + self.poke_interval > deadline {
                return Err(EtlError::ApiUnavailable(format!(
                    "no successful probe within {:?}",
                    self.readiness_timeout
                )));
            }
            sleep(self.poke_interval).await;
        }
    }

    async fn transform_load(&self, document: &Value) -> Result<RunReport, EtlError> {
        let record = transform(document)?;
        let key = self.writer.write(&record).await?;
        Ok(RunReport { record, key })
    }
}
