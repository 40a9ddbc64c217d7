use chrono::{DateTime, Days, NaiveTime, Utc};
use tokio::time::sleep;
use tracing::{error, info};

use crate::{
    pipeline::{Pipeline, StageError},
    source::WeatherSource,
};

/// Next midnight UTC strictly after `now`.
pub fn next_daily_tick(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .unwrap_or(chrono::NaiveDate::MAX);
    tomorrow.and_time(NaiveTime::MIN).and_utc()
}

/// What the daily loop does once a run has failed for good.
///
/// The job sends no alerts itself. `Exit` hands the failure to whatever
/// supervises the process (systemd, cron wrapper) through the exit status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure and wait for the next day.
    #[default]
    Continue,
    /// Log the failure and stop the loop with the error.
    Exit,
}

/// Run the pipeline once per day at midnight UTC until a run fails under
/// [`FailurePolicy::Exit`].
///
/// Missed days are not caught up: after a long run or a suspended host the
/// loop simply waits for the next midnight.
pub async fn run_daily<S: WeatherSource>(
    pipeline: &Pipeline<S>,
    on_failure: FailurePolicy,
) -> Result<(), StageError> {
    loop {
        let now = Utc::now();
        let next = next_daily_tick(now);
        info!(next_run = %next, "waiting for next scheduled run");

        sleep((next - now).to_std().unwrap_or_default()).await;

        scheduled_run(pipeline, on_failure).await?;
    }
}

async fn scheduled_run<S: WeatherSource>(
    pipeline: &Pipeline<S>,
    on_failure: FailurePolicy,
) -> Result<(), StageError> {
    match pipeline.run_once().await {
        Ok(report) => {
            info!(key = %report.key, city = %report.record.city, "scheduled run succeeded");
            Ok(())
        }
        Err(err) => {
            error!(stage = %err.stage, attempts = err.attempts, error = %err, ?on_failure, "scheduled run failed");
            match on_failure {
                FailurePolicy::Continue => Ok(()),
                FailurePolicy::Exit => Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};

    use async_trait::async_trait;
    use chrono::TimeZone;
    use object_store::{ObjectStore, memory::InMemory};
    use serde_json::Value;

    use crate::{error::EtlError, pipeline::{RetryPolicy, Stage}, writer::ArtifactWriter};

    #[derive(Debug)]
    struct DownstreamOutage;

    #[async_trait]
    impl WeatherSource for DownstreamOutage {
        async fn check_ready(&self) -> Result<bool, EtlError> {
            Ok(true)
        }

        async fn fetch(&self) -> Result<Value, EtlError> {
            Err(EtlError::Fetch("OpenWeather request failed with status 503".into()))
        }
    }

    fn failing_pipeline(store: Arc<InMemory>) -> Pipeline<DownstreamOutage> {
        let writer = ArtifactWriter::new(store, "memory://", "current_weather_data", "Portland");
        Pipeline::new(DownstreamOutage, writer)
            .with_retry(RetryPolicy { retries: 1, delay: Duration::ZERO })
            .with_readiness(Duration::ZERO, Duration::ZERO)
    }

    #[tokio::test]
    async fn exit_policy_hands_terminal_failure_to_the_caller() {
        let store = Arc::new(InMemory::new());

        let err = scheduled_run(&failing_pipeline(store.clone()), FailurePolicy::Exit)
            .await
            .unwrap_err();

        assert_eq!(err.stage, Stage::Extract);
        assert_eq!(err.attempts, 2);
        assert!(err.to_string().contains("503"), "{err}");
        assert!(store.list_with_delimiter(None).await.unwrap().objects.is_empty());
    }

    #[tokio::test]
    async fn continue_policy_keeps_the_loop_alive() {
        let store = Arc::new(InMemory::new());

        scheduled_run(&failing_pipeline(store), FailurePolicy::Continue)
            .await
            .unwrap();
    }

    #[test]
    fn default_policy_continues() {
        assert_eq!(FailurePolicy::default(), FailurePolicy::Continue);
    }

    #[test]
    fn tick_is_next_midnight() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 15, 42, 7).unwrap();
        assert_eq!(next_daily_tick(now), Utc.with_ymd_and_hms(2024, 6, 4, 0, 0, 0).unwrap());
    }

    #[test]
    fn tick_at_midnight_moves_a_full_day() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap();
        assert_eq!(next_daily_tick(now), Utc.with_ymd_and_hms(2024, 6, 4, 0, 0, 0).unwrap());
    }

    #[test]
    fn tick_crosses_month_and_year() {
        let now = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(next_daily_tick(now), Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }
}
