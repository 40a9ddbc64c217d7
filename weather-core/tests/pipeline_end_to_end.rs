use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use object_store::{ObjectStore, memory::InMemory, path::Path};
use serde_json::{Value, json};
use weather_etl_core::{
    ArtifactWriter, EtlError, Pipeline, RetryPolicy, Stage, TransformedRecord, WeatherSource,
};

/// Serves a canned document; readiness and fetch can be told to fail a few
/// times first.
#[derive(Debug, Default)]
struct FakeSource {
    document: Value,
    not_ready_for: u32,
    fetch_failures: u32,
    probes: AtomicU32,
    fetches: AtomicU32,
}

impl FakeSource {
    fn serving(document: Value) -> Self {
        Self { document, ..Self::default() }
    }
}

#[async_trait]
impl WeatherSource for FakeSource {
    async fn check_ready(&self) -> Result<bool, EtlError> {
        Ok(self.probes.fetch_add(1, Ordering::SeqCst) >= self.not_ready_for)
    }

    async fn fetch(&self) -> Result<Value, EtlError> {
        if self.fetches.fetch_add(1, Ordering::SeqCst) < self.fetch_failures {
            return Err(EtlError::Fetch("connection reset".into()));
        }
        Ok(self.document.clone())
    }
}

fn portland() -> Value {
    json!({
        "name": "Portland",
        "weather": [{"description": "clear sky"}],
        "main": {"temp": 280, "feels_like": 279, "temp_min": 278, "temp_max": 282,
                 "pressure": 1012, "humidity": 70},
        "wind": {"speed": 3.1},
        "dt": 1717000000,
        "timezone": 0,
        "sys": {"sunrise": 1716990000, "sunset": 1717030000}
    })
}

fn fast() -> RetryPolicy {
    RetryPolicy { retries: 5, delay: Duration::ZERO }
}

fn pipeline(source: FakeSource, store: Arc<InMemory>) -> Pipeline<FakeSource> {
    let writer = ArtifactWriter::new(store, "memory://", "current_weather_data", "Portland");
    Pipeline::new(source, writer)
        .with_retry(fast())
        .with_readiness(Duration::ZERO, Duration::from_millis(50))
}

async fn read(store: &InMemory, key: &str) -> String {
    let bytes = store.get(&Path::from(key)).await.unwrap().bytes().await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn portland_run_writes_exactly_one_row() {
    let store = Arc::new(InMemory::new());
    let report = pipeline(FakeSource::serving(portland()), store.clone())
        .run_once()
        .await
        .expect("run should succeed");

    assert_eq!(report.record.city, "Portland");
    assert_eq!(report.record.description, "clear sky");
    assert!((report.record.temperature_f - 44.33).abs() < 0.01);
    assert!(report.key.as_str().starts_with("current_weather_data_portland_"));
    assert!(report.key.as_str().ends_with(".csv"));

    let body = read(&store, report.key.as_str()).await;
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 2, "{body}");
    assert_eq!(lines[0], TransformedRecord::COLUMNS.join(","));
    assert!(lines[1].starts_with("Portland,clear sky,44.33"));
    assert!(lines[1].contains("2024-05-29 16:26:40"));
}

#[tokio::test]
async fn transient_fetch_failures_are_retried() {
    let store = Arc::new(InMemory::new());
    let source = FakeSource { fetch_failures: 2, ..FakeSource::serving(portland()) };
    let pipeline = pipeline(source, store);

    let report = pipeline.run_once().await.unwrap();
    assert_eq!(report.record.humidity, 70);
}

#[tokio::test]
async fn readiness_polls_until_source_answers() {
    let store = Arc::new(InMemory::new());
    let source = FakeSource { not_ready_for: 3, ..FakeSource::serving(portland()) };

    let report = pipeline(source, store).run_once().await;
    assert!(report.is_ok());
}

#[tokio::test]
async fn readiness_timeout_fails_the_readiness_stage() {
    let store = Arc::new(InMemory::new());
    let source = FakeSource { not_ready_for: u32::MAX, ..FakeSource::serving(portland()) };
    let writer = ArtifactWriter::new(store, "memory://", "current_weather_data", "Portland");

    let err = Pipeline::new(source, writer)
        .with_retry(RetryPolicy::none())
        .with_readiness(Duration::from_millis(10), Duration::from_millis(30))
        .run_once()
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Readiness);
    assert!(matches!(err.source, EtlError::ApiUnavailable(_)));
}

#[tokio::test]
async fn empty_document_fails_transform_load_without_writing() {
    let store = Arc::new(InMemory::new());
    let writer = ArtifactWriter::new(store.clone(), "memory://", "current_weather_data", "Portland");
    let pipeline = Pipeline::new(FakeSource::serving(Value::Null), writer)
        .with_retry(RetryPolicy { retries: 2, delay: Duration::ZERO })
        .with_readiness(Duration::ZERO, Duration::ZERO);

    let err = pipeline.run_once().await.unwrap_err();

    assert_eq!(err.stage, Stage::TransformLoad);
    assert_eq!(err.attempts, 3);
    assert!(matches!(err.source, EtlError::MissingData));

    let listed = store.list_with_delimiter(None).await.unwrap();
    assert!(listed.objects.is_empty());
}

#[tokio::test]
async fn missing_humidity_fails_without_writing() {
    let store = Arc::new(InMemory::new());
    let mut doc = portland();
    doc["main"].as_object_mut().unwrap().remove("humidity");

    let err = pipeline(FakeSource::serving(doc), store.clone()).run_once().await.unwrap_err();

    assert!(matches!(err.source, EtlError::MalformedData { .. }));
    let listed = store.list_with_delimiter(None).await.unwrap();
    assert!(listed.objects.is_empty());
}
