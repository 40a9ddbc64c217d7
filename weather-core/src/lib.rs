//! Core library for the daily weather ETL job.
//!
//! This crate defines:
//! - Kelvin → Fahrenheit conversion and the record transform
//! - The CSV artifact writer over object storage
//! - The fetch source, staged pipeline and daily schedule
//! - Configuration handling
//!
//! It is used by `weather-etl-cli`, but the transform and writer can be
//! driven by any other scheduler.

pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod schedule;
pub mod source;
pub mod transform;
pub mod writer;

pub use config::{ApiConfig, Config, ScheduleConfig, StorageConfig};
pub use convert::fahrenheit;
pub use error::EtlError;
pub use model::{RawObservation, TransformedRecord};
pub use pipeline::{Pipeline, RetryPolicy, RunReport, Stage, StageError};
pub use source::{OpenWeatherSource, WeatherSource};
pub use transform::transform;
pub use writer::{ArtifactKey, ArtifactWriter, StorageCredentials, encode_csv};
