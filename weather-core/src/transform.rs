//! Raw OpenWeather document → [`TransformedRecord`].

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::{
    convert::fahrenheit,
    error::EtlError,
    model::{RawObservation, TransformedRecord},
};

/// Flatten one weather document into a record.
///
/// Fails with [`EtlError::MissingData`] for a null or empty document and with
/// [`EtlError::MalformedData`] when any required field is absent or mistyped.
/// The error is logged here and then handed back unchanged.
pub fn transform(document: &Value) -> Result<TransformedRecord, EtlError> {
    debug!(raw = %document, "transforming weather document");

    transform_inner(document).inspect_err(|err| {
        error!(error = %err, "error in transform step");
    })
}

fn transform_inner(document: &Value) -> Result<TransformedRecord, EtlError> {
    if is_empty(document) {
        return Err(EtlError::MissingData);
    }

    let raw = RawObservation::deserialize(document)
        .map_err(|e| EtlError::malformed(e.to_string()))?;

    Ok(TransformedRecord {
        city: raw.name,
        description: raw.condition.description,
        temperature_f: fahrenheit(raw.main.temp),
        feels_like_f: fahrenheit(raw.main.feels_like),
        min_temp_f: fahrenheit(raw.main.temp_min),
        max_temp_f: fahrenheit(raw.main.temp_max),
        pressure: raw.main.pressure,
        humidity: raw.main.humidity,
        wind_speed: raw.wind.speed,
        time_of_record: shifted(raw.dt, raw.timezone, "dt")?,
        sunrise: shifted(raw.sys.sunrise, raw.timezone, "sys.sunrise")?,
        sunset: shifted(raw.sys.sunset, raw.timezone, "sys.sunset")?,
    })
}

/// "Local" time by offset arithmetic: the zone offset is added to the epoch
/// value and the sum is rendered as if it were UTC.
pub fn shifted(epoch: i64, offset_secs: i64, field: &str) -> Result<NaiveDateTime, EtlError> {
    epoch
        .checked_add(offset_secs)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| {
            EtlError::malformed(format!("`{field}` + timezone ({epoch} + {offset_secs}) is out of range"))
        })
}

fn is_empty(document: &Value) -> bool {
    match document {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
    }
}
