use std::fmt;

use chrono::NaiveDateTime;
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, IgnoredAny, SeqAccess, Visitor},
};

/// Rendering used for every timestamp column of the artifact.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current-weather document as returned by OpenWeather.
///
/// Only the fields the job reads are modelled; everything else in the payload
/// is ignored. No field has a default, so a missing key fails deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawObservation {
    pub name: String,
    /// Head of the `weather` list; later entries are skipped unvalidated.
    #[serde(rename = "weather", deserialize_with = "first_condition")]
    pub condition: RawCondition,
    pub main: RawMain,
    pub wind: RawWind,
    pub dt: i64,
    pub timezone: i64,
    pub sys: RawSys,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCondition {
    pub description: String,
}

fn first_condition<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RawCondition, D::Error> {
    struct FirstCondition;

    impl<'de> Visitor<'de> for FirstCondition {
        type Value = RawCondition;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-empty list of weather conditions")
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<RawCondition, A::Error> {
            let first = seq
                .next_element()?
                .ok_or_else(|| de::Error::custom("`weather` list is empty"))?;
            while seq.next_element::<IgnoredAny>()?.is_some() {}
            Ok(first)
        }
    }

    deserializer.deserialize_seq(FirstCondition)
}

/// Temperatures are in Kelvin (the API's default unit).
#[derive(Debug, Clone, Deserialize)]
pub struct RawMain {
    pub temp: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub pressure: i64,
    pub humidity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawWind {
    pub speed: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSys {
    pub sunrise: i64,
    pub sunset: i64,
}

/// One flattened, unit-converted observation. Field order is the artifact's
/// column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformedRecord {
    #[serde(rename = "City")]
    pub city: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Temperature (F)")]
    pub temperature_f: f64,
    #[serde(rename = "Feels like (F)")]
    pub feels_like_f: f64,
    #[serde(rename = "Minimum Temp (F)")]
    pub min_temp_f: f64,
    #[serde(rename = "Maximum Temp (F)")]
    pub max_temp_f: f64,
    #[serde(rename = "Pressure")]
    pub pressure: i64,
    #[serde(rename = "Humidity")]
    pub humidity: i64,
    #[serde(rename = "Wind Speed")]
    pub wind_speed: f64,
    #[serde(rename = "Time of Record", serialize_with = "serialize_timestamp")]
    pub time_of_record: NaiveDateTime,
    #[serde(rename = "Sunrise (Local Time)", serialize_with = "serialize_timestamp")]
    pub sunrise: NaiveDateTime,
    #[serde(rename = "Sunset (Local Time)", serialize_with = "serialize_timestamp")]
    pub sunset: NaiveDateTime,
}

impl TransformedRecord {
    /// Column names in artifact order.
    pub const COLUMNS: [&'static str; 12] = [
        "City",
        "Description",
        "Temperature (F)",
        "Feels like (F)",
        "Minimum Temp (F)",
        "Maximum Temp (F)",
        "Pressure",
        "Humidity",
        "Wind Speed",
        "Time of Record",
        "Sunrise (Local Time)",
        "Sunset (Local Time)",
    ];
}

fn serialize_timestamp<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&ts.format(TIMESTAMP_FORMAT))
}
