use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::FromRow;

use crate::models::{
    Reading, DEFAULT_AIR_QUALITY, DEFAULT_HUMIDITY, DEFAULT_PRESSURE, DEFAULT_TEMPERATURE,
};

#[derive(Debug, Clone, FromRow)]
pub struct Station {
    pub id: i32,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Most recent value ever recorded on each channel, plus the timestamp of
/// the newest temperature row
#[derive(Debug, Clone, Default, FromRow)]
pub struct LatestValues {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub air_quality: Option<f64>,
    pub taken_at: Option<NaiveDateTime>,
}

/// Per-request fill values for channels missing from a joined row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackDefaults {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub air_quality: f64,
    pub taken_at: NaiveDateTime,
}

impl LatestValues {
    /// Resolve missing channels to their constants; `now` stands in for the
    /// timestamp when the station has no temperature history at all
    pub fn into_defaults(self, now: NaiveDateTime) -> FallbackDefaults {
        FallbackDefaults {
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            humidity: self.humidity.unwrap_or(DEFAULT_HUMIDITY),
            pressure: self.pressure.unwrap_or(DEFAULT_PRESSURE),
            air_quality: self.air_quality.unwrap_or(DEFAULT_AIR_QUALITY),
            taken_at: self.taken_at.unwrap_or(now),
        }
    }
}

impl FallbackDefaults {
    /// The single reading used when the lookback window is empty
    pub fn synthetic_reading(&self) -> Reading {
        Reading {
            fecha: self.taken_at.date(),
            hora: self.taken_at.time(),
            temperatura: self.temperature,
            humedad: self.humidity,
            presion: self.pressure,
            calidad_aire: self.air_quality,
        }
    }
}

/// A temperature row with the other channels joined and coalesced
#[derive(Debug, Clone, FromRow)]
pub struct JoinedReading {
    pub reading_date: NaiveDate,
    pub reading_time: NaiveTime,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub air_quality: f64,
}

impl From<JoinedReading> for Reading {
    fn from(row: JoinedReading) -> Self {
        Reading {
            fecha: row.reading_date,
            hora: row.reading_time,
            temperatura: row.temperature,
            humedad: row.humidity,
            presion: row.pressure,
            calidad_aire: row.air_quality,
        }
    }
}
