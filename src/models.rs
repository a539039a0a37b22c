//! Wire types shared by the HTTP surface and the forecaster contract.
//!
//! Field names follow the JSON contract consumed by the mobile client and
//! produced by the prediction model, so they are Spanish on the wire.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Station name reported when a request carries no station at all
pub const UNKNOWN_STATION: &str = "unknown";

/// Channel defaults used when a station never recorded a value
pub const DEFAULT_TEMPERATURE: f64 = 22.0;
pub const DEFAULT_HUMIDITY: f64 = 50.0;
pub const DEFAULT_PRESSURE: f64 = 775.0;
pub const DEFAULT_AIR_QUALITY: f64 = 60.0;

/// One timestamped multi-channel sample handed to the forecaster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub fecha: NaiveDate,
    pub hora: NaiveTime,
    pub temperatura: f64,
    pub humedad: f64,
    pub presion: f64,
    #[serde(rename = "calidadAire")]
    pub calidad_aire: f64,
}

/// Payload written to the forecaster: station name plus readings in
/// ascending chronological order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastInput {
    pub estacion: String,
    pub readings: Vec<Reading>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPrediction {
    pub hora: String,
    pub temperatura: f64,
    pub humedad: f64,
    #[serde(rename = "calidadAire")]
    pub calidad_aire: f64,
    pub presion: f64,
    pub confianza: f64,
}

/// Response body of `/predictions`, also the forecaster's output shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastOutput {
    pub estacion: String,
    pub fecha_prediccion: String,
    pub predicciones: Vec<HourlyPrediction>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ForecastOutput {
    /// Build the in-band error envelope returned for every failed request
    pub fn error_envelope(estacion: &str, date: NaiveDate, message: impl Into<String>) -> Self {
        Self {
            estacion: estacion.to_string(),
            fecha_prediccion: date.format("%Y-%m-%d").to_string(),
            predicciones: Vec::new(),
            error: Some(message.into()),
        }
    }
}

/// Latest known value of every channel, served by `/zone_info`
///
/// A channel that never recorded anything reports its default constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentReading {
    pub estacion: String,
    pub temperatura: f64,
    pub humedad: f64,
    pub presion: f64,
    #[serde(rename = "calidadAire")]
    pub calidad_aire: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationLocation {
    #[serde(rename = "idEstacion")]
    pub id_estacion: i32,
    pub estacion: String,
    pub latitud: f64,
    pub longitud: f64,
}
