//! Request handling for `/predictions`.
//!
//! Every request ends in a JSON body: either a forecast (cached or freshly
//! computed) or the error envelope. Cache misses for the same station that
//! overlap in time share a single computation.

use crate::cache::PredictionCache;
use crate::error::{truncate_chars, AppError, Result, OUTPUT_PREFIX_CHARS};
use crate::forecaster::Forecaster;
use crate::models::{ForecastOutput, UNKNOWN_STATION};
use crate::store::{HistoryWindow, StationStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

type SharedBody = Option<Arc<Vec<u8>>>;

#[derive(Clone)]
pub struct PredictionService {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn StationStore>,
    forecaster: Arc<dyn Forecaster>,
    cache: PredictionCache,
    window: HistoryWindow,
    in_flight: Mutex<HashMap<String, watch::Receiver<SharedBody>>>,
}

impl PredictionService {
    pub fn new(
        store: Arc<dyn StationStore>,
        forecaster: Arc<dyn Forecaster>,
        cache: PredictionCache,
        window: HistoryWindow,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                forecaster,
                cache,
                window,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn cache(&self) -> &PredictionCache {
        &self.inner.cache
    }

    /// Answer a prediction request for the raw `estacion` query value
    pub async fn predict(&self, station: Option<&str>) -> Vec<u8> {
        let Some(station) = station.map(str::trim).filter(|s| !s.is_empty()) else {
            warn!("Prediction requested without a station");
            return envelope_body(UNKNOWN_STATION, "Station not specified");
        };

        match self.inner.cache.load(station).await {
            Ok(Some(entry)) if entry.is_fresh => {
                info!(
                    "Serving cached forecast for {} ({}s old)",
                    station,
                    entry.age.as_secs()
                );
                return entry.body;
            }
            Ok(Some(entry)) => {
                debug!("Cached forecast for {} is stale ({}s old)", station, entry.age.as_secs());
            }
            Ok(None) => debug!("No cached forecast for {}", station),
            Err(e) => warn!("Ignoring unreadable cache entry for {}: {}", station, e),
        }

        self.compute_shared(station).await
    }

    /// Run the miss path once per station at a time; overlapping callers
    /// wait for the same result
    async fn compute_shared(&self, station: &str) -> Vec<u8> {
        let key = PredictionCache::key(station);

        let mut rx = {
            let mut in_flight = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            // A closed channel means the computing task died without an answer
            match in_flight.get(&key).filter(|rx| rx.has_changed().is_ok()) {
                Some(rx) => {
                    debug!("Joining in-flight forecast for {}", station);
                    rx.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(key.clone(), rx.clone());

                    // Detached so the computation finishes even if the
                    // requesting client goes away
                    let service = self.clone();
                    let station = station.to_string();
                    tokio::spawn(async move {
                        let body = service.compute(&station).await;
                        service
                            .inner
                            .in_flight
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .remove(&key);
                        let _ = tx.send(Some(Arc::new(body)));
                    });
                    rx
                }
            }
        };

        let result = match rx.wait_for(Option::is_some).await {
            Ok(shared) => match &*shared {
                Some(body) => body.to_vec(),
                None => envelope_body(station, "Forecast computation produced no result"),
            },
            Err(_) => {
                error!("Forecast computation for {} was aborted", station);
                envelope_body(station, "Forecast computation was aborted")
            }
        };
        result
    }

    async fn compute(&self, station: &str) -> Vec<u8> {
        match self.compute_forecast(station).await {
            Ok(body) => body,
            Err(e) => {
                error!("Prediction for {} failed: {}", station, e);
                envelope_body(station, e.to_string())
            }
        }
    }

    /// Load history, run the model, validate, then cache best-effort
    async fn compute_forecast(&self, station: &str) -> Result<Vec<u8>> {
        let started = Instant::now();

        let input = self
            .inner
            .store
            .load_history(station, &self.inner.window)
            .await?;

        let output = self.inner.forecaster.predict(&input).await?;

        let parsed: ForecastOutput = serde_json::from_slice(&output).map_err(|e| {
            AppError::MalformedOutput(format!(
                "{}: {}",
                e,
                truncate_chars(String::from_utf8_lossy(&output).trim(), OUTPUT_PREFIX_CHARS)
            ))
        })?;

        if let Err(e) = self.inner.cache.store(station, output.clone()).await {
            warn!("Could not cache forecast for {}: {}", station, e);
        }

        info!(
            "Computed forecast for {} with {} ({} readings in, {} predictions out) in {}ms",
            station,
            self.inner.forecaster.describe(),
            input.readings.len(),
            parsed.predicciones.len(),
            started.elapsed().as_millis()
        );

        Ok(output)
    }
}

/// Serialized error envelope dated today
pub fn envelope_body(station: &str, message: impl Into<String>) -> Vec<u8> {
    let envelope =
        ForecastOutput::error_envelope(station, chrono::Local::now().date_naive(), message);
    serde_json::to_vec(&envelope).unwrap_or_else(|e| {
        error!("Failed to serialize error envelope: {}", e);
        Vec::new()
    })
}
