use crate::config::{HistoryConfig, MAX_LOOKBACK_HOURS};
use crate::error::Result;
use crate::models::{CurrentReading, ForecastInput, StationLocation};
use async_trait::async_trait;

/// Bounds applied when assembling a station's recent history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    pub lookback: chrono::Duration,
    pub max_rows: u32,
    pub join_tolerance_seconds: u32,
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::from(&HistoryConfig::default())
    }
}

impl From<&HistoryConfig> for HistoryWindow {
    fn from(config: &HistoryConfig) -> Self {
        Self {
            lookback: chrono::Duration::hours(config.lookback_hours.min(MAX_LOOKBACK_HOURS) as i64),
            max_rows: config.max_rows,
            join_tolerance_seconds: config.join_tolerance_seconds,
        }
    }
}

/// Read-only access to station readings
#[async_trait]
pub trait StationStore: Send + Sync {
    /// Assemble the forecaster input for `station` over the window ending now
    ///
    /// Fails with `StationNotFound` when no station has that name.
    async fn load_history(&self, station: &str, window: &HistoryWindow) -> Result<ForecastInput>;

    /// Latest ever value of each channel for `station`
    async fn current_reading(&self, station: &str) -> Result<CurrentReading>;

    async fn list_locations(&self) -> Result<Vec<StationLocation>>;
}
