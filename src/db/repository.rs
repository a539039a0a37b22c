use crate::db::models::{FallbackDefaults, JoinedReading, LatestValues, Station};
use crate::error::{AppError, Result};
use crate::models::{CurrentReading, ForecastInput, Reading, StationLocation};
use crate::store::{HistoryWindow, StationStore};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::PgPool;
use tracing::{debug, info};

/// Latest value per channel, each looked up independently.
/// `taken_at` comes from the temperature channel only.
const LATEST_VALUES_QUERY: &str = r#"
    SELECT
        (SELECT value FROM temperature_readings WHERE station_id = $1
            ORDER BY reading_date DESC, reading_time DESC LIMIT 1) AS temperature,
        (SELECT value FROM humidity_readings WHERE station_id = $1
            ORDER BY reading_date DESC, reading_time DESC LIMIT 1) AS humidity,
        (SELECT value FROM pressure_readings WHERE station_id = $1
            ORDER BY reading_date DESC, reading_time DESC LIMIT 1) AS pressure,
        (SELECT value FROM air_quality_readings WHERE station_id = $1
            ORDER BY reading_date DESC, reading_time DESC LIMIT 1) AS air_quality,
        (SELECT reading_date + reading_time FROM temperature_readings WHERE station_id = $1
            ORDER BY reading_date DESC, reading_time DESC LIMIT 1) AS taken_at
"#;

/// Temperature rows inside the window, newest `$7` kept, returned oldest
/// first. Humidity joins on the exact timestamp; pressure and air quality
/// join on the same date with the nearest row strictly closer than `$5`
/// seconds.
const JOINED_READINGS_QUERY: &str = r#"
    SELECT recent.reading_date, recent.reading_time, recent.temperature,
           recent.humidity, recent.pressure, recent.air_quality
    FROM (
        SELECT
            t.reading_date,
            t.reading_time,
            t.value AS temperature,
            COALESCE(h.value, $2) AS humidity,
            COALESCE(p.value, $3) AS pressure,
            COALESCE(a.value, $4) AS air_quality
        FROM temperature_readings t
        LEFT JOIN LATERAL (
            SELECT hr.value FROM humidity_readings hr
            WHERE hr.station_id = t.station_id
              AND hr.reading_date = t.reading_date
              AND hr.reading_time = t.reading_time
            LIMIT 1
        ) h ON TRUE
        LEFT JOIN LATERAL (
            SELECT pr.value FROM pressure_readings pr
            WHERE pr.station_id = t.station_id
              AND pr.reading_date = t.reading_date
              AND ABS(EXTRACT(EPOCH FROM (t.reading_time - pr.reading_time)))::float8 < $5
            ORDER BY ABS(EXTRACT(EPOCH FROM (t.reading_time - pr.reading_time))) ASC
            LIMIT 1
        ) p ON TRUE
        LEFT JOIN LATERAL (
            SELECT ar.value FROM air_quality_readings ar
            WHERE ar.station_id = t.station_id
              AND ar.reading_date = t.reading_date
              AND ABS(EXTRACT(EPOCH FROM (t.reading_time - ar.reading_time)))::float8 < $5
            ORDER BY ABS(EXTRACT(EPOCH FROM (t.reading_time - ar.reading_time))) ASC
            LIMIT 1
        ) a ON TRUE
        WHERE t.station_id = $1
          AND (t.reading_date + t.reading_time) >= $6
        ORDER BY t.reading_date DESC, t.reading_time DESC
        LIMIT $7
    ) recent
    ORDER BY recent.reading_date ASC, recent.reading_time ASC
"#;

pub struct Repository {
    pool: PgPool,
}

impl Repository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    pub async fn find_station(&self, name: &str) -> Result<Station> {
        sqlx::query_as::<_, Station>(
            "SELECT id, name, latitude, longitude FROM stations WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::StationNotFound(name.to_string()))
    }

    pub async fn latest_values(&self, station_id: i32) -> Result<LatestValues> {
        let latest = sqlx::query_as::<_, LatestValues>(LATEST_VALUES_QUERY)
            .bind(station_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(latest)
    }

    /// Temperature-anchored readings with gaps filled from `defaults`
    pub async fn joined_readings(
        &self,
        station_id: i32,
        since: NaiveDateTime,
        window: &HistoryWindow,
        defaults: &FallbackDefaults,
    ) -> Result<Vec<Reading>> {
        let rows = sqlx::query_as::<_, JoinedReading>(JOINED_READINGS_QUERY)
            .bind(station_id)
            .bind(defaults.humidity)
            .bind(defaults.pressure)
            .bind(defaults.air_quality)
            .bind(window.join_tolerance_seconds as f64)
            .bind(since)
            .bind(window.max_rows as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Reading::from).collect())
    }

    /// Build the forecaster input as of `now` (local wall-clock time, the
    /// same clock the readings are recorded in)
    pub async fn load_history_at(
        &self,
        station: &str,
        now: NaiveDateTime,
        window: &HistoryWindow,
    ) -> Result<ForecastInput> {
        let found = self.find_station(station).await?;
        let defaults = self.latest_values(found.id).await?.into_defaults(now);

        let since = now - window.lookback;
        let mut readings = self
            .joined_readings(found.id, since, window, &defaults)
            .await?;

        if readings.is_empty() {
            debug!(
                "No readings for {} since {}, using last known values",
                station, since
            );
            readings.push(defaults.synthetic_reading());
        } else {
            debug!("Loaded {} readings for {} since {}", readings.len(), station, since);
        }

        Ok(ForecastInput {
            estacion: station.to_string(),
            readings,
        })
    }
}

#[async_trait]
impl StationStore for Repository {
    async fn load_history(&self, station: &str, window: &HistoryWindow) -> Result<ForecastInput> {
        self.load_history_at(station, chrono::Local::now().naive_local(), window)
            .await
    }

    async fn current_reading(&self, station: &str) -> Result<CurrentReading> {
        let found = self.find_station(station).await?;
        let latest = self
            .latest_values(found.id)
            .await?
            .into_defaults(chrono::Local::now().naive_local());

        Ok(CurrentReading {
            estacion: found.name,
            temperatura: latest.temperature,
            humedad: latest.humidity,
            presion: latest.pressure,
            calidad_aire: latest.air_quality,
        })
    }

    async fn list_locations(&self) -> Result<Vec<StationLocation>> {
        let stations = sqlx::query_as::<_, Station>(
            "SELECT id, name, latitude, longitude FROM stations ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(stations
            .into_iter()
            .map(|s| StationLocation {
                id_estacion: s.id,
                estacion: s.name,
                latitud: s.latitude,
                longitud: s.longitude,
            })
            .collect())
    }
}
