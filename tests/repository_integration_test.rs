use chrono::{Duration, NaiveDateTime};
use iot_forecast::db::Repository;
use iot_forecast::error::AppError;
use iot_forecast::models::{Reading, DEFAULT_AIR_QUALITY, DEFAULT_PRESSURE};
use iot_forecast::store::{HistoryWindow, StationStore};
use sqlx::PgPool;

const NOW: &str = "2025-11-20 12:00:00";

fn at(text: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").expect("bad timestamp")
}

async fn add_station(pool: &PgPool, name: &str) -> i32 {
    sqlx::query_scalar::<_, i32>(
        "INSERT INTO stations (name, latitude, longitude) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(name)
    .bind(19.43)
    .bind(-99.13)
    .fetch_one(pool)
    .await
    .expect("Failed to insert station")
}

async fn add_reading(pool: &PgPool, table: &str, station_id: i32, when: &str, value: f64) {
    let when = at(when);
    sqlx::query(&format!(
        "INSERT INTO {} (station_id, reading_date, reading_time, value) VALUES ($1, $2, $3, $4)",
        table
    ))
    .bind(station_id)
    .bind(when.date())
    .bind(when.time())
    .bind(value)
    .execute(pool)
    .await
    .expect("Failed to insert reading");
}

fn timestamps(readings: &[Reading]) -> Vec<NaiveDateTime> {
    readings.iter().map(|r| r.fecha.and_time(r.hora)).collect()
}

/// Unknown names are a terminal error, nothing partial comes back
#[sqlx::test]
async fn test_unknown_station_is_not_found(pool: PgPool) {
    let repo = Repository::new(pool.clone());
    add_station(&pool, "Norte").await;

    let result = repo
        .load_history_at("doesnotexist", at(NOW), &HistoryWindow::default())
        .await;

    match result {
        Err(AppError::StationNotFound(name)) => assert_eq!(name, "doesnotexist"),
        other => panic!("Expected StationNotFound, got {:?}", other),
    }
}

/// Station names are matched exactly
#[sqlx::test]
async fn test_station_lookup_is_case_sensitive(pool: PgPool) {
    let repo = Repository::new(pool.clone());
    add_station(&pool, "Norte").await;

    let result = repo
        .load_history_at("norte", at(NOW), &HistoryWindow::default())
        .await;
    assert!(matches!(result, Err(AppError::StationNotFound(_))));
}

/// A station with only temperature history gets the channel constants
#[sqlx::test]
async fn test_temperature_only_station_uses_constant_defaults(pool: PgPool) {
    let repo = Repository::new(pool.clone());
    let id = add_station(&pool, "Norte").await;
    add_reading(&pool, "temperature_readings", id, "2025-11-20 09:00:00", 19.0).await;
    add_reading(&pool, "temperature_readings", id, "2025-11-20 10:00:00", 20.5).await;
    add_reading(&pool, "temperature_readings", id, "2025-11-20 11:00:00", 21.0).await;

    let input = repo
        .load_history_at("Norte", at(NOW), &HistoryWindow::default())
        .await
        .expect("load_history failed");

    assert_eq!(input.estacion, "Norte");
    assert_eq!(input.readings.len(), 3);
    for reading in &input.readings {
        assert_eq!(reading.humedad, 50.0);
        assert_eq!(reading.presion, 775.0);
        assert_eq!(reading.calidad_aire, 60.0);
    }
    let temps: Vec<f64> = input.readings.iter().map(|r| r.temperatura).collect();
    assert_eq!(temps, vec![19.0, 20.5, 21.0]);
}

/// An empty window yields exactly one reading built from the newest
/// value ever recorded on each channel
#[sqlx::test]
async fn test_empty_window_synthesizes_last_known_reading(pool: PgPool) {
    let repo = Repository::new(pool.clone());
    let id = add_station(&pool, "Norte").await;
    add_reading(&pool, "temperature_readings", id, "2025-11-10 08:00:00", 17.0).await;
    add_reading(&pool, "temperature_readings", id, "2025-11-12 08:30:00", 18.5).await;
    add_reading(&pool, "humidity_readings", id, "2025-11-11 09:00:00", 44.0).await;
    add_reading(&pool, "humidity_readings", id, "2025-11-10 09:00:00", 33.0).await;
    add_reading(&pool, "pressure_readings", id, "2025-11-12 07:00:00", 781.0).await;
    add_reading(&pool, "air_quality_readings", id, "2025-11-09 10:00:00", 70.0).await;

    let input = repo
        .load_history_at("Norte", at(NOW), &HistoryWindow::default())
        .await
        .expect("load_history failed");

    assert_eq!(
        input.readings,
        vec![Reading {
            fecha: at("2025-11-12 08:30:00").date(),
            hora: at("2025-11-12 08:30:00").time(),
            temperatura: 18.5,
            humedad: 44.0,
            presion: 781.0,
            calidad_aire: 70.0,
        }]
    );
}

/// No history anywhere: constants, stamped with the request time
#[sqlx::test]
async fn test_station_without_any_history(pool: PgPool) {
    let repo = Repository::new(pool.clone());
    add_station(&pool, "Norte").await;

    let input = repo
        .load_history_at("Norte", at(NOW), &HistoryWindow::default())
        .await
        .expect("load_history failed");

    assert_eq!(input.readings.len(), 1);
    let reading = &input.readings[0];
    assert_eq!(reading.fecha.and_time(reading.hora), at(NOW));
    assert_eq!(reading.temperatura, 22.0);
    assert_eq!(reading.humedad, 50.0);
    assert_eq!(reading.presion, 775.0);
    assert_eq!(reading.calidad_aire, 60.0);
}

/// Humidity joins on the exact timestamp; pressure joins strictly inside
/// 300 seconds, so a row exactly 300 seconds away is left out
#[sqlx::test]
async fn test_join_rules_and_tolerance_boundary(pool: PgPool) {
    let repo = Repository::new(pool.clone());
    let id = add_station(&pool, "Norte").await;

    add_reading(&pool, "temperature_readings", id, "2025-11-20 10:00:00", 20.0).await;
    add_reading(&pool, "temperature_readings", id, "2025-11-20 11:00:00", 21.0).await;

    add_reading(&pool, "humidity_readings", id, "2025-11-20 10:00:01", 30.0).await;
    add_reading(&pool, "humidity_readings", id, "2025-11-20 11:00:00", 42.0).await;
    add_reading(&pool, "humidity_readings", id, "2025-11-20 11:45:00", 55.0).await;

    add_reading(&pool, "pressure_readings", id, "2025-11-20 10:05:00", 790.0).await;
    add_reading(&pool, "pressure_readings", id, "2025-11-20 11:04:59", 785.0).await;
    add_reading(&pool, "pressure_readings", id, "2025-11-20 11:30:00", 760.0).await;

    let input = repo
        .load_history_at("Norte", at(NOW), &HistoryWindow::default())
        .await
        .expect("load_history failed");

    assert_eq!(input.readings.len(), 2);

    let first = &input.readings[0];
    assert_eq!(first.temperatura, 20.0);
    assert_eq!(first.humedad, 55.0, "off-by-one-second humidity must not join");
    assert_eq!(first.presion, 760.0, "pressure exactly 300s away must not join");

    let second = &input.readings[1];
    assert_eq!(second.temperatura, 21.0);
    assert_eq!(second.humedad, 42.0);
    assert_eq!(second.presion, 785.0, "pressure 299s away joins");
}

/// Several candidates inside the tolerance: the nearest one wins and the
/// temperature row is not duplicated
#[sqlx::test]
async fn test_nearest_air_quality_row_is_joined(pool: PgPool) {
    let repo = Repository::new(pool.clone());
    let id = add_station(&pool, "Norte").await;

    add_reading(&pool, "temperature_readings", id, "2025-11-20 10:00:00", 20.0).await;
    add_reading(&pool, "air_quality_readings", id, "2025-11-20 09:57:00", 90.0).await;
    add_reading(&pool, "air_quality_readings", id, "2025-11-20 10:01:00", 80.0).await;
    add_reading(&pool, "air_quality_readings", id, "2025-11-20 10:04:00", 95.0).await;

    let input = repo
        .load_history_at("Norte", at(NOW), &HistoryWindow::default())
        .await
        .expect("load_history failed");

    assert_eq!(input.readings.len(), 1);
    assert_eq!(input.readings[0].calidad_aire, 80.0);
}

/// Only the same calendar date is joined, even across midnight
#[sqlx::test]
async fn test_join_does_not_cross_midnight(pool: PgPool) {
    let repo = Repository::new(pool.clone());
    let id = add_station(&pool, "Norte").await;

    add_reading(&pool, "temperature_readings", id, "2025-11-19 23:59:00", 15.0).await;
    add_reading(&pool, "pressure_readings", id, "2025-11-20 00:01:00", 790.0).await;
    add_reading(&pool, "pressure_readings", id, "2025-11-20 06:00:00", 770.0).await;

    let input = repo
        .load_history_at("Norte", at(NOW), &HistoryWindow::default())
        .await
        .expect("load_history failed");

    assert_eq!(input.readings.len(), 1);
    assert_eq!(input.readings[0].presion, 770.0);
}

/// The newest `max_rows` readings are kept and returned oldest first
#[sqlx::test]
async fn test_max_rows_keeps_most_recent(pool: PgPool) {
    let repo = Repository::new(pool.clone());
    let id = add_station(&pool, "Norte").await;
    for hour in 6..11 {
        add_reading(
            &pool,
            "temperature_readings",
            id,
            &format!("2025-11-20 {:02}:00:00", hour),
            hour as f64,
        )
        .await;
    }

    let window = HistoryWindow {
        max_rows: 3,
        ..HistoryWindow::default()
    };
    let input = repo
        .load_history_at("Norte", at(NOW), &window)
        .await
        .expect("load_history failed");

    assert_eq!(
        timestamps(&input.readings),
        vec![
            at("2025-11-20 08:00:00"),
            at("2025-11-20 09:00:00"),
            at("2025-11-20 10:00:00"),
        ]
    );
}

/// Rows older than the lookback window are ignored
#[sqlx::test]
async fn test_lookback_window_bounds_history(pool: PgPool) {
    let repo = Repository::new(pool.clone());
    let id = add_station(&pool, "Norte").await;
    add_reading(&pool, "temperature_readings", id, "2025-11-18 11:00:00", 10.0).await; // 49h
    add_reading(&pool, "temperature_readings", id, "2025-11-18 12:00:00", 11.0).await; // 48h
    add_reading(&pool, "temperature_readings", id, "2025-11-18 13:00:00", 12.0).await; // 47h

    let input = repo
        .load_history_at("Norte", at(NOW), &HistoryWindow::default())
        .await
        .expect("load_history failed");
    let temps: Vec<f64> = input.readings.iter().map(|r| r.temperatura).collect();
    assert_eq!(temps, vec![11.0, 12.0]);

    let narrow = HistoryWindow {
        lookback: Duration::hours(1),
        ..HistoryWindow::default()
    };
    let input = repo
        .load_history_at("Norte", at(NOW), &narrow)
        .await
        .expect("load_history failed");
    // Nothing in the last hour, so the newest reading is synthesized
    assert_eq!(input.readings.len(), 1);
    assert_eq!(input.readings[0].temperatura, 12.0);
}

#[sqlx::test]
async fn test_current_reading_fills_missing_channels_with_defaults(pool: PgPool) {
    let repo = Repository::new(pool.clone());
    let id = add_station(&pool, "Norte").await;
    add_reading(&pool, "temperature_readings", id, "2025-11-20 10:00:00", 20.0).await;
    add_reading(&pool, "temperature_readings", id, "2025-11-20 11:00:00", 21.0).await;
    add_reading(&pool, "humidity_readings", id, "2025-11-20 11:00:00", 45.0).await;

    let current = repo.current_reading("Norte").await.expect("current_reading failed");

    assert_eq!(current.estacion, "Norte");
    assert_eq!(current.temperatura, 21.0);
    assert_eq!(current.humedad, 45.0);
    assert_eq!(current.presion, DEFAULT_PRESSURE);
    assert_eq!(current.calidad_aire, DEFAULT_AIR_QUALITY);

    let value = serde_json::to_value(&current).unwrap();
    assert!(value["presion"].is_number());
    assert!(value["calidadAire"].is_number());

    let missing = repo.current_reading("Sur").await;
    assert!(matches!(missing, Err(AppError::StationNotFound(_))));
}

#[sqlx::test]
async fn test_list_locations_ordered_by_id(pool: PgPool) {
    let repo = Repository::new(pool.clone());
    let norte = add_station(&pool, "Norte").await;
    let sur = add_station(&pool, "Sur").await;

    let locations = repo.list_locations().await.expect("list_locations failed");

    assert_eq!(locations.len(), 2);
    assert_eq!(locations[0].id_estacion, norte);
    assert_eq!(locations[0].estacion, "Norte");
    assert_eq!(locations[1].id_estacion, sur);
    assert_eq!(locations[1].latitud, 19.43);
    assert_eq!(locations[1].longitud, -99.13);
}
