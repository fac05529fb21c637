//! End-to-end runs against an on-disk SQLite store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use energydash::api::state::AppState;
use energydash::config::StorageConfig;
use energydash::pipeline::aggregate::IntensityLevel;
use energydash::pipeline::{self, Event, Parameters, PipelineError};
use energydash::storage::{self, SqliteEventSource};

fn open(dir: &tempfile::TempDir) -> Result<storage::Pool> {
    storage::open_pool(&StorageConfig {
        db_path: dir.path().join("meter.db"),
        ..StorageConfig::default()
    })
}

fn event(offset_secs: i64, energy: f64, total: f64) -> Event {
    Event {
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, 5, 0).unwrap()
            + ChronoDuration::seconds(offset_secs),
        event_energy_wh: energy,
        total_energy_wh: total,
        elapsed_seconds: offset_secs as f64,
        is_anomaly: false,
    }
}

#[tokio::test]
async fn test_zero_gap_rows_do_not_break_the_run() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pool = open(&dir)?;
    storage::save_events(
        &pool,
        &[event(0, 0.002, 0.002), event(0, 0.003, 0.005), event(60, 1.2, 1.205)],
    )?;

    let source = SqliteEventSource::new(pool, Duration::from_secs(2));
    let report = pipeline::run(&source, &Parameters::default()).await?;

    let rows = &report.recent_events;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].delta_time, 0.0);
    assert_eq!(rows[1].delta_time, 0.0);
    assert_eq!(rows[1].instant_rate, 0.0);
    assert!((rows[2].instant_rate - (1.2 - 0.003) / 60.0).abs() < 1e-12);

    // Minute 5 sums to 0.005 Wh, minute 6 holds 1.2 Wh.
    let grid_row = &report.intensity_grid.rows[0];
    let five = serde_json::to_value(&grid_row.cells[5])?;
    let six = serde_json::to_value(&grid_row.cells[6])?;
    let seven = serde_json::to_value(&grid_row.cells[7])?;
    assert_eq!(five["level"], serde_json::to_value(IntensityLevel::Low)?);
    assert_eq!(six["level"], serde_json::to_value(IntensityLevel::High)?);
    assert_eq!(seven["kind"], "no_data");
    Ok(())
}

#[tokio::test]
async fn test_single_row_is_insufficient() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pool = open(&dir)?;
    storage::save_event(&pool, &event(0, 1.0, 1.0))?;

    let source = SqliteEventSource::new(pool, Duration::from_secs(2));
    let err = pipeline::run(&source, &Parameters::default()).await.unwrap_err();
    assert!(matches!(err, PipelineError::InsufficientData { needed: 2, have: 1 }));
    Ok(())
}

#[tokio::test]
async fn test_manual_refresh_sees_new_rows() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pool = open(&dir)?;
    storage::save_events(&pool, &[event(0, 0.1, 0.1), event(10, 0.2, 0.3)])?;

    let source = SqliteEventSource::new(pool.clone(), Duration::from_secs(2));
    let params = Parameters {
        refresh_interval_seconds: 60,
        ..Parameters::default()
    };
    let state = AppState::new(Arc::new(source), params.clone());

    let first = state.report(&params).await?;
    assert_eq!(first.summary.event_count, 2);

    storage::save_event(&pool, &event(20, 0.3, 0.6))?;

    // Still inside the refresh interval: served from cache.
    let cached = state.report(&params).await?;
    assert_eq!(cached.summary.event_count, 2);

    let refreshed = state.refresh(&params).await?;
    assert_eq!(refreshed.summary.event_count, 3);
    assert!((refreshed.summary.total_energy_wh - 0.6).abs() < 1e-12);
    Ok(())
}
