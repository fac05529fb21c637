//! SQLite storage layer -- schema, event queries, migrations.

pub mod schema;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use tokio::sync::OnceCell;

use crate::config::StorageConfig;
use crate::pipeline::{Event, EventSource, PipelineError};

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(config: &StorageConfig) -> Result<Pool> {
    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
    }

    let busy_timeout_ms = config.query_timeout_ms;
    let manager = SqliteConnectionManager::file(&config.db_path).with_init(move |c| {
        c.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;
             PRAGMA busy_timeout = {busy_timeout_ms};"
        ))
    });

    let pool = R2D2Pool::builder()
        .max_size(config.pool_size.max(1))
        .connection_timeout(config.query_timeout())
        .build(manager)
        .with_context(|| format!("failed to open database at {}", config.db_path.display()))?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// Accepts RFC 3339 as well as SQLite's `datetime('now')` layout (UTC).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .with_context(|| format!("unparsable timestamp '{}'", raw))?;
    Ok(naive.and_utc())
}

/// Read the whole series, ordered by timestamp ascending.
pub fn load_events(pool: &Pool) -> Result<Vec<Event>> {
    let conn = pool.get().context("failed to get DB connection")?;
    let mut stmt = conn
        .prepare(
            "SELECT timestamp, event_energy_wh, total_energy_wh, elapsed_seconds, is_anomaly
             FROM energy_events
             ORDER BY timestamp ASC, id ASC",
        )
        .context("failed to prepare event query")?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, f64>(1)?,
            row.get::<_, f64>(2)?,
            row.get::<_, f64>(3)?,
            row.get::<_, i64>(4)? != 0,
        ))
    })?;

    let mut events = Vec::new();
    for r in rows {
        let (ts, event_energy_wh, total_energy_wh, elapsed_seconds, is_anomaly) = r?;
        events.push(Event {
            timestamp: parse_timestamp(&ts)?,
            event_energy_wh,
            total_energy_wh,
            elapsed_seconds,
            is_anomaly,
        });
    }

    // Text ordering breaks down for mixed offsets; restore instant order.
    events.sort_by_key(|e| e.timestamp);
    Ok(events)
}

/// Append one event.
pub fn save_event(pool: &Pool, event: &Event) -> Result<()> {
    save_events(pool, std::slice::from_ref(event))
}

/// Append a batch of events in one transaction.
pub fn save_events(pool: &Pool, events: &[Event]) -> Result<()> {
    let mut conn = pool.get()?;
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO energy_events
                (timestamp, event_energy_wh, total_energy_wh, elapsed_seconds, is_anomaly)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for e in events {
            stmt.execute(params![
                e.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                e.event_energy_wh,
                e.total_energy_wh,
                e.elapsed_seconds,
                e.is_anomaly as i64,
            ])?;
        }
    }
    tx.commit().context("failed to save events")?;
    Ok(())
}

/// Latest stored event, if any. Used to continue a simulated series.
pub fn latest_event(pool: &Pool) -> Result<Option<Event>> {
    let conn = pool.get().context("failed to get DB connection")?;
    let row = conn
        .query_row(
            "SELECT timestamp, event_energy_wh, total_energy_wh, elapsed_seconds, is_anomaly
             FROM energy_events
             ORDER BY timestamp DESC, id DESC
             LIMIT 1",
            [],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, i64>(4)? != 0,
                ))
            },
        )
        .optional()?;

    row.map(|(ts, event_energy_wh, total_energy_wh, elapsed_seconds, is_anomaly)| {
        Ok::<_, anyhow::Error>(Event {
            timestamp: parse_timestamp(&ts)?,
            event_energy_wh,
            total_energy_wh,
            elapsed_seconds,
            is_anomaly,
        })
    })
    .transpose()
}

/// The production [`EventSource`]: one bounded query against SQLite.
///
/// The pool is opened on first use and re-attempted on every load until it
/// succeeds. Open failures are `DataUnavailable` like any query failure.
#[derive(Clone)]
pub struct SqliteEventSource {
    config: StorageConfig,
    pool: Arc<OnceCell<Pool>>,
}

impl SqliteEventSource {
    /// Wrap an already opened pool.
    pub fn new(pool: Pool, query_timeout: Duration) -> Self {
        Self {
            config: StorageConfig {
                query_timeout_ms: query_timeout.as_millis() as u64,
                ..StorageConfig::default()
            },
            pool: Arc::new(OnceCell::new_with(Some(pool))),
        }
    }

    /// Defer opening the pool until the first load.
    pub fn deferred(config: StorageConfig) -> Self {
        Self {
            config,
            pool: Arc::new(OnceCell::new()),
        }
    }

    pub fn query_timeout(&self) -> Duration {
        self.config.query_timeout()
    }

    /// Open the pool if it is not open yet.
    pub async fn connect(&self) -> Result<Pool, PipelineError> {
        let pool = self
            .pool
            .get_or_try_init(|| async {
                let config = self.config.clone();
                tokio::task::spawn_blocking(move || open_pool(&config))
                    .await
                    .map_err(PipelineError::unavailable)?
                    .map_err(|e| PipelineError::unavailable(format!("{e:#}")))
            })
            .await?;
        Ok(pool.clone())
    }

    async fn connect_and_load(&self) -> Result<Vec<Event>, PipelineError> {
        let pool = self.connect().await?;
        tokio::task::spawn_blocking(move || load_events(&pool))
            .await
            .map_err(PipelineError::unavailable)?
            .map_err(|e| PipelineError::unavailable(format!("{e:#}")))
    }
}

#[async_trait::async_trait]
impl EventSource for SqliteEventSource {
    async fn load(&self) -> Result<Vec<Event>, PipelineError> {
        let timeout = self.query_timeout();
        match tokio::time::timeout(timeout, self.connect_and_load()).await {
            Ok(Ok(events)) => {
                tracing::debug!(events = events.len(), "loaded energy events");
                Ok(events)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PipelineError::unavailable(format!(
                "event query exceeded {} ms",
                timeout.as_millis()
            ))),
        }
    }
}
