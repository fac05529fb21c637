//! Analysis pipeline: load -> derive -> {forecast, aggregate} -> report.
//!
//! Every run is a pure function of the loaded events and the parameters.
//! Nothing derived is kept between runs.

pub mod aggregate;
pub mod event;
pub mod features;
pub mod forecast;
pub mod report;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::event::{DerivedEvent, Event};
pub use self::report::DashboardReport;

/// Minimum number of events for a run: one delta needs two points.
pub const MIN_EVENTS: usize = 2;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The store could not be reached or returned unusable rows. `detail`
    /// carries the driver message for logs only.
    #[error("energy data is unavailable")]
    DataUnavailable { detail: String },

    #[error("not enough data yet for analysis: need {needed} events, have {have}")]
    InsufficientData { needed: usize, have: usize },
}

impl PipelineError {
    pub fn unavailable(detail: impl std::fmt::Display) -> Self {
        Self::DataUnavailable {
            detail: detail.to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParameterError {
    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },

    #[error("{name} must be one of {allowed:?}, got {value}")]
    NotAllowed {
        name: &'static str,
        allowed: &'static [u32],
        value: u32,
    },
}

pub const PREDICTION_STEPS: &[u32] = &[1, 5, 10];

/// Runtime-adjustable dashboard parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    pub prediction_horizon_seconds: u32,
    pub prediction_step_seconds: u32,
    pub refresh_interval_seconds: u32,
    pub energy_threshold: f64,
    pub time_threshold: f64,
    pub recent_event_window: usize,
    pub zoom_minutes: u32,
    pub visible_minutes: u32,
    pub table_row_count: usize,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            prediction_horizon_seconds: 60,
            prediction_step_seconds: 5,
            refresh_interval_seconds: 5,
            energy_threshold: 0.1,
            time_threshold: 30.0,
            recent_event_window: 30,
            zoom_minutes: 5,
            visible_minutes: 10,
            table_row_count: 50,
        }
    }
}

/// Allowed range of a numeric parameter, published for UI sliders.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ParameterRange {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
}

const fn limits(name: &'static str, min: f64, max: f64) -> ParameterRange {
    ParameterRange { name, min, max }
}

pub const PARAMETER_RANGES: &[ParameterRange] = &[
    limits("prediction_horizon_seconds", 10.0, 120.0),
    limits("refresh_interval_seconds", 2.0, 60.0),
    limits("energy_threshold", 0.01, 1.0),
    limits("time_threshold", 5.0, 120.0),
    limits("recent_event_window", 5.0, 100.0),
    limits("zoom_minutes", 1.0, 800.0),
    limits("visible_minutes", 1.0, 60.0),
    limits("table_row_count", 10.0, 200.0),
];

fn check_range(name: &'static str, value: f64) -> Result<(), ParameterError> {
    let Some(range) = PARAMETER_RANGES.iter().find(|r| r.name == name) else {
        return Ok(());
    };
    if value.is_nan() || value < range.min || value > range.max {
        return Err(ParameterError::OutOfRange {
            name,
            min: range.min,
            max: range.max,
            value,
        });
    }
    Ok(())
}

impl Parameters {
    /// Reject values outside the documented ranges instead of clamping.
    pub fn validate(&self) -> Result<(), ParameterError> {
        check_range("prediction_horizon_seconds", f64::from(self.prediction_horizon_seconds))?;
        if !PREDICTION_STEPS.contains(&self.prediction_step_seconds) {
            return Err(ParameterError::NotAllowed {
                name: "prediction_step_seconds",
                allowed: PREDICTION_STEPS,
                value: self.prediction_step_seconds,
            });
        }
        check_range("refresh_interval_seconds", f64::from(self.refresh_interval_seconds))?;
        check_range("energy_threshold", self.energy_threshold)?;
        check_range("time_threshold", self.time_threshold)?;
        check_range("recent_event_window", self.recent_event_window as f64)?;
        check_range("zoom_minutes", f64::from(self.zoom_minutes))?;
        check_range("visible_minutes", f64::from(self.visible_minutes))?;
        check_range("table_row_count", self.table_row_count as f64)?;
        Ok(())
    }

    pub fn thresholds(&self) -> features::InactivityThresholds {
        features::InactivityThresholds {
            energy_wh: self.energy_threshold,
            time_seconds: self.time_threshold,
        }
    }
}

/// Partial parameters, e.g. from a query string, layered over defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParameterOverrides {
    pub prediction_horizon_seconds: Option<u32>,
    pub prediction_step_seconds: Option<u32>,
    pub refresh_interval_seconds: Option<u32>,
    pub energy_threshold: Option<f64>,
    pub time_threshold: Option<f64>,
    pub recent_event_window: Option<usize>,
    pub zoom_minutes: Option<u32>,
    pub visible_minutes: Option<u32>,
    pub table_row_count: Option<usize>,
}

impl ParameterOverrides {
    pub fn apply(&self, base: &Parameters) -> Parameters {
        Parameters {
            prediction_horizon_seconds: self
                .prediction_horizon_seconds
                .unwrap_or(base.prediction_horizon_seconds),
            prediction_step_seconds: self
                .prediction_step_seconds
                .unwrap_or(base.prediction_step_seconds),
            refresh_interval_seconds: self
                .refresh_interval_seconds
                .unwrap_or(base.refresh_interval_seconds),
            energy_threshold: self.energy_threshold.unwrap_or(base.energy_threshold),
            time_threshold: self.time_threshold.unwrap_or(base.time_threshold),
            recent_event_window: self.recent_event_window.unwrap_or(base.recent_event_window),
            zoom_minutes: self.zoom_minutes.unwrap_or(base.zoom_minutes),
            visible_minutes: self.visible_minutes.unwrap_or(base.visible_minutes),
            table_row_count: self.table_row_count.unwrap_or(base.table_row_count),
        }
    }
}

/// Anything that can produce the full event series ordered by timestamp.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// `Ok(vec![])` means the store answered with zero rows; failures are
    /// always `Err(DataUnavailable)`.
    async fn load(&self) -> Result<Vec<Event>, PipelineError>;
}

/// A fixed in-memory series, e.g. a replay or a test fixture.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    events: Vec<Event>,
}

impl MemorySource {
    pub fn new(mut events: Vec<Event>) -> Self {
        events.sort_by_key(|e| e.timestamp);
        Self { events }
    }
}

#[async_trait::async_trait]
impl EventSource for MemorySource {
    async fn load(&self) -> Result<Vec<Event>, PipelineError> {
        Ok(self.events.clone())
    }
}

pub fn ensure_sufficient(events: &[Event]) -> Result<(), PipelineError> {
    if events.len() < MIN_EVENTS {
        return Err(PipelineError::InsufficientData {
            needed: MIN_EVENTS,
            have: events.len(),
        });
    }
    Ok(())
}

/// Run derive, forecast and aggregate over an already loaded series.
pub fn analyze(events: &[Event], params: &Parameters) -> Result<DashboardReport, PipelineError> {
    ensure_sufficient(events)?;

    let derived = features::derive(events, &params.thresholds());
    let forecast = forecast::forecast(
        events,
        params.prediction_horizon_seconds,
        params.prediction_step_seconds,
    );
    let buckets = aggregate::aggregate_minutes(events);

    let report = DashboardReport::build(&derived, forecast, &buckets, params);
    tracing::debug!(
        report_id = %report.id,
        events = events.len(),
        inactive = report.inactivity.inactive.len(),
        r2 = report.model.r2,
        "pipeline run complete"
    );
    Ok(report)
}

/// Load from `source` and analyse.
pub async fn run(
    source: &dyn EventSource,
    params: &Parameters,
) -> Result<DashboardReport, PipelineError> {
    let events = source.load().await?;
    analyze(&events, params)
}
