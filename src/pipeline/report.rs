//! Presentation outputs: everything the renderer needs for one refresh.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::aggregate::{IntensityGrid, MinuteBuckets};
use super::event::DerivedEvent;
use super::forecast::{FitMetrics, ForecastPoint, ForecastResult};
use super::Parameters;

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    /// Cumulative meter reading of the latest event.
    pub total_energy_wh: f64,
    pub mean_event_energy_wh: f64,
    pub anomaly_count: usize,
    pub inactive_count: usize,
    pub event_count: usize,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConsumptionPoint {
    pub elapsed_seconds: f64,
    pub energy_wh: f64,
}

/// Observed consumption against elapsed time, plus the forecast tail.
#[derive(Debug, Clone, Serialize)]
pub struct ConsumptionChart {
    pub actual: Vec<ConsumptionPoint>,
    pub forecast: Vec<ForecastPoint>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RatePoint {
    pub timestamp: DateTime<Utc>,
    pub delta_energy_wh: f64,
    pub instant_rate: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TimePoint {
    pub timestamp: DateTime<Utc>,
    pub energy_wh: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InactivityChart {
    pub series: Vec<TimePoint>,
    pub inactive: Vec<TimePoint>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DetailPoint {
    pub timestamp: DateTime<Utc>,
    pub energy_wh: f64,
    /// Colour-scale input; currently the event energy itself.
    pub intensity: f64,
}

/// Zoomed scatter of the last `zoom_minutes`.
#[derive(Debug, Clone, Serialize)]
pub struct DetailView {
    pub since: DateTime<Utc>,
    pub points: Vec<DetailPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub parameters: Parameters,
    pub summary: Summary,
    pub consumption: ConsumptionChart,
    pub instant: Vec<RatePoint>,
    pub inactivity: InactivityChart,
    pub detail: DetailView,
    pub intensity_grid: IntensityGrid,
    pub anomalies: Vec<DerivedEvent>,
    pub recent_events: Vec<DerivedEvent>,
    pub model: FitMetrics,
}

fn tail<T: Clone>(items: &[T], n: usize) -> Vec<T> {
    items[items.len().saturating_sub(n)..].to_vec()
}

fn time_point(d: &DerivedEvent) -> TimePoint {
    TimePoint {
        timestamp: d.event.timestamp,
        energy_wh: d.event.event_energy_wh,
    }
}

impl DashboardReport {
    pub fn build(
        derived: &[DerivedEvent],
        forecast: ForecastResult,
        buckets: &MinuteBuckets,
        params: &Parameters,
    ) -> Self {
        let latest = derived
            .last()
            .map(|d| d.event.timestamp)
            .unwrap_or_else(Utc::now);

        let event_count = derived.len();
        let energy_sum: f64 = derived.iter().map(|d| d.event.event_energy_wh).sum();
        let summary = Summary {
            total_energy_wh: derived.last().map_or(0.0, |d| d.event.total_energy_wh),
            mean_event_energy_wh: if event_count > 0 {
                energy_sum / event_count as f64
            } else {
                0.0
            },
            anomaly_count: derived.iter().filter(|d| d.event.is_anomaly).count(),
            inactive_count: derived.iter().filter(|d| d.is_inactive).count(),
            event_count,
        };

        let consumption = ConsumptionChart {
            actual: derived
                .iter()
                .map(|d| ConsumptionPoint {
                    elapsed_seconds: d.event.elapsed_seconds,
                    energy_wh: d.event.event_energy_wh,
                })
                .collect(),
            forecast: forecast.points,
        };

        let instant = tail(derived, params.recent_event_window)
            .iter()
            .map(|d| RatePoint {
                timestamp: d.event.timestamp,
                delta_energy_wh: d.delta_energy,
                instant_rate: d.instant_rate,
            })
            .collect();

        let inactivity = InactivityChart {
            series: derived.iter().map(time_point).collect(),
            inactive: derived
                .iter()
                .filter(|d| d.is_inactive)
                .map(time_point)
                .collect(),
        };

        let zoom_since = latest - Duration::minutes(i64::from(params.zoom_minutes));
        let detail = DetailView {
            since: zoom_since,
            points: derived
                .iter()
                .filter(|d| d.event.timestamp >= zoom_since)
                .map(|d| DetailPoint {
                    timestamp: d.event.timestamp,
                    energy_wh: d.event.event_energy_wh,
                    intensity: d.event.event_energy_wh,
                })
                .collect(),
        };

        let anomalies: Vec<DerivedEvent> =
            derived.iter().filter(|d| d.event.is_anomaly).cloned().collect();

        let visible_since = latest - Duration::minutes(i64::from(params.visible_minutes));
        let visible: Vec<DerivedEvent> = derived
            .iter()
            .filter(|d| d.event.timestamp >= visible_since)
            .cloned()
            .collect();

        Self {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            parameters: params.clone(),
            summary,
            consumption,
            instant,
            inactivity,
            detail,
            intensity_grid: IntensityGrid::from_buckets(buckets),
            anomalies: tail(&anomalies, params.table_row_count),
            recent_events: tail(&visible, params.table_row_count),
            model: forecast.metrics,
        }
    }
}
