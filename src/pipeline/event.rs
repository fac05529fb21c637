use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One timestamped energy reading as stored by the meter producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub event_energy_wh: f64,
    pub total_energy_wh: f64,
    pub elapsed_seconds: f64,
    pub is_anomaly: bool,
}

/// An [`Event`] enriched with deltas against its predecessor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedEvent {
    #[serde(flatten)]
    pub event: Event,
    /// Seconds since the previous event (0 for the first).
    pub delta_time: f64,
    /// Energy change against the previous event (0 for the first).
    pub delta_energy: f64,
    /// Wh/s. Always finite.
    pub instant_rate: f64,
    pub is_inactive: bool,
}
