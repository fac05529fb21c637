//! Per-event deltas, instantaneous rate and inactivity flags.

use super::event::{DerivedEvent, Event};

/// Thresholds that decide whether an event marks an inactive stretch.
#[derive(Debug, Clone, Copy)]
pub struct InactivityThresholds {
    /// Energy change (Wh) strictly below which the meter counts as idle.
    pub energy_wh: f64,
    /// Gap (seconds) strictly above which the meter counts as idle.
    pub time_seconds: f64,
}

impl Default for InactivityThresholds {
    fn default() -> Self {
        Self {
            energy_wh: 0.1,
            time_seconds: 30.0,
        }
    }
}

impl InactivityThresholds {
    pub fn is_inactive(&self, delta_energy: f64, delta_time: f64) -> bool {
        delta_energy.abs() < self.energy_wh && delta_time > self.time_seconds
    }
}

/// Energy over time, normalised to 0 when the gap is empty or the quotient
/// is not finite.
pub fn instant_rate(delta_energy: f64, delta_time: f64) -> f64 {
    if delta_time <= 0.0 {
        return 0.0;
    }
    let rate = delta_energy / delta_time;
    if rate.is_finite() {
        rate
    } else {
        0.0
    }
}

/// Gap in seconds at microsecond resolution, falling back to milliseconds
/// when the microsecond count overflows.
fn gap_seconds(gap: chrono::Duration) -> f64 {
    match gap.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        None => gap.num_milliseconds() as f64 / 1000.0,
    }
}

/// Derive deltas for every event. Input order is trusted, not re-checked.
pub fn derive(events: &[Event], thresholds: &InactivityThresholds) -> Vec<DerivedEvent> {
    let mut derived = Vec::with_capacity(events.len());
    let mut previous: Option<&Event> = None;

    for event in events {
        let (delta_time, delta_energy) = match previous {
            Some(prev) => {
                let gap = event.timestamp - prev.timestamp;
                (gap_seconds(gap), event.event_energy_wh - prev.event_energy_wh)
            }
            None => (0.0, 0.0),
        };

        derived.push(DerivedEvent {
            event: event.clone(),
            delta_time,
            delta_energy,
            instant_rate: instant_rate(delta_energy, delta_time),
            is_inactive: thresholds.is_inactive(delta_energy, delta_time),
        });
        previous = Some(event);
    }

    derived
}
