//! Synthetic meter producer for demos and local testing.
//!
//! Generates a plausible event series: a noisy base load, occasional long
//! idle gaps with almost no consumption, and rare flagged spikes.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::pipeline::Event;

#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub events: usize,
    /// Mean spacing between events in seconds.
    pub interval_secs: f64,
    /// Probability that an event is a flagged spike.
    pub anomaly_rate: f64,
    /// Probability that an event follows a long quiet gap.
    pub idle_rate: f64,
}

impl Default for SimulationPlan {
    fn default() -> Self {
        Self {
            events: 500,
            interval_secs: 5.0,
            anomaly_rate: 0.02,
            idle_rate: 0.03,
        }
    }
}

/// Generate `plan.events` events continuing after `previous`, or ending
/// around `now` for a fresh series.
pub fn generate<R: Rng>(
    previous: Option<&Event>,
    now: DateTime<Utc>,
    plan: &SimulationPlan,
    rng: &mut R,
) -> Vec<Event> {
    let interval = plan.interval_secs.max(0.1);
    let (mut timestamp, mut elapsed, mut total) = match previous {
        Some(prev) => (prev.timestamp, prev.elapsed_seconds, prev.total_energy_wh),
        None => {
            let span = interval * plan.events as f64;
            (now - Duration::milliseconds((span * 1000.0) as i64), 0.0, 0.0)
        }
    };

    let mut out = Vec::with_capacity(plan.events);
    for i in 0..plan.events {
        let idle = rng.gen_bool(plan.idle_rate.clamp(0.0, 1.0));
        let anomaly = !idle && rng.gen_bool(plan.anomaly_rate.clamp(0.0, 1.0));

        let gap = if previous.is_none() && i == 0 {
            0.0
        } else if idle {
            interval * rng.gen_range(8.0..15.0)
        } else {
            interval * rng.gen_range(0.5..1.5)
        };

        let energy = if idle {
            rng.gen_range(0.001..0.02)
        } else if anomaly {
            rng.gen_range(2.0..5.0)
        } else {
            rng.gen_range(0.05..0.4)
        };

        timestamp += Duration::milliseconds((gap * 1000.0) as i64);
        elapsed += gap;
        total += energy;

        out.push(Event {
            timestamp,
            event_energy_wh: energy,
            total_energy_wh: total,
            elapsed_seconds: elapsed,
            is_anomaly: anomaly,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generated_series_is_ordered_and_cumulative() {
        let mut rng = StdRng::seed_from_u64(7);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let events = generate(None, now, &SimulationPlan::default(), &mut rng);

        assert_eq!(events.len(), 500);
        assert_eq!(events[0].elapsed_seconds, 0.0);
        for pair in events.windows(2) {
            assert!(pair[1].timestamp >= pair[0].timestamp);
            assert!(pair[1].elapsed_seconds >= pair[0].elapsed_seconds);
            assert!(pair[1].total_energy_wh >= pair[0].total_energy_wh);
        }
    }

    #[test]
    fn test_continues_after_previous_event() {
        let mut rng = StdRng::seed_from_u64(1);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let previous = Event {
            timestamp: now,
            event_energy_wh: 0.2,
            total_energy_wh: 40.0,
            elapsed_seconds: 1200.0,
            is_anomaly: false,
        };
        let plan = SimulationPlan {
            events: 10,
            ..SimulationPlan::default()
        };
        let events = generate(Some(&previous), now, &plan, &mut rng);

        assert_eq!(events.len(), 10);
        assert!(events[0].timestamp > now);
        assert!(events[0].elapsed_seconds > 1200.0);
        assert!(events[0].total_energy_wh > 40.0);
    }

    #[test]
    fn test_anomalies_are_spikes() {
        let mut rng = StdRng::seed_from_u64(3);
        let plan = SimulationPlan {
            events: 200,
            anomaly_rate: 0.5,
            ..SimulationPlan::default()
        };
        let events = generate(None, Utc::now(), &plan, &mut rng);

        assert!(events.iter().any(|e| e.is_anomaly));
        assert!(events
            .iter()
            .filter(|e| e.is_anomaly)
            .all(|e| e.event_energy_wh >= 2.0));
    }
}
