//! Per-minute consumption buckets and intensity classification.

use std::collections::BTreeMap;

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;

use super::event::Event;

/// Upper (inclusive) bounds of the Low, Medium and High bands in Wh.
pub const BAND_BOUNDARIES: [f64; 3] = [0.01, 0.5, 2.0];

/// Render-time colour for cells with no events. Not a classification.
pub const NO_DATA_COLOR: &str = "#e0e0e0";

/// Colour for minutes whose events sum to zero or less.
pub const UNCLASSIFIED_COLOR: &str = "#7f7f7f";

pub const MINUTES_PER_HOUR: u32 = 60;

/// Ordered consumption level of one minute bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl IntensityLevel {
    pub const ALL: [IntensityLevel; 4] = [
        IntensityLevel::Low,
        IntensityLevel::Medium,
        IntensityLevel::High,
        IntensityLevel::VeryHigh,
    ];

    /// Bands are left-open, right-closed: `(0, 0.01]`, `(0.01, 0.5]`,
    /// `(0.5, 2.0]`, `(2.0, inf)`. Sums at or below zero fall outside all
    /// bands.
    pub fn classify(energy_wh: f64) -> Option<Self> {
        let [low, medium, high] = BAND_BOUNDARIES;
        if energy_wh.is_nan() || energy_wh <= 0.0 {
            None
        } else if energy_wh <= low {
            Some(Self::Low)
        } else if energy_wh <= medium {
            Some(Self::Medium)
        } else if energy_wh <= high {
            Some(Self::High)
        } else {
            Some(Self::VeryHigh)
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Self::Low => "#1f77b4",
            Self::Medium => "#2ca02c",
            Self::High => "#ffbf00",
            Self::VeryHigh => "#d62728",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::VeryHigh => "Very high",
        }
    }
}

impl std::fmt::Display for IntensityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinuteBucket {
    pub hour: DateTime<Utc>,
    pub minute: u32,
    pub energy_wh: f64,
    /// `None` when the sum is at or below zero.
    pub level: Option<IntensityLevel>,
}

/// Sparse `(hour, minute) -> bucket` mapping. Minutes without events are
/// absent.
#[derive(Debug, Clone, Default)]
pub struct MinuteBuckets {
    buckets: BTreeMap<(DateTime<Utc>, u32), MinuteBucket>,
}

impl MinuteBuckets {
    pub fn get(&self, hour: DateTime<Utc>, minute: u32) -> Option<&MinuteBucket> {
        self.buckets.get(&(hour, minute))
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MinuteBucket> {
        self.buckets.values()
    }

    /// Distinct hours, most recent first.
    pub fn hours_desc(&self) -> Vec<DateTime<Utc>> {
        let mut hours: Vec<DateTime<Utc>> = self.buckets.keys().map(|(h, _)| *h).collect();
        hours.dedup();
        hours.reverse();
        hours
    }
}

pub fn hour_floor(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Sum event energy per `(hour, minute)` and classify each sum.
pub fn aggregate_minutes(events: &[Event]) -> MinuteBuckets {
    let mut sums: BTreeMap<(DateTime<Utc>, u32), f64> = BTreeMap::new();
    for event in events {
        let key = (hour_floor(event.timestamp), event.timestamp.minute());
        *sums.entry(key).or_insert(0.0) += event.event_energy_wh;
    }

    let buckets = sums
        .into_iter()
        .map(|((hour, minute), energy_wh)| {
            let bucket = MinuteBucket {
                hour,
                minute,
                energy_wh,
                level: IntensityLevel::classify(energy_wh),
            };
            ((hour, minute), bucket)
        })
        .collect();

    MinuteBuckets { buckets }
}

/// One grid cell. Absent minutes are an explicit `NoData`, never a band.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GridCell {
    NoData,
    Unclassified { energy_wh: f64 },
    Level { level: IntensityLevel, energy_wh: f64 },
}

impl GridCell {
    pub fn color(&self) -> &'static str {
        match self {
            GridCell::Level { level, .. } => level.color(),
            GridCell::Unclassified { .. } => UNCLASSIFIED_COLOR,
            GridCell::NoData => NO_DATA_COLOR,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GridRow {
    pub hour: DateTime<Utc>,
    pub cells: Vec<GridCell>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LegendEntry {
    pub key: &'static str,
    pub label: &'static str,
    pub color: &'static str,
}

/// Dense hour x minute grid for rendering, most recent hour first.
#[derive(Debug, Clone, Serialize)]
pub struct IntensityGrid {
    pub rows: Vec<GridRow>,
    pub legend: Vec<LegendEntry>,
}

impl IntensityGrid {
    pub fn from_buckets(buckets: &MinuteBuckets) -> Self {
        let rows = buckets
            .hours_desc()
            .into_iter()
            .map(|hour| {
                let cells = (0..MINUTES_PER_HOUR)
                    .map(|minute| match buckets.get(hour, minute) {
                        None => GridCell::NoData,
                        Some(b) => match b.level {
                            Some(level) => GridCell::Level {
                                level,
                                energy_wh: b.energy_wh,
                            },
                            None => GridCell::Unclassified {
                                energy_wh: b.energy_wh,
                            },
                        },
                    })
                    .collect();
                GridRow { hour, cells }
            })
            .collect();

        let mut legend: Vec<LegendEntry> = IntensityLevel::ALL
            .iter()
            .map(|level| LegendEntry {
                key: match level {
                    IntensityLevel::Low => "low",
                    IntensityLevel::Medium => "medium",
                    IntensityLevel::High => "high",
                    IntensityLevel::VeryHigh => "very_high",
                },
                label: level.label(),
                color: level.color(),
            })
            .collect();
        legend.push(LegendEntry {
            key: "unclassified",
            label: "Zero or negative",
            color: UNCLASSIFIED_COLOR,
        });
        legend.push(LegendEntry {
            key: "no_data",
            label: "No data",
            color: NO_DATA_COLOR,
        });

        Self { rows, legend }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(h: u32, m: u32, s: u32, energy: f64) -> Event {
        Event {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap(),
            event_energy_wh: energy,
            total_energy_wh: 0.0,
            elapsed_seconds: 0.0,
            is_anomaly: false,
        }
    }

    #[test]
    fn test_minute_sums_are_classified() {
        let events = vec![
            event(10, 5, 1, 0.002),
            event(10, 5, 30, 0.003),
            event(10, 6, 0, 0.7),
            event(10, 6, 59, 0.5),
        ];
        let buckets = aggregate_minutes(&events);
        let hour = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

        let five = buckets.get(hour, 5).unwrap();
        assert!((five.energy_wh - 0.005).abs() < 1e-12);
        assert_eq!(five.level, Some(IntensityLevel::Low));

        let six = buckets.get(hour, 6).unwrap();
        assert!((six.energy_wh - 1.2).abs() < 1e-12);
        assert_eq!(six.level, Some(IntensityLevel::High));

        // No events at minute 7: absent, not Low.
        assert!(buckets.get(hour, 7).is_none());
        assert_eq!(buckets.len(), 2);
    }

    #[test]
    fn test_band_boundaries_are_right_inclusive() {
        assert_eq!(IntensityLevel::classify(0.0), None);
        assert_eq!(IntensityLevel::classify(-1.0), None);
        assert_eq!(IntensityLevel::classify(f64::NAN), None);
        assert_eq!(IntensityLevel::classify(1e-9), Some(IntensityLevel::Low));
        assert_eq!(IntensityLevel::classify(0.01), Some(IntensityLevel::Low));
        assert_eq!(IntensityLevel::classify(0.011), Some(IntensityLevel::Medium));
        assert_eq!(IntensityLevel::classify(0.5), Some(IntensityLevel::Medium));
        assert_eq!(IntensityLevel::classify(0.51), Some(IntensityLevel::High));
        assert_eq!(IntensityLevel::classify(2.0), Some(IntensityLevel::High));
        assert_eq!(IntensityLevel::classify(2.0001), Some(IntensityLevel::VeryHigh));
        assert_eq!(IntensityLevel::classify(1e9), Some(IntensityLevel::VeryHigh));
    }

    #[test]
    fn test_levels_are_ordered() {
        assert!(IntensityLevel::Low < IntensityLevel::Medium);
        assert!(IntensityLevel::High < IntensityLevel::VeryHigh);
    }

    #[test]
    fn test_same_minute_in_different_hours_is_separate() {
        let events = vec![event(9, 15, 0, 1.0), event(10, 15, 0, 3.0)];
        let buckets = aggregate_minutes(&events);

        let nine = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let ten = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(buckets.get(nine, 15).unwrap().level, Some(IntensityLevel::High));
        assert_eq!(buckets.get(ten, 15).unwrap().level, Some(IntensityLevel::VeryHigh));
        assert_eq!(buckets.hours_desc(), vec![ten, nine]);
    }

    #[test]
    fn test_grid_marks_missing_minutes_as_no_data() {
        let events = vec![event(10, 0, 0, 0.3), event(10, 2, 0, 0.0)];
        let grid = IntensityGrid::from_buckets(&aggregate_minutes(&events));

        assert_eq!(grid.rows.len(), 1);
        let cells = &grid.rows[0].cells;
        assert_eq!(cells.len(), 60);
        assert_eq!(
            cells[0],
            GridCell::Level {
                level: IntensityLevel::Medium,
                energy_wh: 0.3
            }
        );
        assert_eq!(cells[1], GridCell::NoData);
        assert_eq!(cells[2], GridCell::Unclassified { energy_wh: 0.0 });
        assert_eq!(cells[1].color(), NO_DATA_COLOR);
        assert_ne!(cells[0].color(), NO_DATA_COLOR);
        assert_eq!(grid.legend.len(), 6);
    }

    #[test]
    fn test_zero_minute_is_coloured_apart_from_missing_minute() {
        let events = vec![event(10, 3, 0, 0.4), event(10, 3, 20, -0.4)];
        let grid = IntensityGrid::from_buckets(&aggregate_minutes(&events));
        let cells = &grid.rows[0].cells;

        assert!(matches!(cells[3], GridCell::Unclassified { .. }));
        assert_eq!(cells[4], GridCell::NoData);
        assert_ne!(cells[3].color(), cells[4].color());
        for level in IntensityLevel::ALL {
            assert_ne!(cells[3].color(), level.color());
        }

        let keys: Vec<&str> = grid.legend.iter().map(|l| l.key).collect();
        assert_eq!(
            keys,
            vec!["low", "medium", "high", "very_high", "unclassified", "no_data"]
        );
        let unclassified = &grid.legend[4];
        assert_eq!(unclassified.color, cells[3].color());
    }

    #[test]
    fn test_grid_cell_serialises_with_kind_tag() {
        let json = serde_json::to_value(GridCell::Level {
            level: IntensityLevel::VeryHigh,
            energy_wh: 3.0,
        })
        .unwrap();
        assert_eq!(json["kind"], "level");
        assert_eq!(json["level"], "very_high");

        let json = serde_json::to_value(GridCell::NoData).unwrap();
        assert_eq!(json["kind"], "no_data");
    }
}
