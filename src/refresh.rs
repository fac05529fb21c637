use std::time::Duration;

use tracing::{debug, info, warn};

use crate::api::state::AppState;
use crate::pipeline::PipelineError;

/// Background refresh loop.
/// Re-runs the pipeline with the default parameters every refresh interval
/// so the fetch cache stays warm for UI polls.
pub async fn run_refresh_loop(state: AppState) {
    let period = Duration::from_secs(u64::from(state.defaults.refresh_interval_seconds.max(1)));
    info!(period_secs = period.as_secs(), "Refresh loop started");

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        match state.report(&state.defaults).await {
            Ok(report) => {
                debug!(
                    report_id = %report.id,
                    events = report.summary.event_count,
                    anomalies = report.summary.anomaly_count,
                    inactive = report.summary.inactive_count,
                    total_wh = report.summary.total_energy_wh,
                    r2 = report.model.r2,
                    "Refresh complete"
                );
            }
            Err(PipelineError::InsufficientData { have, .. }) => {
                debug!(have, "Refresh skipped: not enough events yet");
            }
            Err(PipelineError::DataUnavailable { detail }) => {
                warn!(%detail, "Refresh failed: event store unavailable");
            }
        }
    }
}
