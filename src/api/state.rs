use std::sync::Arc;

use crate::cache::EventCache;
use crate::pipeline::{self, DashboardReport, EventSource, Parameters, PipelineError};

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn EventSource>,
    pub cache: Arc<EventCache>,
    /// Parameters applied when a request leaves them unset.
    pub defaults: Parameters,
}

impl AppState {
    pub fn new(source: Arc<dyn EventSource>, defaults: Parameters) -> Self {
        Self {
            source,
            cache: Arc::new(EventCache::new()),
            defaults,
        }
    }

    /// Run the pipeline over the (possibly cached) series.
    pub async fn report(&self, params: &Parameters) -> Result<DashboardReport, PipelineError> {
        let events = self
            .cache
            .get_or_fetch(params.refresh_interval_seconds, self.source.as_ref())
            .await?;
        pipeline::analyze(&events, params)
    }

    /// Drop cached fetches and rerun immediately.
    pub async fn refresh(&self, params: &Parameters) -> Result<DashboardReport, PipelineError> {
        self.cache.invalidate();
        self.report(params).await
    }
}
