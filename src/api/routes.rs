//! API route definitions.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use super::state::AppState;
use crate::pipeline::{
    DashboardReport, ParameterError, ParameterOverrides, Parameters, PipelineError,
    PARAMETER_RANGES, PREDICTION_STEPS,
};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/parameters", get(parameters))
        .route("/dashboard", get(dashboard))
        .route("/refresh", post(refresh))
}

/// Errors surfaced to the renderer. Driver details stay in the logs.
enum ApiError {
    Pipeline(PipelineError),
    Parameter(ParameterError),
    Query(QueryRejection),
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError::Pipeline(e)
    }
}

impl From<ParameterError> for ApiError {
    fn from(e: ParameterError) -> Self {
        ApiError::Parameter(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            ApiError::Pipeline(e @ PipelineError::DataUnavailable { detail }) => {
                tracing::error!(%detail, "event store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "data_unavailable", e.to_string())
            }
            ApiError::Pipeline(e @ PipelineError::InsufficientData { have, .. }) => {
                tracing::warn!(have, "not enough events for analysis");
                (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_data", e.to_string())
            }
            ApiError::Parameter(e) => {
                (StatusCode::BAD_REQUEST, "invalid_parameter", e.to_string())
            }
            ApiError::Query(rejection) => {
                (StatusCode::BAD_REQUEST, "invalid_parameter", rejection.body_text())
            }
        };

        let body = Json(json!({
            "data": null,
            "error": { "kind": kind, "message": message },
            "meta": { "timestamp": chrono::Utc::now().to_rfc3339() }
        }));
        (status, body).into_response()
    }
}

type OverridesQuery = Result<Query<ParameterOverrides>, QueryRejection>;

fn resolve(state: &AppState, query: OverridesQuery) -> Result<Parameters, ApiError> {
    let Query(overrides) = query.map_err(ApiError::Query)?;
    let params = overrides.apply(&state.defaults);
    params.validate()?;
    Ok(params)
}

fn envelope(report: DashboardReport) -> Json<Value> {
    let meta = json!({
        "report_id": report.id,
        "timestamp": report.generated_at.to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    });
    Json(json!({ "data": report, "meta": meta }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn parameters(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "data": {
            "defaults": state.defaults,
            "ranges": PARAMETER_RANGES,
            "prediction_steps": PREDICTION_STEPS,
        }
    }))
}

async fn dashboard(
    State(state): State<AppState>,
    query: OverridesQuery,
) -> Result<Json<Value>, ApiError> {
    let params = resolve(&state, query)?;
    let report = state.report(&params).await?;
    Ok(envelope(report))
}

async fn refresh(
    State(state): State<AppState>,
    query: OverridesQuery,
) -> Result<Json<Value>, ApiError> {
    let params = resolve(&state, query)?;
    tracing::info!("manual refresh requested");
    let report = state.refresh(&params).await?;
    Ok(envelope(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Event, EventSource, MemorySource};
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;
    use tower::ServiceExt; // for `oneshot`

    struct OfflineSource;

    #[async_trait::async_trait]
    impl EventSource for OfflineSource {
        async fn load(&self) -> Result<Vec<Event>, PipelineError> {
            Err(PipelineError::unavailable("unable to open database file: /srv/secret.db"))
        }
    }

    fn sample_events(n: usize) -> Vec<Event> {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        (0..n)
            .map(|i| Event {
                timestamp: base + Duration::seconds(i as i64 * 10),
                event_energy_wh: 0.3 + i as f64 * 0.01,
                total_energy_wh: 0.3 * (i + 1) as f64,
                elapsed_seconds: i as f64 * 10.0,
                is_anomaly: i == 3,
            })
            .collect()
    }

    fn app(source: Arc<dyn EventSource>) -> Router {
        super::super::router(AppState::new(source, Parameters::default()), None)
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 10_000_000)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = app(Arc::new(MemorySource::default()));
        let (status, json) = call(app, "GET", "/api/v1/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "ok");
        assert!(json["data"]["version"].is_string());
    }

    #[tokio::test]
    async fn test_dashboard_returns_report() {
        let source = Arc::new(MemorySource::new(sample_events(20)));
        let (status, json) = call(
            app(source),
            "GET",
            "/api/v1/dashboard?prediction_horizon_seconds=30&prediction_step_seconds=10",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let data = &json["data"];
        assert_eq!(data["summary"]["event_count"], 20);
        assert_eq!(data["summary"]["anomaly_count"], 1);
        assert_eq!(data["consumption"]["forecast"].as_array().unwrap().len(), 3);
        assert!(data["model"]["r2"].is_number());
        assert!(json["meta"]["report_id"].is_string());
    }

    #[tokio::test]
    async fn test_invalid_parameter_is_bad_request() {
        let source = Arc::new(MemorySource::new(sample_events(5)));
        let uri = "/api/v1/dashboard?prediction_step_seconds=7";
        let (status, json) = call(app(source), "GET", uri).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["kind"], "invalid_parameter");
    }

    #[tokio::test]
    async fn test_malformed_query_value_keeps_json_envelope() {
        let source: Arc<dyn EventSource> = Arc::new(MemorySource::new(sample_events(5)));

        for uri in [
            "/api/v1/dashboard?energy_threshold=abc",
            "/api/v1/dashboard?zoom_minutes=",
        ] {
            let (status, json) = call(app(source.clone()), "GET", uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(json["error"]["kind"], "invalid_parameter", "{uri}");
            assert!(json["data"].is_null());
            assert!(json["meta"]["timestamp"].is_string());
        }

        let uri = "/api/v1/refresh?prediction_horizon_seconds=-1";
        let (status, json) = call(app(source), "POST", uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["kind"], "invalid_parameter");
    }

    #[tokio::test]
    async fn test_insufficient_data_is_reported() {
        let source = Arc::new(MemorySource::new(sample_events(1)));
        let (status, json) = call(app(source), "GET", "/api/v1/dashboard").await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["error"]["kind"], "insufficient_data");
    }

    #[tokio::test]
    async fn test_unavailable_store_hides_driver_error() {
        let (status, json) = call(app(Arc::new(OfflineSource)), "GET", "/api/v1/dashboard").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"]["kind"], "data_unavailable");
        let message = json["error"]["message"].as_str().unwrap();
        assert!(!message.contains("secret"));
    }

    #[tokio::test]
    async fn test_refresh_is_post_only() {
        let source: Arc<dyn EventSource> = Arc::new(MemorySource::new(sample_events(5)));

        let (status, _) = call(app(source.clone()), "POST", "/api/v1/refresh").await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(app(source), "GET", "/api/v1/refresh").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_parameters_lists_ranges() {
        let app = app(Arc::new(MemorySource::default()));
        let (status, json) = call(app, "GET", "/api/v1/parameters").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["defaults"]["prediction_horizon_seconds"], 60);
        assert_eq!(json["data"]["prediction_steps"], json!([1, 5, 10]));
        assert_eq!(json["data"]["ranges"].as_array().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_static_ui_exposes_every_parameter_and_plot() {
        let web = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("web");
        let state = AppState::new(Arc::new(MemorySource::default()), Parameters::default());
        let app = super::super::router(state, Some(web.as_path()));

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1_000_000)
            .await
            .unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();

        let defaults = serde_json::to_value(Parameters::default()).unwrap();
        for name in defaults.as_object().unwrap().keys() {
            assert!(html.contains(&format!("id=\"{name}\"")), "no control for {name}");
        }
        for plot in ["consumption", "instant", "inactivity", "detail"] {
            assert!(html.contains(&format!("id=\"plot-{plot}\"")), "no plot for {plot}");
        }
    }

    #[tokio::test]
    async fn test_unknown_path_falls_back() {
        let (status, _) = call(app(Arc::new(MemorySource::default())), "GET", "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
