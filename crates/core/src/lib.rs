//! HTTP decision service for the Luma desktop companion.
//!
//! Two business endpoints: `POST /ai/decide` turns a context snapshot into
//! an action via the configured policy (after the gate had its say), and
//! `POST /ai/feedback` attributes user feedback back to the policy and the
//! audit log. Health, readiness and metrics endpoints follow alongside.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prometheus_client::{
    encoding::{EncodeLabel, EncodeLabelSet},
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use luma_policy::gate::Gate;
use luma_policy::registry::PolicyRegistry;
use luma_policy::store::JsonFileStore;
use luma_policy::{Action, Context, Policy};

pub mod config;
pub mod feedback_log;

pub use config::ServiceConfig;
use feedback_log::FeedbackLog;

/// Version labels reported for gate short-circuits.
const GATE_POLICY_VERSION: &str = "gate_v0";
const GATE_MODEL_VERSION: &str = "n/a";

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AppState(Arc<AppStateInner>);

struct AppStateInner {
    gate: Gate,
    policy: Arc<dyn Policy>,
    feedback_log: FeedbackLog,
    registry: Arc<Registry>,
    http_requests_total: Family<HttpLabels, Counter>,
    ready: AtomicBool,
}

impl AppState {
    fn gate(&self) -> Gate {
        self.0.gate
    }

    fn policy(&self) -> Arc<dyn Policy> {
        self.0.policy.clone()
    }

    fn record_http_request(&self, method: Method, path: &'static str, status: StatusCode) {
        let labels = HttpLabels::new(method, path, status);
        self.0.http_requests_total.get_or_create(&labels).inc();
    }

    pub fn set_ready(&self) {
        self.0.ready.store(true, Ordering::Release);
    }

    fn is_ready(&self) -> bool {
        self.0.ready.load(Ordering::Acquire)
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct HttpLabels {
    method: Method,
    path: &'static str,
    status: StatusCode,
}

impl HttpLabels {
    fn new(method: Method, path: &'static str, status: StatusCode) -> Self {
        Self {
            method,
            path,
            status,
        }
    }
}

impl EncodeLabelSet for HttpLabels {
    fn encode(
        &self,
        encoder: &mut prometheus_client::encoding::LabelSetEncoder<'_>,
    ) -> Result<(), fmt::Error> {
        ("method", self.method.as_str()).encode(encoder.encode_label())?;
        ("path", self.path).encode(encoder.encode_label())?;
        ("status", self.status.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct DecideRequest {
    pub context: Context,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DecideResponse {
    pub action: Action,
    pub policy_version: String,
    pub model_version: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub request_id: String,
    pub feedback: String,
}

pub fn build_app(cfg: ServiceConfig) -> Router {
    build_app_with_state(cfg).0
}

pub fn build_app_with_state(cfg: ServiceConfig) -> (Router, AppState) {
    let mut registry = Registry::default();

    let build_info: Gauge = Gauge::default();
    build_info.set(1);
    registry.register("luma_build_info", "static 1", build_info);

    let http_requests_total = Family::<HttpLabels, Counter>::default();
    registry.register(
        "http_requests",
        "Total number of HTTP requests received",
        http_requests_total.clone(),
    );

    let stats_store = JsonFileStore::new(cfg.stats_path());
    let policy_registry = PolicyRegistry::new(cfg.ollama.clone(), Box::new(stats_store));
    let policy = policy_registry.resolve(&cfg.policy);
    info!(policy = policy.name(), "policy selected");

    let state = AppState(Arc::new(AppStateInner {
        gate: cfg.gate,
        policy,
        feedback_log: FeedbackLog::new(cfg.feedback_log_path()),
        registry: Arc::new(registry),
        http_requests_total,
        ready: AtomicBool::new(false),
    }));

    let app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(healthz))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .route("/ai/decide", post(decide_handler))
        .route("/ai/feedback", post(feedback_handler))
        .with_state(state.clone());

    (app, state)
}

async fn health(State(state): State<AppState>) -> &'static str {
    state.record_http_request(Method::GET, "/health", StatusCode::OK);
    "ok"
}

async fn healthz(State(state): State<AppState>) -> &'static str {
    state.record_http_request(Method::GET, "/healthz", StatusCode::OK);
    "ok"
}

async fn ready(State(state): State<AppState>) -> (StatusCode, &'static str) {
    let (status, body) = if state.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "starting")
    };
    state.record_http_request(Method::GET, "/ready", status);
    (status, body)
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let mut body = String::new();
    match prometheus_client::encoding::text::encode(&mut body, &state.0.registry) {
        Ok(()) => {
            state.record_http_request(Method::GET, "/metrics", StatusCode::OK);
            (
                StatusCode::OK,
                [(CONTENT_TYPE, "text/plain; version=0.0.4")],
                body,
            )
                .into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Caller-supplied request id, falling back to the `X-Request-ID` header.
fn resolve_request_id(explicit: Option<String>, headers: &HeaderMap) -> String {
    explicit
        .filter(|id| !id.trim().is_empty())
        .or_else(|| {
            headers
                .get(REQUEST_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

async fn decide_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DecideRequest>,
) -> Json<DecideResponse> {
    let request_id = resolve_request_id(req.request_id, &headers);

    if let Some(action) = state.gate().check(&req.context) {
        info!(%request_id, policy = GATE_POLICY_VERSION, reason = ?action.reason, "decide");
        state.record_http_request(Method::POST, "/ai/decide", StatusCode::OK);
        return Json(DecideResponse {
            action,
            policy_version: GATE_POLICY_VERSION.to_string(),
            model_version: GATE_MODEL_VERSION.to_string(),
        });
    }

    let policy = state.policy();
    let decision = policy.decide(&req.context).await;
    policy.record_decision(&request_id, &req.context, &decision.action);
    info!(%request_id, policy = %decision.policy_version, "decide");

    state.record_http_request(Method::POST, "/ai/decide", StatusCode::OK);
    Json(DecideResponse {
        action: decision.action,
        policy_version: decision.policy_version,
        model_version: decision.model_version,
    })
}

async fn feedback_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<FeedbackRequest>,
) -> Json<Value> {
    let request_id = resolve_request_id(Some(req.request_id), &headers);
    info!(%request_id, feedback = %req.feedback, "feedback");

    state.0.feedback_log.append(&request_id, &req.feedback);
    state.policy().record_feedback(&request_id, &req.feedback);

    state.record_http_request(Method::POST, "/ai/feedback", StatusCode::OK);
    Json(json!({"status": "ok"}))
}
