//! # HTTP request handlers
//!
//! The transport-facing surface of the service. Two RPCs plus probes:
//!
//! | Endpoint         | Handler      | Purpose                              |
//! |------------------|--------------|--------------------------------------|
//! | `POST /check`    | `check()`    | Rate limit verdict for one request   |
//! | `POST /register` | `register()` | Replace a service's policy list      |
//! | `GET /health`    | `health()`   | Liveness + Redis dependency probe    |
//! | `GET /metrics`   | `metrics()`  | In-process check counters            |
//!
//! Registration validation failures are reported in-band as
//! `{"success": false, "message": ...}`; store failures surface as 5xx
//! and a deadline overrun as 504, so a transport error is never dressed
//! up as an allow or a deny.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LimitdError, LimitdResult};
use crate::health::{HealthChecker, HealthStatus};
use crate::limiter::{CheckRequest, CheckResponse, RateLimiter};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::policy::PolicySpec;

/// Shared application state. Everything inside is independently
/// thread-safe; concurrent checks never serialize on an in-process lock.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub health: Arc<HealthChecker>,
    pub metrics: MetricsCollector,
    pub request_deadline: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub apis: Vec<PolicySpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
}

pub async fn check(
    State(state): State<AppState>,
    Json(request): Json<CheckRequest>,
) -> LimitdResult<Json<CheckResponse>> {
    let response = state.limiter.check(&request, state.request_deadline).await?;
    state
        .metrics
        .record_check(&request.service, response.allowed)
        .await;
    Ok(Json(response))
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> LimitdResult<Json<RegisterResponse>> {
    match state
        .limiter
        .register(&request.service, &request.apis, state.request_deadline)
        .await
    {
        Ok(message) => Ok(Json(RegisterResponse {
            success: true,
            message,
        })),
        // validation problems are reported in-band, not as HTTP errors
        Err(LimitdError::Validation(reason)) => Ok(Json(RegisterResponse {
            success: false,
            message: reason,
        })),
        Err(other) => Err(other),
    }
}

pub async fn health(State(state): State<AppState>) -> LimitdResult<Json<HealthStatus>> {
    state.health.check_health().await.map(Json)
}

pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot().await)
}
