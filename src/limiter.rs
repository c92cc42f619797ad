//! # Limiter engine
//!
//! Orchestrates a check from decoded request to verdict:
//!
//! ```text
//! CheckRequest ──► registry.load(service) ──► first policy with path == api
//!                        │ None                      │ none
//!                        ▼                           ▼
//!                  allow (no policy)           allow (no policy)
//!                                                    │ match
//!                                                    ▼
//!                        key::bucket_key ──► store.sliding_window /
//!                                            store.token_bucket ──► verdict
//! ```
//!
//! Absence of configuration is deliberately not an error: a service that
//! never registered must not be taken down by its rate limiter. Store
//! failures, by contrast, propagate to the caller unchanged; the engine
//! never fabricates an allow or a deny.

use crate::error::LimitdResult;
use crate::key;
use crate::policy::{Algorithm, PolicySpec};
use crate::registry::PolicyRegistry;
use crate::store::{RedisStore, Verdict};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    pub service: String,
    pub api: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResponse {
    pub allowed: bool,
    pub remaining: i32,
    pub reset_at: i64,
}

impl CheckResponse {
    /// The verdict when no policy applies: allowed, with `remaining = -1`
    /// marking "no limit was evaluated".
    pub fn unrestricted() -> Self {
        Self {
            allowed: true,
            remaining: -1,
            reset_at: 0,
        }
    }

    fn from_verdict(verdict: Verdict) -> Self {
        Self {
            allowed: verdict.allowed,
            remaining: verdict.remaining as i32,
            reset_at: verdict.reset_at,
        }
    }
}

pub struct RateLimiter {
    registry: PolicyRegistry,
    store: Arc<RedisStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<RedisStore>) -> Self {
        Self {
            registry: PolicyRegistry::new(store.clone()),
            store,
        }
    }

    pub async fn register(
        &self,
        service: &str,
        specs: &[PolicySpec],
        deadline: Duration,
    ) -> LimitdResult<String> {
        self.registry.register(service, specs, deadline).await
    }

    pub async fn check(
        &self,
        request: &CheckRequest,
        deadline: Duration,
    ) -> LimitdResult<CheckResponse> {
        let policies = match self.registry.load(&request.service, deadline).await? {
            Some(policies) => policies,
            None => {
                debug!(service = %request.service, "service not registered, allowing by default");
                return Ok(CheckResponse::unrestricted());
            }
        };

        // first path match wins
        let Some(policy) = policies.iter().find(|p| p.path == request.api) else {
            debug!(
                service = %request.service,
                api = %request.api,
                "no policy for endpoint, allowing by default"
            );
            return Ok(CheckResponse::unrestricted());
        };

        let bucket = key::bucket_key(
            &request.service,
            &policy.path,
            &policy.key_strategy,
            &request.ip,
            &request.headers,
        );
        debug!(algorithm = %policy.algorithm, key = %bucket, "dispatching check");

        let verdict = match policy.algorithm {
            Algorithm::SlidingWindow => {
                self.store
                    .sliding_window(&bucket, policy.limit, policy.window_seconds, deadline)
                    .await?
            }
            Algorithm::TokenBucket => {
                self.store
                    .token_bucket(
                        &bucket,
                        policy.limit,
                        policy.effective_burst(),
                        policy.window_seconds,
                        deadline,
                    )
                    .await?
            }
        };

        Ok(CheckResponse::from_verdict(verdict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrestricted_response_shape() {
        let resp = CheckResponse::unrestricted();
        assert!(resp.allowed);
        assert_eq!(resp.remaining, -1);
        assert_eq!(resp.reset_at, 0);
    }

    #[test]
    fn verdict_fields_pass_through() {
        let resp = CheckResponse::from_verdict(Verdict {
            allowed: false,
            remaining: 0,
            reset_at: 1700000060,
        });
        assert!(!resp.allowed);
        assert_eq!(resp.remaining, 0);
        assert_eq!(resp.reset_at, 1700000060);
    }

    #[test]
    fn check_request_decodes_with_defaults() {
        let raw = r#"{"service":"svc","api":"/a"}"#;
        let req: CheckRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.service, "svc");
        assert_eq!(req.api, "/a");
        assert!(req.ip.is_empty());
        assert!(req.headers.is_empty());
    }
}
