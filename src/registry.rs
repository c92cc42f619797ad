//! Policy registry: a typed facade over the store's config keys.

use crate::error::{LimitdError, LimitdResult};
use crate::policy::{Policy, PolicySpec};
use crate::store::RedisStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct PolicyRegistry {
    store: Arc<RedisStore>,
}

impl PolicyRegistry {
    pub fn new(store: Arc<RedisStore>) -> Self {
        Self { store }
    }

    /// Validates and persists a whole policy list for a service. The
    /// previous list, if any, is replaced atomically; on validation
    /// failure nothing is written.
    pub async fn register(
        &self,
        service: &str,
        specs: &[PolicySpec],
        deadline: Duration,
    ) -> LimitdResult<String> {
        let policies = validate_registration(service, specs).map_err(LimitdError::Validation)?;
        self.store
            .register_policies(service, &policies, deadline)
            .await?;

        info!(service, count = policies.len(), "registered policies");
        Ok(format!(
            "registered {} policies for {}",
            policies.len(),
            service
        ))
    }

    /// Loads the active policy list; `None` means the service never
    /// registered.
    pub async fn load(
        &self,
        service: &str,
        deadline: Duration,
    ) -> LimitdResult<Option<Vec<Policy>>> {
        self.store.load_policies(service, deadline).await
    }
}

/// Validates a registration and converts the wire specs into persisted
/// policies. Fails on the first invalid entry so no partial list can
/// ever reach the store.
pub fn validate_registration(service: &str, specs: &[PolicySpec]) -> Result<Vec<Policy>, String> {
    if service.is_empty() {
        return Err("service name must not be empty".to_string());
    }

    let mut policies = Vec::with_capacity(specs.len());
    for spec in specs {
        let policy = spec
            .to_policy()
            .map_err(|e| format!("policy for path {:?}: {}", spec.path, e))?;
        policies.push(policy);
    }

    Ok(policies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Algorithm;

    fn spec(path: &str, algorithm: &str, limit: i64) -> PolicySpec {
        PolicySpec {
            path: path.to_string(),
            algorithm: algorithm.to_string(),
            key_strategy: "ip".to_string(),
            limit,
            window_seconds: 60,
            burst: 0,
        }
    }

    #[test]
    fn converts_valid_specs_in_order() {
        let specs = vec![
            spec("/a", "sliding_window", 5),
            spec("/b", "token_bucket", 100),
        ];
        let policies = validate_registration("api-gateway", &specs).unwrap();
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].path, "/a");
        assert_eq!(policies[0].algorithm, Algorithm::SlidingWindow);
        assert_eq!(policies[1].path, "/b");
        assert_eq!(policies[1].algorithm, Algorithm::TokenBucket);
    }

    #[test]
    fn rejects_empty_service() {
        let err = validate_registration("", &[spec("/a", "sliding_window", 5)]).unwrap_err();
        assert!(err.contains("service"));
    }

    #[test]
    fn one_bad_policy_fails_the_whole_registration() {
        let specs = vec![
            spec("/a", "sliding_window", 5),
            spec("/b", "fixed_window", 10),
        ];
        let err = validate_registration("svc", &specs).unwrap_err();
        assert!(err.contains("/b"));
        assert!(err.contains("unknown algorithm"));
    }

    #[test]
    fn empty_policy_list_is_accepted() {
        assert!(validate_registration("svc", &[]).unwrap().is_empty());
    }
}
