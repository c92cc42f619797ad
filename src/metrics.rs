use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize)]
pub struct CheckMetrics {
    pub total_checks: u64,
    pub allowed: u64,
    pub denied: u64,
    pub since: u64,
}

impl Default for CheckMetrics {
    fn default() -> Self {
        Self {
            total_checks: 0,
            allowed: 0,
            denied: 0,
            since: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub global: CheckMetrics,
    pub per_service: HashMap<String, CheckMetrics>,
}

/// In-process counters of check outcomes, keyed by service. Reset on
/// restart; the store holds no decision history.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    per_service: Arc<RwLock<HashMap<String, CheckMetrics>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            per_service: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn record_check(&self, service: &str, allowed: bool) {
        let mut per_service = self.per_service.write().await;
        let metrics = per_service.entry(service.to_string()).or_default();

        metrics.total_checks += 1;
        if allowed {
            metrics.allowed += 1;
        } else {
            metrics.denied += 1;
        }
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let per_service = self.per_service.read().await;

        let mut global = CheckMetrics::default();
        for metrics in per_service.values() {
            global.total_checks += metrics.total_checks;
            global.allowed += metrics.allowed;
            global.denied += metrics.denied;
            global.since = global.since.min(metrics.since);
        }

        MetricsSnapshot {
            global,
            per_service: per_service.clone(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
