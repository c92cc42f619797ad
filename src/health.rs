use crate::error::LimitdResult;
use crate::store::RedisStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: DependencyStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub redis: ServiceStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: String,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

static START_TIME: std::sync::LazyLock<SystemTime> = std::sync::LazyLock::new(SystemTime::now);

pub struct HealthChecker {
    store: Arc<RedisStore>,
    probe_deadline: Duration,
}

impl HealthChecker {
    pub fn new(store: Arc<RedisStore>, probe_deadline: Duration) -> Self {
        Self {
            store,
            probe_deadline,
        }
    }

    pub async fn check_health(&self) -> LimitdResult<HealthStatus> {
        let now = SystemTime::now();
        let uptime = now
            .duration_since(*START_TIME)
            .unwrap_or_default()
            .as_secs();

        let redis_status = self.check_redis().await;

        let overall_status = if redis_status.status == "healthy" {
            "healthy"
        } else {
            "unhealthy"
        };

        Ok(HealthStatus {
            status: overall_status.to_string(),
            timestamp: now
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime,
            dependencies: DependencyStatus {
                redis: redis_status,
            },
        })
    }

    async fn check_redis(&self) -> ServiceStatus {
        let start = SystemTime::now();

        match self.store.ping(self.probe_deadline).await {
            Ok(()) => ServiceStatus {
                status: "healthy".to_string(),
                response_time_ms: start.elapsed().unwrap_or_default().as_millis() as u64,
                error: None,
            },
            Err(e) => ServiceStatus {
                status: "unhealthy".to_string(),
                response_time_ms: start.elapsed().unwrap_or_default().as_millis() as u64,
                error: Some(e.to_string()),
            },
        }
    }
}
