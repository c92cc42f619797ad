use crate::config::Config;
use crate::error::{LimitdError, LimitdResult};
use crate::handlers::{self, AppState};
use crate::health::HealthChecker;
use crate::limiter::RateLimiter;
use crate::metrics::MetricsCollector;
use crate::middleware::request_logging;
use crate::store::RedisStore;
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub struct Server {
    config: Config,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Connects to the store, verifies reachability, binds the listener,
    /// and serves until SIGINT/SIGTERM. Shutdown stops accepting new
    /// requests, drains in-flight ones, then closes the pool.
    pub async fn run(self) -> LimitdResult<()> {
        let store = Arc::new(RedisStore::connect(&self.config)?);
        store.ping(self.config.request_deadline()).await?;
        info!(addr = %self.config.redis_addr, "redis reachable");

        let state = AppState {
            limiter: Arc::new(RateLimiter::new(store.clone())),
            health: Arc::new(HealthChecker::new(
                store.clone(),
                self.config.request_deadline(),
            )),
            metrics: MetricsCollector::new(),
            request_deadline: self.config.request_deadline(),
        };

        let app = router(state);

        let listener = TcpListener::bind(&self.config.bind_address)
            .await
            .map_err(|e| {
                LimitdError::Config(format!(
                    "failed to bind {}: {}",
                    self.config.bind_address, e
                ))
            })?;
        info!(addr = %self.config.bind_address, "listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| LimitdError::Internal(format!("server error: {}", e)))?;

        info!("in-flight requests drained, closing store pool");
        store.close();
        Ok(())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/check", post(handlers::check))
        .route("/register", post(handlers::register))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(request_logging))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
