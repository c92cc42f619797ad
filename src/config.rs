use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub redis_addr: String,
    pub redis_password: Option<String>,
    pub redis_db: i64,
    pub redis_pool_size: usize,
    pub pool_wait_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidBindAddress(String),
    InvalidDb(String),
    InvalidPoolSize(String),
    InvalidTimeout(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidBindAddress(msg) => write!(f, "Invalid bind address: {}", msg),
            ConfigError::InvalidDb(msg) => write!(f, "Invalid Redis database: {}", msg),
            ConfigError::InvalidPoolSize(msg) => write!(f, "Invalid pool size: {}", msg),
            ConfigError::InvalidTimeout(msg) => write!(f, "Invalid timeout: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            redis_addr: "127.0.0.1:6379".to_string(),
            redis_password: None,
            redis_db: 0,
            redis_pool_size: 100,
            pool_wait_timeout_ms: 2000,
            request_timeout_ms: 2000,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(addr) = env::var("LIMITD_BIND_ADDRESS") {
            config.bind_address = addr;
        }

        if let Ok(addr) = env::var("REDIS_ADDR") {
            config.redis_addr = addr;
        }

        if let Ok(password) = env::var("REDIS_PASSWORD") {
            if !password.is_empty() {
                config.redis_password = Some(password);
            }
        }

        if let Ok(db_str) = env::var("REDIS_DB") {
            config.redis_db = db_str.parse().map_err(|_| ConfigError::InvalidDb(db_str))?;
        }

        if let Ok(pool_str) = env::var("REDIS_POOL_SIZE") {
            config.redis_pool_size = pool_str
                .parse()
                .map_err(|_| ConfigError::InvalidPoolSize(pool_str))?;
        }

        if let Ok(wait_str) = env::var("LIMITD_POOL_TIMEOUT_MS") {
            config.pool_wait_timeout_ms = wait_str
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(wait_str))?;
        }

        if let Ok(timeout_str) = env::var("LIMITD_REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = timeout_str
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(timeout_str))?;
        }

        if let Ok(level) = env::var("LIMITD_LOG_LEVEL") {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        SocketAddr::from_str(&self.bind_address)
            .map_err(|_| ConfigError::InvalidBindAddress(self.bind_address.clone()))?;

        if self.redis_db < 0 {
            return Err(ConfigError::InvalidDb(
                "database number cannot be negative".to_string(),
            ));
        }

        if self.redis_pool_size == 0 {
            return Err(ConfigError::InvalidPoolSize(
                "pool size must be greater than 0".to_string(),
            ));
        }

        if self.pool_wait_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "timeouts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Connection URL for the store, carrying credentials and database number.
    pub fn redis_url(&self) -> String {
        match &self.redis_password {
            Some(password) => format!("redis://:{}@{}/{}", password, self.redis_addr, self.redis_db),
            None => format!("redis://{}/{}", self.redis_addr, self.redis_db),
        }
    }

    pub fn pool_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_wait_timeout_ms)
    }

    /// Deadline inherited by every store round trip of a request.
    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_bind_address() {
        let config = Config {
            bind_address: "not-an-address".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBindAddress(_))
        ));
    }

    #[test]
    fn rejects_zero_pool_size() {
        let config = Config {
            redis_pool_size: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPoolSize(_))
        ));
    }

    #[test]
    fn redis_url_without_password() {
        let config = Config {
            redis_addr: "10.0.0.5:6379".to_string(),
            redis_db: 2,
            ..Config::default()
        };
        assert_eq!(config.redis_url(), "redis://10.0.0.5:6379/2");
    }

    #[test]
    fn redis_url_with_password() {
        let config = Config {
            redis_password: Some("hunter2".to_string()),
            ..Config::default()
        };
        assert_eq!(config.redis_url(), "redis://:hunter2@127.0.0.1:6379/0");
    }
}
