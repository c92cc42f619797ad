//! Redis store adapter.
//!
//! Hosts the two algorithm scripts and the policy persistence primitives.
//! Both algorithms run as server-side Lua so the read, arithmetic, and
//! write form one indivisible step; concurrent checks on the same key are
//! totally ordered by the store, and a check costs one round trip.
//!
//! The script sources are kept byte-identical across limiter replicas;
//! a mixed fleet evaluating the same key must produce the same verdicts.

use crate::config::Config;
use crate::error::{LimitdError, LimitdResult};
use crate::policy::Policy;
use deadpool_redis::{Connection, Pool, Runtime};
use redis::{AsyncCommands, ErrorKind, RedisError, Script};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

const CONFIG_KEY_PREFIX: &str = "rlconfig:";

const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local reqid = ARGV[4]
local cutoff = now - window

redis.call('ZREMRANGEBYSCORE', key, 0, cutoff)

local count = redis.call('ZCARD', key)
if count < limit then
	redis.call('ZADD', key, now, reqid)
	redis.call('EXPIRE', key, math.ceil(window * 1.5))
	return {1, limit - count - 1, now + window}
else
	redis.call('EXPIRE', key, math.ceil(window * 1.5))
	return {0, 0, now + window}
end
"#;

const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local burst = tonumber(ARGV[3])
local window = tonumber(ARGV[4])

local bucket = redis.call('HMGET', key, 'tokens', 'last')
local tokens = tonumber(bucket[1])
local last = tonumber(bucket[2])

if tokens == nil then
	tokens = burst
	last = now
else
	local elapsed = now - last
	tokens = math.min(burst, tokens + elapsed * rate)
end

local allowed = 0
local remaining = math.floor(tokens)
if tokens >= 1 then
	tokens = tokens - 1
	allowed = 1
	remaining = math.floor(tokens)
end

redis.call('HMSET', key, 'tokens', tokens, 'last', now)
redis.call('EXPIRE', key, math.ceil(window * 1.5))

local needed = burst - tokens
local secs_until_full = needed / rate
local reset_at = now + math.ceil(secs_until_full)

return {allowed, remaining, reset_at}
"#;

/// Outcome of one atomic algorithm evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub allowed: bool,
    pub remaining: i64,
    pub reset_at: i64,
}

impl Verdict {
    fn from_reply(reply: (i64, i64, i64)) -> Self {
        let (allowed, remaining, reset_at) = reply;
        Self {
            allowed: allowed == 1,
            remaining,
            reset_at,
        }
    }
}

pub struct RedisStore {
    pool: Pool,
    sliding_window_script: Script,
    token_bucket_script: Script,
}

impl RedisStore {
    /// Builds the connection pool. Connections are established lazily;
    /// call [`RedisStore::ping`] to verify reachability at startup.
    pub fn connect(config: &Config) -> LimitdResult<Self> {
        let mut pool_config = deadpool_redis::Config::from_url(config.redis_url());

        let mut managed = deadpool_redis::PoolConfig::new(config.redis_pool_size);
        managed.timeouts.wait = Some(config.pool_wait_timeout());
        managed.timeouts.create = Some(config.pool_wait_timeout());
        pool_config.pool = Some(managed);

        let pool = pool_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| LimitdError::Redis(format!("failed to create pool: {}", e)))?;

        info!(
            addr = %config.redis_addr,
            db = config.redis_db,
            pool_size = config.redis_pool_size,
            "redis pool created"
        );

        Ok(Self {
            pool,
            sliding_window_script: Script::new(SLIDING_WINDOW_SCRIPT),
            token_bucket_script: Script::new(TOKEN_BUCKET_SCRIPT),
        })
    }

    async fn get_connection(&self) -> LimitdResult<Connection> {
        self.pool.get().await.map_err(|e| match e {
            // a caller blocked past the pool wait timeout has exceeded
            // its deadline; the verdict is unknown, not a store fault
            deadpool_redis::PoolError::Timeout(_) => {
                LimitdError::Timeout("timed out waiting for a pool connection".to_string())
            }
            other => LimitdError::Redis(format!("failed to get connection: {}", other)),
        })
    }

    pub async fn ping(&self, deadline: Duration) -> LimitdResult<()> {
        let mut conn = self.get_connection().await?;
        let reply: String = timeout(deadline, redis::cmd("PING").query_async(&mut conn))
            .await
            .map_err(|_| LimitdError::Timeout("ping timed out".to_string()))?
            .map_err(|e| self.command_error(e, "ping"))?;

        if reply == "PONG" {
            debug!("redis ping successful");
            Ok(())
        } else {
            Err(LimitdError::Internal(format!(
                "unexpected ping reply: {}",
                reply
            )))
        }
    }

    /// Persists the policy list for a service as one opaque value.
    /// The write replaces whatever was there before and never expires.
    pub async fn register_policies(
        &self,
        service: &str,
        policies: &[Policy],
        deadline: Duration,
    ) -> LimitdResult<()> {
        let key = format!("{}{}", CONFIG_KEY_PREFIX, service);
        let data = serde_json::to_string(policies)?;

        let mut conn = self.get_connection().await?;
        timeout(deadline, conn.set::<_, _, ()>(&key, data))
            .await
            .map_err(|_| {
                LimitdError::Timeout(format!("registration write timed out for {}", service))
            })?
            .map_err(|e| self.command_error(e, "register_policies"))?;

        debug!(service, count = policies.len(), "stored policy list");
        Ok(())
    }

    /// Loads the policy list for a service. An unregistered service is a
    /// first-class `None`, not an error.
    pub async fn load_policies(
        &self,
        service: &str,
        deadline: Duration,
    ) -> LimitdResult<Option<Vec<Policy>>> {
        let key = format!("{}{}", CONFIG_KEY_PREFIX, service);

        let mut conn = self.get_connection().await?;
        let data = timeout(deadline, conn.get::<_, Option<String>>(&key))
            .await
            .map_err(|_| LimitdError::Timeout(format!("policy load timed out for {}", service)))?
            .map_err(|e| self.command_error(e, "load_policies"))?;

        match data {
            None => Ok(None),
            Some(raw) => {
                let policies: Vec<Policy> = serde_json::from_str(&raw)?;
                Ok(Some(policies))
            }
        }
    }

    /// Atomically evaluates the sliding window log for one key.
    pub async fn sliding_window(
        &self,
        key: &str,
        limit: u32,
        window: u32,
        deadline: Duration,
    ) -> LimitdResult<Verdict> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        // unique per request so simultaneous checks in the same second
        // are counted independently
        let request_id = format!("{}:{}", now.as_secs(), now.as_nanos());

        let mut conn = self.get_connection().await?;
        let reply: (i64, i64, i64) = timeout(
            deadline,
            self.sliding_window_script
                .key(key)
                .arg(now.as_secs())
                .arg(window)
                .arg(limit)
                .arg(request_id)
                .invoke_async(&mut conn),
        )
        .await
        .map_err(|_| LimitdError::Timeout(format!("sliding window check timed out for {}", key)))?
        .map_err(|e| self.command_error(e, "sliding_window"))?;

        Ok(Verdict::from_reply(reply))
    }

    /// Atomically evaluates the token bucket for one key. Refill rate is
    /// `limit / window` tokens per second, capped at `burst`.
    pub async fn token_bucket(
        &self,
        key: &str,
        limit: u32,
        burst: u32,
        window: u32,
        deadline: Duration,
    ) -> LimitdResult<Verdict> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let rate = f64::from(limit) / f64::from(window);

        let mut conn = self.get_connection().await?;
        let reply: (i64, i64, i64) = timeout(
            deadline,
            self.token_bucket_script
                .key(key)
                .arg(now.as_secs())
                .arg(rate)
                .arg(burst)
                .arg(window)
                .invoke_async(&mut conn),
        )
        .await
        .map_err(|_| LimitdError::Timeout(format!("token bucket check timed out for {}", key)))?
        .map_err(|e| self.command_error(e, "token_bucket"))?;

        Ok(Verdict::from_reply(reply))
    }

    /// Closes the pool; waiting callers get an immediate error.
    pub fn close(&self) {
        self.pool.close();
    }

    fn command_error(&self, error: RedisError, operation: &str) -> LimitdError {
        match error.kind() {
            ErrorKind::IoError => {
                warn!("redis io error during {}: {}", operation, error);
                LimitdError::Redis(format!("connection lost during {}", operation))
            }
            ErrorKind::AuthenticationFailed => {
                error!("redis authentication failed during {}: {}", operation, error);
                LimitdError::Redis("authentication failed".to_string())
            }
            ErrorKind::TypeError => {
                error!("unexpected reply shape during {}: {}", operation, error);
                LimitdError::Internal(format!("unexpected script reply in {}", operation))
            }
            _ => {
                error!("redis error during {}: {}", operation, error);
                LimitdError::Redis(format!("redis error: {}", error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_decodes_allowed_flag() {
        let allowed = Verdict::from_reply((1, 4, 1700000060));
        assert!(allowed.allowed);
        assert_eq!(allowed.remaining, 4);
        assert_eq!(allowed.reset_at, 1700000060);

        let denied = Verdict::from_reply((0, 0, 1700000060));
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
    }
}
