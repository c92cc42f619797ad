//! Rate limit policy types shared by the registry and the limiter engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Limiting algorithm selected per endpoint.
///
/// The two variants map one-to-one onto the store-side scripts; dispatch
/// happens at check time on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    SlidingWindow,
    TokenBucket,
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sliding_window" => Ok(Algorithm::SlidingWindow),
            "token_bucket" => Ok(Algorithm::TokenBucket),
            other => Err(format!(
                "unknown algorithm {:?} (expected sliding_window or token_bucket)",
                other
            )),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::SlidingWindow => write!(f, "sliding_window"),
            Algorithm::TokenBucket => write!(f, "token_bucket"),
        }
    }
}

/// A validated per-endpoint policy as persisted in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub path: String,
    pub algorithm: Algorithm,
    pub key_strategy: String,
    pub limit: u32,
    pub window_seconds: u32,
    #[serde(default)]
    pub burst: u32,
}

impl Policy {
    /// Bucket capacity for the token bucket; a zero or absent burst
    /// falls back to the sustained limit.
    pub fn effective_burst(&self) -> u32 {
        if self.burst == 0 {
            self.limit
        } else {
            self.burst
        }
    }
}

/// A policy as it arrives on the wire, before validation.
///
/// The algorithm is a free string here so that an unknown value is
/// rejected with a descriptive message instead of a decode failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySpec {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub algorithm: String,
    #[serde(default)]
    pub key_strategy: String,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub window_seconds: i64,
    #[serde(default)]
    pub burst: i64,
}

impl PolicySpec {
    /// Validates the spec and converts it into a persisted [`Policy`].
    pub fn to_policy(&self) -> Result<Policy, String> {
        if self.path.is_empty() {
            return Err("path must not be empty".to_string());
        }

        let algorithm = self.algorithm.parse::<Algorithm>()?;

        if self.key_strategy.is_empty() {
            return Err("key_strategy must not be empty".to_string());
        }

        let max = i64::from(i32::MAX);
        if self.limit <= 0 || self.limit > max {
            return Err(format!("limit must be a positive int32, got {}", self.limit));
        }

        if self.window_seconds <= 0 || self.window_seconds > max {
            return Err(format!(
                "window_seconds must be a positive int32, got {}",
                self.window_seconds
            ));
        }

        if self.burst < 0 || self.burst > max {
            return Err(format!(
                "burst must be a non-negative int32, got {}",
                self.burst
            ));
        }

        Ok(Policy {
            path: self.path.clone(),
            algorithm,
            key_strategy: self.key_strategy.clone(),
            limit: self.limit as u32,
            window_seconds: self.window_seconds as u32,
            burst: self.burst as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> PolicySpec {
        PolicySpec {
            path: "/api/login".to_string(),
            algorithm: "sliding_window".to_string(),
            key_strategy: "ip".to_string(),
            limit: 5,
            window_seconds: 60,
            burst: 0,
        }
    }

    #[test]
    fn valid_spec_converts() {
        let policy = spec().to_policy().unwrap();
        assert_eq!(policy.path, "/api/login");
        assert_eq!(policy.algorithm, Algorithm::SlidingWindow);
        assert_eq!(policy.limit, 5);
        assert_eq!(policy.window_seconds, 60);
        assert_eq!(policy.burst, 0);
    }

    #[test]
    fn rejects_empty_path() {
        let mut s = spec();
        s.path = String::new();
        assert!(s.to_policy().unwrap_err().contains("path"));
    }

    #[test]
    fn rejects_unknown_algorithm() {
        let mut s = spec();
        s.algorithm = "leaky_bucket".to_string();
        assert!(s.to_policy().unwrap_err().contains("unknown algorithm"));
    }

    #[test]
    fn rejects_non_positive_limit() {
        let mut s = spec();
        s.limit = 0;
        assert!(s.to_policy().unwrap_err().contains("limit"));
        s.limit = -3;
        assert!(s.to_policy().unwrap_err().contains("limit"));
    }

    #[test]
    fn rejects_limit_beyond_int32() {
        let mut s = spec();
        s.limit = i64::from(i32::MAX) + 1;
        assert!(s.to_policy().unwrap_err().contains("int32"));
    }

    #[test]
    fn rejects_non_positive_window() {
        let mut s = spec();
        s.window_seconds = 0;
        assert!(s.to_policy().unwrap_err().contains("window_seconds"));
    }

    #[test]
    fn rejects_empty_key_strategy() {
        let mut s = spec();
        s.key_strategy = String::new();
        assert!(s.to_policy().unwrap_err().contains("key_strategy"));
    }

    #[test]
    fn effective_burst_defaults_to_limit() {
        let mut policy = spec().to_policy().unwrap();
        assert_eq!(policy.effective_burst(), 5);
        policy.burst = 20;
        assert_eq!(policy.effective_burst(), 20);
    }

    #[test]
    fn algorithm_serializes_as_snake_case() {
        assert_eq!(
            serde_json::to_string(&Algorithm::SlidingWindow).unwrap(),
            "\"sliding_window\""
        );
        assert_eq!(
            serde_json::to_string(&Algorithm::TokenBucket).unwrap(),
            "\"token_bucket\""
        );
    }

    #[test]
    fn policy_roundtrips_without_burst_field() {
        let raw = r#"{"path":"/x","algorithm":"token_bucket","key_strategy":"ip","limit":10,"window_seconds":30}"#;
        let policy: Policy = serde_json::from_str(raw).unwrap();
        assert_eq!(policy.burst, 0);
        assert_eq!(policy.effective_burst(), 10);

        let reparsed: Policy =
            serde_json::from_str(&serde_json::to_string(&policy).unwrap()).unwrap();
        assert_eq!(reparsed, policy);
    }
}
