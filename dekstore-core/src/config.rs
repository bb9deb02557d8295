//! Configuration types

use std::time::Duration;

use crate::error::ConfigError;

/// Default cache entry lifetime.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default period between sweeps of expired cache entries.
pub const DEFAULT_CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(600);

/// Default deadline for a single durable backend call.
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the caching key store.
///
/// A zero `cache_ttl` disables caching entirely: every read goes to the
/// durable store. A zero `cache_cleanup_interval` disables the background
/// sweep, leaving expiry purely lazy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Lifetime of a cache entry, counted from insertion.
    pub cache_ttl: Duration,
    /// How often the janitor purges expired entries.
    pub cache_cleanup_interval: Duration,
    /// Deadline applied to backend calls that don't supply their own.
    pub backend_timeout: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_cleanup_interval: DEFAULT_CACHE_CLEANUP_INTERVAL,
            backend_timeout: Some(DEFAULT_BACKEND_TIMEOUT),
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create CacheConfig from environment variables.
    ///
    /// Environment variables:
    /// - `DEKSTORE_CACHE_TTL_SECS`: entry lifetime (default: 300, 0 disables caching)
    /// - `DEKSTORE_CACHE_CLEANUP_INTERVAL_SECS`: sweep period (default: 600, 0 disables)
    /// - `DEKSTORE_BACKEND_TIMEOUT_MS`: backend deadline (default: 5000, 0 = none)
    pub fn from_env() -> Result<Self, ConfigError> {
        let cache_ttl = env_u64("DEKSTORE_CACHE_TTL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CACHE_TTL);

        let cache_cleanup_interval = env_u64("DEKSTORE_CACHE_CLEANUP_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CACHE_CLEANUP_INTERVAL);

        let backend_timeout = match env_u64("DEKSTORE_BACKEND_TIMEOUT_MS")? {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => Some(DEFAULT_BACKEND_TIMEOUT),
        };

        let config = Self {
            cache_ttl,
            cache_cleanup_interval,
            backend_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the janitor interval.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cache_cleanup_interval = interval;
        self
    }

    /// Set or clear the default backend deadline.
    pub fn with_backend_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.backend_timeout = timeout;
        self
    }

    /// Whether reads and writes populate the cache at all.
    pub fn caching_enabled(&self) -> bool {
        !self.cache_ttl.is_zero()
    }

    /// Reject settings that would make every backend call fail instantly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(timeout) = self.backend_timeout {
            if timeout.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: "backend_timeout".to_string(),
                    value: "0".to_string(),
                    reason: "use None to disable the deadline".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                field: name.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.cache_cleanup_interval, Duration::from_secs(600));
        assert_eq!(config.backend_timeout, Some(Duration::from_secs(5)));
        assert!(config.caching_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_config_builder() {
        let config = CacheConfig::new()
            .with_ttl(Duration::from_secs(30))
            .with_cleanup_interval(Duration::from_secs(60))
            .with_backend_timeout(None);

        assert_eq!(config.cache_ttl, Duration::from_secs(30));
        assert_eq!(config.cache_cleanup_interval, Duration::from_secs(60));
        assert_eq!(config.backend_timeout, None);
    }

    #[test]
    fn test_zero_ttl_disables_caching() {
        let config = CacheConfig::new().with_ttl(Duration::ZERO);
        assert!(!config.caching_enabled());
        assert!(CacheConfig::new().caching_enabled());
    }

    #[test]
    fn test_zero_backend_timeout_is_rejected() {
        let config = CacheConfig::new().with_backend_timeout(Some(Duration::ZERO));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "backend_timeout"
        ));
    }

    #[test]
    fn test_env_u64_unset_is_none() {
        assert_eq!(
            env_u64("DEKSTORE_TEST_SURELY_UNSET_VARIABLE").unwrap(),
            None
        );
    }
}
