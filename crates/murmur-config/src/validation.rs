//! Configuration validation.
//!
//! Collects every problem in one pass so a bad deployment fails fast with the
//! full list instead of one error per restart.

use crate::{AppConfig, CacheBackend, CacheConfig, JobSchedule, MaintenanceConfig, QueueConfig, RedisConfig};
use std::fmt;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// A capacity, size or worker count is zero.
    ZeroValue { name: String },
    /// A job interval is zero.
    ZeroInterval { job: String },
    /// Redis URL does not use a redis scheme.
    InvalidRedisUrl { url: String },
    /// Log filter is empty.
    EmptyLogLevel,
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroValue { name } => write!(f, "{name} must be greater than zero"),
            Self::ZeroInterval { job } => write!(f, "Interval of job {job} must be greater than zero"),
            Self::InvalidRedisUrl { url } => {
                write!(f, "Invalid Redis URL: {url} (expected redis:// or rediss://)")
            }
            Self::EmptyLogLevel => write!(f, "Log level must not be empty"),
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the entire application configuration.
    ///
    /// Returns Ok(()) if valid, or Err with all validation errors found.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        let uses_redis = config.cache.is_active() && config.cache.backend == CacheBackend::Redis;
        Self::validate_redis(&config.redis, uses_redis, &mut errors);
        Self::validate_cache(&config.cache, &mut errors);
        Self::validate_queue(&config.queue, &mut errors);
        Self::validate_maintenance(&config.maintenance, &mut errors);

        if config.observability.log_level.trim().is_empty() {
            errors.push(ConfigValidationError::EmptyLogLevel);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_redis(config: &RedisConfig, in_use: bool, errors: &mut Vec<ConfigValidationError>) {
        if !in_use {
            return;
        }
        if !(config.url.starts_with("redis://") || config.url.starts_with("rediss://")) {
            errors.push(ConfigValidationError::InvalidRedisUrl {
                url: config.url.clone(),
            });
        }
        non_zero("redis.pool_size", config.pool_size, errors);
    }

    fn validate_cache(config: &CacheConfig, errors: &mut Vec<ConfigValidationError>) {
        non_zero("cache.invalidation_batch_size", config.invalidation_batch_size, errors);
        non_zero("cache.populator_workers", config.populator_workers, errors);
        non_zero("cache.populator_queue_capacity", config.populator_queue_capacity, errors);
    }

    fn validate_queue(config: &QueueConfig, errors: &mut Vec<ConfigValidationError>) {
        non_zero("queue.capacity", config.capacity, errors);
    }

    fn validate_maintenance(config: &MaintenanceConfig, errors: &mut Vec<ConfigValidationError>) {
        for (job, schedule) in config.schedules() {
            Self::validate_schedule(job, schedule, errors);
        }
        non_zero("maintenance.warm_page_size", config.warm_page_size, errors);
    }

    fn validate_schedule(job: &str, schedule: &JobSchedule, errors: &mut Vec<ConfigValidationError>) {
        if schedule.enabled && schedule.interval_secs == 0 {
            errors.push(ConfigValidationError::ZeroInterval { job: job.to_string() });
        }
    }
}

fn non_zero(name: &str, value: usize, errors: &mut Vec<ConfigValidationError>) {
    if value == 0 {
        errors.push(ConfigValidationError::ZeroValue { name: name.to_string() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigValidator::validate(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = AppConfig::default();
        config.queue.capacity = 0;
        config.cache.populator_workers = 0;
        config.maintenance.message_cleanup.interval_secs = 0;

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ConfigValidationError::ZeroInterval {
            job: "message_cleanup".to_string()
        }));
    }

    #[test]
    fn test_disabled_job_interval_ignored() {
        let mut config = AppConfig::default();
        config.maintenance.hashtag_warming.enabled = false;
        config.maintenance.hashtag_warming.interval_secs = 0;
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_redis_url_checked_only_for_redis_backend() {
        let mut config = AppConfig::default();
        config.redis.url = "http://localhost".to_string();
        assert!(ConfigValidator::validate(&config).is_err());

        config.cache.backend = CacheBackend::Memory;
        assert!(ConfigValidator::validate(&config).is_ok());
    }
}
