//! Application configuration structures.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// Redis configuration.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Feed cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// In-process queue configuration.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Job scheduler configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Maintenance job configuration.
    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Application name.
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Environment (development, staging, production).
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            environment: default_environment(),
        }
    }
}

fn default_app_name() -> String {
    "murmur".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

/// Redis connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL.
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Prefix prepended to every cache key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_pool_size(),
            connect_timeout_secs: default_connect_timeout(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl RedisConfig {
    /// Returns the connect timeout as a Duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_pool_size() -> usize {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_key_prefix() -> String {
    "murmur".to_string()
}

/// Storage used behind the feed cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Shared Redis instance.
    #[default]
    Redis,
    /// Process-local map, useful for single-node setups and tests.
    Memory,
    /// No caching; every read goes to the source of truth.
    Disabled,
}

/// Feed cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Master switch for the feed cache.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cache backend.
    #[serde(default)]
    pub backend: CacheBackend,

    /// TTL of home feed entries in seconds.
    #[serde(default = "default_feed_ttl")]
    pub feed_ttl_secs: u64,

    /// TTL of cached posts in seconds.
    #[serde(default = "default_post_ttl")]
    pub post_ttl_secs: u64,

    /// TTL of the explore feed entry in seconds.
    #[serde(default = "default_explore_ttl")]
    pub explore_ttl_secs: u64,

    /// TTL of hashtag feed entries in seconds.
    #[serde(default = "default_hashtag_ttl")]
    pub hashtag_ttl_secs: u64,

    /// Maximum number of keys removed per delete round trip.
    #[serde(default = "default_invalidation_batch_size")]
    pub invalidation_batch_size: usize,

    /// Number of background population workers.
    #[serde(default = "default_populator_workers")]
    pub populator_workers: usize,

    /// Pending population tasks accepted before new ones are dropped.
    #[serde(default = "default_populator_queue_capacity")]
    pub populator_queue_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::default(),
            feed_ttl_secs: default_feed_ttl(),
            post_ttl_secs: default_post_ttl(),
            explore_ttl_secs: default_explore_ttl(),
            hashtag_ttl_secs: default_hashtag_ttl(),
            invalidation_batch_size: default_invalidation_batch_size(),
            populator_workers: default_populator_workers(),
            populator_queue_capacity: default_populator_queue_capacity(),
        }
    }
}

impl CacheConfig {
    /// Returns true when a backend should be constructed at all.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && self.backend != CacheBackend::Disabled
    }

    #[must_use]
    pub const fn feed_ttl(&self) -> Duration {
        Duration::from_secs(self.feed_ttl_secs)
    }

    #[must_use]
    pub const fn post_ttl(&self) -> Duration {
        Duration::from_secs(self.post_ttl_secs)
    }

    #[must_use]
    pub const fn explore_ttl(&self) -> Duration {
        Duration::from_secs(self.explore_ttl_secs)
    }

    #[must_use]
    pub const fn hashtag_ttl(&self) -> Duration {
        Duration::from_secs(self.hashtag_ttl_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_feed_ttl() -> u64 {
    900 // 15 minutes
}

fn default_post_ttl() -> u64 {
    3600 // 1 hour
}

fn default_explore_ttl() -> u64 {
    300 // 5 minutes
}

fn default_hashtag_ttl() -> u64 {
    300 // 5 minutes
}

fn default_invalidation_batch_size() -> usize {
    500
}

fn default_populator_workers() -> usize {
    4
}

fn default_populator_queue_capacity() -> usize {
    1024
}

/// In-process queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Capacity of each named queue.
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,

    /// Default blocking time of a dequeue call in milliseconds.
    #[serde(default = "default_dequeue_timeout")]
    pub default_dequeue_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            default_dequeue_timeout_ms: default_dequeue_timeout(),
        }
    }
}

impl QueueConfig {
    #[must_use]
    pub const fn default_dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.default_dequeue_timeout_ms)
    }
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_dequeue_timeout() -> u64 {
    1000
}

/// Job scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Enable the scheduler.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Timeout applied to jobs that do not set their own, in seconds.
    #[serde(default = "default_job_timeout")]
    pub default_timeout_secs: u64,

    /// Retry count applied to jobs that do not set their own.
    #[serde(default)]
    pub default_retry_count: u32,

    /// Delay between retries in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub default_retry_delay_ms: u64,

    /// Upper bound on waiting for in-flight jobs during shutdown, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_timeout_secs: default_job_timeout(),
            default_retry_count: 0,
            default_retry_delay_ms: default_retry_delay(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    #[must_use]
    pub const fn default_retry_delay(&self) -> Duration {
        Duration::from_millis(self.default_retry_delay_ms)
    }

    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn default_job_timeout() -> u64 {
    300 // 5 minutes
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// Schedule of a single maintenance job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSchedule {
    /// Whether the job is registered at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between runs in seconds.
    pub interval_secs: u64,

    /// Run once immediately when the scheduler starts.
    #[serde(default)]
    pub run_on_start: bool,

    /// Attempts after the first failure.
    #[serde(default = "default_job_retries")]
    pub retry_count: u32,
}

impl JobSchedule {
    #[must_use]
    pub const fn every(interval_secs: u64, run_on_start: bool) -> Self {
        Self {
            enabled: true,
            interval_secs,
            run_on_start,
            retry_count: 2,
        }
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_job_retries() -> u32 {
    2
}

/// Maintenance jobs wired by the runtime's job factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_notification_cleanup")]
    pub notification_cleanup: JobSchedule,

    #[serde(default = "default_message_cleanup")]
    pub message_cleanup: JobSchedule,

    #[serde(default = "default_status_cleanup")]
    pub status_cleanup: JobSchedule,

    #[serde(default = "default_explore_warming")]
    pub explore_warming: JobSchedule,

    #[serde(default = "default_hashtag_warming")]
    pub hashtag_warming: JobSchedule,

    /// Read notifications older than this many days are deleted.
    #[serde(default = "default_notification_retention")]
    pub notification_retention_days: u32,

    /// Number of posts fetched when warming a feed.
    #[serde(default = "default_warm_page_size")]
    pub warm_page_size: usize,

    /// Hashtags whose feeds are kept warm.
    #[serde(default)]
    pub warm_hashtags: Vec<String>,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            notification_cleanup: default_notification_cleanup(),
            message_cleanup: default_message_cleanup(),
            status_cleanup: default_status_cleanup(),
            explore_warming: default_explore_warming(),
            hashtag_warming: default_hashtag_warming(),
            notification_retention_days: default_notification_retention(),
            warm_page_size: default_warm_page_size(),
            warm_hashtags: Vec::new(),
        }
    }
}

impl MaintenanceConfig {
    /// All job schedules keyed by the job name they configure.
    #[must_use]
    pub fn schedules(&self) -> [(&'static str, &JobSchedule); 5] {
        [
            ("notification_cleanup", &self.notification_cleanup),
            ("message_cleanup", &self.message_cleanup),
            ("status_cleanup", &self.status_cleanup),
            ("explore_feed_warming", &self.explore_warming),
            ("hashtag_feed_warming", &self.hashtag_warming),
        ]
    }
}

fn default_notification_cleanup() -> JobSchedule {
    JobSchedule::every(24 * 3600, false)
}

fn default_message_cleanup() -> JobSchedule {
    JobSchedule::every(3600, false)
}

fn default_status_cleanup() -> JobSchedule {
    JobSchedule::every(3600, true)
}

fn default_explore_warming() -> JobSchedule {
    JobSchedule::every(5 * 60, true)
}

fn default_hashtag_warming() -> JobSchedule {
    JobSchedule::every(10 * 60, false)
}

fn default_notification_retention() -> u32 {
    30
}

fn default_warm_page_size() -> usize {
    50
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log filter directive (e.g. `info` or `murmur_feed=debug,info`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON logs instead of the pretty format.
    #[serde(default)]
    pub json_logs: bool,

    /// Install the Prometheus recorder.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            metrics_enabled: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.queue.capacity, 1000);
        assert_eq!(config.cache.invalidation_batch_size, 500);
        assert_eq!(config.cache.backend, CacheBackend::Redis);
        assert!(config.cache.is_active());
        assert_eq!(config.maintenance.notification_retention_days, 30);
    }

    #[test]
    fn test_partial_section_uses_field_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"cache": {"backend": "memory", "feed_ttl_secs": 60}}"#).unwrap();
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.feed_ttl(), Duration::from_secs(60));
        assert_eq!(config.cache.post_ttl_secs, 3600);
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_disabled_backend_is_inactive() {
        let cache = CacheConfig {
            backend: CacheBackend::Disabled,
            ..CacheConfig::default()
        };
        assert!(!cache.is_active());
    }

    #[test]
    fn test_schedule_names() {
        let config = MaintenanceConfig::default();
        let names: Vec<_> = config.schedules().iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            [
                "notification_cleanup",
                "message_cleanup",
                "status_cleanup",
                "explore_feed_warming",
                "hashtag_feed_warming"
            ]
        );
    }
}
