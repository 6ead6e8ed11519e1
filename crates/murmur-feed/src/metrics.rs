//! Prometheus metrics for the feed cache and background population.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Metric names for the feed cache.
pub mod names {
    /// Total feed entry lookups served from cache.
    pub const FEED_CACHE_HITS_TOTAL: &str = "murmur_feed_cache_hits_total";
    /// Total feed entry lookups that missed.
    pub const FEED_CACHE_MISSES_TOTAL: &str = "murmur_feed_cache_misses_total";
    /// Total entry hits discarded because cached posts were missing.
    pub const FEED_CACHE_PARTIAL_HITS_TOTAL: &str = "murmur_feed_cache_partial_hits_total";
    /// Total post snapshot lookups by outcome.
    pub const POST_CACHE_LOOKUPS_TOTAL: &str = "murmur_post_cache_lookups_total";
    /// Total cache writes.
    pub const FEED_CACHE_WRITES_TOTAL: &str = "murmur_feed_cache_writes_total";
    /// Total writes discarded because an invalidation overtook them.
    pub const FEED_CACHE_STALE_WRITES_TOTAL: &str = "murmur_feed_cache_stale_writes_total";
    /// Total keys invalidated.
    pub const FEED_CACHE_INVALIDATIONS_TOTAL: &str = "murmur_feed_cache_invalidations_total";
    /// Total cache backend errors.
    pub const FEED_CACHE_ERRORS_TOTAL: &str = "murmur_feed_cache_errors_total";

    /// Total population tasks by outcome.
    pub const POPULATOR_TASKS_TOTAL: &str = "murmur_populator_tasks_total";
    /// Total population tasks dropped because the populator was saturated.
    pub const POPULATOR_DROPPED_TOTAL: &str = "murmur_populator_dropped_total";
    /// Population task duration in seconds.
    pub const POPULATOR_DURATION_SECONDS: &str = "murmur_populator_duration_seconds";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::FEED_CACHE_HITS_TOTAL, "Total number of feed cache hits");
    describe_counter!(names::FEED_CACHE_MISSES_TOTAL, "Total number of feed cache misses");
    describe_counter!(
        names::FEED_CACHE_PARTIAL_HITS_TOTAL,
        "Total number of feed entries served from the source because posts were missing"
    );
    describe_counter!(names::POST_CACHE_LOOKUPS_TOTAL, "Total number of post snapshot lookups");
    describe_counter!(names::FEED_CACHE_WRITES_TOTAL, "Total number of cache writes");
    describe_counter!(
        names::FEED_CACHE_STALE_WRITES_TOTAL,
        "Total number of cache writes discarded after a concurrent invalidation"
    );
    describe_counter!(names::FEED_CACHE_INVALIDATIONS_TOTAL, "Total number of invalidated keys");
    describe_counter!(names::FEED_CACHE_ERRORS_TOTAL, "Total number of cache backend errors");

    describe_counter!(names::POPULATOR_TASKS_TOTAL, "Total number of background population tasks");
    describe_counter!(names::POPULATOR_DROPPED_TOTAL, "Total number of dropped population tasks");
    describe_histogram!(names::POPULATOR_DURATION_SECONDS, "Population task duration in seconds");
}

/// Feed cache metrics recorder.
#[derive(Clone)]
pub struct CacheMetrics;

impl CacheMetrics {
    pub fn hit(feed: &'static str) {
        counter!(names::FEED_CACHE_HITS_TOTAL, "feed" => feed).increment(1);
    }

    pub fn miss(feed: &'static str) {
        counter!(names::FEED_CACHE_MISSES_TOTAL, "feed" => feed).increment(1);
    }

    pub fn partial_hit(feed: &'static str) {
        counter!(names::FEED_CACHE_PARTIAL_HITS_TOTAL, "feed" => feed).increment(1);
    }

    /// Record a batched post lookup.
    pub fn post_lookup(found: usize, missing: usize) {
        counter!(names::POST_CACHE_LOOKUPS_TOTAL, "outcome" => "hit").increment(found as u64);
        counter!(names::POST_CACHE_LOOKUPS_TOTAL, "outcome" => "miss").increment(missing as u64);
    }

    pub fn write(entry: &'static str, count: usize) {
        counter!(names::FEED_CACHE_WRITES_TOTAL, "entry" => entry).increment(count as u64);
    }

    pub fn stale_write(entry: &'static str, count: usize) {
        counter!(names::FEED_CACHE_STALE_WRITES_TOTAL, "entry" => entry).increment(count as u64);
    }

    pub fn invalidated(entry: &'static str, count: usize) {
        counter!(names::FEED_CACHE_INVALIDATIONS_TOTAL, "entry" => entry).increment(count as u64);
    }

    pub fn error(operation: &'static str) {
        counter!(names::FEED_CACHE_ERRORS_TOTAL, "operation" => operation).increment(1);
    }
}

/// Background populator metrics recorder.
#[derive(Clone)]
pub struct PopulatorMetrics;

impl PopulatorMetrics {
    /// Record a finished population task.
    pub fn task_finished(label: &'static str, succeeded: bool, duration: Duration) {
        let status = if succeeded { "succeeded" } else { "failed" };
        counter!(names::POPULATOR_TASKS_TOTAL, "task" => label, "status" => status).increment(1);
        histogram!(names::POPULATOR_DURATION_SECONDS, "task" => label).record(duration.as_secs_f64());
    }

    pub fn task_dropped(label: &'static str) {
        counter!(names::POPULATOR_DROPPED_TOTAL, "task" => label).increment(1);
    }
}
