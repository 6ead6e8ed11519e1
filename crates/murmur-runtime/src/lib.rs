//! # Murmur Runtime
//!
//! Wires the feed engine together from an [`AppConfig`](murmur_config::AppConfig)
//! and the repositories supplied by the host application.
//!
//! ```rust,ignore
//! let config = ConfigLoader::load("config")?;
//! telemetry::init_tracing(&config.observability);
//! let _metrics = telemetry::init_metrics(&config.observability)?;
//!
//! let runtime = Runtime::build(config, repositories)?;
//! runtime.start()?;
//! let page = runtime.feeds().explore_feed(FeedQuery::first_page(None, 20)).await?;
//! runtime.shutdown().await;
//! ```

pub mod di;
pub mod job_factory;
pub mod runtime;
pub mod telemetry;

pub use di::{build_cache_module, resolve_cache_backend, CacheModule};
pub use job_factory::JobFactory;
pub use runtime::{Repositories, Runtime};
