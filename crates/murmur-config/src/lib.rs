//! # Murmur Config
//!
//! Configuration management for the Murmur feed engine.
//! Supports layered configuration from files, environment variables
//! and runtime reload.

mod app_config;
mod loader;
mod validation;

pub use app_config::*;
pub use loader::*;
pub use validation::*;
