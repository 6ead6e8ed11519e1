//! # Murmur Core
//!
//! Core types, collaborator traits, and error definitions shared by the
//! Murmur feed engine crates.
//!
//! The relational store, HTTP handlers and notification delivery live outside
//! this workspace; they are reached only through the repository traits in
//! [`repository`].

pub mod domain;
pub mod error;
pub mod id;
pub mod pagination;
pub mod repository;
pub mod result;

#[cfg(feature = "testing")]
pub mod testing;

pub use domain::*;
pub use error::*;
pub use id::*;
pub use pagination::*;
pub use repository::*;
pub use result::*;

// Re-export shaku for dependency injection
pub use shaku::Interface;
