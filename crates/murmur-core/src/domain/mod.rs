//! Domain types shared by the cache, feed and job crates.

mod feed;
mod post;
mod relationship;

pub use feed::*;
pub use post::*;
pub use relationship::*;
