//! In-memory, channel-backed queue provider.
//!
//! Best-effort only: nothing survives a restart and there is no lease on
//! dequeued jobs.

mod queue;

pub use queue::InMemoryQueueProvider;
