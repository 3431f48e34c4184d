//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Scheduler (scheduler.rs), one per plugin:
//!     Periodic timer
//!     → Fetcher (fetch module, bounded by stop_timeout)
//!     → pipeline.rs (decode, extract, resolve)
//!     → instance.rs publishes into state.rs (CacheCell)
//!
//! Probe (net::responder):
//!     → instance.rs snapshot
//!     → staleness.rs (fresh / stale / never fetched)
//!     → one response line
//! ```
//!
//! # Design Decisions
//! - Probes never wait on a fetch; they read the last published entry
//! - One writer per cache cell, whole-entry swaps, no locks on the read path
//! - A failed cycle keeps the last good response and lets it age

pub mod instance;
pub mod pipeline;
pub mod scheduler;
pub mod staleness;
pub mod state;

pub use instance::PluginInstance;
pub use scheduler::Scheduler;
pub use staleness::{Decision, Freshness, StalenessPolicy};
pub use state::{CacheCell, CacheEntry, PipelineError};
