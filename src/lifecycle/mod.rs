//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → Build plugins → Bind listeners → Start schedulers
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain probes → Stop schedulers → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then plugins, then listeners
//! - Ordered shutdown: stop accept, drain, stop schedulers
//! - Shutdown has timeouts: grace for probes, stop_timeout for schedulers

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{build_plugins, start, Agent, StartupError};
