//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming probe connection
//!     → listener.rs (accept, connection limits)
//!     → connection.rs (lifecycle tracking)
//!     → responder.rs (snapshot, staleness, write one line, close)
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - The agent never reads from the probe; it writes and closes

pub mod connection;
pub mod listener;
pub mod responder;

pub use listener::{Listener, ListenerError};
pub use responder::{AgentServer, ProbeError};
