//! Load-balancer agent-check health agent.
//!
//! Every configured plugin periodically fetches a health signal, reduces it
//! to a single agent-check answer and serves that answer, one line per TCP
//! connection, on its own port.

pub mod config;
pub mod fetch;
pub mod health;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod rules;

pub use config::schema::AgentConfig;
pub use fetch::{Fetcher, FetcherRegistry};
pub use lifecycle::{Agent, Shutdown};
pub use rules::AgentResponse;
