//! Staleness policy: decides what a probe is told, given the cached entry
//! and the current time.

use std::time::{Duration, Instant};

use crate::health::state::CacheEntry;
use crate::rules::AgentResponse;

/// How fresh the cached result was when a probe was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale { age: Duration },
    NeverFetched,
}

impl Freshness {
    pub fn is_stale(&self) -> bool {
        !matches!(self, Freshness::Fresh)
    }
}

/// Answer for one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub response: AgentResponse,
    pub freshness: Freshness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    /// Results older than this are stale. `None` disables aging.
    pub max_age: Option<Duration>,
    pub stale_response: AgentResponse,
    pub startup_response: AgentResponse,
}

impl StalenessPolicy {
    /// Build a policy from the configured interval in seconds, 0 meaning
    /// results never go stale.
    pub fn new(staleness_secs: u64, stale_response: AgentResponse, startup_response: AgentResponse) -> Self {
        Self {
            max_age: (staleness_secs > 0).then(|| Duration::from_secs(staleness_secs)),
            stale_response,
            startup_response,
        }
    }

    pub fn evaluate(&self, entry: &CacheEntry, now: Instant) -> Decision {
        let Some(age) = entry.age(now) else {
            return Decision {
                response: self.startup_response,
                freshness: Freshness::NeverFetched,
            };
        };

        match self.max_age {
            Some(max_age) if age > max_age => Decision {
                response: self.stale_response,
                freshness: Freshness::Stale { age },
            },
            _ => Decision {
                response: entry.response,
                freshness: Freshness::Fresh,
            },
        }
    }
}
