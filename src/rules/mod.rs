//! Rule evaluation subsystem.
//!
//! # Data Flow
//! ```text
//! payload (JSON value or raw text)
//!     → expression.rs (thresholds_metric / patterns_metric)
//!     → thresholds.rs (numeric metric → token, first match wins)
//!     → patterns.rs (textual metric → token, first match wins)
//!     → response.rs (merge into a single AgentResponse)
//! ```
//!
//! # Design Decisions
//! - Everything here is pure: same payload and rules, same answer
//! - Rules are compiled once from configuration and shared read-only
//! - No rule table matching falls back to `default_response`

pub mod expression;
pub mod patterns;
pub mod response;
pub mod thresholds;

use serde_json::Value;
use thiserror::Error;

use crate::rules::expression::ExpressionError;
use crate::rules::patterns::PatternTable;
use crate::rules::response::ResponseError;
use crate::rules::thresholds::ThresholdTable;

pub use response::{AgentResponse, Status, Weight};

/// Errors found while compiling configured rules.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule {index}: {message}")]
    Malformed { index: usize, message: String },

    #[error("rule {index}: threshold '{value}' is not numeric")]
    NonNumeric { index: usize, value: String },

    #[error("rule {index}: {source}")]
    Response {
        index: usize,
        #[source]
        source: ResponseError,
    },

    #[error("rule {index}: invalid pattern: {source}")]
    Pattern {
        index: usize,
        #[source]
        source: regex::Error,
    },

    #[error("metric expression '{expression}': {source}")]
    Expression {
        expression: String,
        #[source]
        source: ExpressionError,
    },
}

impl RuleError {
    pub(crate) fn malformed(index: usize, message: impl Into<String>) -> Self {
        RuleError::Malformed {
            index,
            message: message.into(),
        }
    }

    pub(crate) fn expression(expression: &str, source: ExpressionError) -> Self {
        RuleError::Expression {
            expression: expression.to_string(),
            source,
        }
    }
}

/// Result of running the rules over one payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Threshold metric, when a threshold table is configured.
    pub metric: Option<f64>,
    pub response: AgentResponse,
}

/// All rules of one plugin instance.
#[derive(Debug, Clone)]
pub struct RuleSet {
    thresholds: Option<ThresholdTable>,
    patterns: Option<PatternTable>,
    default_response: AgentResponse,
}

impl RuleSet {
    pub fn new(
        thresholds: Option<ThresholdTable>,
        patterns: Option<PatternTable>,
        default_response: AgentResponse,
    ) -> Self {
        Self {
            thresholds,
            patterns,
            default_response,
        }
    }

    pub fn default_response(&self) -> AgentResponse {
        self.default_response
    }

    /// Extract metrics from `payload` and resolve them to one response.
    ///
    /// Threshold and pattern answers are merged with the pattern answer
    /// applied last. When neither table matches, `default_response` is used.
    pub fn evaluate(&self, payload: &Value) -> Result<Evaluation, ExpressionError> {
        let mut metric = None;
        let mut threshold_match = None;
        if let Some(table) = &self.thresholds {
            let value = table.extract(payload)?;
            metric = Some(value);
            threshold_match = table.resolve(value);
        }

        let pattern_match = match &self.patterns {
            Some(table) => table.resolve(&table.extract(payload)?),
            None => None,
        };

        let response = match (threshold_match, pattern_match) {
            (None, None) => self.default_response,
            (t, p) => t
                .unwrap_or_default()
                .merge(p.unwrap_or_default()),
        };

        Ok(Evaluation { metric, response })
    }
}
