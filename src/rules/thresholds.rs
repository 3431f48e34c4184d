//! Threshold rules: numeric metric → response token.
//!
//! # Rule Shapes
//! ```text
//! { pct = 7000, min_threshold_response = 1 }   weight rule
//! { pct = 7000, scale = true }                 proportional weight rule
//! { drain = ">7000" }                          comparison rule
//! { down = 0 }                                 equality rule
//! ```
//!
//! # Design Decisions
//! - Rules are a priority-ordered decision table: the first rule that
//!   matches wins and configuration order is the only tie-break
//! - Boundaries are parsed at load time; a non-numeric boundary is a
//!   configuration error, never a runtime one

use crate::rules::expression::{Expression, ExpressionError};
use crate::rules::response::{AgentResponse, Weight};
use crate::rules::RuleError;
use serde_json::Value;

/// Comparison operator of a comparison rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Comparison {
    fn holds(&self, metric: f64, boundary: f64) -> bool {
        match self {
            Comparison::Eq => metric == boundary,
            Comparison::Ne => metric != boundary,
            Comparison::Lt => metric < boundary,
            Comparison::Gt => metric > boundary,
            Comparison::Le => metric <= boundary,
            Comparison::Ge => metric >= boundary,
        }
    }
}

/// Split a boundary such as `">=7000"` into its operator and value.
fn parse_boundary(index: usize, raw: &str) -> Result<(Comparison, f64), RuleError> {
    let s = raw.trim();
    let (op, rest) = [
        (">=", Comparison::Ge),
        ("<=", Comparison::Le),
        ("!=", Comparison::Ne),
        ("==", Comparison::Eq),
        (">", Comparison::Gt),
        ("<", Comparison::Lt),
        ("!", Comparison::Ne),
        ("=", Comparison::Eq),
    ]
    .iter()
    .find_map(|(prefix, op)| s.strip_prefix(prefix).map(|rest| (*op, rest)))
    .unwrap_or((Comparison::Eq, s));

    match rest.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Ok((op, n)),
        _ => Err(RuleError::NonNumeric {
            index,
            value: raw.to_string(),
        }),
    }
}

fn boundary_from_toml(index: usize, value: &toml::Value) -> Result<(Comparison, f64), RuleError> {
    match value {
        toml::Value::Integer(n) => Ok((Comparison::Eq, *n as f64)),
        toml::Value::Float(n) if n.is_finite() => Ok((Comparison::Eq, *n)),
        toml::Value::String(s) => parse_boundary(index, s),
        other => Err(RuleError::NonNumeric {
            index,
            value: other.to_string(),
        }),
    }
}

/// One entry of the threshold table.
#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdRule {
    /// Matches once the metric reaches `boundary` and answers
    /// `min_response`. With `scale`, a metric below the boundary answers
    /// the remaining headroom as a weight.
    Weight {
        boundary: f64,
        min_response: AgentResponse,
        scale: bool,
    },
    /// Answers `response` when `metric <op> boundary` holds.
    Compare {
        op: Comparison,
        boundary: f64,
        response: AgentResponse,
    },
}

impl ThresholdRule {
    /// Build a rule from one configured table.
    pub fn from_toml(index: usize, table: &toml::Table) -> Result<Self, RuleError> {
        if let Some(pct) = table.get("pct") {
            if let Some(key) = table
                .keys()
                .find(|k| !matches!(k.as_str(), "pct" | "min_threshold_response" | "scale"))
            {
                return Err(RuleError::malformed(index, format!("unexpected key '{}' in pct rule", key)));
            }

            let (_, boundary) = boundary_from_toml(index, pct)?;
            if boundary <= 0.0 {
                return Err(RuleError::malformed(index, "pct boundary must be positive"));
            }

            let min_response = match table.get("min_threshold_response") {
                Some(value) => AgentResponse::from_toml(value)
                    .map_err(|source| RuleError::Response { index, source })?,
                None => AgentResponse::Weight(Weight::new(1).map_err(|source| RuleError::Response {
                    index,
                    source,
                })?),
            };

            let scale = match table.get("scale") {
                None => false,
                Some(toml::Value::Boolean(b)) => *b,
                Some(_) => return Err(RuleError::malformed(index, "'scale' must be a boolean")),
            };

            return Ok(ThresholdRule::Weight {
                boundary,
                min_response,
                scale,
            });
        }

        let mut entries = table.iter();
        match (entries.next(), entries.next()) {
            (Some((token, value)), None) => {
                let response = token
                    .parse::<AgentResponse>()
                    .map_err(|source| RuleError::Response { index, source })?;
                let (op, boundary) = boundary_from_toml(index, value)?;
                Ok(ThresholdRule::Compare {
                    op,
                    boundary,
                    response,
                })
            }
            (None, _) => Err(RuleError::malformed(index, "empty threshold rule")),
            _ => Err(RuleError::malformed(
                index,
                "a comparison rule must have exactly one '<response> = <threshold>' entry",
            )),
        }
    }

    /// Decide what this rule says about `metric`.
    pub fn apply(&self, metric: f64) -> RuleOutcome {
        match self {
            ThresholdRule::Weight {
                boundary,
                min_response,
                scale,
            } => {
                if !scale {
                    return RuleOutcome::matched_if(metric >= *boundary, *min_response);
                }
                let pct = (100.0 - (metric / boundary) * 100.0).trunc();
                if pct <= 0.0 {
                    tracing::debug!(metric, boundary, "Weight exhausted, using min_threshold_response");
                    RuleOutcome::Match(*min_response)
                } else if pct > 100.0 {
                    tracing::debug!(metric, boundary, pct, "Weight above 100, ending threshold scan");
                    RuleOutcome::Stop
                } else {
                    match Weight::new(pct as i64) {
                        Ok(weight) => RuleOutcome::Match(AgentResponse::Weight(weight)),
                        Err(_) => RuleOutcome::Stop,
                    }
                }
            }
            ThresholdRule::Compare {
                op,
                boundary,
                response,
            } => RuleOutcome::matched_if(op.holds(metric, *boundary), *response),
        }
    }
}

/// Result of applying one threshold rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuleOutcome {
    /// The rule answers.
    Match(AgentResponse),
    /// The rule does not apply; try the next one.
    Pass,
    /// No answer, and later rules are not consulted.
    Stop,
}

impl RuleOutcome {
    fn matched_if(cond: bool, response: AgentResponse) -> Self {
        if cond {
            RuleOutcome::Match(response)
        } else {
            RuleOutcome::Pass
        }
    }
}

/// Ordered threshold rules plus the expression producing their metric.
#[derive(Debug, Clone)]
pub struct ThresholdTable {
    metric: Expression,
    rules: Vec<ThresholdRule>,
}

impl ThresholdTable {
    pub fn new(metric: Expression, rules: Vec<ThresholdRule>) -> Self {
        Self { metric, rules }
    }

    /// Compile the configured metric expression and rule tables.
    pub fn compile(metric: &str, rules: &[toml::Table]) -> Result<Self, Vec<RuleError>> {
        let mut errors = Vec::new();

        let metric = Expression::compile(metric)
            .map_err(|source| errors.push(RuleError::expression(metric, source)))
            .ok();

        let mut compiled = Vec::with_capacity(rules.len());
        for (index, table) in rules.iter().enumerate() {
            match ThresholdRule::from_toml(index, table) {
                Ok(rule) => compiled.push(rule),
                Err(e) => errors.push(e),
            }
        }

        match metric {
            Some(metric) if errors.is_empty() => Ok(Self::new(metric, compiled)),
            _ => Err(errors),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn extract(&self, payload: &Value) -> Result<f64, ExpressionError> {
        self.metric.evaluate_number(payload)
    }

    /// First matching rule's answer, or `None` when nothing matches or a
    /// rule stops the scan.
    pub fn resolve(&self, metric: f64) -> Option<AgentResponse> {
        for rule in &self.rules {
            match rule.apply(metric) {
                RuleOutcome::Match(response) => return Some(response),
                RuleOutcome::Pass => continue,
                RuleOutcome::Stop => return None,
            }
        }
        None
    }
}
