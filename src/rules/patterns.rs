//! Pattern rules: textual metric → response token.
//!
//! Each rule is a single `{ <response> = "<regex>" }` entry. The regex is
//! anchored at the start of the text; rules are tried in order and the first
//! match wins.

use regex::Regex;
use serde_json::Value;

use crate::rules::expression::{Expression, ExpressionError};
use crate::rules::response::AgentResponse;
use crate::rules::RuleError;

#[derive(Debug, Clone)]
pub struct PatternRule {
    response: AgentResponse,
    pattern: Regex,
}

impl PatternRule {
    pub fn new(index: usize, response: AgentResponse, pattern: &str) -> Result<Self, RuleError> {
        let pattern = Regex::new(&format!("^(?:{})", pattern))
            .map_err(|source| RuleError::Pattern { index, source })?;
        Ok(Self { response, pattern })
    }

    pub fn from_toml(index: usize, table: &toml::Table) -> Result<Self, RuleError> {
        let mut entries = table.iter();
        match (entries.next(), entries.next()) {
            (Some((token, toml::Value::String(pattern))), None) => {
                let response = token
                    .parse::<AgentResponse>()
                    .map_err(|source| RuleError::Response { index, source })?;
                Self::new(index, response, pattern)
            }
            (Some(_), None) => Err(RuleError::malformed(index, "pattern must be a string")),
            _ => Err(RuleError::malformed(
                index,
                "a pattern rule must have exactly one '<response> = <regex>' entry",
            )),
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// Ordered pattern rules plus the expression producing their text.
#[derive(Debug, Clone)]
pub struct PatternTable {
    metric: Expression,
    rules: Vec<PatternRule>,
}

impl PatternTable {
    pub fn compile(metric: &str, rules: &[toml::Table]) -> Result<Self, Vec<RuleError>> {
        let mut errors = Vec::new();

        let metric = Expression::compile(metric)
            .map_err(|source| errors.push(RuleError::expression(metric, source)))
            .ok();

        let mut compiled = Vec::with_capacity(rules.len());
        for (index, table) in rules.iter().enumerate() {
            match PatternRule::from_toml(index, table) {
                Ok(rule) => compiled.push(rule),
                Err(e) => errors.push(e),
            }
        }

        match metric {
            Some(metric) if errors.is_empty() => Ok(Self {
                metric,
                rules: compiled,
            }),
            _ => Err(errors),
        }
    }

    pub fn extract(&self, payload: &Value) -> Result<String, ExpressionError> {
        self.metric.evaluate_text(payload)
    }

    pub fn resolve(&self, text: &str) -> Option<AgentResponse> {
        self.rules
            .iter()
            .find(|rule| rule.matches(text))
            .map(|rule| rule.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::response::Status;

    fn rules(src: &str) -> Vec<toml::Table> {
        let doc: toml::Table = toml::from_str(&format!("rules = {}", src)).unwrap();
        doc["rules"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_table().unwrap().clone())
            .collect()
    }

    #[test]
    fn first_matching_pattern_wins() {
        let table = PatternTable::compile(
            "r",
            &rules(r#"[{ ready = ".*healthy.*" }, { down = ".*unhealthy.*" }, { drain = "maxed" }]"#),
        )
        .unwrap();

        assert_eq!(table.resolve("all healthy"), Some(AgentResponse::Status(Status::Ready)));
        // ".*healthy.*" also matches "unhealthy", and it comes first.
        assert_eq!(table.resolve("unhealthy"), Some(AgentResponse::Status(Status::Ready)));
        assert_eq!(table.resolve("maxed out"), Some(AgentResponse::Status(Status::Drain)));
        assert_eq!(table.resolve("queue maxed"), None);
    }

    #[test]
    fn extracts_text_from_payload() {
        let table = PatternTable::compile("r['state']", &rules(r#"[{ maint = "maintenance" }]"#)).unwrap();
        let payload = serde_json::json!({"state": "maintenance window"});
        let text = table.extract(&payload).unwrap();
        assert_eq!(table.resolve(&text), Some(AgentResponse::Status(Status::Maint)));
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let errors = PatternTable::compile("r", &rules(r#"[{ down = "(unclosed" }, { up = 3 }]"#)).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], RuleError::Pattern { index: 0, .. }));
        assert!(matches!(errors[1], RuleError::Malformed { index: 1, .. }));
    }
}
