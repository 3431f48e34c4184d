//! Payload processing: decode, extract, resolve.
//!
//! Pure and synchronous. Fetching happens in the scheduler; this module only
//! turns a payload into an [`Evaluation`] or a [`PipelineError`].

use serde_json::Value;

use crate::health::state::PipelineError;
use crate::rules::{Evaluation, RuleSet};

#[derive(Debug, Clone)]
pub struct Pipeline {
    is_json: bool,
    rules: RuleSet,
}

impl Pipeline {
    pub fn new(is_json: bool, rules: RuleSet) -> Self {
        Self { is_json, rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Turn the raw payload into the value bound to `r`.
    ///
    /// JSON payloads are parsed; anything else is passed through as a string.
    pub fn decode(&self, payload: &str) -> Result<Value, PipelineError> {
        if self.is_json {
            serde_json::from_str(payload).map_err(|e| PipelineError::Parse(e.to_string()))
        } else {
            Ok(Value::String(payload.to_string()))
        }
    }

    pub fn process(&self, payload: &str) -> Result<Evaluation, PipelineError> {
        let value = self.decode(payload)?;
        self.rules
            .evaluate(&value)
            .map_err(|e| PipelineError::Extraction(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::patterns::PatternTable;
    use crate::rules::thresholds::ThresholdTable;
    use crate::rules::AgentResponse;

    fn table(src: &str) -> Vec<toml::Table> {
        let wrapper: toml::Table = toml::from_str(&format!("rules = {}", src)).unwrap();
        wrapper["rules"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_table().unwrap().clone())
            .collect()
    }

    fn json_pipeline() -> Pipeline {
        let thresholds = ThresholdTable::compile(
            "r['requests_per_second']",
            &table("[{ pct = 7000, min_threshold_response = 1 }]"),
        )
        .unwrap();
        Pipeline::new(true, RuleSet::new(Some(thresholds), None, AgentResponse::Noop))
    }

    #[test]
    fn extracts_field_from_json() {
        let evaluation = json_pipeline()
            .process(r#"{"requests_per_second": 42}"#)
            .unwrap();
        assert_eq!(evaluation.metric, Some(42.0));
        assert_eq!(evaluation.response.to_string(), "noop");
    }

    #[test]
    fn busy_backend_gets_minimum_weight() {
        let evaluation = json_pipeline()
            .process(r#"{"requests_per_second": 8000}"#)
            .unwrap();
        assert_eq!(evaluation.response.to_string(), "1%");
    }

    #[test]
    fn invalid_json_is_a_parse_failure() {
        let err = json_pipeline().process("{not json").unwrap_err();
        assert_eq!(err.kind(), "parse_error");
    }

    #[test]
    fn missing_field_is_an_extraction_failure() {
        let err = json_pipeline().process(r#"{"other": 1}"#).unwrap_err();
        assert_eq!(err.kind(), "extraction_error");
    }

    #[test]
    fn plain_text_payload_with_identity_rule() {
        let thresholds = ThresholdTable::compile("r", &table("[{ up = '<100' }, { drain = '>=100' }]")).unwrap();
        let pipeline = Pipeline::new(false, RuleSet::new(Some(thresholds), None, AgentResponse::Noop));

        let evaluation = pipeline.process("42\n").unwrap();
        assert_eq!(evaluation.metric, Some(42.0));
        assert_eq!(evaluation.response.to_string(), "up");
    }

    #[test]
    fn plain_text_matched_by_patterns() {
        let patterns = PatternTable::compile("r", &table("[{ maint = 'maintenance' }]")).unwrap();
        let pipeline = Pipeline::new(false, RuleSet::new(None, Some(patterns), AgentResponse::Noop));

        assert_eq!(pipeline.process("maintenance window").unwrap().response.to_string(), "maint");
        assert_eq!(pipeline.process("serving").unwrap().response.to_string(), "noop");
    }
}
