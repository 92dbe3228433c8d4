//! Ordered, priority-sorted payload rewriting pipeline.
//!
//! Each stage is a pure function registered by name in a static table —
//! the Rust equivalent of the Python original's `importlib`-based plugin
//! loading, adapted to a language where dynamic import by string isn't
//! idiomatic.

mod stages;

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use rand::RngCore;

use crate::value::Value;

/// What a tamper stage is handed and what it must hand back. Later stages
/// must tolerate either shape: once one stage serializes the document to
/// text, downstream stages either operate on the text directly or parse
/// it back into a document (valid, since every text-producing stage here
/// only injects whitespace or `\uXXXX` escapes, both of which round-trip
/// through a JSON parser).
#[derive(Debug, Clone)]
pub enum TamperInput {
    Structured(Value),
    Text(String),
}

impl TamperInput {
    pub fn into_text(self) -> String {
        match self {
            TamperInput::Text(s) => s,
            TamperInput::Structured(v) => serde_json::to_string(&v.to_json()).unwrap_or_default(),
        }
    }

    /// Recovers a structured document, parsing text back into one if
    /// necessary. Fails only if a prior stage produced genuinely
    /// non-JSON text.
    pub fn into_value(self) -> anyhow::Result<Value> {
        match self {
            TamperInput::Structured(v) => Ok(v),
            TamperInput::Text(s) => {
                let raw: serde_json::Value = serde_json::from_str(&s)?;
                Ok(Value::from_json(raw))
            }
        }
    }
}

pub trait TamperStage: Send + Sync {
    fn name(&self) -> &'static str;
    fn priority(&self) -> i32;
    fn apply(&self, input: TamperInput, rng: &mut dyn RngCore) -> anyhow::Result<TamperInput>;
}

/// Pairs of stage names that conflict (apply overlapping rewrites).
/// Building a pipeline containing both logs a warning but still runs
/// both, in the priority order they'd run in anyway.
const CONFLICTS: &[(&str, &str)] = &[
    ("space_to_newline", "space_to_tab"),
    ("unicode_keys", "unicode_random"),
];

static REGISTRY: Lazy<HashMap<&'static str, Arc<dyn TamperStage>>> = Lazy::new(|| {
    let all: Vec<Arc<dyn TamperStage>> = vec![
        Arc::new(stages::LogicInversion),
        Arc::new(stages::JsConcat),
        Arc::new(stages::RandomWhitespace),
        Arc::new(stages::SpaceToNewline),
        Arc::new(stages::SpaceToTab),
        Arc::new(stages::UnicodeDollar),
        Arc::new(stages::UnicodeKeys),
        Arc::new(stages::UnicodeValues),
        Arc::new(stages::UnicodeRandom),
        Arc::new(stages::AsciiHexEncoding),
    ];
    all.into_iter().map(|s| (s.name(), s)).collect()
});

pub fn available_stage_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = REGISTRY.keys().copied().collect();
    names.sort();
    names
}

pub struct TamperPipeline {
    stages: Vec<Arc<dyn TamperStage>>,
}

impl TamperPipeline {
    /// Resolves names against the registry, warns and drops anything
    /// unknown, warns (but keeps) conflicting pairs, and sorts the
    /// survivors by ascending priority.
    pub fn build(names: &[String]) -> TamperPipeline {
        let mut resolved: Vec<Arc<dyn TamperStage>> = Vec::new();
        for name in names {
            match REGISTRY.get(name.as_str()) {
                Some(stage) => resolved.push(stage.clone()),
                None => tracing::warn!(tamper = %name, "unknown tamper stage, ignoring"),
            }
        }
        for (a, b) in CONFLICTS {
            if names.iter().any(|n| n == a) && names.iter().any(|n| n == b) {
                tracing::warn!(stage_a = %a, stage_b = %b, "tamper stages conflict; both will still run");
            }
        }
        resolved.sort_by_key(|s| s.priority());
        if !resolved.is_empty() {
            let order: Vec<&str> = resolved.iter().map(|s| s.name()).collect();
            tracing::info!("Tamper Pipeline Constructed: {}", order.join(" -> "));
        }
        TamperPipeline { stages: resolved }
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage left to right. A stage that errors is skipped:
    /// its output is discarded and the input already held is forwarded
    /// unchanged to the next stage.
    pub fn process(&self, payload: Value, rng: &mut dyn RngCore) -> TamperInput {
        let mut current = TamperInput::Structured(payload);
        for stage in &self.stages {
            let snapshot = current.clone();
            match stage.apply(snapshot, rng) {
                Ok(next) => current = next,
                Err(e) => tracing::warn!(stage = stage.name(), error = %e, "tamper stage skipped"),
            }
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn unknown_stage_names_are_dropped_not_fatal() {
        let pipeline = TamperPipeline::build(&["not_a_real_stage".to_string()]);
        assert!(pipeline.is_empty());
    }

    #[test]
    fn priority_order_is_independent_of_requested_order() {
        let pipeline = TamperPipeline::build(&[
            "ascii_hex_encoding".to_string(),
            "logic_inversion".to_string(),
        ]);
        let names: Vec<&str> = pipeline.stages.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["logic_inversion", "ascii_hex_encoding"]);
    }

    #[test]
    fn ordering_scenario_inverts_then_hex_encodes() {
        let pipeline = TamperPipeline::build(&[
            "ascii_hex_encoding".to_string(),
            "logic_inversion".to_string(),
        ]);
        let payload = Value::from_json(serde_json::json!({"$ne": "admin", "$where": "return true"}));
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let out = pipeline.process(payload, &mut rng).into_text();
        assert!(out.contains("eval(String.fromCharCode("));
        assert!(!out.contains("$ne"));
    }
}
