//! Injection point scanner (C7): for each top-level request parameter,
//! tries every strategy's `test()` payload until one comes back true,
//! recording the winning strategy and moving to the next parameter.

use crate::detect::reliable_check;
use crate::engine::Engine;
use crate::strategy::{strategies, Strategy};

#[derive(Debug, Clone)]
pub struct ScanHit {
    pub param: String,
    pub strategy_index: usize,
}

/// Scans every top-level parameter (or just `only_param`, if given) and
/// returns the first strategy that proves injectable for each. A
/// top-level body that isn't an object is refused outright rather than
/// silently producing no hits — list-shaped bodies have no addressable
/// parameter to target.
pub fn scan_all_injection_points(engine: &Engine, only_param: Option<&str>) -> anyhow::Result<Vec<ScanHit>> {
    let keys = engine.template.body.top_level_keys()?;
    let ctx = engine.strategy_ctx();
    let candidates: Vec<&Strategy> = strategies_ref();
    let mut hits = Vec::new();

    for key in &keys {
        if let Some(only) = only_param {
            if only != key {
                continue;
            }
        }
        for (idx, strategy) in candidates.iter().enumerate() {
            let payload = (strategy.test)(key, &ctx);
            let Ok(body) = engine.template.body.with_leaf(key, payload) else {
                continue;
            };
            let Some(true) = reliable_check(engine, strategy, &body) else {
                continue;
            };
            if let Some(confirm_false) = strategy.confirm_false {
                let confirm_payload = confirm_false(key, &ctx);
                let Ok(confirm_body) = engine.template.body.with_leaf(key, confirm_payload) else {
                    continue;
                };
                if reliable_check(engine, strategy, &confirm_body) != Some(false) {
                    continue;
                }
            }
            tracing::info!(param = %key, strategy = strategy.name, "injection point confirmed");
            hits.push(ScanHit {
                param: key.clone(),
                strategy_index: idx,
            });
            break;
        }
    }
    Ok(hits)
}

fn strategies_ref() -> Vec<&'static Strategy> {
    static CACHE: once_cell::sync::OnceCell<Vec<Strategy>> = once_cell::sync::OnceCell::new();
    CACHE.get_or_init(strategies).iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_array_shaped_top_level_body() {
        let body = crate::value::Value::Array(vec![]);
        assert!(body.top_level_keys().is_err());
    }
}
