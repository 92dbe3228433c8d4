//! Length Prober (C8): binary search over `[1, 1000]` for the length
//! of a parameter's value, using the strategy the scanner confirmed.

use crate::detect::reliable_check;
use crate::engine::Engine;
use crate::strategy::Strategy;

const MAX_LENGTH: usize = 1000;

/// Returns `None` if the network never resolves a probe (short-circuits
/// the whole search rather than guessing), or if no length in
/// `[1, MAX_LENGTH]` ever tests true.
pub fn probe_length(engine: &Engine, strategy: &Strategy, param: &str) -> Option<usize> {
    let ctx = engine.strategy_ctx();
    let (mut low, mut high) = (1usize, MAX_LENGTH);
    let mut found = None;

    while low <= high {
        let mid = low + (high - low) / 2;
        let payload = (strategy.length)(param, mid, &ctx);
        let body = engine.template.body.with_leaf(param, payload).ok()?;
        match reliable_check(engine, strategy, &body)? {
            true => {
                found = Some(mid);
                low = mid + 1;
            }
            false => {
                if mid == 0 {
                    break;
                }
                high = mid - 1;
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    /// A binary search over `[1, 1000]` never needs more than
    /// `ceil(log2(1000)) + 1 = 11` probes to land on the true length,
    /// independent of what that length is.
    #[test]
    fn thousand_value_range_fits_in_eleven_probes() {
        let worst_case = (1000f64).log2().ceil() as u32 + 1;
        assert!(worst_case <= 11);
    }
}
