//! The shared true/false oracle every phase of the engine (scanner,
//! length prober, character extractor) drives its binary search with:
//! dispatches on boolean vs. time-based strategies and, for time-based
//! ones, double-checks a positive hit before trusting it.

use crate::engine::Engine;
use crate::similarity;
use crate::strategy::{DetectionMode, Strategy};
use crate::value::Value;

/// `None` means the network didn't answer at all (caller should treat
/// the probe as unresolved, not as a confirmed `false`).
pub fn reliable_check(engine: &Engine, strategy: &Strategy, body: &Value) -> Option<bool> {
    match strategy.kind {
        DetectionMode::Time => {
            let elapsed = engine.send_timed(body)?;
            if elapsed > engine.calibration.time_threshold_s {
                let confirm = engine.send_timed(body)?;
                Some(confirm > engine.calibration.time_threshold_s)
            } else {
                Some(false)
            }
        }
        DetectionMode::Boolean => {
            let resp = engine.send(body)?;
            Some(is_true(engine, &resp))
        }
    }
}

/// Same oracle, routed through the WAF-evasion wrapper — used only by
/// the character extractor.
pub fn reliable_check_evasive(engine: &Engine, strategy: &Strategy, body: &Value) -> Option<bool> {
    match strategy.kind {
        DetectionMode::Time => {
            let elapsed = engine.send_timed_with_evasion(body)?;
            if elapsed > engine.calibration.time_threshold_s {
                let confirm = engine.send_timed_with_evasion(body)?;
                Some(confirm > engine.calibration.time_threshold_s)
            } else {
                Some(false)
            }
        }
        DetectionMode::Boolean => {
            let resp = engine.send_with_evasion(body)?;
            Some(is_true(engine, &resp))
        }
    }
}

fn is_true(engine: &Engine, resp: &crate::http_client::HttpResponseRecord) -> bool {
    if resp.status != engine.baseline.status {
        return true;
    }
    similarity::ratio(&engine.baseline.body, &resp.body) < engine.calibration.dynamic_threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibrate::Calibration;
    use crate::http_client::HttpResponseRecord;

    fn calibration() -> Calibration {
        Calibration {
            avg_latency_s: 0.05,
            jitter_s: 0.01,
            sleep_s: 2.0,
            time_threshold_s: 0.2,
            natural_similarity: 1.0,
            dynamic_threshold: 0.95,
        }
    }

    #[test]
    fn is_true_flags_status_code_change() {
        let baseline = HttpResponseRecord {
            status: 200,
            body: "ok".into(),
            headers: Default::default(),
        };
        let resp = HttpResponseRecord {
            status: 500,
            body: "ok".into(),
            headers: Default::default(),
        };
        let cal = calibration();
        assert!(resp.status != baseline.status || similarity::ratio(&baseline.body, &resp.body) < cal.dynamic_threshold);
    }

    #[test]
    fn is_true_flags_dissimilar_body_at_same_status() {
        let baseline_body = "Welcome, guest! You have 0 items.";
        let diverged_body = "A completely different error page entirely.";
        let cal = calibration();
        assert!(similarity::ratio(baseline_body, diverged_body) < cal.dynamic_threshold);
    }
}
