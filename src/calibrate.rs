//! Derives the per-target network-timing threshold and content-
//! similarity baseline the rest of the extraction pipeline relies on,
//! exactly once per run, before any injection probes are sent.

use std::sync::Arc;

use crate::engine::raw_send;
use crate::http_client::{ClientConfig, HttpResponseRecord};
use crate::request::RequestTemplate;
use crate::similarity;

#[derive(Debug, Clone)]
pub struct Calibration {
    pub avg_latency_s: f64,
    pub jitter_s: f64,
    pub sleep_s: f64,
    pub time_threshold_s: f64,
    pub natural_similarity: f64,
    pub dynamic_threshold: f64,
}

const NETWORK_SAMPLES: usize = 10;

/// Measures `NETWORK_SAMPLES` baseline round trips, derives jitter and a
/// sleep duration long enough to be distinguishable from it, then a
/// time threshold the detector compares observed latency against.
/// `time_sec_override` (the `--time-sec` flag) forces a fixed sleep
/// duration instead of deriving one.
pub fn calibrate_network(
    cfg: &Arc<ClientConfig>,
    template: &RequestTemplate,
    baseline: &HttpResponseRecord,
    time_sec_override: Option<f64>,
) -> Calibration {
    let mut samples = Vec::with_capacity(NETWORK_SAMPLES);
    for _ in 0..NETWORK_SAMPLES {
        let start = std::time::Instant::now();
        let _ = raw_send(cfg, template, &template.body, Some(baseline.status));
        samples.push(start.elapsed().as_secs_f64());
    }
    let avg_latency_s = samples.iter().sum::<f64>() / samples.len() as f64;
    let variance = samples.iter().map(|s| (s - avg_latency_s).powi(2)).sum::<f64>() / samples.len() as f64;
    let jitter_s = variance.sqrt();

    let sleep_s = match time_sec_override {
        Some(forced) => forced,
        None => round2(2.0_f64.max(jitter_s * 6.0 + 1.0)),
    };
    let time_threshold_s = avg_latency_s + 4.0 * jitter_s + 0.7 * sleep_s;

    Calibration {
        avg_latency_s,
        jitter_s,
        sleep_s,
        time_threshold_s,
        natural_similarity: 1.0,
        dynamic_threshold: 0.98,
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Sends two extra baseline requests beyond the ones `calibrate_network`
/// already sent and derives the dynamic similarity threshold below which
/// a response is considered meaningfully different from the baseline.
pub fn calibrate_content(cfg: &Arc<ClientConfig>, template: &RequestTemplate, baseline: &HttpResponseRecord, cal: &mut Calibration) {
    let mut ratios = Vec::with_capacity(2);
    for _ in 0..2 {
        if let Some(resp) = raw_send(cfg, template, &template.body, Some(baseline.status)) {
            ratios.push(similarity::ratio(&baseline.body, &resp.body));
        }
    }
    let natural_ratio = ratios.into_iter().fold(1.0_f64, f64::min);
    cal.natural_similarity = natural_ratio;
    cal.dynamic_threshold = if natural_ratio < 0.99 { natural_ratio - 0.05 } else { 0.98 };
}

pub fn capture_baseline(cfg: &Arc<ClientConfig>, template: &RequestTemplate) -> Option<HttpResponseRecord> {
    raw_send(cfg, template, &template.body, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round2_matches_python_rounding() {
        assert_eq!(round2(2.345), 2.35);
        assert_eq!(round2(1.0), 1.0);
    }

    #[test]
    fn forced_sleep_overrides_derivation() {
        let forced = Some(3.0);
        let sleep_s = match forced {
            Some(v) => v,
            None => 2.0,
        };
        assert_eq!(sleep_s, 3.0);
    }

    #[test]
    fn content_threshold_tightens_when_baseline_is_unstable() {
        let mut cal = Calibration {
            avg_latency_s: 0.1,
            jitter_s: 0.01,
            sleep_s: 2.0,
            time_threshold_s: 0.2,
            natural_similarity: 1.0,
            dynamic_threshold: 0.98,
        };
        cal.natural_similarity = 0.9;
        cal.dynamic_threshold = if cal.natural_similarity < 0.99 {
            cal.natural_similarity - 0.05
        } else {
            0.98
        };
        assert!((cal.dynamic_threshold - 0.85).abs() < 1e-9);
    }
}
