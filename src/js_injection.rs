//! `--technique J`: substitutes `--prefix`/`--suffix` and `--time-sec`
//! into every catalog `js_injection` template and tries each rendered
//! `$where` clause against every top-level parameter, grounded in the
//! reference tool's dedicated JS-injection module.

use regex::Regex;

use crate::engine::Engine;
use crate::http_client::HttpResponseRecord;
use crate::payloads::PayloadCatalog;
use crate::similarity;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct JsInjectionHit {
    pub param: String,
    pub template_index: usize,
    pub time_based: bool,
}

pub fn run(engine: &Engine, catalog: &PayloadCatalog, prefix: &str, suffix: &str, time_sec: Option<f64>) -> anyhow::Result<Vec<JsInjectionHit>> {
    let keys = engine.template.body.top_level_keys()?;
    let mut hits = Vec::new();
    let sleep_threshold = time_sec.unwrap_or(5.0) * 0.8;

    for key in &keys {
        for (idx, template) in catalog.js_injection.iter().enumerate() {
            let rendered = render_template(template, prefix, suffix, time_sec);
            let Ok(body) = engine.template.body.with_leaf(key, rendered.clone()) else {
                continue;
            };
            let time_based = contains_sleep(&rendered);
            let hit = if time_based {
                engine.send_timed(&body).map(|e| e > sleep_threshold).unwrap_or(false)
            } else {
                engine.send(&body).map(|r| is_successful_logic(engine, &r)).unwrap_or(false)
            };
            if hit {
                tracing::info!(param = %key, template_index = idx, time_based, "js injection candidate");
                hits.push(JsInjectionHit {
                    param: key.clone(),
                    template_index: idx,
                    time_based,
                });
                break;
            }
        }
    }
    Ok(hits)
}

fn contains_sleep(template: &Value) -> bool {
    match template {
        Value::Str(s) => s.contains("sleep("),
        Value::Object(map) => map.values().any(contains_sleep),
        Value::Array(items) => items.iter().any(contains_sleep),
        _ => false,
    }
}

fn render_template(template: &Value, prefix: &str, suffix: &str, time_sec: Option<f64>) -> Value {
    let sleep_re = Regex::new(r"sleep\(\d+\)").unwrap();
    match template {
        Value::Str(s) => {
            let mut rendered = s.replace("PREFIX", prefix).replace("SUFFIX", suffix);
            if let Some(t) = time_sec {
                let ms = (t * 1000.0) as u64;
                rendered = sleep_re.replace_all(&rendered, format!("sleep({ms})")).to_string();
                rendered = rendered.replace("TIME_SEC", &ms.to_string());
            }
            Value::Str(rendered)
        }
        Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), render_template(v, prefix, suffix, time_sec))).collect()),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_template(v, prefix, suffix, time_sec)).collect()),
        other => other.clone(),
    }
}

fn is_successful_logic(engine: &Engine, resp: &HttpResponseRecord) -> bool {
    if resp.status == 200 && engine.baseline.status != 200 {
        return true;
    }
    let has_error_keyword = ["invalid", "denied", "error"].iter().any(|kw| resp.body.to_lowercase().contains(kw));
    similarity::ratio(&engine.baseline.body, &resp.body) < 0.90 && !has_error_keyword
}
