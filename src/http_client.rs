//! Blocking HTTP client: session cookies, retry/backoff, transparent
//! re-auth, proxy/Tor routing and browser impersonation. Built on
//! `reqwest`'s `blocking` feature so callers never `await` — this crate
//! runs its concurrency on OS threads (`rayon`), not an async runtime.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use rand::RngCore;
use reqwest::blocking::ClientBuilder;

use crate::request::Method;
use crate::tamper::{TamperInput, TamperPipeline};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserProfile {
    Chrome120,
    Safari153,
    Firefox117,
}

impl BrowserProfile {
    pub fn parse(s: &str) -> BrowserProfile {
        match s {
            "safari15_3" => BrowserProfile::Safari153,
            "firefox117" => BrowserProfile::Firefox117,
            _ => BrowserProfile::Chrome120,
        }
    }

    pub fn user_agent(&self) -> &'static str {
        match self {
            BrowserProfile::Chrome120 => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
            }
            BrowserProfile::Safari153 => {
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.3 Safari/605.1.15"
            }
            BrowserProfile::Firefox117 => "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:117.0) Gecko/20100101 Firefox/117.0",
        }
    }

    fn default_headers(&self) -> Vec<(&'static str, &'static str)> {
        let mut headers = vec![
            ("Accept", "*/*"),
            ("Accept-Language", "en-US,en;q=0.9"),
            ("Accept-Encoding", "gzip, deflate"),
        ];
        if matches!(self, BrowserProfile::Chrome120) {
            headers.push(("Sec-Ch-Ua", "\"Chromium\";v=\"120\", \"Not(A:Brand\";v=\"24\""));
        }
        headers
    }
}

pub enum AuthData {
    Json(Value),
    Raw(String),
}

pub struct ClientConfig {
    pub headers: IndexMap<String, String>,
    pub timeout: Duration,
    pub retries: u8,
    pub global_delay: f64,
    pub auth_url: Option<String>,
    pub auth_data: Option<AuthData>,
    pub impersonate: BrowserProfile,
    /// Picked once at startup from `user-agents.txt` when `--random-agent`
    /// is set, overriding `impersonate`'s fixed User-Agent for the whole
    /// run. Per-request rotation is handled separately by the
    /// WAF-evasion wrapper during character extraction.
    pub user_agent_override: Option<String>,
    pub proxy: Option<String>,
    pub tor: bool,
    pub tamper: TamperPipeline,
}

#[derive(Debug, Clone)]
pub struct HttpResponseRecord {
    pub status: u16,
    pub body: String,
    pub headers: IndexMap<String, String>,
}

/// Thin wrapper around a `reqwest::blocking::Client` plus the shared,
/// immutable run configuration. Each worker thread owns its own
/// `HttpClient` (and therefore its own cookie jar) built from the same
/// `Arc<ClientConfig>` via `clone_for_worker`.
pub struct HttpClient {
    client: reqwest::blocking::Client,
    cfg: Arc<ClientConfig>,
}

impl HttpClient {
    pub fn new(cfg: Arc<ClientConfig>) -> anyhow::Result<HttpClient> {
        let mut builder = ClientBuilder::new()
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .danger_accept_invalid_certs(true)
            .timeout(cfg.timeout)
            .connect_timeout(Duration::from_secs(10))
            .cookie_store(true)
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(cfg.user_agent_override.clone().unwrap_or_else(|| cfg.impersonate.user_agent().to_string()));

        if cfg.tor {
            builder = builder.proxy(reqwest::Proxy::all("socks5h://127.0.0.1:9050")?);
        } else if let Some(proxy) = &cfg.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy.as_str())?);
        }

        Ok(HttpClient {
            client: builder.build()?,
            cfg,
        })
    }

    /// Builds a fresh client sharing this one's configuration but owning
    /// its own cookie jar, for handing to a new worker thread.
    pub fn clone_for_worker(&self) -> anyhow::Result<HttpClient> {
        HttpClient::new(self.cfg.clone())
    }

    /// Sends `body` through the tamper pipeline and over the wire,
    /// retrying on 429/5xx with backoff and transparently re-logging in
    /// on 401/403 once. `baseline_status` (when known) avoids retrying a
    /// 403 the target always returns for this request shape.
    pub fn send(
        &self,
        url: &str,
        method: Method,
        body: Option<&Value>,
        baseline_status: Option<u16>,
        extra_headers: &[(String, String)],
        rng: &mut dyn RngCore,
    ) -> Option<HttpResponseRecord> {
        if self.cfg.global_delay > 0.0 {
            thread::sleep(Duration::from_secs_f64(self.cfg.global_delay));
        }

        let tampered = body.map(|b| self.cfg.tamper.process(b.clone(), rng));
        let mut reauthed = false;

        for attempt in 0..=self.cfg.retries {
            match self.attempt(url, method, tampered.as_ref(), extra_headers) {
                Ok(resp) => {
                    if (resp.status == 401 || resp.status == 403) && !reauthed && self.cfg.auth_url.is_some() {
                        if self.reauth() {
                            reauthed = true;
                            continue;
                        }
                    }
                    let retryable_403 = resp.status == 403 && baseline_status != Some(403);
                    if (resp.status == 429 || resp.status >= 500 || retryable_403) && attempt < self.cfg.retries {
                        thread::sleep(Duration::from_secs_f64(retry_wait_seconds(resp.status, attempt, self.cfg.global_delay)));
                        continue;
                    }
                    return Some(resp);
                }
                Err(e) => {
                    tracing::debug!(url, attempt, error = %e, "request failed");
                    if attempt < self.cfg.retries {
                        thread::sleep(Duration::from_secs(1));
                        continue;
                    }
                    return None;
                }
            }
        }
        None
    }

    fn attempt(
        &self,
        url: &str,
        method: Method,
        tampered: Option<&TamperInput>,
        extra_headers: &[(String, String)],
    ) -> reqwest::Result<HttpResponseRecord> {
        let start = Instant::now();
        let mut req = self.client.request(method.to_reqwest(), url);
        for (k, v) in self.cfg.impersonate.default_headers() {
            req = req.header(k, v);
        }
        for (k, v) in &self.cfg.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        for (k, v) in extra_headers {
            req = req.header(k.as_str(), v.as_str());
        }

        let content_type_form = self
            .cfg
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.to_ascii_lowercase().contains("application/x-www-form-urlencoded"))
            .unwrap_or(false);

        if let Some(data) = tampered {
            req = match data {
                TamperInput::Text(s) => req.body(s.clone()),
                TamperInput::Structured(v) => {
                    if method == Method::Get {
                        req.query(&value_to_pairs(v))
                    } else if content_type_form {
                        req.form(&value_to_pairs(v))
                    } else {
                        req.json(&v.to_json())
                    }
                }
            };
        }

        let resp = req.send()?;
        let status = resp.status().as_u16();
        let mut headers = IndexMap::new();
        for (k, v) in resp.headers() {
            if let Ok(val) = v.to_str() {
                headers.insert(k.as_str().to_string(), val.to_string());
            }
        }
        let body = resp.text().unwrap_or_default();
        tracing::debug!(url, status, elapsed_ms = start.elapsed().as_millis() as u64, "http request");
        Ok(HttpResponseRecord { status, body, headers })
    }

    fn reauth(&self) -> bool {
        let Some(auth_url) = &self.cfg.auth_url else { return false };
        let mut req = self.client.post(auth_url);
        req = match &self.cfg.auth_data {
            Some(AuthData::Json(v)) => req.json(&v.to_json()),
            Some(AuthData::Raw(s)) => req.body(s.clone()),
            None => req,
        };
        match req.send() {
            Ok(resp) => {
                tracing::info!(status = resp.status().as_u16(), "re-authenticated session");
                resp.status().is_success()
            }
            Err(e) => {
                tracing::warn!(error = %e, "re-auth request failed");
                false
            }
        }
    }
}

/// Per-status retry policy: a 429 backs off proportionally to the
/// configured global delay and attempt count, a retryable 403 (one the
/// baseline didn't already return) gets a flat wait, and a 5xx gets a
/// shorter flat wait, matching the reference tool's three distinct
/// retry behaviors rather than one generic exponential curve.
fn retry_wait_seconds(status: u16, attempt: u8, global_delay: f64) -> f64 {
    match status {
        429 => global_delay * (attempt as f64 + 1.0) * 3.0,
        403 => 5.0,
        _ => 2.0,
    }
}

fn value_to_pairs(v: &Value) -> Vec<(String, String)> {
    match v.as_object() {
        Some(map) => map.iter().map(|(k, v)| (k.clone(), value_to_plain_string(v))).collect(),
        None => Vec::new(),
    }
}

fn value_to_plain_string(v: &Value) -> String {
    match v {
        Value::Str(s) => s.clone(),
        Value::Num(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => serde_json::to_string(&other.to_json()).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_backoff_scales_with_attempt_and_global_delay() {
        assert_eq!(retry_wait_seconds(429, 0, 1.0), 3.0);
        assert_eq!(retry_wait_seconds(429, 2, 1.0), 9.0);
        assert_eq!(retry_wait_seconds(429, 0, 0.0), 0.0);
    }

    #[test]
    fn forbidden_and_server_error_use_flat_waits() {
        assert_eq!(retry_wait_seconds(403, 5, 2.0), 5.0);
        assert_eq!(retry_wait_seconds(503, 5, 2.0), 2.0);
    }

    #[test]
    fn value_to_pairs_stringifies_scalars() {
        let v = Value::from_json(serde_json::json!({"a": 1, "b": "x"}));
        let pairs = value_to_pairs(&v);
        assert_eq!(pairs.len(), 2);
    }
}
