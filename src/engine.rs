//! Shared run context: the request template, a thread-local HTTP
//! client per caller thread, the captured baseline response and the
//! network/content calibration. Every stage of the extraction pipeline
//! (scanner, length prober, character extractor, fingerprinter) reads
//! through an `Engine`.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Instant;

use crate::calibrate::Calibration;
use crate::http_client::{ClientConfig, HttpClient, HttpResponseRecord};
use crate::request::RequestTemplate;
use crate::strategy::StrategyContext;
use crate::value::Value;
use crate::waf_evasion;

thread_local! {
    static LOCAL_HTTP: RefCell<Option<(usize, HttpClient)>> = RefCell::new(None);
}

pub struct Engine {
    pub template: RequestTemplate,
    pub client_cfg: Arc<ClientConfig>,
    pub baseline: HttpResponseRecord,
    pub calibration: Calibration,
    pub prefix: String,
    pub suffix: String,
}

impl Engine {
    pub fn strategy_ctx(&self) -> StrategyContext {
        StrategyContext {
            prefix: self.prefix.clone(),
            suffix: self.suffix.clone(),
            sleep_s: self.calibration.sleep_s,
        }
    }

    /// Runs `f` against a thread-local `HttpClient` built from this
    /// engine's config, constructing one the first time a given thread
    /// calls in — mirroring the reference tool's `threading.local()`
    /// per-thread session.
    fn with_http<R>(&self, f: impl FnOnce(&HttpClient) -> R) -> R {
        let cfg_key = Arc::as_ptr(&self.client_cfg) as usize;
        LOCAL_HTTP.with(|cell| {
            let mut slot = cell.borrow_mut();
            let needs_new = match &*slot {
                Some((key, _)) => *key != cfg_key,
                None => true,
            };
            if needs_new {
                let client = HttpClient::new(self.client_cfg.clone()).expect("failed to build worker HTTP client");
                *slot = Some((cfg_key, client));
            }
            f(&slot.as_ref().unwrap().1)
        })
    }

    /// Plain send: tamper pipeline only, no WAF-evasion wrapper. Used by
    /// the scanner, length prober, calibrator and fingerprinter.
    pub fn send(&self, body: &Value) -> Option<HttpResponseRecord> {
        let mut rng = rand::thread_rng();
        self.with_http(|http| {
            http.send(
                &self.template.url,
                self.template.method,
                Some(body),
                Some(self.baseline.status),
                &[],
                &mut rng,
            )
        })
    }

    /// Timed send: returns wall-clock elapsed seconds for the full call
    /// (including any internal retry backoff), needed by the time-based
    /// detection path.
    pub fn send_timed(&self, body: &Value) -> Option<f64> {
        let start = Instant::now();
        self.send(body)?;
        Some(start.elapsed().as_secs_f64())
    }

    /// Every outgoing probe of the character extractor is routed
    /// through the WAF-evasion wrapper: junk keys injected, keys
    /// shuffled, User-Agent prefix rotated.
    pub fn send_with_evasion(&self, body: &Value) -> Option<HttpResponseRecord> {
        let mut rng = rand::thread_rng();
        let evasive = waf_evasion::inject_junk_and_shuffle(body, &mut rng);
        let ua_header = waf_evasion::rotated_user_agent_header(self.client_cfg.impersonate.user_agent(), &mut rng);
        self.with_http(|http| {
            http.send(
                &self.template.url,
                self.template.method,
                Some(&evasive),
                Some(self.baseline.status),
                &[ua_header.clone()],
                &mut rng,
            )
        })
    }

    pub fn send_timed_with_evasion(&self, body: &Value) -> Option<f64> {
        let start = Instant::now();
        self.send_with_evasion(body)?;
        Some(start.elapsed().as_secs_f64())
    }
}

/// Used only by the calibrator, which needs to drive requests before an
/// `Engine` (which requires a `Calibration`) exists yet.
pub fn raw_send(
    client_cfg: &Arc<ClientConfig>,
    template: &RequestTemplate,
    body: &Value,
    baseline_status: Option<u16>,
) -> Option<HttpResponseRecord> {
    let client = HttpClient::new(client_cfg.clone()).ok()?;
    let mut rng = rand::thread_rng();
    client.send(&template.url, template.method, Some(body), baseline_status, &[], &mut rng)
}
