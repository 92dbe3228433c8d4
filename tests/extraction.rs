//! End-to-end extraction against a minimal in-process HTTP server that
//! emulates a MongoDB backend evaluating `$where` boolean-injection
//! payloads against a fixed secret. Exercises the calibrator, scanner,
//! length prober and character extractor together, the way a real run
//! would, without needing a live MongoDB instance.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use nosql_tomcat::http_client::BrowserProfile;
use nosql_tomcat::orchestrator::{self, RunOptions};
use nosql_tomcat::request::{Method, RequestTemplate};
use nosql_tomcat::tamper::TamperPipeline;
use nosql_tomcat::value::Value;

static LENGTH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"toString\(\)\.length >= (\d+)").unwrap());
static CHAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"charCodeAt\((\d+)\) > (\d+)").unwrap());
static NONEMPTY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"toString\(\)\.length > 0").unwrap());

fn spawn_mock_backend(secret: &'static str, stop: Arc<AtomicBool>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock backend");
    let port = listener.local_addr().unwrap().port();
    listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, _)) => {
                    handle_connection(stream, secret);
                }
                Err(_) => std::thread::sleep(Duration::from_millis(5)),
            }
        }
    });
    port
}

fn handle_connection(mut stream: TcpStream, secret: &str) {
    stream.set_read_timeout(Some(Duration::from_secs(2))).ok();
    let mut buf = [0u8; 8192];
    let mut accumulated = Vec::new();
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                accumulated.extend_from_slice(&buf[..n]);
                if accumulated.windows(4).any(|w| w == b"\r\n\r\n") {
                    let text = String::from_utf8_lossy(&accumulated);
                    if let Some(headers_end) = text.find("\r\n\r\n") {
                        let headers = &text[..headers_end];
                        let content_length: usize = headers
                            .lines()
                            .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(0);
                        let body_so_far = accumulated.len() - (headers_end + 4);
                        if body_so_far >= content_length {
                            break;
                        }
                    }
                }
            }
            Err(_) => break,
        }
    }

    let text = String::from_utf8_lossy(&accumulated);
    let body_text = text.split("\r\n\r\n").nth(1).unwrap_or("").to_string();
    let decision = evaluate(&body_text, secret);
    let page = if decision { "TRUE_RESULT_PAGE_abcdefghijklmnopqrstuvwxyz" } else { "FALSE_RESULT_PAGE_zzzzzzzzzzzzzzzzzzzzzzzzzz" };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        page.len(),
        page
    );
    let _ = stream.write_all(response.as_bytes());
}

/// Interprets the literal `$where` JS templates produced by
/// `strategy.rs` against a fixed secret value, standing in for a real
/// MongoDB `$where` evaluator.
fn evaluate(body_text: &str, secret: &str) -> bool {
    let parsed: serde_json::Value = match serde_json::from_str(body_text) {
        Ok(v) => v,
        Err(_) => return false,
    };
    let Some(secret_field) = parsed.get("secret") else { return false };
    let Some(where_clause) = secret_field.get("$where").and_then(|v| v.as_str()) else {
        return false;
    };

    if let Some(caps) = CHAR_RE.captures(where_clause) {
        let idx: usize = caps[1].parse().unwrap();
        let code: u32 = caps[2].parse().unwrap();
        return secret.chars().nth(idx).map(|c| (c as u32) > code).unwrap_or(false);
    }
    if let Some(caps) = LENGTH_RE.captures(where_clause) {
        let len: usize = caps[1].parse().unwrap();
        return secret.chars().count() >= len;
    }
    if NONEMPTY_RE.is_match(where_clause) {
        return !secret.is_empty();
    }
    false
}

fn make_template(url: &str) -> RequestTemplate {
    let mut body = IndexMap::new();
    body.insert("secret".to_string(), Value::Str("probe".to_string()));
    RequestTemplate {
        url: url.to_string(),
        method: Method::Post,
        headers: IndexMap::new(),
        body: Value::Object(body),
    }
}

/// Runs the full calibrate -> fingerprint -> scan -> length-probe ->
/// extract pipeline against a mock backend serving `secret` and returns
/// whatever the extractor recovered. `>=`-based length predicates mean
/// this must succeed for any length, not just ones that happen to land
/// on a fixed bisection midpoint of `[1, 1000]` — the four lengths
/// below are deliberately off that path.
fn run_extraction(secret: &'static str) -> String {
    let stop = Arc::new(AtomicBool::new(false));
    let port = spawn_mock_backend(secret, stop.clone());
    let url = format!("http://127.0.0.1:{port}/login");

    let cfg = orchestrator::make_client_config(
        IndexMap::new(),
        Duration::from_secs(5),
        1,
        0.0,
        None,
        None,
        BrowserProfile::Chrome120,
        None,
        None,
        false,
        TamperPipeline::build(&[]),
    );

    let session_dir = std::env::temp_dir().join(format!(
        "nosql_tomcat_test_sessions_e2e_{}_{}",
        std::process::id(),
        secret.len()
    ));
    let _ = std::fs::remove_dir_all(&session_dir);
    let opts = RunOptions {
        threads: 2,
        only_param: None,
        time_sec: None,
        session_dir,
    };

    let template = make_template(&url);
    let eng = orchestrator::build_engine(cfg, template, &opts, String::new(), String::new()).expect("engine should build against the mock backend");
    let report = orchestrator::run_blind_dump(&eng, &opts).expect("run should complete");

    stop.store(true, Ordering::Relaxed);

    let found = report.extracted.iter().find(|e| e.param == "secret").expect("secret parameter should be extracted");
    found.value.clone()
}

#[test]
fn extracts_known_secret_end_to_end() {
    assert_eq!(run_extraction("abc"), "abc");
}

#[test]
fn extracts_secret_with_length_off_the_bisection_path() {
    assert_eq!(run_extraction("h"), "h");
    assert_eq!(run_extraction("sevench"), "sevench");
    assert_eq!(run_extraction("a-thirteen-ch"), "a-thirteen-ch");
}
