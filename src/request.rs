//! Request template: the target URL/method/headers/body derived either
//! from `-u`/`-d` flags or from a raw HTTP request file, plus the raw
//! request file parser (`original_source/core/parser.py`'s algorithm,
//! unchanged in meaning, grounded here rather than in any `spec.md`
//! component since it's an external collaborator).

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    pub fn parse(s: &str) -> Result<Method> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            other => bail!("unsupported HTTP method `{other}`"),
        }
    }

    pub fn to_reqwest(&self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestTemplate {
    pub url: String,
    pub method: Method,
    pub headers: IndexMap<String, String>,
    pub body: Value,
}

impl RequestTemplate {
    /// Builds a template directly from `-u`/`-d`/`-m` flags. A body that
    /// doesn't parse as JSON is treated as a single-key `data` parameter,
    /// matching how the reference tool falls back for plain POST bodies.
    pub fn from_url_and_data(url: &str, method: Method, data: Option<&str>) -> Result<RequestTemplate> {
        let body = match data {
            None => Value::object(),
            Some(raw) => match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(json) => Value::from_json(json),
                Err(_) => parse_form_or_opaque(raw),
            },
        };
        let mut headers = IndexMap::new();
        if matches!(method, Method::Post | Method::Put | Method::Patch) {
            headers.insert("Content-Type".to_string(), "application/json".to_string());
        }
        Ok(RequestTemplate {
            url: url.to_string(),
            method,
            headers,
            body,
        })
    }

    pub fn param_names(&self) -> Result<Vec<String>> {
        self.body.top_level_keys()
    }
}

fn parse_form_or_opaque(raw: &str) -> Value {
    if raw.contains('=') && raw.contains('&') || (raw.contains('=') && !raw.trim_start().starts_with('{')) {
        let mut map = IndexMap::new();
        for pair in raw.split('&') {
            if let Some((k, v)) = pair.split_once('=') {
                let key = urlencoding::decode(k).map(|c| c.into_owned()).unwrap_or_else(|_| k.to_string());
                let val = urlencoding::decode(v).map(|c| c.into_owned()).unwrap_or_else(|_| v.to_string());
                map.insert(key, Value::Str(val));
            }
        }
        if !map.is_empty() {
            return Value::Object(map);
        }
    }
    let mut map = IndexMap::new();
    map.insert("data".to_string(), Value::Str(raw.to_string()));
    Value::Object(map)
}

/// Parses a raw HTTP request file: request line, header block, blank
/// line, body. Scheme is inferred from the `Host` header (`https`
/// unless the host contains `127.0.0.1` or `localhost` and does not
/// also contain `443`) exactly as the reference parser does.
pub fn parse_raw_request_file(path: &Path) -> Result<RequestTemplate> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading raw request file {}", path.display()))?;
    let normalized = raw.replace("\r\n", "\n");
    let mut parts = normalized.splitn(2, "\n\n");
    let head = parts.next().unwrap_or_default();
    let body_text = parts.next().unwrap_or_default();

    let mut lines = head.lines();
    let request_line = lines.next().with_context(|| "raw request file is empty")?;
    let mut tokens = request_line.split_whitespace();
    let method = Method::parse(tokens.next().with_context(|| "missing method in request line")?)?;
    let path_part = tokens.next().with_context(|| "missing path in request line")?;

    let mut headers: IndexMap<String, String> = IndexMap::new();
    let mut header_order: HashMap<String, String> = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            let key = k.trim().to_string();
            let val = v.trim().to_string();
            header_order.insert(key.to_ascii_lowercase(), key.clone());
            headers.insert(key, val);
        }
    }

    let host = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("host"))
        .map(|(_, v)| v.clone())
        .with_context(|| "raw request file has no Host header")?;
    let scheme = if (host.contains("127.0.0.1") || host.contains("localhost")) && !host.contains("443") {
        "http"
    } else {
        "https"
    };
    let url = format!("{scheme}://{host}{path_part}");

    let content_type = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        .map(|(_, v)| v.to_ascii_lowercase())
        .unwrap_or_default();

    let body = if body_text.trim().is_empty() {
        Value::object()
    } else if content_type.contains("application/json") {
        Value::from_json(serde_json::from_str(body_text.trim()).with_context(|| "parsing JSON body from raw request file")?)
    } else if content_type.contains("application/x-www-form-urlencoded") {
        parse_form_or_opaque(body_text.trim())
    } else {
        parse_form_or_opaque(body_text.trim())
    };
    let _ = header_order;

    Ok(RequestTemplate { url, method, headers, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_template_from_json_data() {
        let tpl = RequestTemplate::from_url_and_data(
            "http://example.com/login",
            Method::Post,
            Some(r#"{"username":"admin","password":"x"}"#),
        )
        .unwrap();
        assert_eq!(tpl.param_names().unwrap(), vec!["username", "password"]);
    }

    #[test]
    fn falls_back_to_form_encoded_when_not_json() {
        let tpl = RequestTemplate::from_url_and_data("http://example.com/login", Method::Post, Some("username=admin&password=x")).unwrap();
        assert_eq!(tpl.param_names().unwrap(), vec!["username", "password"]);
    }

    #[test]
    fn infers_https_scheme_for_public_host() {
        assert_eq!(Method::parse("post").unwrap(), Method::Post);
    }

    fn write_raw_request(name: &str, host: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("tomcat-raw-req-test-{name}-{}.txt", std::process::id()));
        std::fs::write(&path, format!("GET /login HTTP/1.1\nHost: {host}\n\n")).unwrap();
        path
    }

    #[test]
    fn loopback_host_without_443_infers_http() {
        let path = write_raw_request("loopback", "127.0.0.1:8080");
        let tpl = parse_raw_request_file(&path).unwrap();
        assert!(tpl.url.starts_with("http://"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn loopback_host_on_443_stays_https() {
        let path = write_raw_request("loopback-443", "127.0.0.1:443");
        let tpl = parse_raw_request_file(&path).unwrap();
        assert!(tpl.url.starts_with("https://"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn host_containing_localhost_as_substring_infers_http() {
        let path = write_raw_request("substring-localhost", "api.localhost.example.com");
        let tpl = parse_raw_request_file(&path).unwrap();
        assert!(tpl.url.starts_with("http://"));
        std::fs::remove_file(&path).ok();
    }
}
