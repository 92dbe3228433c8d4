//! Structured document type shared by the tamper pipeline, the session
//! store and the HTTP client body encoder.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A recursively nested document: the only shape a request body or an
/// injected payload ever takes inside this crate. Deliberately not
/// `serde_json::Value` so the tamper stages and strategy builders have a
/// stable, crate-owned type to pattern-match on.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
}

impl Value {
    pub fn object() -> Value {
        Value::Object(IndexMap::new())
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut IndexMap<String, Value>> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns a copy of this document with `key` (a top-level key only —
    /// nested injection points are out of scope) replaced by `payload`.
    /// Fails if the document isn't an object, since a top-level array or
    /// scalar body has no named parameter to target.
    pub fn with_leaf(&self, key: &str, payload: Value) -> anyhow::Result<Value> {
        let mut clone = self.clone();
        let map = clone
            .as_object_mut()
            .ok_or_else(|| anyhow::anyhow!("request body is not an object; cannot target parameter `{key}`"))?;
        if !map.contains_key(key) {
            anyhow::bail!("parameter `{key}` is not present in the request body");
        }
        map.insert(key.to_string(), payload);
        Ok(clone)
    }

    /// Top-level keys in insertion order. Errors for non-object bodies —
    /// a list-shaped top-level body has no named scan targets and is
    /// refused rather than silently skipped.
    pub fn top_level_keys(&self) -> anyhow::Result<Vec<String>> {
        self.as_object()
            .map(|m| m.keys().cloned().collect())
            .ok_or_else(|| anyhow::anyhow!("top-level request body must be an object; array/scalar bodies are not scannable"))
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Num(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => {
                let mut obj = serde_json::Map::new();
                for (k, v) in map {
                    obj.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(obj)
            }
        }
    }

    pub fn from_json(v: serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Num(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => Value::Array(items.into_iter().map(Value::from_json).collect()),
            serde_json::Value::Object(obj) => {
                Value::Object(obj.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect())
            }
        }
    }

    /// Recursively sorted-key JSON text, used only for session
    /// fingerprinting — never for wire encoding, where key order must
    /// stay whatever the tamper pipeline produced.
    pub fn canonical_json(&self) -> String {
        fn sorted(v: &Value) -> serde_json::Value {
            match v {
                Value::Object(map) => {
                    let mut keys: Vec<&String> = map.keys().collect();
                    keys.sort();
                    let mut obj = serde_json::Map::new();
                    for k in keys {
                        obj.insert(k.clone(), sorted(&map[k]));
                    }
                    serde_json::Value::Object(obj)
                }
                Value::Array(items) => serde_json::Value::Array(items.iter().map(sorted).collect()),
                other => other.to_json(),
            }
        }
        sorted(self).to_string()
    }

    /// Strips keys matching the WAF-evasion junk-key shape (`_` followed
    /// by 3-5 lowercase letters) so a resumed session fingerprints the
    /// same request regardless of which random junk keys a prior run's
    /// evasion wrapper happened to add.
    pub fn strip_junk_keys(&self) -> Value {
        match self {
            Value::Object(map) => {
                let mut out = IndexMap::new();
                for (k, v) in map {
                    if is_junk_key(k) {
                        continue;
                    }
                    out.insert(k.clone(), v.strip_junk_keys());
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(Value::strip_junk_keys).collect()),
            other => other.clone(),
        }
    }
}

fn is_junk_key(key: &str) -> bool {
    let rest = match key.strip_prefix('_') {
        Some(r) => r,
        None => return false,
    };
    (3..=5).contains(&rest.len()) && rest.chars().all(|c| c.is_ascii_lowercase())
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from_json(v))
    }
}
