//! On-disk checkpoint store keyed by a content-addressed fingerprint of
//! the request, so a run can be killed and resumed without re-probing
//! already-extracted characters.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::request::Method;
use crate::value::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InjectionRecord {
    pub strategy_index: Option<usize>,
    pub data_length: Option<usize>,
    pub extracted_data: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default)]
    pub injections: IndexMap<String, InjectionRecord>,
    /// Top-level keys outside `injections`, e.g. the fingerprinted
    /// backend or a resolved database name, written by `update_global`.
    #[serde(flatten, default)]
    pub globals: IndexMap<String, serde_json::Value>,
}

impl InjectionRecord {
    pub fn apply(&mut self, key: &str, value: serde_json::Value) {
        match key {
            "strategy_index" => self.strategy_index = value.as_u64().map(|n| n as usize),
            "data_length" => self.data_length = value.as_u64().map(|n| n as usize),
            "extracted_data" => self.extracted_data = value.as_str().map(|s| s.to_string()),
            "status" => self.status = value.as_str().map(|s| s.to_string()),
            _ => {}
        }
    }
}

pub struct SessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>, fingerprint: &str) -> anyhow::Result<SessionStore> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(SessionStore {
            path: dir.join(format!("{fingerprint}.json")),
            lock: Mutex::new(()),
        })
    }

    /// MD5 of the method, URL, canonicalized (sorted-key, junk-key
    /// stripped) body and an optional custom-expression key, matching
    /// the reference tool's session-filename scheme with the Open
    /// Question about body canonicalization resolved in favor of
    /// stability across WAF-evasion noise.
    pub fn fingerprint(method: Method, url: &str, body: &Value, expr_key: Option<&str>) -> String {
        let canon = body.strip_junk_keys().canonical_json();
        let key = format!("{}{}{}{}", method.as_str(), url, canon, expr_key.unwrap_or("default"));
        format!("{:x}", md5::compute(key.as_bytes()))
    }

    pub fn load(&self) -> SessionRecord {
        let _guard = self.lock.lock();
        self.read_unlocked()
    }

    fn read_unlocked(&self) -> SessionRecord {
        match fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!(path = %self.path.display(), error = %e, "corrupt session file, starting fresh");
                SessionRecord::default()
            }),
            Err(_) => SessionRecord::default(),
        }
    }

    fn write_unlocked(&self, record: &SessionRecord) {
        let result = (|| -> anyhow::Result<()> {
            let text = serde_json::to_string_pretty(record)?;
            let mut f = fs::File::create(&self.path)?;
            f.write_all(text.as_bytes())?;
            f.sync_all()?;
            Ok(())
        })();
        if let Err(e) = result {
            tracing::error!(path = %self.path.display(), error = %e, "failed to persist session checkpoint");
        }
    }

    pub fn update(&self, param: &str, key: &str, value: serde_json::Value) {
        let _guard = self.lock.lock();
        let mut record = self.read_unlocked();
        let entry = record.injections.entry(param.to_string()).or_default();
        entry.apply(key, value);
        self.write_unlocked(&record);
    }

    /// Writes a top-level session key outside `injections`, mirroring
    /// the reference tool's `_save_session` for run-wide facts (e.g. the
    /// fingerprinted backend) that aren't scoped to a single parameter.
    pub fn update_global(&self, key: &str, value: serde_json::Value) {
        let _guard = self.lock.lock();
        let mut record = self.read_unlocked();
        record.globals.insert(key.to_string(), value);
        self.write_unlocked(&record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile_like::TempDir;

    /// Minimal stand-in for a scratch directory; avoids adding a
    /// `tempfile` dependency for three tests.
    mod tempfile_like {
        use std::path::{Path, PathBuf};

        pub struct TempDir(PathBuf);

        impl TempDir {
            pub fn new(name: &str) -> TempDir {
                let dir = std::env::temp_dir().join(format!("tomcat-session-test-{name}-{}", std::process::id()));
                let _ = std::fs::remove_dir_all(&dir);
                std::fs::create_dir_all(&dir).unwrap();
                TempDir(dir)
            }
            pub fn path(&self) -> &Path {
                &self.0
            }
        }

        impl Drop for TempDir {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.0);
            }
        }
    }

    #[test]
    fn fingerprint_ignores_junk_keys_and_key_order() {
        let a = Value::from_json(serde_json::json!({"username": "a", "_xyz": "1"}));
        let b = Value::from_json(serde_json::json!({"_abc": "2", "username": "a"}));
        assert_eq!(
            SessionStore::fingerprint(Method::Post, "http://x/y", &a, None),
            SessionStore::fingerprint(Method::Post, "http://x/y", &b, None)
        );
    }

    #[test]
    fn update_then_load_round_trips() {
        let dir = TempDir::new("roundtrip");
        let store = SessionStore::new(dir.path(), "fp").unwrap();
        store.update("username", "extracted_data", serde_json::Value::String("adm?n".to_string()));
        let loaded = store.load();
        assert_eq!(
            loaded.injections.get("username").unwrap().extracted_data.as_deref(),
            Some("adm?n")
        );
    }

    #[test]
    fn update_global_persists_a_top_level_key_outside_injections() {
        let dir = TempDir::new("global");
        let store = SessionStore::new(dir.path(), "fp").unwrap();
        store.update("username", "extracted_data", serde_json::Value::String("adm?n".to_string()));
        store.update_global("backend", serde_json::Value::String("mongodb".to_string()));
        let loaded = store.load();
        assert_eq!(loaded.globals.get("backend"), Some(&serde_json::Value::String("mongodb".to_string())));
        assert!(loaded.injections.contains_key("username"));
    }

    #[test]
    fn corrupt_session_file_starts_fresh_instead_of_panicking() {
        let dir = TempDir::new("corrupt");
        let store = SessionStore::new(dir.path(), "fp").unwrap();
        std::fs::write(dir.path().join("fp.json"), "{not valid json").unwrap();
        let loaded = store.load();
        assert!(loaded.injections.is_empty());
    }
}
