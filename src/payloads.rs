//! Loads the user-editable payload catalog (`core/payloads.json`):
//! auth-bypass operator payloads, JS-injection `$where` templates, and
//! the canned target expressions the enumeration wrappers drive through
//! the custom-expression extraction path.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::value::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct EnumerationTemplates {
    pub mongodb: BTreeMap<String, String>,
    pub generic: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayloadCatalog {
    pub auth_bypass: Vec<Value>,
    pub js_injection: Vec<Value>,
    pub enumeration_templates: EnumerationTemplates,
}

impl PayloadCatalog {
    pub fn load(path: &Path) -> Result<PayloadCatalog> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading payload catalog at {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing payload catalog at {}", path.display()))
    }

    pub fn default_path() -> std::path::PathBuf {
        std::path::PathBuf::from("core/payloads.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_catalog_parses_and_has_expected_shape() {
        let raw = include_str!("../core/payloads.json");
        let catalog: PayloadCatalog = serde_json::from_str(raw).expect("bundled payload catalog must parse");
        assert!(!catalog.auth_bypass.is_empty());
        assert!(!catalog.js_injection.is_empty());
        assert!(catalog.enumeration_templates.mongodb.contains_key("current_db"));
    }
}
