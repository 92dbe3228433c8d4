//! `--dbs`/`--collections`/`--users`/`--dump`: thin wrappers that pick a
//! canned expression out of the payload catalog's enumeration templates
//! and drive it through the custom-expression extraction path.

use crate::engine::Engine;
use crate::fingerprint::Backend;
use crate::orchestrator;
use crate::payloads::EnumerationTemplates;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumerationTarget {
    CurrentDb,
    CurrentUser,
    ServerVersion,
    ListCollections,
}

impl EnumerationTarget {
    fn template_key(self) -> &'static str {
        match self {
            EnumerationTarget::CurrentDb => "current_db",
            EnumerationTarget::CurrentUser => "current_user",
            EnumerationTarget::ServerVersion => "server_version",
            EnumerationTarget::ListCollections => "list_collections",
        }
    }
}

pub fn run(engine: &Engine, backend: &Backend, templates: &EnumerationTemplates, target: EnumerationTarget) -> anyhow::Result<Option<String>> {
    let table = if *backend == Backend::Generic { &templates.generic } else { &templates.mongodb };
    let Some(expr) = table.get(target.template_key()) else {
        tracing::warn!(target = target.template_key(), "no enumeration template for this backend");
        return Ok(None);
    };
    orchestrator::run_custom_expression(engine, expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_keys_match_catalog_shape() {
        assert_eq!(EnumerationTarget::CurrentDb.template_key(), "current_db");
        assert_eq!(EnumerationTarget::ListCollections.template_key(), "list_collections");
    }
}
