//! Small set of path/limit defaults that aren't worth exposing as CLI
//! flags, mirroring the reference tool's bundled `config.py` constants.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub session_dir: PathBuf,
    pub payload_catalog_path: PathBuf,
    pub user_agents_path: PathBuf,
    pub max_length_probe: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_dir: PathBuf::from(".tomcat_sessions"),
            payload_catalog_path: crate::payloads::PayloadCatalog::default_path(),
            user_agents_path: PathBuf::from("user-agents.txt"),
            max_length_probe: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_session_dir_is_relative_and_hidden() {
        let cfg = Config::default();
        assert_eq!(cfg.session_dir, PathBuf::from(".tomcat_sessions"));
    }
}
