//! Server configuration, read from a TOML file.
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//!
//! [storage]
//! data_dir = "/var/lib/depot"
//!
//! [rma]
//! batch_prefix = "RMA"
//! ```

use std::path::{Path, PathBuf};

use rma::RmaConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,
    pub storage: StorageSection,
    #[serde(default)]
    pub rma: RmaConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageSection {
    pub data_dir: String,
}

impl ServerConfig {
    /// A bare name resolves to `/etc/depot/<name>.toml`; anything that looks
    /// like a path is used as is.
    pub fn resolve_path(arg: &str) -> PathBuf {
        if arg.contains('/') || arg.contains('.') {
            PathBuf::from(arg)
        } else {
            PathBuf::from(format!("/etc/depot/{arg}.toml"))
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: ServerConfig = toml::from_str(content)?;
        config.verify()?;
        Ok(config)
    }

    /// Refuse to start on settings the modules cannot work with.
    fn verify(&self) -> anyhow::Result<()> {
        if self.storage.data_dir.trim().is_empty() {
            anyhow::bail!("storage.data_dir is empty in configuration");
        }
        if self.rma.batch_prefix.trim().is_empty() {
            anyhow::bail!("rma.batch_prefix is empty in configuration");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_file() {
        let config = ServerConfig::parse(
            r#"
            [server]
            listen = "127.0.0.1:9000"

            [storage]
            data_dir = "/tmp/depot"

            [rma]
            batch_prefix = "RET"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9000");
        assert_eq!(config.storage.data_dir, "/tmp/depot");
        assert_eq!(config.rma.batch_prefix, "RET");
    }

    #[test]
    fn defaults_apply() {
        let config = ServerConfig::parse("[storage]\ndata_dir = \"data\"\n").unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:8080");
        assert_eq!(config.rma.batch_prefix, "RMA");
    }

    #[test]
    fn empty_data_dir_is_rejected() {
        assert!(ServerConfig::parse("[storage]\ndata_dir = \"\"\n").is_err());
        assert!(ServerConfig::parse("[server]\nlisten = \"x\"\n").is_err());
    }

    #[test]
    fn resolve_path_by_name_or_path() {
        assert_eq!(
            ServerConfig::resolve_path("stage"),
            PathBuf::from("/etc/depot/stage.toml")
        );
        assert_eq!(
            ServerConfig::resolve_path("./depot.toml"),
            PathBuf::from("./depot.toml")
        );
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depot.toml");
        std::fs::write(&path, "[storage]\ndata_dir = \"/srv/depot\"\n").unwrap();
        assert_eq!(ServerConfig::load(&path).unwrap().storage.data_dir, "/srv/depot");
        assert!(ServerConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
