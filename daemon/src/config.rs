//! Daemon configuration file (TOML).

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

pub const DEFAULT_SOCKET: &str = "/tmp/klish-unix.sock";
pub const DEFAULT_CONFIG: &str = "/etc/klish/klishd.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen socket path.
    pub socket: PathBuf,
    /// View every session starts in.
    pub start_view: String,
    /// Scheme files (JSON), merged in order.
    pub scheme: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket: PathBuf::from(DEFAULT_SOCKET),
            start_view: "main".to_string(),
            scheme: Vec::new(),
        }
    }
}

impl Config {
    /// Read the file when present; a missing default config is not an
    /// error, a missing explicit one is.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG), false),
        };
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(anyhow::anyhow!("can't read {}: {e}", path.display()));
            }
        };
        let config: Self = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("bad config {}: {e}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_apply_to_missing_keys() {
        let config: Config = toml::from_str("start_view = \"enable\"").unwrap();
        assert_eq!(config.start_view, "enable");
        assert_eq!(config.socket, PathBuf::from(DEFAULT_SOCKET));
        assert!(config.scheme.is_empty());
    }

    #[test]
    fn full_config_parses() {
        let text = r#"
socket = "/run/klishd.sock"
start_view = "main"
scheme = ["/etc/klish/base.json", "/etc/klish/net.json"]
"#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.socket, PathBuf::from("/run/klishd.sock"));
        assert_eq!(config.scheme.len(), 2);
    }
}
