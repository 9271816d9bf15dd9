//! Configuration structures loaded from TOML, matching the ambient
//! stack's `serde` + `toml` choice. Argument parsing itself lives in the
//! example binaries under `demos/`.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

fn default_listen_addr() -> String {
    "0.0.0.0:27298".to_string()
}

fn default_timeout_secs() -> u64 {
    4
}

fn default_keepalive_secs() -> u64 {
    2
}

/// Server-side configuration: where the store lives, where to listen,
/// and the TLS material to present and verify against.
#[derive(Debug, Clone, Deserialize)]
pub struct VaultConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub data_dir: PathBuf,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub ca_cert_path: PathBuf,
    /// Use the directory fan-out chunk store (supports optimised seek
    /// I/O) instead of the embedded `sled` chunk store.
    #[serde(default)]
    pub fanout_chunks: bool,
}

/// Client-side configuration: where to connect, and the per-call and
/// keep-alive timing spec.md §4.6 describes.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub server_addr: String,
    pub server_name: String,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub ca_cert_path: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }
}

/// Errors loading or parsing a config file.
#[derive(Debug)]
pub enum Error {
    /// The file could not be read.
    Io(std::io::Error),
    /// The file's contents are not valid TOML for the target type.
    Parse(toml::de::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "reading config: {e}"),
            Error::Parse(e) => write!(f, "parsing config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Parse(e)
    }
}

pub fn load<T: serde::de::DeserializeOwned>(path: impl AsRef<std::path::Path>) -> Result<T, Error> {
    let text = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vault_config_applies_defaults_for_omitted_fields() {
        let toml = r#"
            data_dir = "/var/lib/vaultfs"
            cert_path = "/etc/vaultfs/server.crt"
            key_path = "/etc/vaultfs/server.key"
            ca_cert_path = "/etc/vaultfs/ca.crt"
        "#;
        let cfg: VaultConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.listen_addr, "0.0.0.0:27298");
        assert!(!cfg.fanout_chunks);
    }

    #[test]
    fn client_config_timeout_converts_seconds_to_a_duration() {
        let toml = r#"
            server_addr = "127.0.0.1:27298"
            server_name = "vaultfs.local"
            cert_path = "/etc/vaultfs/client.crt"
            key_path = "/etc/vaultfs/client.key"
            ca_cert_path = "/etc/vaultfs/ca.crt"
        "#;
        let cfg: ClientConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.timeout(), Duration::from_secs(4));
        assert_eq!(cfg.keepalive_secs, 2);
    }

    #[test]
    fn load_reports_io_error_for_a_missing_file() {
        let err = load::<VaultConfig>("/nonexistent/path/vaultfs.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
