use anyhow::{Context, Result};
use reqwest::Url;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::crypto::KeyAlgorithm;
use crate::csr::SubjectAttributes;
use crate::transport::{parse_base_url, resolve_url};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub subject: SubjectAttributes,
    #[serde(default)]
    pub key: KeyAlgorithm,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_enroll_path")]
    pub enroll_path: String,
    /// Request timeout; requests wait indefinitely when unset
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            enroll_path: default_enroll_path(),
            timeout_secs: None,
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_enroll_path() -> String {
    "/certs/enroll".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_bundle_path")]
    pub bundle_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            bundle_path: default_bundle_path(),
        }
    }
}

fn default_bundle_path() -> PathBuf {
    PathBuf::from(crate::bundle::BUNDLE_FILE_NAME)
}

impl ServerConfig {
    pub fn base_url(&self) -> Result<Url> {
        parse_base_url(&self.base_url).context("Invalid server.base_url")
    }

    /// Absolute enrollment endpoint: `enroll_path` resolved against `base_url`.
    pub fn enroll_url(&self) -> Result<Url> {
        let base = self.base_url()?;
        resolve_url(&base, &self.enroll_path).context("Invalid server.enroll_path")
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig =
            toml::from_str(&config_str).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration with default path (config.toml)
    pub fn load() -> Result<Self> {
        Self::from_file(DEFAULT_CONFIG_PATH)
    }

    /// Load `path` when given, otherwise `config.toml` if it exists, otherwise
    /// the built-in defaults. An explicitly named file must exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{EcCurve, HashAlgorithm, SignatureScheme};
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.base_url, "http://127.0.0.1:8000");
        assert_eq!(
            config.server.enroll_url().unwrap().as_str(),
            "http://127.0.0.1:8000/certs/enroll"
        );
        assert!(config.server.timeout().is_none());
        assert_eq!(config.subject.common_name, "yadd@debian.org");
        assert_eq!(config.subject.organization, "Debian");
        assert_eq!(config.subject.organizational_unit, "Debian Developers");
        assert_eq!(config.key, KeyAlgorithm::default());
        assert_eq!(config.output.bundle_path, PathBuf::from("client.p12"));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.enroll_path, "/certs/enroll");
        assert_eq!(config.key.rsa_bits, 2048);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[server]
base_url = "https://nm.example.org/"
timeout_secs = 30

[subject]
common_name = "jdoe@example.org"

[key]
scheme = "ECDSA"
hash = "SHA-256"
ec_curve = "P-384"

[output]
bundle_path = "out/jdoe.p12"
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(
            config.server.enroll_url().unwrap().as_str(),
            "https://nm.example.org/certs/enroll"
        );
        assert_eq!(config.server.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.subject.common_name, "jdoe@example.org");
        assert_eq!(config.subject.organization, "Debian");
        assert_eq!(config.key.scheme, SignatureScheme::Ecdsa);
        assert_eq!(config.key.hash, HashAlgorithm::Sha256);
        assert_eq!(config.key.ec_curve, EcCurve::P384);
        assert_eq!(config.key.rsa_bits, 2048);
        assert_eq!(config.output.bundle_path, PathBuf::from("out/jdoe.p12"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(AppConfig::load_or_default(Some(missing.as_path())).is_err());
    }

    #[test]
    fn test_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[server\nbase_url = ").unwrap();
        assert!(AppConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_invalid_base_url() {
        let server = ServerConfig {
            base_url: "not a url".to_string(),
            ..ServerConfig::default()
        };
        assert!(server.enroll_url().is_err());
    }
}
