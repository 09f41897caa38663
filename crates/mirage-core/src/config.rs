//! Honeypot configuration.
//!
//! The config file is YAML and enumerates the listening ports, named TLS
//! profiles, the completion model and API key, the prompt template, and the
//! response-cache policy. Everything is read once at startup and shared
//! read-only afterwards.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the config file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A TLS port does not name a TLS profile.
    #[error("TLS profile not configured for port {port}")]
    TlsProfileMissing { port: u16 },

    /// A TLS port names a profile that is not in the profile map.
    #[error("unknown TLS profile {name:?} for port {port}")]
    TlsProfileUnknown { port: u16, name: String },

    /// A TLS profile is missing its certificate or key path.
    #[error("TLS profile {name:?} for port {port} is incomplete")]
    TlsProfileIncomplete { port: u16, name: String },

    /// The prompt template must contain exactly one `%s` slot for the
    /// raw request dump.
    #[error("prompt template must contain exactly one %s slot, found {found}")]
    PromptTemplate { found: usize },
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Listener protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Http,
    Tls,
}

/// One listening port.
#[derive(Debug, Clone, Deserialize)]
pub struct PortConfig {
    pub port: u16,
    pub protocol: Protocol,
    /// Name of an entry in [`Config::tls`]; required when `protocol` is TLS.
    #[serde(default)]
    pub tls_profile: Option<String>,
}

/// Certificate and key paths for a TLS listener.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsProfile {
    pub certificate: PathBuf,
    pub key: PathBuf,
}

impl TlsProfile {
    /// Returns true when both the certificate and key paths are set.
    pub fn is_complete(&self) -> bool {
        !self.certificate.as_os_str().is_empty() && !self.key.as_os_str().is_empty()
    }
}

/// Response-cache key policy.
///
/// The original key of `"<port>_<uri>"` makes two distinct POSTs to the same
/// path collide; `uri_method_body` widens the key with the method and body
/// digest. Changing the policy changes replay semantics, so it is
/// configuration rather than a constant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKeyPolicy {
    /// Key on `(port, request URI)` only.
    #[default]
    Uri,
    /// Key on `(port, request URI, method, body SHA-256)`.
    UriMethodBody,
}

/// Top-level honeypot configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Ports to listen on.
    pub ports: Vec<PortConfig>,
    /// Named TLS profiles referenced by TLS ports.
    #[serde(default)]
    pub tls: HashMap<String, TlsProfile>,
    /// Completion model identifier.
    pub model: String,
    /// Bearer token for the completion API.
    pub api_key: String,
    /// Prompt template with exactly one `%s` slot for the raw request dump.
    pub prompt_template: String,
    /// How long a cached response stays valid.
    pub cache_duration_hours: u64,
    /// Response-cache key policy.
    #[serde(default)]
    pub cache_key: CacheKeyPolicy,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("ports", &self.ports)
            .field("tls", &self.tls)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("prompt_template", &self.prompt_template)
            .field("cache_duration_hours", &self.cache_duration_hours)
            .field("cache_key", &self.cache_key)
            .finish()
    }
}

impl Config {
    /// Loads and validates the configuration at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates invariants that the type system cannot express.
    pub fn validate(&self) -> Result<()> {
        for pc in &self.ports {
            if pc.protocol != Protocol::Tls {
                continue;
            }
            let name = pc
                .tls_profile
                .as_deref()
                .ok_or(ConfigError::TlsProfileMissing { port: pc.port })?;
            let profile = self
                .tls
                .get(name)
                .ok_or_else(|| ConfigError::TlsProfileUnknown {
                    port: pc.port,
                    name: name.to_string(),
                })?;
            if !profile.is_complete() {
                return Err(ConfigError::TlsProfileIncomplete {
                    port: pc.port,
                    name: name.to_string(),
                });
            }
        }

        let found = self.prompt_template.matches("%s").count();
        if found != 1 {
            return Err(ConfigError::PromptTemplate { found });
        }

        Ok(())
    }

    /// The response-cache TTL as a duration.
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache_duration_hours as i64)
    }

    /// Resolves the TLS profile for a port, with the same errors as
    /// [`validate`](Self::validate) so listeners can fail descriptively.
    pub fn tls_profile_for(&self, pc: &PortConfig) -> Result<&TlsProfile> {
        let name = pc
            .tls_profile
            .as_deref()
            .ok_or(ConfigError::TlsProfileMissing { port: pc.port })?;
        let profile = self
            .tls
            .get(name)
            .ok_or_else(|| ConfigError::TlsProfileUnknown {
                port: pc.port,
                name: name.to_string(),
            })?;
        if !profile.is_complete() {
            return Err(ConfigError::TlsProfileIncomplete {
                port: pc.port,
                name: name.to_string(),
            });
        }
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_yaml() -> &'static str {
        r#"
ports:
  - port: 8080
    protocol: HTTP
  - port: 8443
    protocol: TLS
    tls_profile: default
tls:
  default:
    certificate: "cert/cert.pem"
    key: "cert/key.pem"
model: "pplx-7b-chat"
api_key: "secret"
prompt_template: "Respond to this request: %s"
cache_duration_hours: 24
"#
    }

    #[test]
    fn parses_and_validates() {
        let config: Config = serde_yaml::from_str(base_yaml()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.ports.len(), 2);
        assert_eq!(config.ports[0].protocol, Protocol::Http);
        assert_eq!(config.ports[1].protocol, Protocol::Tls);
        assert_eq!(config.ports[1].tls_profile.as_deref(), Some("default"));
        assert_eq!(config.cache_duration_hours, 24);
        assert_eq!(config.cache_key, CacheKeyPolicy::Uri);
    }

    #[test]
    fn rejects_unknown_protocol() {
        let yaml = base_yaml().replace("protocol: HTTP", "protocol: QUIC");
        assert!(serde_yaml::from_str::<Config>(&yaml).is_err());
    }

    #[test]
    fn rejects_tls_port_without_profile_name() {
        let yaml = base_yaml().replace("    tls_profile: default\n", "");
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TlsProfileMissing { port: 8443 })
        ));
    }

    #[test]
    fn rejects_unknown_tls_profile() {
        let yaml = base_yaml().replace("tls_profile: default", "tls_profile: missing");
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TlsProfileUnknown { port: 8443, .. })
        ));
    }

    #[test]
    fn rejects_incomplete_tls_profile() {
        let yaml = base_yaml().replace("key: \"cert/key.pem\"", "key: \"\"");
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TlsProfileIncomplete { port: 8443, .. })
        ));
    }

    #[test]
    fn rejects_prompt_template_without_slot() {
        let yaml = base_yaml().replace("%s", "");
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PromptTemplate { found: 0 })
        ));
    }

    #[test]
    fn rejects_prompt_template_with_two_slots() {
        let yaml = base_yaml().replace("%s", "%s %s");
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PromptTemplate { found: 2 })
        ));
    }

    #[test]
    fn load_reads_and_validates_a_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, base_yaml()).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.model, "pplx-7b-chat");

        assert!(matches!(
            Config::load(dir.path().join("missing.yaml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn cache_key_policy_is_configurable() {
        let yaml = format!("{}cache_key: uri_method_body\n", base_yaml());
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.cache_key, CacheKeyPolicy::UriMethodBody);
    }

    #[test]
    fn debug_redacts_api_key() {
        let config: Config = serde_yaml::from_str(base_yaml()).unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn cache_ttl_in_hours() {
        let config: Config = serde_yaml::from_str(base_yaml()).unwrap();
        assert_eq!(config.cache_ttl(), chrono::Duration::hours(24));
    }
}
