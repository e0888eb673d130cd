//! Provider configuration
//!
//! Settings are layered: a JSON file first, then `HW_*` environment
//! variables, then explicit overrides (CLI flags). Later layers win.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::signer::Credentials;

/// Default per-request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Services served from a global endpoint rather than a regional one
const GLOBAL_SERVICES: &[&str] = &["bss"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid endpoint for {service}: {endpoint}")]
    InvalidEndpoint { service: String, endpoint: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Connection settings for the Huawei Cloud APIs
#[derive(Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    pub region: Option<String>,
    pub project_id: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub security_token: Option<String>,
    /// Base URL overrides keyed by service name (e.g. "cph", "cae", "bss")
    pub endpoints: HashMap<String, String>,
    /// Skip TLS certificate verification
    pub insecure: Option<bool>,
    pub request_timeout_secs: Option<u64>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("region", &self.region)
            .field("project_id", &self.project_id)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field(
                "security_token",
                &self.security_token.as_ref().map(|_| "<redacted>"),
            )
            .field("endpoints", &self.endpoints)
            .field("insecure", &self.insecure)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl ProviderConfig {
    /// Load settings from a JSON file
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load settings from the `HW_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Self {
            region: get("HW_REGION_NAME"),
            project_id: get("HW_PROJECT_ID"),
            access_key: get("HW_ACCESS_KEY"),
            secret_key: get("HW_SECRET_KEY"),
            security_token: get("HW_SECURITY_TOKEN"),
            endpoints: HashMap::new(),
            insecure: get("HW_INSECURE").map(|v| v == "true" || v == "1"),
            request_timeout_secs: None,
        }
    }

    /// Overlay `other` on top of `self`; values set in `other` win
    pub fn merge(mut self, other: ProviderConfig) -> Self {
        self.region = other.region.or(self.region);
        self.project_id = other.project_id.or(self.project_id);
        self.access_key = other.access_key.or(self.access_key);
        self.secret_key = other.secret_key.or(self.secret_key);
        self.security_token = other.security_token.or(self.security_token);
        self.endpoints.extend(other.endpoints);
        self.insecure = other.insecure.or(self.insecure);
        self.request_timeout_secs = other.request_timeout_secs.or(self.request_timeout_secs);
        self
    }

    /// Check that everything needed to call an API is present
    pub fn validate(&self) -> ConfigResult<()> {
        self.region()?;
        self.project_id()?;
        self.credentials()?;
        for (service, endpoint) in &self.endpoints {
            if url::Url::parse(endpoint).is_err() {
                return Err(ConfigError::InvalidEndpoint {
                    service: service.clone(),
                    endpoint: endpoint.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn region(&self) -> ConfigResult<&str> {
        self.region.as_deref().ok_or(ConfigError::Missing("region"))
    }

    pub fn project_id(&self) -> ConfigResult<&str> {
        self.project_id
            .as_deref()
            .ok_or(ConfigError::Missing("project_id"))
    }

    pub fn credentials(&self) -> ConfigResult<Credentials> {
        let access_key = self
            .access_key
            .clone()
            .ok_or(ConfigError::Missing("access_key"))?;
        let secret_key = self
            .secret_key
            .clone()
            .ok_or(ConfigError::Missing("secret_key"))?;
        Ok(Credentials {
            access_key,
            secret_key,
            security_token: self.security_token.clone(),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    /// Base URL of `service`, always ending with '/'
    pub fn endpoint_for(&self, service: &str) -> ConfigResult<String> {
        if let Some(endpoint) = self.endpoints.get(service) {
            return Ok(if endpoint.ends_with('/') {
                endpoint.clone()
            } else {
                format!("{}/", endpoint)
            });
        }

        if GLOBAL_SERVICES.contains(&service) {
            return Ok(format!("https://{}.myhuaweicloud.com/", service));
        }

        Ok(format!(
            "https://{}.{}.myhuaweicloud.com/",
            service,
            self.region()?
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn full_config() -> ProviderConfig {
        ProviderConfig {
            region: Some("cn-north-4".to_string()),
            project_id: Some("0123456789abcdef".to_string()),
            access_key: Some("AK".to_string()),
            secret_key: Some("SK".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_endpoint_resolution() {
        let mut config = full_config();
        assert_eq!(
            config.endpoint_for("cph").unwrap(),
            "https://cph.cn-north-4.myhuaweicloud.com/"
        );
        assert_eq!(
            config.endpoint_for("bss").unwrap(),
            "https://bss.myhuaweicloud.com/"
        );

        config
            .endpoints
            .insert("cae".to_string(), "http://127.0.0.1:8080".to_string());
        assert_eq!(config.endpoint_for("cae").unwrap(), "http://127.0.0.1:8080/");
    }

    #[test]
    fn test_regional_endpoint_requires_region() {
        let config = ProviderConfig::default();
        assert!(matches!(
            config.endpoint_for("cph"),
            Err(ConfigError::Missing("region"))
        ));
    }

    #[test]
    fn test_from_lookup_reads_hw_variables() {
        let env: HashMap<&str, &str> = [
            ("HW_REGION_NAME", "ap-southeast-1"),
            ("HW_ACCESS_KEY", "AK"),
            ("HW_SECRET_KEY", "SK"),
            ("HW_PROJECT_ID", ""),
        ]
        .into_iter()
        .collect();

        let config = ProviderConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.region.as_deref(), Some("ap-southeast-1"));
        assert_eq!(config.project_id, None);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("project_id"))
        ));
    }

    #[test]
    fn test_merge_prefers_later_layer() {
        let file = full_config();
        let flags = ProviderConfig {
            region: Some("cn-south-1".to_string()),
            ..Default::default()
        };

        let merged = file.merge(flags);
        assert_eq!(merged.region.as_deref(), Some("cn-south-1"));
        assert_eq!(merged.access_key.as_deref(), Some("AK"));
        assert!(merged.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "region": "cn-north-4",
                "project_id": "p-1",
                "access_key": "AK",
                "secret_key": "SK",
                "endpoints": {{"cph": "https://cph.example.com"}},
                "request_timeout_secs": 5
            }}"#
        )
        .unwrap();

        let config = ProviderConfig::from_file(file.path()).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(
            config.endpoint_for("cph").unwrap(),
            "https://cph.example.com/"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_rejects_unknown_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"regoin": "cn-north-4"}}"#).unwrap();

        let err = ProviderConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let text = format!("{:?}", full_config());
        assert!(text.contains("<redacted>"));
        assert!(!text.contains("\"SK\""));
    }
}
