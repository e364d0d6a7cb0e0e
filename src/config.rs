//! Flowwright Configuration Module
//!
//! Connection settings for the flow platform and assembly thresholds.
//! Config is stored in `~/.config/flowwright/config.toml`.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Environment variables (`NIFI_BASE_URL`, `NIFI_USERNAME`, `NIFI_PASSWORD`,
//!    `NIFI_TLS_VERIFY`, `FLOWWRIGHT_SCOPE`)
//! 2. Config file (`~/.config/flowwright/config.toml`, or `--config`)
//! 3. Defaults
//!
//! ```toml
//! [server]
//! base_url = "https://localhost:8443/nifi-api"
//! username = "admin"
//! tls_verify = false
//!
//! [assembly]
//! default_scope = "root"
//! max_unit_failures = 3
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FlowConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub assembly: AssemblySettings,
}

/// Flow platform connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// REST API root, e.g. `https://nifi:8443/nifi-api`
    pub base_url: String,

    /// Username for token auth (anonymous access when unset)
    pub username: Option<String>,

    pub password: Option<String>,

    /// Verify TLS certificates
    pub tls_verify: bool,

    /// Per-request timeout
    pub timeout_secs: u64,

    /// Extra attempts for read calls on transport errors (writes are never retried)
    pub read_retries: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/nifi-api".to_string(),
            username: None,
            password: None,
            tls_verify: true,
            timeout_secs: 30,
            read_retries: 2,
        }
    }
}

/// Thresholds and switches for one assembly run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssemblySettings {
    /// Scope used when neither the batch nor the command line names one
    pub default_scope: Option<String>,

    /// Service creation failures that trigger rollback
    pub max_service_failures: usize,

    /// Unit creation/correction failures that trigger rollback
    pub max_unit_failures: usize,

    /// Link creation failures that trigger rollback
    pub max_link_failures: usize,

    /// Suggestions listed per unknown type
    pub type_suggestion_limit: usize,

    /// Run the post-creation flow review
    pub validate_after: bool,
}

impl Default for AssemblySettings {
    fn default() -> Self {
        Self {
            default_scope: None,
            max_service_failures: 2,
            max_unit_failures: 3,
            max_link_failures: 3,
            type_suggestion_limit: 5,
            validate_after: true,
        }
    }
}

impl FlowConfig {
    /// Get the config directory path
    ///
    /// Returns `~/.config/flowwright/` on Unix, `%APPDATA%/flowwright/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("flowwright")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load from the default location
    ///
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load from an explicit path
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns error if the file exists but is malformed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| FlowError::ConfigError {
            reason: format!("Failed to read config file: {}", e),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| FlowError::ConfigError {
            reason: format!("Failed to parse config file: {}", e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Merge with environment variables
    ///
    /// Environment variables take precedence over config file values.
    pub fn with_env(mut self) -> Self {
        if let Some(url) = non_empty_env("NIFI_BASE_URL") {
            self.server.base_url = url;
        }
        if let Some(user) = non_empty_env("NIFI_USERNAME") {
            self.server.username = Some(user);
        }
        if let Some(password) = non_empty_env("NIFI_PASSWORD") {
            self.server.password = Some(password);
        }
        if let Some(verify) = non_empty_env("NIFI_TLS_VERIFY") {
            self.server.tls_verify = !matches!(
                verify.to_ascii_lowercase().as_str(),
                "false" | "0" | "no" | "off"
            );
        }
        if let Some(scope) = non_empty_env("FLOWWRIGHT_SCOPE") {
            self.assembly.default_scope = Some(scope);
        }
        self
    }

    /// Reject values that would make an assembly run meaningless
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.server.base_url).map_err(|e| FlowError::ConfigError {
            reason: format!("server.base_url '{}' is not a valid URL: {}", self.server.base_url, e),
        })?;

        let thresholds = [
            ("max_service_failures", self.assembly.max_service_failures),
            ("max_unit_failures", self.assembly.max_unit_failures),
            ("max_link_failures", self.assembly.max_link_failures),
        ];
        for (key, value) in thresholds {
            if value == 0 {
                return Err(FlowError::ConfigError {
                    reason: format!("assembly.{} must be at least 1", key),
                });
            }
        }

        Ok(())
    }

    /// TOML rendering with the password masked
    pub fn display(&self) -> String {
        let mut shown = self.clone();
        shown.server.password = shown.server.password.as_deref().map(|p| mask_secret(p, 2));
        toml::to_string_pretty(&shown).unwrap_or_default()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Mask a secret for display
///
/// Shows first N chars + asterisks, e.g. "ad***"
pub fn mask_secret(secret: &str, visible_chars: usize) -> String {
    if secret.is_empty() {
        return String::new();
    }

    let visible = secret
        .char_indices()
        .nth(visible_chars)
        .map(|(i, _)| i)
        .unwrap_or(secret.len());
    format!("{}***", &secret[..visible])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn test_config_path_contains_app_name() {
        let path = FlowConfig::config_path();
        assert!(path.to_string_lossy().contains("flowwright"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn test_defaults() {
        let config = FlowConfig::default();
        assert_eq!(config.assembly.max_service_failures, 2);
        assert_eq!(config.assembly.max_unit_failures, 3);
        assert_eq!(config.assembly.max_link_failures, 3);
        assert_eq!(config.assembly.type_suggestion_limit, 5);
        assert!(config.assembly.validate_after);
        assert!(config.server.tls_verify);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = FlowConfig::load_from(&temp_dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, FlowConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "[server]\nbase_url = \"https://nifi:8443/nifi-api\"\n\n[assembly]\nmax_unit_failures = 5\n",
        )
        .unwrap();

        let config = FlowConfig::load_from(&path).unwrap();
        assert_eq!(config.server.base_url, "https://nifi:8443/nifi-api");
        assert_eq!(config.server.timeout_secs, 30);
        assert_eq!(config.assembly.max_unit_failures, 5);
        assert_eq!(config.assembly.max_service_failures, 2);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[server\nbase_url = ").unwrap();

        let err = FlowConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, FlowError::ConfigError { .. }));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = FlowConfig::default();
        config.assembly.max_link_failures = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides_config() {
        env::set_var("FLOWWRIGHT_SCOPE", "scope-from-env");
        env::set_var("NIFI_TLS_VERIFY", "false");

        let config = FlowConfig::default().with_env();
        assert_eq!(config.assembly.default_scope.as_deref(), Some("scope-from-env"));
        assert!(!config.server.tls_verify);

        env::remove_var("FLOWWRIGHT_SCOPE");
        env::remove_var("NIFI_TLS_VERIFY");
    }

    #[test]
    fn test_display_masks_password() {
        let mut config = FlowConfig::default();
        config.server.password = Some("supersecret".into());

        let shown = config.display();
        assert!(shown.contains("su***"));
        assert!(!shown.contains("supersecret"));
    }

    #[test]
    fn test_mask_secret_edges() {
        assert_eq!(mask_secret("", 3), "");
        assert_eq!(mask_secret("ab", 3), "ab***");
    }
}
