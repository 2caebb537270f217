// Nestguard Core - Engine configuration resource
//
// Example:
// ```yaml
// apiVersion: nestguard.dev/v1
// kind: NestguardConfig
// metadata:
//   name: household
// spec:
//   approvals:
//     default_expiry_minutes: 720
//     expiration_tick_seconds: 15
//     retention_hours: 168
//   notifications:
//     daily_digest_interval_hours: 24
//     weekly_digest_interval_days: 7
//     delivery_timeout_seconds: 10
//   storage:
//     backend: file
//     path: ${NESTGUARD_DATA}/store.json
//   rules_file: ./rules.yaml
// ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NestError, NestResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestguardConfig {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_kind")]
    pub kind: String,

    pub metadata: ConfigMetadata,

    #[serde(default)]
    pub spec: ConfigSpec,
}

fn default_api_version() -> String {
    "nestguard.dev/v1".to_string()
}

fn default_kind() -> String {
    "NestguardConfig".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    pub name: String,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConfigSpec {
    #[serde(default)]
    pub approvals: ApprovalConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Optional SafetyRuleCatalog YAML replacing the built-in rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_file: Option<String>,
}

/// Approval workflow timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ApprovalConfig {
    /// Lifetime of a new approval request
    #[serde(default = "default_expiry_minutes")]
    pub default_expiry_minutes: u32,

    /// How often due expirations are processed
    #[serde(default = "default_expiration_tick")]
    pub expiration_tick_seconds: u64,

    /// How long decided requests stay in memory; the store keeps them
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
}

fn default_expiry_minutes() -> u32 {
    24 * 60
}

fn default_expiration_tick() -> u64 {
    30
}

fn default_retention_hours() -> u64 {
    7 * 24
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            default_expiry_minutes: default_expiry_minutes(),
            expiration_tick_seconds: default_expiration_tick(),
            retention_hours: default_retention_hours(),
        }
    }
}

/// Digest job cadence and channel delivery bound
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NotificationConfig {
    #[serde(default = "default_daily_interval")]
    pub daily_digest_interval_hours: u64,

    #[serde(default = "default_weekly_interval")]
    pub weekly_digest_interval_days: u64,

    /// Longest a single channel delivery may take before it is abandoned
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_seconds: u64,
}

fn default_daily_interval() -> u64 {
    24
}

fn default_weekly_interval() -> u64 {
    7
}

fn default_delivery_timeout() -> u64 {
    10
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            daily_digest_interval_hours: default_daily_interval(),
            weekly_digest_interval_days: default_weekly_interval(),
            delivery_timeout_seconds: default_delivery_timeout(),
        }
    }
}

/// Which store backend to build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    Memory,
    File { path: String },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Memory
    }
}

impl NestguardConfig {
    pub fn from_yaml_str(content: &str) -> NestResult<Self> {
        let mut config: NestguardConfig = serde_yaml::from_str(content)?;
        config.expand_env_vars();
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> NestResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> NestResult<()> {
        if self.metadata.name.is_empty() {
            return Err(NestError::validation("config name is required"));
        }
        if self.kind != "NestguardConfig" {
            return Err(NestError::validation(format!("unexpected kind: {}", self.kind)));
        }
        if self.spec.approvals.default_expiry_minutes == 0 {
            return Err(NestError::validation("default_expiry_minutes must be greater than 0"));
        }
        if self.spec.approvals.expiration_tick_seconds == 0 {
            return Err(NestError::validation("expiration_tick_seconds must be greater than 0"));
        }
        if self.spec.approvals.retention_hours == 0 {
            return Err(NestError::validation("retention_hours must be greater than 0"));
        }
        if self.spec.notifications.daily_digest_interval_hours == 0
            || self.spec.notifications.weekly_digest_interval_days == 0
        {
            return Err(NestError::validation("digest intervals must be greater than 0"));
        }
        if self.spec.notifications.delivery_timeout_seconds == 0 {
            return Err(NestError::validation("delivery_timeout_seconds must be greater than 0"));
        }
        if let StorageConfig::File { ref path } = self.spec.storage {
            if path.is_empty() {
                return Err(NestError::validation("file storage requires a path"));
            }
        }
        Ok(())
    }

    /// Expand ${VAR} references in path-valued settings
    pub fn expand_env_vars(&mut self) {
        if let StorageConfig::File { ref mut path } = self.spec.storage {
            *path = expand_env_var(path);
        }
        if let Some(ref rules_file) = self.spec.rules_file {
            self.spec.rules_file = Some(expand_env_var(rules_file));
        }
    }

    pub fn approval_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.spec.approvals.default_expiry_minutes))
    }

    pub fn decided_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.spec.approvals.retention_hours as i64)
    }

    pub fn expiration_tick(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.spec.approvals.expiration_tick_seconds)
    }

    pub fn daily_digest_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.spec.notifications.daily_digest_interval_hours * 3600)
    }

    pub fn weekly_digest_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.spec.notifications.weekly_digest_interval_days * 86_400)
    }

    pub fn delivery_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.spec.notifications.delivery_timeout_seconds)
    }
}

/// Expand ${VAR_NAME} patterns in a string; unknown variables are left as-is
fn expand_env_var(value: &str) -> String {
    let Ok(re) = regex::Regex::new(r"\$\{([^}]+)\}") else {
        return value.to_string();
    };

    let mut result = value.to_string();
    for cap in re.captures_iter(value) {
        if let Ok(var_value) = std::env::var(&cap[1]) {
            result = result.replace(&cap[0], &var_value);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
apiVersion: nestguard.dev/v1
kind: NestguardConfig
metadata:
  name: household
"#;
        let config = NestguardConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.spec.approvals.default_expiry_minutes, 1440);
        assert_eq!(config.spec.storage, StorageConfig::Memory);
        assert_eq!(config.approval_ttl(), chrono::Duration::hours(24));
        assert_eq!(config.delivery_timeout(), std::time::Duration::from_secs(10));
        assert_eq!(config.decided_retention(), chrono::Duration::days(7));
    }

    #[test]
    fn test_parse_file_storage_with_env() {
        std::env::set_var("NESTGUARD_TEST_DATA", "/var/lib/nestguard");
        let yaml = r#"
metadata:
  name: household
spec:
  approvals:
    default_expiry_minutes: 60
    expiration_tick_seconds: 5
  storage:
    backend: file
    path: ${NESTGUARD_TEST_DATA}/store.json
"#;
        let config = NestguardConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(
            config.spec.storage,
            StorageConfig::File {
                path: "/var/lib/nestguard/store.json".to_string()
            }
        );
        assert_eq!(config.expiration_tick(), std::time::Duration::from_secs(5));
        std::env::remove_var("NESTGUARD_TEST_DATA");
    }

    #[test]
    fn test_validation_errors() {
        let yaml = r#"
metadata:
  name: household
spec:
  approvals:
    default_expiry_minutes: 0
"#;
        assert!(NestguardConfig::from_yaml_str(yaml).is_err());

        let yaml = r#"
metadata:
  name: ""
"#;
        assert!(NestguardConfig::from_yaml_str(yaml).is_err());

        let yaml = r#"
metadata:
  name: household
spec:
  notifications:
    delivery_timeout_seconds: 0
"#;
        assert!(NestguardConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nestguard.yaml");
        std::fs::write(&path, "metadata:\n  name: from-file\n").unwrap();

        let config = NestguardConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.metadata.name, "from-file");
    }
}
