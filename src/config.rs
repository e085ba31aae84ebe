use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "https://online-school-backend-gumy.onrender.com";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_EXPIRY_DAYS: u32 = 7;
const MAX_EXPIRY_DAYS: u32 = 3650;
const CONFIG_DIR: &str = ".schooldesk";

/// A validation error in the configuration
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

/// Backend connection settings
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Where the cookie jar lives and how long its entries last
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub cookie_file: Option<PathBuf>,
    #[serde(default)]
    pub expiry_days: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ActivityConfig {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Main configuration structure. Every field is optional so that layers
/// only override what they set; the accessors supply the defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
}

fn home_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
}

impl Config {
    /// Load configuration from default paths
    /// Priority: local (.schooldesk/config.local.toml) > project (.schooldesk/config.toml)
    /// > user (~/.schooldesk/config.toml)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(CONFIG_DIR).join("config.toml");
            if user_config.exists() {
                config.merge(Self::load_from(&user_config)?);
            }
        }

        let project_config = Path::new(CONFIG_DIR).join("config.toml");
        if project_config.exists() {
            config.merge(Self::load_from(&project_config)?);
        }

        // Should be gitignored
        let local_config = Path::new(CONFIG_DIR).join("config.local.toml");
        if local_config.exists() {
            config.merge(Self::load_from(&local_config)?);
        }

        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Merge another config into this one (other takes priority for every
    /// field it sets)
    pub fn merge(&mut self, other: Config) {
        if other.api.base_url.is_some() {
            self.api.base_url = other.api.base_url;
        }
        if other.api.timeout_ms.is_some() {
            self.api.timeout_ms = other.api.timeout_ms;
        }
        if other.session.cookie_file.is_some() {
            self.session.cookie_file = other.session.cookie_file;
        }
        if other.session.expiry_days.is_some() {
            self.session.expiry_days = other.session.expiry_days;
        }
        if other.activity.enabled.is_some() {
            self.activity.enabled = other.activity.enabled;
        }
        if other.activity.path.is_some() {
            self.activity.path = other.activity.path;
        }
    }

    pub fn base_url(&self) -> &str {
        self.api.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn timeout_ms(&self) -> u64 {
        self.api.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    pub fn cookie_file(&self) -> PathBuf {
        self.session
            .cookie_file
            .clone()
            .unwrap_or_else(|| home_dir().join("cookies.json"))
    }

    pub fn expiry_days(&self) -> u32 {
        self.session.expiry_days.unwrap_or(DEFAULT_EXPIRY_DAYS)
    }

    /// Activity log path, or `None` when logging is switched off
    pub fn activity_path(&self) -> Option<PathBuf> {
        if !self.activity.enabled.unwrap_or(true) {
            return None;
        }
        Some(
            self.activity
                .path
                .clone()
                .unwrap_or_else(|| home_dir().join("activity.jsonl")),
        )
    }

    /// Validate configuration and return any errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let url = self.base_url();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ValidationError {
                field: "api.base_url".to_string(),
                message: format!("Expected an http:// or https:// URL, got '{}'", url),
            });
        }

        if self.timeout_ms() == 0 {
            errors.push(ValidationError {
                field: "api.timeout_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        let expiry = self.expiry_days();
        if expiry == 0 {
            errors.push(ValidationError {
                field: "session.expiry_days".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        } else if expiry > MAX_EXPIRY_DAYS {
            errors.push(ValidationError {
                field: "session.expiry_days".to_string(),
                message: format!("Must be at most {}, got {}", MAX_EXPIRY_DAYS, expiry),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.expiry_days(), 7);
        assert!(config.cookie_file().ends_with(".schooldesk/cookies.json"));
        assert!(config.activity_path().is_some());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_and_merge() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[api]
base_url = "http://localhost:5000"

[activity]
enabled = false
"#,
        )
        .unwrap();

        let mut config = Config::default();
        config.api.timeout_ms = Some(5_000);
        config.merge(Config::load_from(&path).unwrap());

        assert_eq!(config.base_url(), "http://localhost:5000");
        // Unset in the later layer, so the earlier value stays
        assert_eq!(config.timeout_ms(), 5_000);
        assert!(config.activity_path().is_none());
    }

    #[test]
    fn test_load_from_bad_toml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[api\nbase_url = 1").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("failed to parse config"));
    }

    #[test]
    fn test_validate_bad_url_scheme() {
        let mut config = Config::default();
        config.api.base_url = Some("ftp://school".to_string());
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].field.contains("base_url"));
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = Config::default();
        config.api.timeout_ms = Some(0);
        config.session.expiry_days = Some(0);
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.message.contains("greater than 0")));
    }

    #[test]
    fn test_validate_expiry_cap() {
        let mut config = Config::default();
        config.session.expiry_days = Some(MAX_EXPIRY_DAYS);
        assert!(config.validate().is_ok());

        config.session.expiry_days = Some(u32::MAX);
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "session.expiry_days");
        assert!(errors[0].message.contains("at most 3650"));
    }
}
