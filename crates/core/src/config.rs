//! TOML-based configuration system for listsync.
//!
//! All sensitive values (passwords, tokens) are stored as `_env` fields that
//! reference environment variable names. The actual secrets are resolved at
//! runtime via [`AppConfig::resolve_env_vars`].

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Daemon / polling settings.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// People directory settings.
    pub directory: DirectoryConfig,

    /// Defaults applied to every managed list.
    #[serde(default)]
    pub lists: ListDefaults,

    /// Remote mailing-list servers.
    #[serde(default)]
    pub servers: Vec<ServerConfig>,

    /// Per-organization managed lists.
    #[serde(default)]
    pub organization_lists: Vec<OrgListConfig>,
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

/// Daemon / polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Seconds between reconciliation cycles (default 3600).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Per-request HTTP timeout in seconds for directory and gateway calls.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

fn default_poll_interval() -> u64 {
    3600
}
fn default_log_level() -> String {
    "info".into()
}
fn default_http_timeout() -> u64 {
    30
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            log_level: default_log_level(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

impl DaemonConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// People directory connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Directory REST API base URL.
    pub api_url: String,

    /// Environment variable holding an optional bearer token.
    #[serde(default)]
    pub token_env: Option<String>,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

// ---------------------------------------------------------------------------
// List defaults
// ---------------------------------------------------------------------------

/// Defaults applied to every created/managed list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListDefaults {
    /// Style name passed to the remote server on list creation.
    #[serde(default = "default_style")]
    pub style: String,

    /// Fixed list name for the per-server student list.
    #[serde(default = "default_student_list")]
    pub student_list: String,

    /// Fixed list name for the per-server personal list.
    #[serde(default = "default_personal_list")]
    pub personal_list: String,

    /// Remote list option map applied to every managed list.
    #[serde(default)]
    pub settings: HashMap<String, toml::Value>,
}

fn default_style() -> String {
    "legacy-default".into()
}
fn default_student_list() -> String {
    "students".into()
}
fn default_personal_list() -> String {
    "personal".into()
}

impl Default for ListDefaults {
    fn default() -> Self {
        Self {
            style: default_style(),
            student_list: default_student_list(),
            personal_list: default_personal_list(),
            settings: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Servers
// ---------------------------------------------------------------------------

/// A remote mailing-list server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// REST API base URL (e.g. `https://mailman.example.com/3.1`).
    pub url: String,

    /// REST API username.
    pub username: String,

    /// Environment variable holding the REST API password.
    pub password_env: String,

    /// Disabled servers are skipped entirely.
    #[serde(default)]
    pub enabled: bool,

    /// Mail host of the all-students list, if this server carries one.
    #[serde(default)]
    pub student_domain: Option<String>,

    /// Mail host of the all-staff list, if this server carries one.
    #[serde(default)]
    pub personal_domain: Option<String>,

    /// Resolved password (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub password: Option<String>,
}

// ---------------------------------------------------------------------------
// Organization lists
// ---------------------------------------------------------------------------

/// A managed list tied to a directory organization.
///
/// At most one enabled entry per (server, domain, name) tuple should exist;
/// this is not enforced here, callers must avoid duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgListConfig {
    /// URL of the server the list lives on (must match a `[[servers]]` entry).
    pub server: String,

    /// Remote mail domain.
    pub domain: String,

    /// Remote list name.
    pub name: String,

    /// Linked directory organization id.
    pub organization: i64,

    /// Disabled lists are skipped.
    #[serde(default)]
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve all `*_env` fields from environment variables and populate the
    /// corresponding resolved fields.
    ///
    /// Fields that reference a missing variable will log a warning but will
    /// **not** fail -- a server without a resolved password is skipped at
    /// sync time with a per-list error.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");

        if let Some(ref env_name) = self.directory.token_env {
            self.directory.token = resolve_optional_env(env_name, "directory.token_env");
        }

        for server in &mut self.servers {
            server.password = resolve_optional_env(&server.password_env, "servers.password_env");
        }

        debug!("environment variable resolution complete");
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.directory.api_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "directory.api_url".into(),
                detail: "directory API URL must not be empty".into(),
            });
        }
        if self.daemon.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "daemon.poll_interval_secs".into(),
                detail: "poll interval must be > 0".into(),
            });
        }
        for server in &self.servers {
            if server.url.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "servers.url".into(),
                    detail: "server URL must not be empty".into(),
                });
            }
            if server.username.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "servers.username".into(),
                    detail: "server username must not be empty".into(),
                });
            }
        }
        for list in &self.organization_lists {
            if list.name.is_empty() || list.domain.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "organization_lists".into(),
                    detail: "list name and domain must not be empty".into(),
                });
            }
            if self.server_by_url(&list.server).is_none() {
                return Err(ConfigError::InvalidValue {
                    field: "organization_lists.server".into(),
                    detail: format!("no such server: {}", list.server),
                });
            }
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Find a server by its URL.
    pub fn server_by_url(&self, url: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.url == url)
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[daemon]
poll_interval_secs = 1800
log_level = "debug"
http_timeout_secs = 10

[directory]
api_url = "https://directory.example.com/api"
token_env = "DIRECTORY_TOKEN"

[lists]
style = "legacy-default"
student_list = "students"
personal_list = "personal"

[lists.settings]
advertised = false
max_message_size = 1024
subject_prefix = ""

[[servers]]
url = "https://mailman.example.com/3.1"
username = "restadmin"
password_env = "MAILMAN_PASSWORD"
enabled = true
student_domain = "students.example.com"
personal_domain = "staff.example.com"

[[organization_lists]]
server = "https://mailman.example.com/3.1"
domain = "lists.example.com"
name = "physics"
organization = 42
enabled = true
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.daemon.poll_interval_secs, 1800);
        assert_eq!(config.directory.api_url, "https://directory.example.com/api");
        assert_eq!(config.lists.style, "legacy-default");
        assert_eq!(
            config.lists.settings.get("max_message_size"),
            Some(&toml::Value::Integer(1024))
        );
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.organization_lists[0].organization, 42);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = AppConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.daemon.log_level, "debug");
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/config.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_validate_rejects_empty_api_url() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.directory.api_url = String::new();
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "directory.api_url"
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_server_reference() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.organization_lists[0].server = "https://other.example.com/3.1".into();
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "organization_lists.server"
        ));
    }

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("TEST_MAILMAN_PW", "s3cret");

        let toml_str = r#"
[directory]
api_url = "https://directory.example.com/api"

[[servers]]
url = "https://mailman.example.com/3.1"
username = "restadmin"
password_env = "TEST_MAILMAN_PW"
enabled = true
"#;
        let mut config: AppConfig = toml::from_str(toml_str).unwrap();
        config.resolve_env_vars().unwrap();

        assert_eq!(config.servers[0].password.as_deref(), Some("s3cret"));

        std::env::remove_var("TEST_MAILMAN_PW");
    }

    #[test]
    fn test_defaults() {
        let minimal = r#"
[directory]
api_url = "https://directory.example.com/api"
"#;
        let config: AppConfig = toml::from_str(minimal).unwrap();
        assert_eq!(config.daemon.poll_interval_secs, 3600);
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.daemon.http_timeout_secs, 30);
        assert_eq!(config.lists.style, "legacy-default");
        assert_eq!(config.lists.student_list, "students");
        assert_eq!(config.lists.personal_list, "personal");
        assert!(config.servers.is_empty());
        assert!(config.organization_lists.is_empty());
    }

    #[test]
    fn test_server_enabled_defaults_to_false() {
        let toml_str = r#"
[directory]
api_url = "https://directory.example.com/api"

[[servers]]
url = "https://mailman.example.com/3.1"
username = "restadmin"
password_env = "MAILMAN_PASSWORD"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(!config.servers[0].enabled);
    }
}
