//! Error types for the listsync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.
//!
//! [`RemoteOperationError`] is deliberately not part of [`SyncError`]: a
//! failed subscribe/unsubscribe is recorded in the apply report and must
//! never abort the remaining plan items.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Directory errors
// ---------------------------------------------------------------------------

/// Errors from the read-only people directory.
///
/// Any directory failure is fatal for the run that needed it: without the
/// directory there is no desired membership set to reconcile against.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// HTTP-level transport error (network, TLS, timeout).
    #[error("directory HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("directory API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// Authentication token is missing or invalid.
    #[error("directory authentication failed: {0}")]
    AuthenticationFailed(String),
}

// ---------------------------------------------------------------------------
// Gateway errors
// ---------------------------------------------------------------------------

/// Errors from the remote mailing-list server's REST API.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP-level transport error (network, TLS, timeout).
    #[error("mailing list server HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("mailing list server API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// Credentials were rejected by the remote server.
    #[error("mailing list server authentication failed: {0}")]
    AuthenticationFailed(String),
}

// ---------------------------------------------------------------------------
// Sync errors
// ---------------------------------------------------------------------------

/// Per-list errors from provisioning and reconciliation.
///
/// All variants except [`SyncError::Directory`] are contained at the list
/// boundary: the offending list is skipped and the run continues.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The configured mail domain does not exist on the remote server.
    #[error("domain {mail_host} not available on {server}")]
    DomainNotFound { mail_host: String, server: String },

    /// The list does not exist and was not expected to be created.
    #[error("list {list_name} not found on {mail_host}")]
    ListNotFound {
        list_name: String,
        mail_host: String,
    },

    /// The remote server rejected list creation.
    #[error("failed to create list {list_name} on {mail_host}: {source}")]
    Provision {
        list_name: String,
        mail_host: String,
        #[source]
        source: GatewayError,
    },

    /// The buffered settings could not be flushed. Applying membership
    /// changes against possibly-stale settings is unsafe, so the list's
    /// run is skipped.
    #[error("failed to flush settings for {fqdn_listname}: {source}")]
    SettingsFlush {
        fqdn_listname: String,
        #[source]
        source: GatewayError,
    },

    /// No password could be resolved for the server's configured env var.
    #[error("no password resolved for server {server}")]
    MissingCredentials { server: String },

    /// An organization list without a linked organization.
    #[error("list {list} has no linked organization")]
    MissingOrganization { list: String },

    /// Directory read failure. Fatal for the run.
    #[error("directory read failed: {0}")]
    Directory(#[from] DirectoryError),

    /// Non-item-level gateway failure (roster read, domain listing).
    #[error("mailing list server error: {0}")]
    Gateway(#[from] GatewayError),
}

// ---------------------------------------------------------------------------
// Per-item apply failures
// ---------------------------------------------------------------------------

/// A single operation from a convergence plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanOperation {
    Subscribe,
    Unsubscribe,
    AddModerator,
    RemoveModerator,
}

impl std::fmt::Display for PlanOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subscribe => write!(f, "subscribe"),
            Self::Unsubscribe => write!(f, "unsubscribe"),
            Self::AddModerator => write!(f, "add_moderator"),
            Self::RemoveModerator => write!(f, "remove_moderator"),
        }
    }
}

/// A single subscribe/unsubscribe/moderator call that failed.
///
/// Recorded in the [`ApplyReport`](crate::engine::ApplyReport); the
/// remaining plan items are still attempted.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{operation} failed for {email}: {cause}")]
pub struct RemoteOperationError {
    /// The offending email address (normalized key).
    pub email: String,
    /// The operation that failed.
    pub operation: PlanOperation,
    /// Rendered cause from the gateway.
    pub cause: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = SyncError::DomainNotFound {
            mail_host: "lists.example.com".into(),
            server: "https://mailman.example.com/3.1".into(),
        };
        assert_eq!(
            err.to_string(),
            "domain lists.example.com not available on https://mailman.example.com/3.1"
        );

        let err = GatewayError::ApiError {
            status: 500,
            body: "HTTP 500".into(),
        };
        assert!(err.to_string().contains("500"));

        let err = ConfigError::FileNotFound("/etc/listsync/config.toml".into());
        assert!(err.to_string().contains("/etc/listsync/config.toml"));
    }

    #[test]
    fn test_remote_operation_error_display() {
        let err = RemoteOperationError {
            email: "a@x.org".into(),
            operation: PlanOperation::Subscribe,
            cause: "HTTP 500".into(),
        };
        assert_eq!(err.to_string(), "subscribe failed for a@x.org: HTTP 500");
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let gw_err = GatewayError::AuthenticationFailed("HTTP 401".into());
        let core_err: CoreError = gw_err.into();
        assert!(matches!(core_err, CoreError::Gateway(_)));

        let sync_err = SyncError::MissingCredentials {
            server: "https://mailman.example.com/3.1".into(),
        };
        let core_err: CoreError = sync_err.into();
        assert!(matches!(core_err, CoreError::Sync(_)));
    }
}
