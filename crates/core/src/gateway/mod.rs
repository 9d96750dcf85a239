//! Abstraction over the remote mailing-list server.
//!
//! [`ListGateway`] is the interface the provisioner and reconciliation
//! engine consume; [`MailmanClient`] is the production implementation
//! speaking the Mailman 3 REST API.
//!
//! List settings follow a buffer-then-flush discipline: changes accumulate
//! in a [`SettingsBuffer`] client-side and are persisted by a single
//! `save_settings` call, so a failed flush is observable instead of leaving
//! partial remote configuration assumed-applied.

pub mod mailman;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::GatewayError;

pub use mailman::MailmanClient;

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// A mail domain on the remote server.
#[derive(Debug, Clone, Deserialize)]
pub struct MailDomain {
    pub mail_host: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A handle on a remote list, sufficient to address every per-list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ListHandle {
    pub list_id: String,
    pub list_name: String,
    pub mail_host: String,
    pub fqdn_listname: String,
}

/// A member as read from the remote roster. The email may be empty and must
/// be excluded from comparisons.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteMember {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub member_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// A moderator as read from the remote roster.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteModerator {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub member_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Settings buffer
// ---------------------------------------------------------------------------

/// Client-side buffer of pending list settings.
///
/// Keys are remote option names; values are flushed verbatim as JSON in one
/// `save_settings` call.
#[derive(Debug, Clone, Default)]
pub struct SettingsBuffer {
    pending: BTreeMap<String, serde_json::Value>,
}

impl SettingsBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a setting; a later value for the same key wins.
    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.pending.insert(key.into(), value);
    }

    /// Read back a buffered (not yet flushed) value.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.pending.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.pending.iter()
    }

    /// The flush payload.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.pending
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// Gateway trait
// ---------------------------------------------------------------------------

/// Interface over the remote mailing-list server.
///
/// Mutating calls are idempotent by construction: subscribing an
/// already-subscribed address or removing an absent one is a success, so a
/// crashed apply phase can simply be re-run.
#[async_trait]
pub trait ListGateway: Send + Sync {
    /// Locate a mail domain by host name.
    async fn find_domain(&self, mail_host: &str) -> Result<Option<MailDomain>, GatewayError>;

    /// Locate a list within a domain by its short name.
    async fn find_list(
        &self,
        domain: &MailDomain,
        list_name: &str,
    ) -> Result<Option<ListHandle>, GatewayError>;

    /// Create a list with the given style.
    async fn create_list(
        &self,
        domain: &MailDomain,
        list_name: &str,
        style: &str,
    ) -> Result<ListHandle, GatewayError>;

    /// Flush a settings buffer to the remote list in one call.
    async fn save_settings(
        &self,
        list: &ListHandle,
        settings: &SettingsBuffer,
    ) -> Result<(), GatewayError>;

    /// Read the current member roster.
    async fn list_members(&self, list: &ListHandle) -> Result<Vec<RemoteMember>, GatewayError>;

    /// Read the current moderator roster.
    async fn list_moderators(
        &self,
        list: &ListHandle,
    ) -> Result<Vec<RemoteModerator>, GatewayError>;

    /// Subscribe an address, pre-verified and pre-approved.
    async fn subscribe(
        &self,
        list: &ListHandle,
        email: &str,
        display_name: Option<&str>,
    ) -> Result<(), GatewayError>;

    /// Unsubscribe an address. Absent addresses are a no-op.
    async fn unsubscribe(&self, list: &ListHandle, email: &str) -> Result<(), GatewayError>;

    /// Promote an address to moderator.
    async fn add_moderator(&self, list: &ListHandle, email: &str) -> Result<(), GatewayError>;

    /// Demote a moderator. Absent moderators are a no-op.
    async fn remove_moderator(&self, list: &ListHandle, email: &str) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settings_buffer_last_write_wins() {
        let mut buffer = SettingsBuffer::new();
        buffer.set("advertised", json!(true));
        buffer.set("advertised", json!(false));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.get("advertised"), Some(&json!(false)));
    }

    #[test]
    fn test_settings_buffer_flush_payload() {
        let mut buffer = SettingsBuffer::new();
        buffer.set("display_name", json!("Physics"));
        buffer.set("max_message_size", json!(1024));
        let payload = buffer.to_json();
        assert_eq!(payload["display_name"], json!("Physics"));
        assert_eq!(payload["max_message_size"], json!(1024));
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = SettingsBuffer::new();
        assert!(buffer.is_empty());
        assert_eq!(buffer.to_json(), json!({}));
    }
}
