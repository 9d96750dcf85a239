//! List provisioning: ensure a managed list exists and carries its baseline
//! settings before reconciliation runs.
//!
//! Idempotent: running against an already-configured list performs no
//! creation and simply re-flushes the same settings (redundant identical
//! writes are accepted).

use std::collections::HashMap;

use tracing::{debug, info};

use crate::errors::SyncError;
use crate::gateway::{ListGateway, ListHandle, SettingsBuffer};

/// Everything needed to provision one list.
#[derive(Debug, Clone)]
pub struct ListBlueprint<'a> {
    pub mail_host: &'a str,
    pub list_name: &'a str,
    /// Style name used when the list has to be created.
    pub style: &'a str,
    pub display_name: &'a str,
    pub description: &'a str,
    /// Remote option map applied to every managed list.
    pub settings: &'a HashMap<String, toml::Value>,
}

impl ListBlueprint<'_> {
    fn fqdn_listname(&self) -> String {
        format!("{}@{}", self.list_name, self.mail_host)
    }
}

/// Result of [`ensure_list`].
#[derive(Debug, Clone)]
pub struct ProvisionedList {
    pub handle: ListHandle,
    /// The list was created during this call.
    pub created: bool,
    /// Dry-run only: the list is absent and would be created. The handle is
    /// synthetic and must not be used for roster reads.
    pub pending_create: bool,
}

/// Ensure the target list exists and carries the configured settings.
///
/// Locates the domain, finds or creates the list (with the blueprint's
/// style), then buffers the option map plus display name and description and
/// flushes them in one call. In dry-run mode nothing is mutated: an absent
/// list is reported as pending creation and settings stay buffered.
pub async fn ensure_list<G: ListGateway + ?Sized>(
    gateway: &G,
    blueprint: &ListBlueprint<'_>,
    server: &str,
    dry_run: bool,
) -> Result<ProvisionedList, SyncError> {
    let domain = gateway
        .find_domain(blueprint.mail_host)
        .await?
        .ok_or_else(|| SyncError::DomainNotFound {
            mail_host: blueprint.mail_host.to_string(),
            server: server.to_string(),
        })?;

    let (handle, created, pending_create) =
        match gateway.find_list(&domain, blueprint.list_name).await? {
            Some(handle) => (handle, false, false),
            None if dry_run => {
                info!(
                    list = %blueprint.fqdn_listname(),
                    style = %blueprint.style,
                    "dry run: list absent, would create"
                );
                let handle = ListHandle {
                    list_id: format!("{}.{}", blueprint.list_name, blueprint.mail_host),
                    list_name: blueprint.list_name.to_string(),
                    mail_host: blueprint.mail_host.to_string(),
                    fqdn_listname: blueprint.fqdn_listname(),
                };
                (handle, false, true)
            }
            None => {
                info!(
                    list = %blueprint.fqdn_listname(),
                    style = %blueprint.style,
                    "creating new mailing list"
                );
                let handle = gateway
                    .create_list(&domain, blueprint.list_name, blueprint.style)
                    .await
                    .map_err(|source| SyncError::Provision {
                        list_name: blueprint.list_name.to_string(),
                        mail_host: blueprint.mail_host.to_string(),
                        source,
                    })?;
                (handle, true, false)
            }
        };

    let mut settings = SettingsBuffer::new();
    for (key, value) in blueprint.settings {
        debug!(key = %key, list = %handle.fqdn_listname, "buffering list setting");
        settings.set(key, toml_to_json(value));
    }
    settings.set("display_name", serde_json::json!(blueprint.display_name));
    settings.set("description", serde_json::json!(blueprint.description));

    if dry_run {
        debug!(
            list = %handle.fqdn_listname,
            pending = settings.len(),
            "dry run: settings not flushed"
        );
    } else {
        gateway
            .save_settings(&handle, &settings)
            .await
            .map_err(|source| SyncError::SettingsFlush {
                fqdn_listname: handle.fqdn_listname.clone(),
                source,
            })?;
    }

    Ok(ProvisionedList {
        handle,
        created,
        pending_create,
    })
}

fn toml_to_json(value: &toml::Value) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_to_json_conversion() {
        assert_eq!(
            toml_to_json(&toml::Value::Boolean(false)),
            serde_json::json!(false)
        );
        assert_eq!(
            toml_to_json(&toml::Value::Integer(1024)),
            serde_json::json!(1024)
        );
        assert_eq!(
            toml_to_json(&toml::Value::String("acceptable".into())),
            serde_json::json!("acceptable")
        );
    }
}
