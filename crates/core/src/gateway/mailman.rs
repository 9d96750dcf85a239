//! Mailman 3 REST API client.
//!
//! Authenticates with HTTP Basic credentials from the server configuration.
//! Conflict responses on subscribe (409) and missing members on delete (404)
//! are treated as success so the apply phase stays idempotent.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use super::{ListGateway, ListHandle, MailDomain, RemoteMember, RemoteModerator, SettingsBuffer};
use crate::errors::GatewayError;

/// A paged Mailman collection. Empty collections omit `entries` entirely.
#[derive(Debug, Deserialize)]
struct Paged<T> {
    #[serde(default = "Vec::new")]
    entries: Vec<T>,
}

/// A member resource as returned by `POST /members/find`.
#[derive(Debug, Deserialize)]
struct FoundMember {
    member_id: String,
    #[serde(default)]
    email: String,
}

/// Asynchronous Mailman 3 REST API client.
#[derive(Clone)]
pub struct MailmanClient {
    http: reqwest::Client,
    api_url: String,
    username: String,
    password: String,
}

impl MailmanClient {
    pub fn new(
        api_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("listsync/0.1"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");
        info!(api_url = %api_url, "created MailmanClient");
        Self {
            http,
            api_url,
            username: username.into(),
            password: password.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let resp = self
            .http
            .get(self.url(path))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        check_response(&resp)?;
        Ok(resp.json().await?)
    }

    /// Resolve a roster entry to its member resource, or `None` when the
    /// address holds no such membership.
    async fn find_member(
        &self,
        list_id: &str,
        email: &str,
        role: &str,
    ) -> Result<Option<FoundMember>, GatewayError> {
        let resp = self
            .http
            .post(self.url("/members/find"))
            .basic_auth(&self.username, Some(&self.password))
            .json(&serde_json::json!({
                "list_id": list_id,
                "subscriber": email,
                "role": role,
            }))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_response(&resp)?;
        let page: Paged<FoundMember> = resp.json().await?;
        Ok(page
            .entries
            .into_iter()
            .find(|m| m.email.eq_ignore_ascii_case(email)))
    }

    async fn delete_member(&self, member_id: &str) -> Result<(), GatewayError> {
        let resp = self
            .http
            .delete(self.url(&format!("/members/{}", member_id)))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!(member_id, "member already gone");
            return Ok(());
        }
        check_response(&resp)
    }

    async fn post_member(
        &self,
        list: &ListHandle,
        email: &str,
        display_name: Option<&str>,
        role: Option<&str>,
    ) -> Result<(), GatewayError> {
        let mut body = serde_json::json!({
            "list_id": list.list_id,
            "subscriber": email,
            "pre_verified": true,
            "pre_confirmed": true,
            "pre_approved": true,
        });
        if let Some(name) = display_name {
            body["display_name"] = serde_json::json!(name);
        }
        if let Some(role) = role {
            body["role"] = serde_json::json!(role);
        }
        let resp = self
            .http
            .post(self.url("/members"))
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await?;
        if resp.status() == StatusCode::CONFLICT {
            debug!(email, list = %list.fqdn_listname, "membership already present");
            return Ok(());
        }
        check_response(&resp)
    }
}

fn check_response(resp: &reqwest::Response) -> Result<(), GatewayError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(GatewayError::AuthenticationFailed(format!(
            "HTTP {}",
            status
        )));
    }
    Err(GatewayError::ApiError {
        status: status.as_u16(),
        body: format!("HTTP {}", status),
    })
}

#[async_trait]
impl ListGateway for MailmanClient {
    async fn find_domain(&self, mail_host: &str) -> Result<Option<MailDomain>, GatewayError> {
        let page: Paged<MailDomain> = self.get_json("/domains").await?;
        debug!(count = page.entries.len(), "fetched domains");
        Ok(page
            .entries
            .into_iter()
            .find(|d| d.mail_host.eq_ignore_ascii_case(mail_host)))
    }

    async fn find_list(
        &self,
        domain: &MailDomain,
        list_name: &str,
    ) -> Result<Option<ListHandle>, GatewayError> {
        let page: Paged<ListHandle> = self
            .get_json(&format!("/domains/{}/lists", domain.mail_host))
            .await?;
        debug!(
            mail_host = %domain.mail_host,
            count = page.entries.len(),
            "fetched domain lists"
        );
        Ok(page.entries.into_iter().find(|l| l.list_name == list_name))
    }

    async fn create_list(
        &self,
        domain: &MailDomain,
        list_name: &str,
        style: &str,
    ) -> Result<ListHandle, GatewayError> {
        let fqdn_listname = format!("{}@{}", list_name, domain.mail_host);
        let resp = self
            .http
            .post(self.url("/lists"))
            .basic_auth(&self.username, Some(&self.password))
            .json(&serde_json::json!({
                "fqdn_listname": fqdn_listname,
                "style_name": style,
            }))
            .send()
            .await?;
        check_response(&resp)?;
        // The create response carries no body; fetch the canonical handle.
        let handle: ListHandle = self.get_json(&format!("/lists/{}", fqdn_listname)).await?;
        info!(list = %handle.fqdn_listname, style, "created mailing list");
        Ok(handle)
    }

    async fn save_settings(
        &self,
        list: &ListHandle,
        settings: &SettingsBuffer,
    ) -> Result<(), GatewayError> {
        if settings.is_empty() {
            debug!(list = %list.fqdn_listname, "no buffered settings to flush");
            return Ok(());
        }
        let resp = self
            .http
            .patch(self.url(&format!("/lists/{}/config", list.list_id)))
            .basic_auth(&self.username, Some(&self.password))
            .json(&settings.to_json())
            .send()
            .await?;
        check_response(&resp)?;
        debug!(
            list = %list.fqdn_listname,
            count = settings.len(),
            "flushed list settings"
        );
        Ok(())
    }

    async fn list_members(&self, list: &ListHandle) -> Result<Vec<RemoteMember>, GatewayError> {
        let page: Paged<RemoteMember> = self
            .get_json(&format!("/lists/{}/roster/member", list.list_id))
            .await?;
        debug!(
            list = %list.fqdn_listname,
            count = page.entries.len(),
            "fetched member roster"
        );
        Ok(page.entries)
    }

    async fn list_moderators(
        &self,
        list: &ListHandle,
    ) -> Result<Vec<RemoteModerator>, GatewayError> {
        let page: Paged<RemoteModerator> = self
            .get_json(&format!("/lists/{}/roster/moderator", list.list_id))
            .await?;
        debug!(
            list = %list.fqdn_listname,
            count = page.entries.len(),
            "fetched moderator roster"
        );
        Ok(page.entries)
    }

    async fn subscribe(
        &self,
        list: &ListHandle,
        email: &str,
        display_name: Option<&str>,
    ) -> Result<(), GatewayError> {
        self.post_member(list, email, display_name, None).await
    }

    async fn unsubscribe(&self, list: &ListHandle, email: &str) -> Result<(), GatewayError> {
        match self.find_member(&list.list_id, email, "member").await? {
            Some(member) => self.delete_member(&member.member_id).await,
            None => {
                debug!(email, list = %list.fqdn_listname, "not subscribed, nothing to remove");
                Ok(())
            }
        }
    }

    async fn add_moderator(&self, list: &ListHandle, email: &str) -> Result<(), GatewayError> {
        self.post_member(list, email, None, Some("moderator")).await
    }

    async fn remove_moderator(&self, list: &ListHandle, email: &str) -> Result<(), GatewayError> {
        match self.find_member(&list.list_id, email, "moderator").await? {
            Some(member) => self.delete_member(&member.member_id).await,
            None => {
                debug!(email, list = %list.fqdn_listname, "not a moderator, nothing to remove");
                Ok(())
            }
        }
    }
}
