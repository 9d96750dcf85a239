//! Read-only client for the people directory.
//!
//! The directory is the authoritative source of organizations, employed
//! people, and enrolled students. Only eligible records are returned (the
//! employment/enrollment filter is applied server-side); no write access is
//! ever used.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::DirectoryError;

// ---------------------------------------------------------------------------
// Directory records
// ---------------------------------------------------------------------------

/// An organization in the directory.
#[derive(Debug, Clone, Deserialize)]
pub struct Organization {
    pub id: i64,
    pub name: String,
}

/// An employed person. The email may be absent; such records are dropped
/// during identity normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct Person {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// An enrolled student.
#[derive(Debug, Clone, Deserialize)]
pub struct Student {
    pub id: i64,
    #[serde(default)]
    pub email: Option<String>,
}

// ---------------------------------------------------------------------------
// Directory trait
// ---------------------------------------------------------------------------

/// Read-only query surface over the directory.
///
/// Implementations return only eligible records: employed people, enrolled
/// students. Any failure is a [`DirectoryError`] and aborts the run that
/// needed it.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Look up an organization by id.
    async fn organization(&self, org_id: i64) -> Result<Organization, DirectoryError>;

    /// Employed members of an organization.
    async fn organization_members(&self, org_id: i64) -> Result<Vec<Person>, DirectoryError>;

    /// Employed moderators designated for an organization's list.
    async fn organization_moderators(&self, org_id: i64) -> Result<Vec<Person>, DirectoryError>;

    /// All enrolled students.
    async fn students(&self) -> Result<Vec<Student>, DirectoryError>;

    /// All employed people.
    async fn employees(&self) -> Result<Vec<Person>, DirectoryError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Asynchronous directory REST API client.
#[derive(Clone)]
pub struct HttpDirectory {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl HttpDirectory {
    pub fn new(
        api_url: impl Into<String>,
        token: Option<String>,
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
        info!(api_url = %api_url, "created HttpDirectory");
        Self {
            http,
            api_url,
            token,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, DirectoryError> {
        let url = format!("{}{}", self.api_url, path);
        let mut req = self.http.get(&url);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        if !query.is_empty() {
            req = req.query(query);
        }
        let resp = req.send().await?;
        check_response(&resp)?;
        Ok(resp.json().await?)
    }
}

fn check_response(resp: &reqwest::Response) -> Result<(), DirectoryError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(DirectoryError::AuthenticationFailed(format!(
            "HTTP {}",
            status
        )));
    }
    Err(DirectoryError::ApiError {
        status: status.as_u16(),
        body: format!("HTTP {}", status),
    })
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn organization(&self, org_id: i64) -> Result<Organization, DirectoryError> {
        let org: Organization = self
            .get_json(&format!("/organizations/{}", org_id), &[])
            .await?;
        debug!(org_id, name = %org.name, "fetched organization");
        Ok(org)
    }

    async fn organization_members(&self, org_id: i64) -> Result<Vec<Person>, DirectoryError> {
        let persons: Vec<Person> = self
            .get_json(
                &format!("/organizations/{}/persons", org_id),
                &[("employed", "true")],
            )
            .await?;
        debug!(org_id, count = persons.len(), "fetched organization members");
        Ok(persons)
    }

    async fn organization_moderators(&self, org_id: i64) -> Result<Vec<Person>, DirectoryError> {
        let persons: Vec<Person> = self
            .get_json(
                &format!("/organizations/{}/moderators", org_id),
                &[("employed", "true")],
            )
            .await?;
        debug!(
            org_id,
            count = persons.len(),
            "fetched organization moderators"
        );
        Ok(persons)
    }

    async fn students(&self) -> Result<Vec<Student>, DirectoryError> {
        let students: Vec<Student> = self.get_json("/students", &[]).await?;
        debug!(count = students.len(), "fetched students");
        Ok(students)
    }

    async fn employees(&self) -> Result<Vec<Person>, DirectoryError> {
        let persons: Vec<Person> = self
            .get_json("/persons", &[("employed", "true")])
            .await?;
        debug!(count = persons.len(), "fetched employees");
        Ok(persons)
    }
}
