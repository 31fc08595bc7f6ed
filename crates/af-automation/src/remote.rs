//! Remote configuration catalog client
//!
//! The remote catalog is the source of truth for activities, apps, and
//! area assignments. The trait keeps storage and engine testable without
//! a network; [`HttpRemoteClient`] is the production implementation.

use crate::model::{ActivityDef, App, AreaAssignment};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// HTTP request timeout
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote catalog errors
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Result type for remote operations
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Client for the remote configuration catalog
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Fetch the area assignments of an instance
    async fn fetch_area_assignments(
        &self,
        instance_id: &str,
    ) -> RemoteResult<IndexMap<String, AreaAssignment>>;

    /// Fetch an app including its activity action bundles
    async fn fetch_app_with_actions(&self, app_id: &str) -> RemoteResult<Option<App>>;

    /// Fetch activity definitions by id, in catalog priority order
    async fn fetch_activity_types(&self, activity_ids: &[String]) -> RemoteResult<Vec<ActivityDef>>;

    /// Persist an area assignment back to the catalog
    async fn save_area_assignment(
        &self,
        instance_id: &str,
        assignment: &AreaAssignment,
    ) -> RemoteResult<()>;
}

/// Remote client over the catalog's REST API
pub struct HttpRemoteClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpRemoteClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> RemoteResult<Self> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> RemoteResult<T> {
        debug!(path, "Remote GET");

        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct AssignmentsResponse {
    #[serde(default)]
    assignments: IndexMap<String, AreaAssignment>,
}

#[derive(Debug, Deserialize)]
struct ActivitiesResponse {
    #[serde(default)]
    activities: Vec<ActivityDef>,
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn fetch_area_assignments(
        &self,
        instance_id: &str,
    ) -> RemoteResult<IndexMap<String, AreaAssignment>> {
        let response: AssignmentsResponse = self
            .get_json(&format!("/v1/instances/{instance_id}/assignments"))
            .await?;
        Ok(response.assignments)
    }

    async fn fetch_app_with_actions(&self, app_id: &str) -> RemoteResult<Option<App>> {
        let response = self
            .client
            .get(self.url(&format!("/v1/apps/{app_id}")))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let app: App = response.error_for_status()?.json().await?;
        Ok(Some(app))
    }

    async fn fetch_activity_types(&self, activity_ids: &[String]) -> RemoteResult<Vec<ActivityDef>> {
        if activity_ids.is_empty() {
            return Ok(Vec::new());
        }

        let response: ActivitiesResponse = self
            .get_json(&format!("/v1/activity_types?ids={}", activity_ids.join(",")))
            .await?;
        Ok(response.activities)
    }

    async fn save_area_assignment(
        &self,
        instance_id: &str,
        assignment: &AreaAssignment,
    ) -> RemoteResult<()> {
        debug!(instance_id, area_id = %assignment.area_id, "Saving assignment");

        self.client
            .put(self.url(&format!(
                "/v1/instances/{instance_id}/assignments/{}",
                assignment.area_id
            )))
            .bearer_auth(&self.api_key)
            .json(assignment)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}
