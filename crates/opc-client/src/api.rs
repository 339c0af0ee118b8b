//! HTTP client for the snapshot endpoints.

use crate::config::{ApiBase, ClientConfig};
use crate::error::{ClientError, Result};
use opc_core::{Agent, Deployment, Issue, ListResponse, LogEntry, PullRequest, Worktree};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::de::DeserializeOwned;
use tracing::debug;

pub const DEFAULT_LOG_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct ApiClient {
    http_client: reqwest::Client,
    base: ApiBase,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base: config.api_base.clone(),
        })
    }

    pub fn base(&self) -> &ApiBase {
        &self.base
    }

    pub async fn fetch_agents(&self) -> Result<ListResponse<Agent>> {
        self.fetch_list("agents").await
    }

    pub async fn fetch_issues(&self) -> Result<ListResponse<Issue>> {
        self.fetch_list("issues").await
    }

    pub async fn fetch_prs(&self) -> Result<ListResponse<PullRequest>> {
        self.fetch_list("prs").await
    }

    pub async fn fetch_worktrees(&self) -> Result<ListResponse<Worktree>> {
        self.fetch_list("worktrees").await
    }

    pub async fn fetch_deployments(&self) -> Result<ListResponse<Deployment>> {
        self.fetch_list("deployments").await
    }

    pub async fn fetch_logs(&self, limit: usize) -> Result<ListResponse<LogEntry>> {
        self.fetch_list(&format!("logs?limit={limit}")).await
    }

    async fn fetch_list<T: DeserializeOwned>(&self, path: &str) -> Result<ListResponse<T>> {
        let base = self.base.url()?;
        let url = format!("{}/{}", base.as_str().trim_end_matches('/'), path);
        debug!(event = "snapshot_fetch", url = %url);

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
