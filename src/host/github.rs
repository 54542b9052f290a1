//! GitHub REST client

use crate::core::{ApiErrorKind, ProvisionError, Secret};
use crate::host::{RemoteRepository, SourceHost};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

const SERVICE: &str = "GitHub";

/// Client for the GitHub repositories API
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    api_base: String,
    owner: String,
    token: Secret,
}

impl GitHubClient {
    /// Create a client for the account `owner`
    ///
    /// # Arguments
    /// * `api_base` - API root, e.g. `https://api.github.com`
    /// * `owner` - Account that owns the repositories
    /// * `token` - Personal access token
    pub fn new(
        api_base: impl Into<String>,
        owner: impl Into<String>,
        token: Secret,
    ) -> Result<Self, ProvisionError> {
        let client = Client::builder()
            .user_agent(concat!("provision/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ProvisionError::RemoteApi {
                service: SERVICE,
                kind: ApiErrorKind::Other,
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            owner: owner.into(),
            token,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.api_base, path))
            .header(AUTHORIZATION, format!("token {}", self.token.expose()))
            .header(ACCEPT, "application/vnd.github+json")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ProvisionError> {
        request.send().await.map_err(|e| ProvisionError::RemoteApi {
            service: SERVICE,
            kind: ApiErrorKind::Network,
            message: e.to_string(),
        })
    }
}

/// Map an unsuccessful HTTP status to an error kind
pub fn classify_status(status: StatusCode, headers: &HeaderMap) -> ApiErrorKind {
    let quota_exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");

    match status {
        StatusCode::UNAUTHORIZED => ApiErrorKind::Auth,
        StatusCode::TOO_MANY_REQUESTS => ApiErrorKind::RateLimited,
        StatusCode::FORBIDDEN if quota_exhausted => ApiErrorKind::RateLimited,
        StatusCode::FORBIDDEN => ApiErrorKind::Auth,
        StatusCode::NOT_FOUND => ApiErrorKind::NotFound,
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => ApiErrorKind::Conflict,
        s if s.is_server_error() => ApiErrorKind::Server,
        _ => ApiErrorKind::Other,
    }
}

async fn error_from_response(response: Response) -> ProvisionError {
    let status = response.status();
    let kind = classify_status(status, response.headers());
    let body = response.text().await.unwrap_or_default();

    let detail = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            let message = v.get("message")?.as_str()?.to_string();
            let errors = v
                .get("errors")
                .and_then(|e| e.as_array())
                .map(|errors| {
                    errors
                        .iter()
                        .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                        .collect::<Vec<_>>()
                        .join("; ")
                })
                .filter(|s| !s.is_empty());
            Some(match errors {
                Some(errors) => format!("{} ({})", message, errors),
                None => message,
            })
        })
        .unwrap_or(body);

    ProvisionError::RemoteApi {
        service: SERVICE,
        kind,
        message: format!("HTTP {}: {}", status.as_u16(), detail.trim()),
    }
}

#[async_trait]
impl SourceHost for GitHubClient {
    async fn find_repository(&self, name: &str) -> Result<Option<RemoteRepository>, ProvisionError> {
        let path = format!("/repos/{}/{}", self.owner, name);
        debug!("Looking up repository {}/{}", self.owner, name);
        let response = self.send(self.request(Method::GET, &path)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let repo = response
            .json::<RemoteRepository>()
            .await
            .map_err(|e| ProvisionError::RemoteApi {
                service: SERVICE,
                kind: ApiErrorKind::Other,
                message: format!("failed to parse repository: {}", e),
            })?;
        Ok(Some(repo))
    }

    async fn create_repository(
        &self,
        name: &str,
        private: bool,
    ) -> Result<RemoteRepository, ProvisionError> {
        info!("Creating repository {} (private: {})", name, private);
        let request = self
            .request(Method::POST, "/user/repos")
            .json(&json!({ "name": name, "private": private }));
        let response = self.send(request).await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        response
            .json::<RemoteRepository>()
            .await
            .map_err(|e| ProvisionError::RemoteApi {
                service: SERVICE,
                kind: ApiErrorKind::Other,
                message: format!("failed to parse created repository: {}", e),
            })
    }

    async fn delete_repository(&self, name: &str) -> Result<(), ProvisionError> {
        info!("Deleting repository {}/{}", self.owner, name);
        let path = format!("/repos/{}/{}", self.owner, name);
        let response = self.send(self.request(Method::DELETE, &path)).await?;

        match response.status() {
            s if s.is_success() || s == StatusCode::NOT_FOUND => Ok(()),
            _ => Err(error_from_response(response).await),
        }
    }
}
