//! Source-control host API

pub mod github;

use crate::core::ProvisionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use github::GitHubClient;

/// A repository on the source host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRepository {
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    pub clone_url: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub html_url: String,
}

/// Trait for source hosts - allows for different implementations
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Look a repository up by name under the authenticated account
    async fn find_repository(&self, name: &str) -> Result<Option<RemoteRepository>, ProvisionError>;

    /// Create a repository under the authenticated account
    async fn create_repository(
        &self,
        name: &str,
        private: bool,
    ) -> Result<RemoteRepository, ProvisionError>;

    /// Delete a repository; deleting one that does not exist succeeds
    async fn delete_repository(&self, name: &str) -> Result<(), ProvisionError>;
}
