#![forbid(unsafe_code)]

use std::sync::Arc;

use folio_engines::content_http::HttpContentClient;
use folio_kernel_contracts::content::{ChildBatch, CreatedLibrary, FetchError};
use folio_kernel_contracts::hierarchy::{Credential, EntityId, LibraryName, Rank};

/// Loads the children of one parent (or the root list when `parent_id` is `None`).
#[async_trait::async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch_children(
        &self,
        rank: Rank,
        parent_id: Option<EntityId>,
        credential: Credential,
    ) -> Result<ChildBatch, FetchError>;
}

#[async_trait::async_trait]
pub trait LibraryCreator: Send + Sync {
    async fn create_library(
        &self,
        name: LibraryName,
        credential: Credential,
    ) -> Result<CreatedLibrary, FetchError>;
}

/// Runs the blocking HTTP client off the async executor.
#[derive(Debug, Clone)]
pub struct HttpContentService {
    client: Arc<HttpContentClient>,
}

impl HttpContentService {
    pub fn new(client: HttpContentClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

#[async_trait::async_trait]
impl ContentFetcher for HttpContentService {
    async fn fetch_children(
        &self,
        rank: Rank,
        parent_id: Option<EntityId>,
        credential: Credential,
    ) -> Result<ChildBatch, FetchError> {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || {
            client.fetch_children(rank, parent_id.as_ref(), &credential)
        })
        .await
        .map_err(|e| FetchError::network(format!("fetch task aborted: {e}")))?
    }
}

#[async_trait::async_trait]
impl LibraryCreator for HttpContentService {
    async fn create_library(
        &self,
        name: LibraryName,
        credential: Credential,
    ) -> Result<CreatedLibrary, FetchError> {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || client.create_library(&name, &credential))
            .await
            .map_err(|e| FetchError::network(format!("create task aborted: {e}")))?
    }
}
