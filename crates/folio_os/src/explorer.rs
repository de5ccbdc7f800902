#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use folio_kernel_contracts::content::{CreatedLibrary, FetchError};
use folio_kernel_contracts::hierarchy::{Credential, EntityId, LibraryName, Rank};
use folio_kernel_contracts::ContractViolation;

use crate::content_fetch::{ContentFetcher, LibraryCreator};
use crate::navigator::{
    FetchApplyOutcome, FetchRequest, HierarchyNavigator, NavigatorConfig, NavigatorError,
    NavigatorState, SelectPlan, VisiblePath,
};
use crate::session::{resolve_credential, CredentialPolicy, SessionProvider};

#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
    #[error(transparent)]
    Navigator(#[from] NavigatorError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Contract(#[from] ContractViolation),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    Fetched(FetchApplyOutcome),
    LeafSelected { rank: Rank, id: EntityId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryCreateOutcome {
    pub created: CreatedLibrary,
    pub refresh: FetchApplyOutcome,
    /// Whether the refreshed root list holds the new library exactly once.
    /// `None` when the service did not echo the row and the name is ambiguous.
    pub present_exactly_once: Option<bool>,
}

/// One user's browsing session: the navigator plus the collaborators it fetches through.
pub struct ExplorerSession {
    navigator: Mutex<HierarchyNavigator>,
    fetcher: Arc<dyn ContentFetcher>,
    creator: Arc<dyn LibraryCreator>,
    session: Arc<dyn SessionProvider>,
    credential_policy: CredentialPolicy,
}

impl ExplorerSession {
    pub fn new(
        config: NavigatorConfig,
        fetcher: Arc<dyn ContentFetcher>,
        creator: Arc<dyn LibraryCreator>,
        session: Arc<dyn SessionProvider>,
        credential_policy: CredentialPolicy,
    ) -> Self {
        Self {
            navigator: Mutex::new(HierarchyNavigator::new(config)),
            fetcher,
            creator,
            session,
            credential_policy,
        }
    }

    pub fn current_credential(&self) -> Credential {
        resolve_credential(self.session.as_ref(), &self.credential_policy)
    }

    /// Loads the root list with the session's current credential. Fetch
    /// failures are reported in the outcome, never as `Err`.
    pub async fn initialize(&self) -> Result<FetchApplyOutcome, ExplorerError> {
        let credential = self.current_credential();
        tracing::info!(credential = credential.kind_label(), "loading libraries");
        let request = self.lock()?.begin_initialize(credential);
        self.run_fetch(request).await
    }

    pub async fn select_at(&self, rank: Rank, id: &EntityId) -> Result<SelectOutcome, ExplorerError> {
        let plan = self.lock()?.begin_select(rank, id)?;
        match plan {
            SelectPlan::Leaf { rank, id } => {
                tracing::info!(rank = %rank, id = id.as_str(), "leaf selected");
                Ok(SelectOutcome::LeafSelected { rank, id })
            }
            SelectPlan::Fetch(request) => Ok(SelectOutcome::Fetched(self.run_fetch(request).await?)),
        }
    }

    /// Creates a root library, then reloads the root list.
    pub async fn create_library(&self, raw_name: &str) -> Result<LibraryCreateOutcome, ExplorerError> {
        let name = LibraryName::new(raw_name)?;
        let credential = self.current_credential();
        let created = self.creator.create_library(name, credential).await?;
        tracing::info!(
            library_name = created.name.as_str(),
            echoed = created.entity.is_some(),
            "library created"
        );

        let refresh = self.initialize().await?;
        let present_exactly_once = {
            let navigator = self.lock()?;
            let roots = navigator.state().items(Rank::Library);
            match &created.entity {
                Some(entity) => Some(roots.iter().filter(|e| e.id == entity.id).count() == 1),
                None => {
                    let matching = roots
                        .iter()
                        .filter(|e| e.label == created.name.as_str())
                        .count();
                    (matching <= 1).then_some(matching == 1)
                }
            }
        };
        if present_exactly_once == Some(false) {
            tracing::warn!(
                library_name = created.name.as_str(),
                "created library not found after refresh"
            );
        }

        Ok(LibraryCreateOutcome {
            created,
            refresh,
            present_exactly_once,
        })
    }

    pub fn visible_path(&self) -> Result<VisiblePath, ExplorerError> {
        Ok(self.lock()?.visible_path())
    }

    pub fn snapshot(&self) -> Result<NavigatorState, ExplorerError> {
        Ok(self.lock()?.state().clone())
    }

    async fn run_fetch(&self, request: FetchRequest) -> Result<FetchApplyOutcome, ExplorerError> {
        let FetchRequest { tag, credential } = request;
        let result = self
            .fetcher
            .fetch_children(tag.rank, tag.parent_id.clone(), credential)
            .await;
        let outcome = self.lock()?.complete_batch(&tag, result);
        Ok(outcome)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HierarchyNavigator>, NavigatorError> {
        self.navigator.lock().map_err(|_| NavigatorError::StatePoisoned)
    }
}
