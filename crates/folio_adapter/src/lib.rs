#![forbid(unsafe_code)]

use std::sync::Arc;

use folio_engines::content_http::{ContentHttpConfig, HttpContentClient};
use folio_kernel_contracts::content::FetchFailureKind;
use folio_kernel_contracts::hierarchy::{Entity, EntityId, Rank};
use folio_os::content_fetch::HttpContentService;
use folio_os::navigator::{
    FetchApplyOutcome, ListPresence, NavigatorConfig, NavigatorError, NavigatorState,
};
use folio_os::session::{CredentialPolicy, SessionTokenStore};
use folio_os::{ExplorerError, ExplorerSession, SelectOutcome};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SelectAdapterRequest {
    /// Rank index (`0`..`6`) or name (`library` .. `action`).
    pub rank: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CreateLibraryAdapterRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RankViewResponse {
    pub rank: Rank,
    pub presence: &'static str,
    pub selected: Option<EntityId>,
    pub items: Vec<Entity>,
    pub failure: Option<FetchFailureKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct VisiblePathResponse {
    pub status: String,
    pub ranks: Vec<RankViewResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NavigationAdapterResponse {
    pub status: String,
    pub outcome: String,
    pub rank: Rank,
    pub reason_code: Option<String>,
    pub failure: Option<FetchFailureKind>,
    pub path: VisiblePathResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CreateLibraryAdapterResponse {
    pub status: String,
    pub name: String,
    pub library: Option<Entity>,
    pub present_exactly_once: Option<bool>,
    pub refresh: NavigationAdapterResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AdapterHealthResponse {
    pub status: String,
    pub outcome: String,
    pub credential: String,
    pub libraries_loaded: usize,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AdapterErrorResponse {
    pub status: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterFailureClass {
    BadRequest,
    NotFound,
    UpstreamUnavailable,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterFailure {
    pub class: AdapterFailureClass,
    pub reason: String,
}

impl AdapterFailure {
    fn bad_request(reason: impl Into<String>) -> Self {
        Self {
            class: AdapterFailureClass::BadRequest,
            reason: reason.into(),
        }
    }

    pub fn to_response(&self) -> AdapterErrorResponse {
        AdapterErrorResponse {
            status: "error".to_string(),
            reason: self.reason.clone(),
        }
    }
}

impl From<ExplorerError> for AdapterFailure {
    fn from(err: ExplorerError) -> Self {
        let class = match &err {
            ExplorerError::Navigator(NavigatorError::UnknownEntity { .. }) => {
                AdapterFailureClass::NotFound
            }
            ExplorerError::Navigator(NavigatorError::StatePoisoned) => AdapterFailureClass::Internal,
            ExplorerError::Navigator(_) | ExplorerError::Contract(_) => {
                AdapterFailureClass::BadRequest
            }
            ExplorerError::Fetch(_) => AdapterFailureClass::UpstreamUnavailable,
        };
        Self {
            class,
            reason: err.to_string(),
        }
    }
}

/// Shared handle served by the HTTP adapter. Cloning shares one explorer session.
#[derive(Clone)]
pub struct AdapterRuntime {
    explorer: Arc<ExplorerSession>,
}

impl AdapterRuntime {
    pub fn new(explorer: Arc<ExplorerSession>) -> Self {
        Self { explorer }
    }

    pub fn default_from_env() -> Result<Self, String> {
        let http_config = ContentHttpConfig::from_env()?;
        let client = HttpContentClient::new(http_config)?;
        let service = Arc::new(HttpContentService::new(client));
        let credential_policy = CredentialPolicy::from_env().map_err(|e| e.to_string())?;
        let explorer = ExplorerSession::new(
            NavigatorConfig::from_env(),
            service.clone(),
            service,
            Arc::new(SessionTokenStore::from_env()),
            credential_policy,
        );
        Ok(Self::new(Arc::new(explorer)))
    }

    pub fn explorer(&self) -> &ExplorerSession {
        &self.explorer
    }

    pub fn health_report(&self) -> Result<AdapterHealthResponse, AdapterFailure> {
        let snapshot = self.explorer.snapshot().map_err(AdapterFailure::from)?;
        let credential = snapshot
            .credential()
            .map(|c| c.kind_label())
            .unwrap_or("none");
        let (outcome, reason) = match snapshot.failure(Rank::Library) {
            Some(kind) => ("DEGRADED", Some(format!("root fetch failed: {}", kind.as_str()))),
            None if snapshot.credential().is_none() => ("STARTING", None),
            None => ("HEALTHY", None),
        };
        Ok(AdapterHealthResponse {
            status: "ok".to_string(),
            outcome: outcome.to_string(),
            credential: credential.to_string(),
            libraries_loaded: snapshot.items(Rank::Library).len(),
            reason,
        })
    }

    pub fn visible_path(&self) -> Result<VisiblePathResponse, AdapterFailure> {
        let snapshot = self.explorer.snapshot().map_err(AdapterFailure::from)?;
        Ok(render_path(&snapshot))
    }

    pub async fn refresh(&self) -> Result<NavigationAdapterResponse, AdapterFailure> {
        let outcome = self.explorer.initialize().await?;
        self.navigation_response(describe_apply(&outcome))
    }

    pub async fn select(
        &self,
        request: SelectAdapterRequest,
    ) -> Result<NavigationAdapterResponse, AdapterFailure> {
        let rank = Rank::parse(&request.rank)
            .ok_or_else(|| AdapterFailure::bad_request(format!("unknown rank {:?}", request.rank)))?;
        let id = EntityId::new(request.id.trim())
            .map_err(|e| AdapterFailure::bad_request(e.to_string()))?;
        let described = match self.explorer.select_at(rank, &id).await? {
            SelectOutcome::Fetched(outcome) => describe_apply(&outcome),
            SelectOutcome::LeafSelected { rank, .. } => OutcomeSummary {
                outcome: "LEAF_SELECTED",
                rank,
                reason_code: None,
                failure: None,
            },
        };
        self.navigation_response(described)
    }

    pub async fn create_library(
        &self,
        request: CreateLibraryAdapterRequest,
    ) -> Result<CreateLibraryAdapterResponse, AdapterFailure> {
        let outcome = self.explorer.create_library(&request.name).await?;
        let refresh = self.navigation_response(describe_apply(&outcome.refresh))?;
        Ok(CreateLibraryAdapterResponse {
            status: "ok".to_string(),
            name: outcome.created.name.as_str().to_string(),
            library: outcome.created.entity,
            present_exactly_once: outcome.present_exactly_once,
            refresh,
        })
    }

    fn navigation_response(
        &self,
        summary: OutcomeSummary,
    ) -> Result<NavigationAdapterResponse, AdapterFailure> {
        Ok(NavigationAdapterResponse {
            status: "ok".to_string(),
            outcome: summary.outcome.to_string(),
            rank: summary.rank,
            reason_code: summary.reason_code,
            failure: summary.failure,
            path: self.visible_path()?,
        })
    }
}

struct OutcomeSummary {
    outcome: &'static str,
    rank: Rank,
    reason_code: Option<String>,
    failure: Option<FetchFailureKind>,
}

fn describe_apply(outcome: &FetchApplyOutcome) -> OutcomeSummary {
    let (label, failure) = match outcome {
        FetchApplyOutcome::Applied { .. } => ("APPLIED", None),
        FetchApplyOutcome::Failed { kind, .. } => ("FETCH_FAILED", Some(*kind)),
        FetchApplyOutcome::DiscardedStale { .. } => ("DISCARDED_STALE", None),
    };
    OutcomeSummary {
        outcome: label,
        rank: outcome.rank(),
        reason_code: Some(outcome.reason_code().to_string()),
        failure,
    }
}

/// Path and failures come from one snapshot so they always agree.
fn render_path(state: &NavigatorState) -> VisiblePathResponse {
    let path = state.visible_path();
    VisiblePathResponse {
        status: "ok".to_string(),
        ranks: path
            .ranks
            .iter()
            .map(|view| RankViewResponse {
                rank: view.rank,
                presence: presence_label(view.presence),
                selected: view.selected.clone(),
                items: view.items.clone(),
                failure: state.failure(view.rank),
            })
            .collect(),
    }
}

fn presence_label(presence: ListPresence) -> &'static str {
    match presence {
        ListPresence::Loading => "loading",
        ListPresence::Empty => "empty",
        ListPresence::Populated => "populated",
    }
}
