#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use folio_kernel_contracts::content::{ChildBatch, CreatedLibrary, FetchError};
use folio_kernel_contracts::hierarchy::{Credential, Entity, EntityId, LibraryName, Rank};
use folio_kernel_contracts::Validate;
use folio_os::content_fetch::{ContentFetcher, LibraryCreator};
use folio_os::in_memory::InMemoryContentService;
use folio_os::navigator::{FetchApplyOutcome, NavigatorConfig};
use folio_os::session::{CredentialPolicy, SessionTokenStore};
use folio_os::{ExplorerSession, SelectOutcome};
use tokio::sync::oneshot;

type GateKey = (Rank, Option<EntityId>);

/// Holds fetches for gated keys until the test releases them.
struct GatedFetcher {
    inner: InMemoryContentService,
    gates: Mutex<HashMap<GateKey, oneshot::Receiver<()>>>,
}

impl GatedFetcher {
    fn new(inner: InMemoryContentService) -> Self {
        Self {
            inner,
            gates: Mutex::new(HashMap::new()),
        }
    }

    fn gate(&self, rank: Rank, parent_id: Option<EntityId>) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert((rank, parent_id), rx);
        tx
    }
}

#[async_trait::async_trait]
impl ContentFetcher for GatedFetcher {
    async fn fetch_children(
        &self,
        rank: Rank,
        parent_id: Option<EntityId>,
        credential: Credential,
    ) -> Result<ChildBatch, FetchError> {
        let gate = self
            .gates
            .lock()
            .unwrap()
            .remove(&(rank, parent_id.clone()));
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.inner.fetch_children(rank, parent_id, credential).await
    }
}

#[async_trait::async_trait]
impl LibraryCreator for GatedFetcher {
    async fn create_library(
        &self,
        name: LibraryName,
        credential: Credential,
    ) -> Result<CreatedLibrary, FetchError> {
        self.inner.create_library(name, credential).await
    }
}

fn id(raw: &str) -> EntityId {
    EntityId::new(raw).unwrap()
}

fn entity(raw_id: &str, label: &str, parent: Option<&str>) -> Entity {
    Entity::v1(id(raw_id), label.to_string(), parent.map(id)).unwrap()
}

fn two_section_catalog() -> InMemoryContentService {
    let service = InMemoryContentService::new();
    service.insert(Rank::Library, entity("1", "Fiction", None));
    service.insert(Rank::Library, entity("2", "Myths", None));
    service.insert(Rank::Book, entity("10", "Dune", Some("1")));
    service.insert(Rank::Section, entity("100", "Book One", Some("10")));
    service.insert(Rank::Section, entity("101", "Book Two", Some("10")));
    service.insert(Rank::Chapter, entity("1000", "Arrakis", Some("100")));
    service.insert(Rank::Chapter, entity("1010", "Sietch Tabr", Some("101")));
    service
}

fn explorer(fetcher: &Arc<GatedFetcher>, session: Arc<SessionTokenStore>) -> Arc<ExplorerSession> {
    Arc::new(ExplorerSession::new(
        NavigatorConfig::mvp_v1(),
        fetcher.clone(),
        fetcher.clone(),
        session,
        CredentialPolicy::mvp_v1(),
    ))
}

async fn drilled_to_book(fetcher: &Arc<GatedFetcher>) -> Arc<ExplorerSession> {
    let explorer = explorer(fetcher, Arc::new(SessionTokenStore::with_token("T1")));
    explorer.initialize().await.unwrap();
    explorer.select_at(Rank::Library, &id("1")).await.unwrap();
    explorer.select_at(Rank::Book, &id("10")).await.unwrap();
    explorer
}

async fn wait_for_pending(explorer: &ExplorerSession, rank: Rank, parent: &EntityId) {
    for _ in 0..200 {
        let state = explorer.snapshot().unwrap();
        if state
            .pending(rank)
            .is_some_and(|tag| tag.parent_id.as_ref() == Some(parent))
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("fetch for {rank} under {parent} never became pending");
}

fn spawn_select(
    explorer: &Arc<ExplorerSession>,
    rank: Rank,
    raw_id: &str,
) -> tokio::task::JoinHandle<SelectOutcome> {
    let explorer = Arc::clone(explorer);
    let target = id(raw_id);
    tokio::spawn(async move { explorer.select_at(rank, &target).await.unwrap() })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_explorer_stale_01_late_response_for_superseded_selection_is_dropped() {
    let fetcher = Arc::new(GatedFetcher::new(two_section_catalog()));
    let explorer = drilled_to_book(&fetcher).await;

    let release_a = fetcher.gate(Rank::Chapter, Some(id("100")));
    let task_a = spawn_select(&explorer, Rank::Section, "100");
    wait_for_pending(&explorer, Rank::Chapter, &id("100")).await;

    let outcome_b = explorer.select_at(Rank::Section, &id("101")).await.unwrap();
    assert!(matches!(
        outcome_b,
        SelectOutcome::Fetched(FetchApplyOutcome::Applied { .. })
    ));

    release_a.send(()).unwrap();
    let outcome_a = task_a.await.unwrap();
    assert!(matches!(
        outcome_a,
        SelectOutcome::Fetched(FetchApplyOutcome::DiscardedStale {
            rank: Rank::Chapter,
            ..
        })
    ));

    let state = explorer.snapshot().unwrap();
    assert_eq!(state.selected(Rank::Section), Some(&id("101")));
    assert_eq!(
        state.items(Rank::Chapter),
        &[entity("1010", "Sietch Tabr", Some("101"))]
    );
    state.validate().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_explorer_stale_02_superseded_response_landing_first_is_dropped() {
    let fetcher = Arc::new(GatedFetcher::new(two_section_catalog()));
    let explorer = drilled_to_book(&fetcher).await;

    let release_a = fetcher.gate(Rank::Chapter, Some(id("100")));
    let release_b = fetcher.gate(Rank::Chapter, Some(id("101")));
    let task_a = spawn_select(&explorer, Rank::Section, "100");
    wait_for_pending(&explorer, Rank::Chapter, &id("100")).await;
    let task_b = spawn_select(&explorer, Rank::Section, "101");
    wait_for_pending(&explorer, Rank::Chapter, &id("101")).await;

    release_a.send(()).unwrap();
    let outcome_a = task_a.await.unwrap();
    assert!(matches!(
        outcome_a,
        SelectOutcome::Fetched(FetchApplyOutcome::DiscardedStale { .. })
    ));
    assert!(explorer.snapshot().unwrap().items(Rank::Chapter).is_empty());

    release_b.send(()).unwrap();
    task_b.await.unwrap();
    let state = explorer.snapshot().unwrap();
    assert_eq!(
        state.items(Rank::Chapter),
        &[entity("1010", "Sietch Tabr", Some("101"))]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_explorer_stale_03_shallower_selection_cancels_deeper_fetch() {
    let fetcher = Arc::new(GatedFetcher::new(two_section_catalog()));
    let explorer = drilled_to_book(&fetcher).await;

    let release = fetcher.gate(Rank::Chapter, Some(id("100")));
    let task = spawn_select(&explorer, Rank::Section, "100");
    wait_for_pending(&explorer, Rank::Chapter, &id("100")).await;

    explorer.select_at(Rank::Library, &id("2")).await.unwrap();
    release.send(()).unwrap();
    assert!(matches!(
        task.await.unwrap(),
        SelectOutcome::Fetched(FetchApplyOutcome::DiscardedStale { .. })
    ));

    let state = explorer.snapshot().unwrap();
    assert_eq!(state.selected(Rank::Library), Some(&id("2")));
    for rank in Rank::Book.deeper() {
        assert!(state.items(rank).is_empty());
    }
    state.validate().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_explorer_stale_04_root_fetch_from_previous_credential_is_dropped() {
    let fetcher = Arc::new(GatedFetcher::new(two_section_catalog()));
    let session = Arc::new(SessionTokenStore::signed_out());
    let explorer = explorer(&fetcher, session.clone());

    let release = fetcher.gate(Rank::Library, None);
    let anonymous_init = {
        let explorer = Arc::clone(&explorer);
        tokio::spawn(async move { explorer.initialize().await.unwrap() })
    };
    for _ in 0..200 {
        if explorer.snapshot().unwrap().pending(Rank::Library).is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    session.set_token("T2");
    let signed_in = explorer.initialize().await.unwrap();
    assert!(matches!(signed_in, FetchApplyOutcome::Applied { .. }));

    release.send(()).unwrap();
    assert!(matches!(
        anonymous_init.await.unwrap(),
        FetchApplyOutcome::DiscardedStale { .. }
    ));
    let state = explorer.snapshot().unwrap();
    assert!(!state.credential().unwrap().is_anonymous());
    assert_eq!(state.items(Rank::Library).len(), 2);
}
