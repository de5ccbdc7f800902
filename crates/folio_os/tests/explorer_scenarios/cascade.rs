#![forbid(unsafe_code)]

use std::sync::Arc;

use folio_kernel_contracts::hierarchy::{Entity, EntityId, Rank};
use folio_kernel_contracts::Validate;
use folio_os::in_memory::InMemoryContentService;
use folio_os::navigator::{FetchApplyOutcome, ListPresence, NavigatorConfig};
use folio_os::session::{CredentialPolicy, SessionTokenStore};
use folio_os::{ExplorerSession, SelectOutcome};

fn id(raw: &str) -> EntityId {
    EntityId::new(raw).unwrap()
}

fn entity(raw_id: &str, label: &str, parent: Option<&str>) -> Entity {
    Entity::v1(id(raw_id), label.to_string(), parent.map(id)).unwrap()
}

fn fiction_service() -> Arc<InMemoryContentService> {
    let service = InMemoryContentService::new();
    service.insert(Rank::Library, entity("1", "Fiction", None));
    service.insert(Rank::Book, entity("10", "Dune", Some("1")));
    Arc::new(service)
}

fn explorer(service: &Arc<InMemoryContentService>, token: &str) -> ExplorerSession {
    ExplorerSession::new(
        NavigatorConfig::mvp_v1(),
        service.clone(),
        service.clone(),
        Arc::new(SessionTokenStore::with_token(token)),
        CredentialPolicy::mvp_v1(),
    )
}

#[tokio::test]
async fn at_explorer_cascade_01_fiction_dune_walkthrough() {
    let service = fiction_service();
    let explorer = explorer(&service, "T1");

    explorer.initialize().await.unwrap();
    let state = explorer.snapshot().unwrap();
    assert_eq!(state.items(Rank::Library), &[entity("1", "Fiction", None)]);

    explorer.select_at(Rank::Library, &id("1")).await.unwrap();
    let state = explorer.snapshot().unwrap();
    assert_eq!(state.items(Rank::Book), &[entity("10", "Dune", Some("1"))]);

    explorer.select_at(Rank::Book, &id("10")).await.unwrap();
    let state = explorer.snapshot().unwrap();
    assert!(state.items(Rank::Section).is_empty());
    assert_eq!(state.selected(Rank::Book), Some(&id("10")));
    let path = explorer.visible_path().unwrap();
    assert_eq!(
        path.view(Rank::Section).unwrap().presence,
        ListPresence::Empty
    );

    let book_fetches_before = service
        .calls()
        .iter()
        .filter(|call| call.rank == Rank::Book)
        .count();
    explorer.select_at(Rank::Library, &id("1")).await.unwrap();
    let state = explorer.snapshot().unwrap();
    for rank in Rank::Book.deeper() {
        assert!(state.items(rank).is_empty());
        assert!(state.selected(rank).is_none());
    }
    assert!(state.selected(Rank::Book).is_none());
    assert_eq!(state.items(Rank::Book).len(), 1);
    let book_fetches_after = service
        .calls()
        .iter()
        .filter(|call| call.rank == Rank::Book)
        .count();
    assert_eq!(book_fetches_after, book_fetches_before + 1);
    state.validate().unwrap();
}

#[tokio::test]
async fn at_explorer_cascade_02_create_myths_lists_each_library_once() {
    let service = fiction_service();
    let explorer = explorer(&service, "T1");
    explorer.initialize().await.unwrap();

    let outcome = explorer.create_library("Myths").await.unwrap();
    assert!(matches!(outcome.refresh, FetchApplyOutcome::Applied { .. }));
    assert_eq!(outcome.present_exactly_once, Some(true));

    let state = explorer.snapshot().unwrap();
    let labels: Vec<&str> = state
        .items(Rank::Library)
        .iter()
        .map(|e| e.label.as_str())
        .collect();
    assert_eq!(labels, vec!["Fiction", "Myths"]);
}

#[tokio::test]
async fn at_explorer_cascade_03_every_rank_resets_deeper_ranks() {
    let service = Arc::new(InMemoryContentService::sample_catalog());
    let explorer = explorer(&service, "T1");
    explorer.initialize().await.unwrap();
    let chain = [
        (Rank::Library, "1"),
        (Rank::Book, "10"),
        (Rank::Section, "100"),
        (Rank::Chapter, "1000"),
        (Rank::Act, "2000"),
        (Rank::ParentAction, "3000"),
        (Rank::Action, "4000"),
    ];
    for (rank, raw_id) in chain {
        explorer.select_at(rank, &id(raw_id)).await.unwrap();
    }

    for (rank, raw_id) in chain.into_iter().rev() {
        explorer.select_at(rank, &id(raw_id)).await.unwrap();
        let state = explorer.snapshot().unwrap();
        for deeper in rank.deeper() {
            if Some(deeper) == rank.child() {
                assert!(state.selected(deeper).is_none());
            } else {
                assert!(state.items(deeper).is_empty(), "{deeper} kept items");
                assert!(state.selected(deeper).is_none(), "{deeper} kept selection");
            }
        }
        state.validate().unwrap();
    }
}

#[tokio::test]
async fn at_explorer_cascade_04_children_outside_parent_are_never_shown() {
    let service = fiction_service();
    service.insert(Rank::Library, entity("2", "Myths", None));
    service.insert(Rank::Book, entity("20", "Beowulf", Some("2")));
    let explorer = explorer(&service, "T1");
    explorer.initialize().await.unwrap();

    explorer.select_at(Rank::Library, &id("2")).await.unwrap();
    explorer.select_at(Rank::Library, &id("1")).await.unwrap();
    let state = explorer.snapshot().unwrap();
    assert!(state
        .items(Rank::Book)
        .iter()
        .all(|book| book.is_child_of(&id("1"))));
    state.validate().unwrap();
}

#[tokio::test]
async fn at_explorer_cascade_05_leaf_selection_settles_without_fetch() {
    let service = Arc::new(InMemoryContentService::sample_catalog());
    let explorer = explorer(&service, "T1");
    explorer.initialize().await.unwrap();
    for (rank, raw_id) in [
        (Rank::Library, "1"),
        (Rank::Book, "10"),
        (Rank::Section, "100"),
        (Rank::Chapter, "1000"),
        (Rank::Act, "2000"),
        (Rank::ParentAction, "3000"),
    ] {
        explorer.select_at(rank, &id(raw_id)).await.unwrap();
    }
    let calls_before = service.calls().len();
    let outcome = explorer.select_at(Rank::Action, &id("4000")).await.unwrap();
    assert!(matches!(outcome, SelectOutcome::LeafSelected { .. }));
    assert_eq!(service.calls().len(), calls_before);
}
