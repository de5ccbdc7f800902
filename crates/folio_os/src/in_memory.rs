#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use folio_kernel_contracts::content::{ChildBatch, CreatedLibrary, FetchError};
use folio_kernel_contracts::hierarchy::{Credential, Entity, EntityId, LibraryName, Rank};

use crate::content_fetch::{ContentFetcher, LibraryCreator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub rank: Rank,
    pub parent_id: Option<EntityId>,
    pub anonymous: bool,
}

#[derive(Debug, Default)]
struct Catalog {
    entities: BTreeMap<Rank, Vec<Entity>>,
    failures: BTreeMap<(Rank, Option<EntityId>), FetchError>,
    create_failure: Option<FetchError>,
    required_token: Option<String>,
    echo_created: bool,
    calls: Vec<FetchCall>,
}

/// Content service backed by process memory. Serves offline runs and tests.
#[derive(Debug)]
pub struct InMemoryContentService {
    catalog: Mutex<Catalog>,
}

impl Default for InMemoryContentService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryContentService {
    pub fn new() -> Self {
        Self {
            catalog: Mutex::new(Catalog {
                echo_created: true,
                ..Catalog::default()
            }),
        }
    }

    /// One library drilled all the way down, plus an empty sibling library.
    pub fn sample_catalog() -> Self {
        let service = Self::new();
        let rows: [(Rank, &str, &str, Option<&str>); 8] = [
            (Rank::Library, "1", "Fiction", None),
            (Rank::Library, "2", "Reference", None),
            (Rank::Book, "10", "Dune", Some("1")),
            (Rank::Section, "100", "Book One", Some("10")),
            (Rank::Chapter, "1000", "Arrakis", Some("100")),
            (Rank::Act, "2000", "Arrival", Some("1000")),
            (Rank::ParentAction, "3000", "Meet the Duke", Some("2000")),
            (Rank::Action, "4000", "Bow to the Duke", Some("3000")),
        ];
        for (rank, id, label, parent) in rows {
            // Fixture rows are static and valid.
            if let Ok(entity) = fixture_entity(id, label, parent) {
                service.insert(rank, entity);
            }
        }
        service
    }

    pub fn insert(&self, rank: Rank, entity: Entity) {
        self.lock().entities.entry(rank).or_default().push(entity);
    }

    pub fn remove(&self, rank: Rank, id: &EntityId) {
        if let Some(rows) = self.lock().entities.get_mut(&rank) {
            rows.retain(|entity| &entity.id != id);
        }
    }

    pub fn fail_fetch(&self, rank: Rank, parent_id: Option<EntityId>, err: FetchError) {
        self.lock().failures.insert((rank, parent_id), err);
    }

    pub fn fail_create(&self, err: FetchError) {
        self.lock().create_failure = Some(err);
    }

    /// Reject every call whose bearer token differs from `token`.
    pub fn require_token(&self, token: impl Into<String>) {
        self.lock().required_token = Some(token.into());
    }

    pub fn set_echo_created(&self, echo: bool) {
        self.lock().echo_created = echo;
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Catalog> {
        match self.catalog.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Catalog {
    fn authorize(&self, credential: &Credential) -> Result<(), FetchError> {
        match &self.required_token {
            Some(token) if token != credential.bearer_token() => {
                Err(FetchError::AuthRejected { status: 401 })
            }
            _ => Ok(()),
        }
    }

    fn next_library_id(&self) -> String {
        let next = self
            .entities
            .get(&Rank::Library)
            .into_iter()
            .flatten()
            .filter_map(|entity| entity.id.as_str().parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        next.to_string()
    }
}

#[async_trait::async_trait]
impl ContentFetcher for InMemoryContentService {
    async fn fetch_children(
        &self,
        rank: Rank,
        parent_id: Option<EntityId>,
        credential: Credential,
    ) -> Result<ChildBatch, FetchError> {
        let mut catalog = self.lock();
        catalog.calls.push(FetchCall {
            rank,
            parent_id: parent_id.clone(),
            anonymous: credential.is_anonymous(),
        });
        catalog.authorize(&credential)?;
        if let Some(err) = catalog.failures.get(&(rank, parent_id.clone())) {
            return Err(err.clone());
        }
        if let (Some(parent_rank), Some(parent_id)) = (rank.parent(), parent_id.as_ref()) {
            let parent_known = catalog
                .entities
                .get(&parent_rank)
                .is_some_and(|rows| rows.iter().any(|entity| &entity.id == parent_id));
            if !parent_known {
                return Err(FetchError::NotFound);
            }
        }
        let children: Vec<Entity> = catalog
            .entities
            .get(&rank)
            .into_iter()
            .flatten()
            .filter(|entity| entity.parent_id == parent_id)
            .cloned()
            .collect();
        Ok(children.into())
    }
}

#[async_trait::async_trait]
impl LibraryCreator for InMemoryContentService {
    async fn create_library(
        &self,
        name: LibraryName,
        credential: Credential,
    ) -> Result<CreatedLibrary, FetchError> {
        let mut catalog = self.lock();
        catalog.authorize(&credential)?;
        if let Some(err) = &catalog.create_failure {
            return Err(err.clone());
        }
        let id = EntityId::new(catalog.next_library_id())
            .map_err(|e| FetchError::malformed(format!("library id: {e}")))?;
        let entity = Entity::v1(id, name.as_str().to_string(), None)
            .map_err(|e| FetchError::malformed(format!("library row: {e}")))?;
        catalog
            .entities
            .entry(Rank::Library)
            .or_default()
            .push(entity.clone());
        let echoed = catalog.echo_created.then_some(entity);
        CreatedLibrary::v1(name, echoed).map_err(|e| FetchError::malformed(e.to_string()))
    }
}

fn fixture_entity(
    id: &str,
    label: &str,
    parent: Option<&str>,
) -> Result<Entity, folio_kernel_contracts::ContractViolation> {
    let parent_id = parent.map(EntityId::new).transpose()?;
    Entity::v1(EntityId::new(id)?, label.to_string(), parent_id)
}
