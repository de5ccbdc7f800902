#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::env;

use folio_kernel_contracts::content::{ChildBatch, FetchError, FetchFailureKind};
use folio_kernel_contracts::hierarchy::{Credential, Entity, EntityId, Rank, RANK_COUNT};
use folio_kernel_contracts::{ContractViolation, ReasonCodeId, Validate};

pub mod reason_codes {
    use folio_kernel_contracts::ReasonCodeId;

    // Navigator reason-code namespace ("NV").
    pub const NAV_OK_CHILDREN_APPLIED: ReasonCodeId = ReasonCodeId(0x4E56_0001);
    pub const NAV_OK_ROOT_APPLIED: ReasonCodeId = ReasonCodeId(0x4E56_0002);

    pub const NAV_STALE_RESPONSE_DISCARDED: ReasonCodeId = ReasonCodeId(0x4E56_00E1);

    pub const NAV_FETCH_FAILED: ReasonCodeId = ReasonCodeId(0x4E56_00F1);
    pub const NAV_PAYLOAD_BUDGET_EXCEEDED: ReasonCodeId = ReasonCodeId(0x4E56_00F2);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigatorConfig {
    pub max_items_per_rank: u16,
}

impl NavigatorConfig {
    pub fn mvp_v1() -> Self {
        Self {
            max_items_per_rank: 2_048,
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::mvp_v1();
        if let Some(max) = lookup("FOLIO_MAX_ITEMS_PER_RANK")
            .and_then(|v| v.trim().parse::<u16>().ok())
            .filter(|v| (1..=10_000).contains(v))
        {
            config.max_items_per_rank = max;
        }
        config
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotStatus {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    Failed(FetchFailureKind),
}

/// Identifies one issued fetch. A result is applied only while its tag is the
/// pending tag of the target rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTag {
    pub rank: Rank,
    pub parent_id: Option<EntityId>,
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub tag: FetchTag,
    pub credential: Credential,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectPlan {
    Fetch(FetchRequest),
    Leaf { rank: Rank, id: EntityId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchApplyOutcome {
    Applied {
        rank: Rank,
        reason_code: ReasonCodeId,
        accepted: usize,
        dropped_out_of_scope: usize,
        dropped_duplicates: usize,
        dropped_invalid: usize,
        selection_cleared: bool,
    },
    Failed {
        rank: Rank,
        reason_code: ReasonCodeId,
        kind: FetchFailureKind,
    },
    DiscardedStale {
        rank: Rank,
        reason_code: ReasonCodeId,
        sequence: u64,
    },
}

impl FetchApplyOutcome {
    pub fn rank(&self) -> Rank {
        match self {
            FetchApplyOutcome::Applied { rank, .. }
            | FetchApplyOutcome::Failed { rank, .. }
            | FetchApplyOutcome::DiscardedStale { rank, .. } => *rank,
        }
    }

    pub fn reason_code(&self) -> ReasonCodeId {
        match self {
            FetchApplyOutcome::Applied { reason_code, .. }
            | FetchApplyOutcome::Failed { reason_code, .. }
            | FetchApplyOutcome::DiscardedStale { reason_code, .. } => *reason_code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NavigatorError {
    #[error("navigator has no credential; initialize first")]
    NotInitialized,
    #[error("{rank} {id} is not among the loaded {rank} items")]
    UnknownEntity { rank: Rank, id: EntityId },
    #[error("navigator state lock poisoned")]
    StatePoisoned,
    #[error(transparent)]
    Contract(#[from] ContractViolation),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RankSlot {
    items: Vec<Entity>,
    selected: Option<EntityId>,
    status: SlotStatus,
    pending: Option<FetchTag>,
}

impl RankSlot {
    fn reset(&mut self) {
        *self = RankSlot::default();
    }

    fn contains(&self, id: &EntityId) -> bool {
        self.items.iter().any(|entity| &entity.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigatorState {
    credential: Option<Credential>,
    slots: [RankSlot; RANK_COUNT],
}

impl NavigatorState {
    fn empty() -> Self {
        Self {
            credential: None,
            slots: std::array::from_fn(|_| RankSlot::default()),
        }
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn items(&self, rank: Rank) -> &[Entity] {
        &self.slot(rank).items
    }

    pub fn selected(&self, rank: Rank) -> Option<&EntityId> {
        self.slot(rank).selected.as_ref()
    }

    pub fn status(&self, rank: Rank) -> SlotStatus {
        self.slot(rank).status
    }

    pub fn pending(&self, rank: Rank) -> Option<&FetchTag> {
        self.slot(rank).pending.as_ref()
    }

    /// Last failure recorded for `rank`. Rendering treats a failed rank as empty.
    pub fn failure(&self, rank: Rank) -> Option<FetchFailureKind> {
        match self.slot(rank).status {
            SlotStatus::Failed(kind) => Some(kind),
            _ => None,
        }
    }

    /// Root rank plus every rank whose parent has a selection, stopping at the first gap.
    pub fn visible_path(&self) -> VisiblePath {
        let mut ranks = Vec::with_capacity(RANK_COUNT);
        for rank in Rank::ALL {
            let parent_selected = match rank.parent() {
                None => true,
                Some(parent) => self.selected(parent).is_some(),
            };
            if !parent_selected {
                break;
            }
            let slot = self.slot(rank);
            let presence = match slot.status {
                SlotStatus::Loading => ListPresence::Loading,
                _ if slot.items.is_empty() => ListPresence::Empty,
                _ => ListPresence::Populated,
            };
            ranks.push(RankView {
                rank,
                items: slot.items.clone(),
                selected: slot.selected.clone(),
                presence,
            });
        }
        VisiblePath { ranks }
    }

    fn slot(&self, rank: Rank) -> &RankSlot {
        &self.slots[rank.index()]
    }

    fn slot_mut(&mut self, rank: Rank) -> &mut RankSlot {
        &mut self.slots[rank.index()]
    }
}

impl Validate for NavigatorState {
    fn validate(&self) -> Result<(), ContractViolation> {
        for rank in Rank::ALL {
            let slot = self.slot(rank);
            if let Some(selected) = &slot.selected {
                if !slot.contains(selected) {
                    return Err(ContractViolation::InvalidValue {
                        field: "navigator_state.selected",
                        reason: "selection must reference a loaded item",
                    });
                }
            }

            let mut seen = BTreeSet::new();
            for entity in &slot.items {
                if !seen.insert(&entity.id) {
                    return Err(ContractViolation::InvalidValue {
                        field: "navigator_state.items",
                        reason: "item ids must be unique within a rank",
                    });
                }
            }

            if let Some(parent) = rank.parent() {
                let parent_selected = self.slot(parent).selected.as_ref();
                match parent_selected {
                    None => {
                        if !slot.items.is_empty() || slot.selected.is_some() {
                            return Err(ContractViolation::InvalidValue {
                                field: "navigator_state.items",
                                reason: "rank without a parent selection must be empty",
                            });
                        }
                        if slot.pending.is_some() {
                            return Err(ContractViolation::InvalidValue {
                                field: "navigator_state.pending",
                                reason: "rank without a parent selection must have no fetch in flight",
                            });
                        }
                    }
                    Some(parent_id) => {
                        if slot.items.iter().any(|entity| !entity.is_child_of(parent_id)) {
                            return Err(ContractViolation::InvalidValue {
                                field: "navigator_state.items",
                                reason: "items must be children of the parent selection",
                            });
                        }
                        if let Some(pending) = &slot.pending {
                            if pending.parent_id.as_ref() != Some(parent_id) {
                                return Err(ContractViolation::InvalidValue {
                                    field: "navigator_state.pending",
                                    reason: "in-flight fetch must target the parent selection",
                                });
                            }
                        }
                    }
                }
            }

            if let Some(pending) = &slot.pending {
                if pending.rank != rank {
                    return Err(ContractViolation::InvalidValue {
                        field: "navigator_state.pending",
                        reason: "fetch tag must target its own rank",
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListPresence {
    Loading,
    Empty,
    Populated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankView {
    pub rank: Rank,
    pub items: Vec<Entity>,
    pub selected: Option<EntityId>,
    pub presence: ListPresence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisiblePath {
    pub ranks: Vec<RankView>,
}

impl VisiblePath {
    pub fn view(&self, rank: Rank) -> Option<&RankView> {
        self.ranks.iter().find(|view| view.rank == rank)
    }
}

/// Owns the seven-rank selection chain. Mutations happen only through
/// `begin_initialize`, `begin_select` and `complete_fetch`.
#[derive(Debug, Clone)]
pub struct HierarchyNavigator {
    config: NavigatorConfig,
    state: NavigatorState,
    next_sequence: u64,
}

impl HierarchyNavigator {
    pub fn new(config: NavigatorConfig) -> Self {
        Self {
            config,
            state: NavigatorState::empty(),
            next_sequence: 1,
        }
    }

    pub fn state(&self) -> &NavigatorState {
        &self.state
    }

    /// Starts a root fetch. A new credential resets every rank; the same
    /// credential keeps selections until the refreshed list arrives.
    pub fn begin_initialize(&mut self, credential: Credential) -> FetchRequest {
        if self.state.credential.as_ref() != Some(&credential) {
            if self.state.credential.is_some() {
                tracing::info!(
                    credential = credential.kind_label(),
                    "credential changed; resetting all ranks"
                );
            }
            self.clear_from(Rank::Library);
            self.state.credential = Some(credential.clone());
        }
        let tag = self.issue_tag(Rank::Library, None);
        FetchRequest { tag, credential }
    }

    pub fn begin_select(&mut self, rank: Rank, id: &EntityId) -> Result<SelectPlan, NavigatorError> {
        let credential = self
            .state
            .credential
            .clone()
            .ok_or(NavigatorError::NotInitialized)?;
        if !self.state.slot(rank).contains(id) {
            return Err(NavigatorError::UnknownEntity {
                rank,
                id: id.clone(),
            });
        }

        self.state.slot_mut(rank).selected = Some(id.clone());
        self.cascade_below(rank);

        match rank.child() {
            None => Ok(SelectPlan::Leaf {
                rank,
                id: id.clone(),
            }),
            Some(child) => {
                let tag = self.issue_tag(child, Some(id.clone()));
                tracing::debug!(
                    rank = %rank,
                    id = id.as_str(),
                    child = %child,
                    sequence = tag.sequence,
                    "selection applied; child fetch issued"
                );
                Ok(SelectPlan::Fetch(FetchRequest { tag, credential }))
            }
        }
    }

    pub fn complete_fetch(
        &mut self,
        tag: &FetchTag,
        result: Result<Vec<Entity>, FetchError>,
    ) -> FetchApplyOutcome {
        self.complete_batch(tag, result.map(ChildBatch::from))
    }

    /// Applies a fetch result whose undecodable rows were already skipped by the transport.
    pub fn complete_batch(
        &mut self,
        tag: &FetchTag,
        result: Result<ChildBatch, FetchError>,
    ) -> FetchApplyOutcome {
        let rank = tag.rank;
        if self.state.slot(rank).pending.as_ref() != Some(tag) {
            tracing::debug!(
                rank = %rank,
                parent_id = tag.parent_id.as_ref().map(EntityId::as_str),
                sequence = tag.sequence,
                "discarding superseded fetch result"
            );
            return FetchApplyOutcome::DiscardedStale {
                rank,
                reason_code: reason_codes::NAV_STALE_RESPONSE_DISCARDED,
                sequence: tag.sequence,
            };
        }

        let batch = match result {
            Ok(batch) if batch.entities.len() > usize::from(self.config.max_items_per_rank) => {
                tracing::warn!(
                    rank = %rank,
                    received = batch.entities.len(),
                    max_items_per_rank = self.config.max_items_per_rank,
                    "fetch result exceeds rank budget"
                );
                return self.record_failure(
                    rank,
                    FetchFailureKind::Malformed,
                    reason_codes::NAV_PAYLOAD_BUDGET_EXCEEDED,
                );
            }
            Ok(batch) => batch,
            Err(err) => {
                tracing::warn!(
                    rank = %rank,
                    parent_id = tag.parent_id.as_ref().map(EntityId::as_str),
                    kind = err.kind().as_str(),
                    error = %err,
                    "fetch failed; rank left empty"
                );
                return self.record_failure(rank, err.kind(), reason_codes::NAV_FETCH_FAILED);
            }
        };

        let scoped = scope_children(tag.parent_id.as_ref(), batch);
        let accepted = scoped.items.len();
        let slot = self.state.slot_mut(rank);
        slot.items = scoped.items;
        slot.status = SlotStatus::Loaded;
        slot.pending = None;

        let mut selection_cleared = false;
        if let Some(selected) = slot.selected.clone() {
            if !slot.contains(&selected) {
                slot.selected = None;
                self.cascade_below(rank);
                selection_cleared = true;
            }
        }

        if scoped.dropped_out_of_scope > 0 || scoped.dropped_duplicates > 0 || scoped.dropped_invalid > 0
        {
            tracing::warn!(
                rank = %rank,
                accepted,
                dropped_out_of_scope = scoped.dropped_out_of_scope,
                dropped_duplicates = scoped.dropped_duplicates,
                dropped_invalid = scoped.dropped_invalid,
                "fetch result re-scoped"
            );
        } else {
            tracing::debug!(rank = %rank, accepted, "fetch result applied");
        }

        FetchApplyOutcome::Applied {
            rank,
            reason_code: if rank.is_root() {
                reason_codes::NAV_OK_ROOT_APPLIED
            } else {
                reason_codes::NAV_OK_CHILDREN_APPLIED
            },
            accepted,
            dropped_out_of_scope: scoped.dropped_out_of_scope,
            dropped_duplicates: scoped.dropped_duplicates,
            dropped_invalid: scoped.dropped_invalid,
            selection_cleared,
        }
    }

    pub fn visible_path(&self) -> VisiblePath {
        self.state.visible_path()
    }

    fn record_failure(
        &mut self,
        rank: Rank,
        kind: FetchFailureKind,
        reason_code: ReasonCodeId,
    ) -> FetchApplyOutcome {
        let slot = self.state.slot_mut(rank);
        slot.pending = None;
        slot.status = SlotStatus::Failed(kind);
        // A failed root refresh keeps the previous list; child ranks were already cleared.
        if !rank.is_root() {
            slot.items.clear();
        }
        FetchApplyOutcome::Failed {
            rank,
            reason_code,
            kind,
        }
    }

    fn issue_tag(&mut self, rank: Rank, parent_id: Option<EntityId>) -> FetchTag {
        let tag = FetchTag {
            rank,
            parent_id,
            sequence: self.next_sequence,
        };
        self.next_sequence = self.next_sequence.saturating_add(1);
        let slot = self.state.slot_mut(rank);
        slot.status = SlotStatus::Loading;
        slot.pending = Some(tag.clone());
        tag
    }

    fn cascade_below(&mut self, rank: Rank) {
        for deeper in rank.deeper() {
            self.state.slot_mut(deeper).reset();
        }
    }

    fn clear_from(&mut self, rank: Rank) {
        self.state.slot_mut(rank).reset();
        self.cascade_below(rank);
    }
}

struct ScopedChildren {
    items: Vec<Entity>,
    dropped_out_of_scope: usize,
    dropped_duplicates: usize,
    dropped_invalid: usize,
}

fn scope_children(parent_id: Option<&EntityId>, batch: ChildBatch) -> ScopedChildren {
    let mut out = ScopedChildren {
        items: Vec::with_capacity(batch.entities.len()),
        dropped_out_of_scope: 0,
        dropped_duplicates: 0,
        dropped_invalid: batch.skipped_rows,
    };
    let mut seen = BTreeSet::new();
    for entity in batch.entities {
        if entity.validate().is_err() {
            out.dropped_invalid += 1;
        } else if entity.parent_id.as_ref() != parent_id {
            out.dropped_out_of_scope += 1;
        } else if !seen.insert(entity.id.clone()) {
            out.dropped_duplicates += 1;
        } else {
            out.items.push(entity);
        }
    }
    out
}
