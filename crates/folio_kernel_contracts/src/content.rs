#![forbid(unsafe_code)]

use crate::hierarchy::{Entity, LibraryName};
use crate::{ContractViolation, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchFailureKind {
    Network,
    AuthRejected,
    NotFound,
    Malformed,
}

impl FetchFailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchFailureKind::Network => "network",
            FetchFailureKind::AuthRejected => "auth_rejected",
            FetchFailureKind::NotFound => "not_found",
            FetchFailureKind::Malformed => "malformed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("content service unreachable: {detail}")]
    Network { detail: String },
    #[error("credential rejected by content service (http {status})")]
    AuthRejected { status: u16 },
    #[error("parent entity not found")]
    NotFound,
    #[error("malformed content payload: {detail}")]
    Malformed { detail: String },
}

impl FetchError {
    pub fn network(detail: impl Into<String>) -> Self {
        FetchError::Network {
            detail: bounded_detail(detail.into()),
        }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        FetchError::Malformed {
            detail: bounded_detail(detail.into()),
        }
    }

    pub fn kind(&self) -> FetchFailureKind {
        match self {
            FetchError::Network { .. } => FetchFailureKind::Network,
            FetchError::AuthRejected { .. } => FetchFailureKind::AuthRejected,
            FetchError::NotFound => FetchFailureKind::NotFound,
            FetchError::Malformed { .. } => FetchFailureKind::Malformed,
        }
    }
}

fn bounded_detail(detail: String) -> String {
    if detail.len() > 256 {
        detail.chars().take(256).collect()
    } else {
        detail
    }
}

/// Rows decoded from one children listing. `skipped_rows` counts rows the
/// service sent that could not be decoded into an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildBatch {
    pub entities: Vec<Entity>,
    pub skipped_rows: usize,
}

impl From<Vec<Entity>> for ChildBatch {
    fn from(entities: Vec<Entity>) -> Self {
        Self {
            entities,
            skipped_rows: 0,
        }
    }
}

/// Result of a library create call. The service may or may not echo the stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedLibrary {
    pub name: LibraryName,
    pub entity: Option<Entity>,
}

impl CreatedLibrary {
    pub fn v1(name: LibraryName, entity: Option<Entity>) -> Result<Self, ContractViolation> {
        let created = Self { name, entity };
        created.validate()?;
        Ok(created)
    }
}

impl Validate for CreatedLibrary {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.name.validate()?;
        if let Some(entity) = &self.entity {
            entity.validate()?;
            if entity.parent_id.is_some() {
                return Err(ContractViolation::InvalidValue {
                    field: "created_library.entity.parent_id",
                    reason: "root entities carry no parent",
                });
            }
        }
        Ok(())
    }
}
