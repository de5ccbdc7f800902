#![forbid(unsafe_code)]

use std::fmt;

use crate::common::{validate_text, validate_token};
use crate::{ContractViolation, Validate};

pub const RANK_COUNT: usize = 7;
pub const ENTITY_ID_MAX_LEN: usize = 128;
pub const ENTITY_LABEL_MAX_LEN: usize = 4_096;
pub const LIBRARY_NAME_MAX_LEN: usize = 128;
pub const CREDENTIAL_TOKEN_MAX_LEN: usize = 4_096;

/// A tier of the content hierarchy. `Library` is the root list, `Action` the leaf.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    Library,
    Book,
    Section,
    Chapter,
    Act,
    ParentAction,
    Action,
}

impl Rank {
    pub const ALL: [Rank; RANK_COUNT] = [
        Rank::Library,
        Rank::Book,
        Rank::Section,
        Rank::Chapter,
        Rank::Act,
        Rank::ParentAction,
        Rank::Action,
    ];

    pub fn index(self) -> usize {
        match self {
            Rank::Library => 0,
            Rank::Book => 1,
            Rank::Section => 2,
            Rank::Chapter => 3,
            Rank::Act => 4,
            Rank::ParentAction => 5,
            Rank::Action => 6,
        }
    }

    pub fn from_index(index: usize) -> Option<Rank> {
        Rank::ALL.get(index).copied()
    }

    pub fn is_root(self) -> bool {
        matches!(self, Rank::Library)
    }

    pub fn child(self) -> Option<Rank> {
        Rank::from_index(self.index() + 1)
    }

    pub fn parent(self) -> Option<Rank> {
        self.index().checked_sub(1).and_then(Rank::from_index)
    }

    /// Ranks strictly deeper than `self`, shallowest first.
    pub fn deeper(self) -> impl Iterator<Item = Rank> {
        Rank::ALL.into_iter().skip(self.index() + 1)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rank::Library => "library",
            Rank::Book => "book",
            Rank::Section => "section",
            Rank::Chapter => "chapter",
            Rank::Act => "act",
            Rank::ParentAction => "parent-action",
            Rank::Action => "action",
        }
    }

    /// Wire field holding the display label for entities of this rank.
    pub fn label_field(self) -> &'static str {
        match self {
            Rank::Library => "library_name",
            Rank::Book => "book_title",
            Rank::Section | Rank::Chapter | Rank::Act | Rank::ParentAction => "name",
            Rank::Action => "description",
        }
    }

    /// Wire field back-referencing the parent entity. The root rank has none.
    pub fn parent_field(self) -> Option<&'static str> {
        match self {
            Rank::Library => None,
            Rank::Book => Some("library_id"),
            Rank::Section => Some("book_id"),
            Rank::Chapter => Some("section_id"),
            Rank::Act => Some("chapter_id"),
            Rank::ParentAction => Some("act_id"),
            Rank::Action => Some("parent_action_id"),
        }
    }

    /// Accepts a numeric rank (`0`..`6`) or a rank name (`parent-action`, `parent_action`).
    pub fn parse(raw: &str) -> Option<Rank> {
        let trimmed = raw.trim();
        if let Ok(index) = trimmed.parse::<usize>() {
            return Rank::from_index(index);
        }
        let normalized = trimmed.to_ascii_lowercase().replace('_', "-");
        Rank::ALL
            .into_iter()
            .find(|rank| rank.as_str() == normalized)
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque service-assigned identifier. Numeric ids are carried as their decimal text.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(raw: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = Self(raw.into());
        id.validate()?;
        Ok(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for EntityId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_token("entity_id", &self.0, ENTITY_ID_MAX_LEN)?;
        // Ids become URL path segments; a dot segment would be normalized away.
        if matches!(self.0.as_str(), "." | "..") {
            return Err(ContractViolation::InvalidValue {
                field: "entity_id",
                reason: "must not be a dot segment",
            });
        }
        Ok(())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub label: String,
    pub parent_id: Option<EntityId>,
}

impl Entity {
    pub fn v1(
        id: EntityId,
        label: String,
        parent_id: Option<EntityId>,
    ) -> Result<Self, ContractViolation> {
        let entity = Self {
            id,
            label,
            parent_id,
        };
        entity.validate()?;
        Ok(entity)
    }

    pub fn is_child_of(&self, parent_id: &EntityId) -> bool {
        self.parent_id.as_ref() == Some(parent_id)
    }
}

impl Validate for Entity {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.id.validate()?;
        if self.label.len() > ENTITY_LABEL_MAX_LEN {
            return Err(ContractViolation::InvalidValue {
                field: "entity.label",
                reason: "exceeds max length",
            });
        }
        if let Some(parent_id) = &self.parent_id {
            parent_id.validate()?;
        }
        Ok(())
    }
}

/// Bearer credential presented to the content service.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Authenticated(String),
    Anonymous(String),
}

impl Credential {
    pub fn authenticated(token: impl Into<String>) -> Result<Self, ContractViolation> {
        let credential = Credential::Authenticated(token.into());
        credential.validate()?;
        Ok(credential)
    }

    pub fn anonymous(token: impl Into<String>) -> Result<Self, ContractViolation> {
        let credential = Credential::Anonymous(token.into());
        credential.validate()?;
        Ok(credential)
    }

    pub fn bearer_token(&self) -> &str {
        match self {
            Credential::Authenticated(token) | Credential::Anonymous(token) => token,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Credential::Anonymous(_))
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Credential::Authenticated(_) => "authenticated",
            Credential::Anonymous(_) => "anonymous",
        }
    }
}

impl Validate for Credential {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_token(
            "credential.bearer_token",
            self.bearer_token(),
            CREDENTIAL_TOKEN_MAX_LEN,
        )
    }
}

// Tokens never reach logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential::{}(<redacted>)", self.kind_label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct LibraryName(String);

impl LibraryName {
    pub fn new(raw: &str) -> Result<Self, ContractViolation> {
        let name = Self(raw.trim().to_string());
        name.validate()?;
        Ok(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for LibraryName {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("library_name", &self.0, LIBRARY_NAME_MAX_LEN)
    }
}
