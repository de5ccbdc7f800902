#![forbid(unsafe_code)]

use std::env;
use std::sync::RwLock;

use folio_kernel_contracts::hierarchy::Credential;
use folio_kernel_contracts::ContractViolation;

pub const ANONYMOUS_FALLBACK_TOKEN_DEFAULT: &str = "dummy-token-123";

/// Source of the signed-in user's bearer token. `None` means signed out.
pub trait SessionProvider: Send + Sync {
    fn current_token(&self) -> Option<String>;
}

#[derive(Debug, Default)]
pub struct SessionTokenStore {
    token: RwLock<Option<String>>,
}

impl SessionTokenStore {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    pub fn from_env() -> Self {
        match env::var("FOLIO_AUTH_TOKEN") {
            Ok(token) if !token.trim().is_empty() => Self::with_token(token.trim()),
            _ => Self::signed_out(),
        }
    }

    pub fn set_token(&self, token: impl Into<String>) {
        match self.token.write() {
            Ok(mut guard) => *guard = Some(token.into()),
            Err(poisoned) => *poisoned.into_inner() = Some(token.into()),
        }
    }

    pub fn clear(&self) {
        match self.token.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

impl SessionProvider for SessionTokenStore {
    fn current_token(&self) -> Option<String> {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPolicy {
    anonymous: Credential,
}

impl CredentialPolicy {
    pub fn mvp_v1() -> Self {
        Self {
            anonymous: Credential::Anonymous(ANONYMOUS_FALLBACK_TOKEN_DEFAULT.to_string()),
        }
    }

    pub fn with_anonymous_token(token: &str) -> Result<Self, ContractViolation> {
        Ok(Self {
            anonymous: Credential::anonymous(token.trim())?,
        })
    }

    pub fn from_env() -> Result<Self, ContractViolation> {
        match env::var("FOLIO_ANONYMOUS_TOKEN") {
            Ok(token) if !token.trim().is_empty() => Self::with_anonymous_token(&token),
            _ => Ok(Self::mvp_v1()),
        }
    }

    pub fn anonymous(&self) -> &Credential {
        &self.anonymous
    }
}

/// Signed-in sessions present their token; everyone else presents the
/// anonymous fallback. A session token that fails validation is treated as
/// signed out.
pub fn resolve_credential(provider: &dyn SessionProvider, policy: &CredentialPolicy) -> Credential {
    let Some(token) = provider.current_token() else {
        return policy.anonymous().clone();
    };
    match Credential::authenticated(token) {
        Ok(credential) => credential,
        Err(err) => {
            tracing::warn!(error = %err, "session token rejected; using anonymous credential");
            policy.anonymous().clone()
        }
    }
}
