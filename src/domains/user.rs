use crate::error::{LifehubError, Result};

/// Caller identity passed explicitly into every service call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserContext {
    user_id: Option<String>,
}

impl UserContext {
    pub fn authenticated(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let user_id = (!user_id.trim().is_empty()).then_some(user_id);
        Self { user_id }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn from_optional(user_id: Option<String>) -> Self {
        user_id.map(Self::authenticated).unwrap_or_default()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// The identity, or `NotAuthenticated` before any query is issued.
    pub fn require(&self) -> Result<&str> {
        self.user_id.as_deref().ok_or(LifehubError::NotAuthenticated)
    }
}
