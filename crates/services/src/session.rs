use std::sync::{Arc, PoisonError, RwLock};

use progress_core::model::{Scope, UserId};

/// Active identity for the running session.
///
/// Set on sign-in, cleared on sign-out. Clones share the same state.
#[derive(Clone, Default)]
pub struct SessionState {
    scope: Arc<RwLock<Scope>>,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_scope(scope: Scope) -> Self {
        Self {
            scope: Arc::new(RwLock::new(scope)),
        }
    }

    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_identified(&self, user: UserId) {
        *self.scope.write().unwrap_or_else(PoisonError::into_inner) = Scope::Identified(user);
    }

    pub fn clear(&self) {
        *self.scope.write().unwrap_or_else(PoisonError::into_inner) = Scope::Anonymous;
    }
}
