//! Shared types for the API layer.

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::api::error::ApiError;
use crate::authorization::{Actor, Permission};
use crate::core_state::CoreState;

type Clock = dyn Fn() -> NaiveDateTime + Send + Sync;

/// Shared context for all API routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
    clock: Arc<Clock>,
}

impl ApiContext {
    /// Context using local wall-clock time, which is what ward staff see.
    pub fn new(core: Arc<CoreState>) -> Self {
        Self::with_clock(core, || chrono::Local::now().naive_local())
    }

    pub fn with_clock(
        core: Arc<CoreState>,
        clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static,
    ) -> Self {
        Self {
            core,
            clock: Arc::new(clock),
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    /// Fails with 403 unless the policy grants `permission` to the caller.
    pub fn require(&self, actor: &ActorContext, permission: Permission) -> Result<(), ApiError> {
        if self.core.is_permitted(&actor.0, permission) {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

/// Authenticated caller, injected into request extensions by the auth middleware.
#[derive(Debug, Clone)]
pub struct ActorContext(pub Actor);

impl ActorContext {
    pub fn id(&self) -> &str {
        &self.0.id
    }
}
