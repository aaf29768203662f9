//! Shared application state for the HTTP layer.
//!
//! Holds no connection: each request opens its own through `open_db`, so a
//! `Connection` never crosses a task boundary.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::authorization::{AccessPolicy, Actor, Permission, RolePolicy};
use crate::config::AppConfig;
use crate::db;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Cannot create data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub struct CoreState {
    db_path: PathBuf,
    policy: Arc<dyn AccessPolicy>,
}

impl CoreState {
    pub fn new(db_path: impl Into<PathBuf>, policy: Arc<dyn AccessPolicy>) -> Self {
        Self {
            db_path: db_path.into(),
            policy,
        }
    }

    /// State for a configured deployment: creates the data directory,
    /// migrates the database once, and uses the default role table.
    pub fn from_config(config: &AppConfig) -> Result<Self, CoreError> {
        std::fs::create_dir_all(&config.data_dir).map_err(|source| CoreError::DataDir {
            path: config.data_dir.clone(),
            source,
        })?;
        let state = Self::new(config.database_path(), Arc::new(RolePolicy::default()));
        state.open_db()?;
        tracing::info!(db_path = %state.db_path.display(), "Database ready");
        Ok(state)
    }

    /// Open a connection with migrations applied.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        Ok(db::open_database(&self.db_path)?)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn is_permitted(&self, actor: &Actor, permission: Permission) -> bool {
        self.policy.is_permitted(actor, permission)
    }
}
