//! Shared application state for the Axum server.
//!
//! Dual-backed: a real `PgPool` in production, or an in-memory store
//! (guarded by the same compare-and-swap discipline over a
//! `tokio::sync::RwLock`) for unit and e2e tests that don't need a live
//! database. Every handler branches on which backend is present, mirroring
//! the teacher's `pool: Option<PgPool>` shape.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::config::ApiConfig;
use crate::db::commands::CommandRow;
use crate::db::descent_checks::DescentCheckRow;
use crate::db::devices::DeviceRow;
use crate::db::dives::DiveRow;
use crate::db::event_log::EventLogRow;
use crate::db::heartbeats::HeartbeatRow;

/// In-memory mirror of the six tables, reusing the same row types the
/// Postgres backend returns so the route/core layer never has to care
/// which backend answered.
#[derive(Default)]
pub struct MemoryStore {
    pub devices: HashMap<String, DeviceRow>,
    pub heartbeats: Vec<HeartbeatRow>,
    pub commands: Vec<CommandRow>,
    pub descent_checks: Vec<DescentCheckRow>,
    pub dives: Vec<DiveRow>,
    pub event_log: Vec<EventLogRow>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pool: Option<PgPool>,
    pub memory: Option<Arc<RwLock<MemoryStore>>>,
}

impl AppState {
    /// Production constructor: connects to Postgres and runs migrations.
    pub async fn connect(config: ApiConfig) -> Result<Self, sqlx::Error> {
        let database_url = config
            .database_url
            .clone()
            .expect("connect() requires DATABASE_URL to be set");
        let pool = crate::db::connect(&database_url, config.db_pool_size).await?;
        Ok(Self {
            config,
            pool: Some(pool),
            memory: None,
        })
    }

    /// Test/dev constructor: no database, everything lives in the process.
    pub fn in_memory(config: ApiConfig) -> Self {
        Self {
            config,
            pool: None,
            memory: Some(Arc::new(RwLock::new(MemoryStore::default()))),
        }
    }

    pub fn is_memory_backed(&self) -> bool {
        self.pool.is_none()
    }
}
