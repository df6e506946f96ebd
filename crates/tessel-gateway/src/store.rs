use std::sync::Arc;

use tracing::error;

use tessel_db::Database;

use crate::error::ChatError;

/// Async handle to the relational store.
///
/// SQLite calls block, so each one runs on the blocking pool. A slow query
/// stalls only the task awaiting it.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    pub fn new(db: Database) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub async fn call<F, T>(&self, f: F) -> Result<T, ChatError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ChatError::Persistence(anyhow::anyhow!("store task failed: {}", e))
            })?
            .map_err(ChatError::Persistence)
    }
}
