//! Data access bound to the shared connection pool

use crate::config::{Database, PoolStats};

/// Entry point for persistence. Every model shares the same pool.
#[derive(Clone)]
pub struct Models {
    db: Database,
}

impl Models {
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    pub const fn db(&self) -> &Database {
        &self.db
    }

    /// Round-trips a trivial query through the pool.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(self.db.pool()).await?;
        Ok(())
    }

    #[allow(dead_code)]
    pub fn pool_stats(&self) -> PoolStats {
        self.db.stats()
    }
}
