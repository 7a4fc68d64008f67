//! 데이터베이스 연결 풀 관리 모듈.
//!
//! The pool is built lazily from the data-source descriptor, bounded from
//! settings, and only handed out after a live connection has been made
//! within [`HEALTH_CHECK_TIMEOUT`].

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, PoisonError,
};
use std::task::Poll;
use std::time::{Duration, Instant};

use serde::Serialize;
use sqlx::{
    any::{install_default_drivers, AnyPoolOptions},
    pool::PoolConnection,
    Any, AnyPool, Connection,
};
use thiserror::Error;
use tracing::{debug, info};

use super::settings::DatabaseSettings;
use crate::constants::{HEALTH_CHECK_TIMEOUT, UNBOUNDED_MAX_CONNECTIONS};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid data source descriptor: {0}")]
    Descriptor(#[source] sqlx::Error),

    #[error("database health check failed: {0}")]
    HealthCheck(#[source] sqlx::Error),

    #[error("database health check timed out after {0:?}")]
    HealthCheckTimeout(Duration),
}

/// Point-in-time pool statistics. A `max_open_connections` of 0 means
/// unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub max_open_connections: u32,
    pub open_connections: u32,
    pub in_use: u32,
    pub idle: u32,
    pub wait_count: u64,
    pub wait_duration_ms: u64,
    pub max_idle_closed: u64,
}

#[derive(Debug, Default)]
struct PoolCounters {
    wait_count: AtomicU64,
    wait_duration_us: AtomicU64,
    max_idle_closed: AtomicU64,
}

impl PoolCounters {
    fn record_wait(&self, waited: Duration) {
        self.wait_count.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(waited.as_micros()).unwrap_or(u64::MAX);
        self.wait_duration_us.fetch_add(micros, Ordering::Relaxed);
    }
}

/// Lets the release hook see the pool it belongs to.
type PoolSlot = Arc<Mutex<Option<AnyPool>>>;

/// The slot holds a pool clone inside the pool's own hook. Emptying it when
/// the last [`Database`] handle drops (or on close) lets the pool go away.
struct SlotRelease(PoolSlot);

impl SlotRelease {
    fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Shared, bounded, health-checked connection pool.
#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
    max_open: u32,
    counters: Arc<PoolCounters>,
    slot: Arc<SlotRelease>,
}

impl Database {
    /// Builds the pool from `settings` and verifies it can reach the store.
    ///
    /// No connection is attempted until the descriptor has been validated and
    /// the bounds applied. If the health check errors or exceeds
    /// [`HEALTH_CHECK_TIMEOUT`], the pool is closed and dropped.
    pub async fn open(settings: &DatabaseSettings) -> Result<Self, PoolError> {
        install_default_drivers();

        let max_open = settings.max_open_conns;
        let max_idle = effective_max_idle(max_open, settings.max_idle_conns);
        let counters = Arc::new(PoolCounters::default());
        let slot: PoolSlot = Arc::new(Mutex::new(None));

        let hook_slot = Arc::clone(&slot);
        let hook_counters = Arc::clone(&counters);
        let pool = AnyPoolOptions::new()
            .max_connections(if max_open == 0 {
                UNBOUNDED_MAX_CONNECTIONS
            } else {
                max_open
            })
            .min_connections(0)
            .idle_timeout((!settings.max_idle_time.is_zero()).then_some(settings.max_idle_time))
            .max_lifetime(None)
            .test_before_acquire(false)
            .after_release(move |_conn, _meta| {
                let keep = max_idle == 0 || idle_below(&hook_slot, max_idle);
                if !keep {
                    hook_counters.max_idle_closed.fetch_add(1, Ordering::Relaxed);
                }
                Box::pin(async move { Ok(keep) })
            })
            .connect_lazy(&settings.dsn)
            .map_err(PoolError::Descriptor)?;

        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(pool.clone());

        let database = Self {
            pool,
            max_open,
            counters,
            slot: Arc::new(SlotRelease(slot)),
        };

        if let Err(e) = database.health_check().await {
            database.close().await;
            return Err(e);
        }

        info!(
            max_open_conns = max_open,
            max_idle_conns = max_idle,
            max_idle_time = ?settings.max_idle_time,
            "Database pool initialized"
        );
        Ok(database)
    }

    async fn health_check(&self) -> Result<(), PoolError> {
        let ping = async {
            let mut conn = self.pool.acquire().await?;
            conn.ping().await?;
            drop(conn);
            self.settle().await;
            Ok::<(), sqlx::Error>(())
        };

        match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, ping).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(PoolError::HealthCheck(e)),
            Err(_) => Err(PoolError::HealthCheckTimeout(HEALTH_CHECK_TIMEOUT)),
        }
    }

    /// Returned connections go back on a spawned task. Waits until every
    /// open connection is idle again.
    async fn settle(&self) {
        while self.pool.num_idle() < self.pool.size() as usize {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Borrows a connection, waiting while the pool is at its bound.
    ///
    /// A borrow counts as a wait when it cannot complete on the first poll
    /// and is not opening a new connection of its own.
    /// Callers impose their own deadline, e.g. with `tokio::time::timeout`.
    pub async fn acquire(&self) -> Result<PoolConnection<Any>, sqlx::Error> {
        let started = Instant::now();
        let size_before = self.pool.size();

        let acquire = self.pool.acquire();
        tokio::pin!(acquire);
        if let Poll::Ready(conn) = futures::poll!(&mut acquire) {
            return conn;
        }
        let opening = self.pool.size() > size_before;

        let conn = acquire.await;
        if !opening {
            self.counters.record_wait(started.elapsed());
        }
        conn
    }

    /// The underlying pool, for running queries directly.
    pub const fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn stats(&self) -> PoolStats {
        let open = self.pool.size();
        let idle = u32::try_from(self.pool.num_idle()).unwrap_or(u32::MAX);
        PoolStats {
            max_open_connections: self.max_open,
            open_connections: open,
            in_use: open.saturating_sub(idle),
            idle,
            wait_count: self.counters.wait_count.load(Ordering::Relaxed),
            wait_duration_ms: self.counters.wait_duration_us.load(Ordering::Relaxed) / 1000,
            max_idle_closed: self.counters.max_idle_closed.load(Ordering::Relaxed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Closes every connection and waits for borrowed ones to be returned.
    pub async fn close(&self) {
        self.slot.clear();
        self.pool.close().await;
        info!("Database pool closed");
    }
}

/// Idle connections can never exceed open ones.
const fn effective_max_idle(max_open: u32, max_idle: u32) -> u32 {
    if max_open > 0 && (max_idle == 0 || max_idle > max_open) {
        max_open
    } else {
        max_idle
    }
}

fn idle_below(slot: &PoolSlot, max_idle: u32) -> bool {
    let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
    guard.as_ref().is_none_or(|pool| {
        let idle = pool.num_idle();
        debug!(idle, max_idle, "Returning connection to pool");
        idle < max_idle as usize
    })
}
