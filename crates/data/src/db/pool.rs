use std::ops::Deref;
use std::time::Duration;

use diesel::r2d2::{self, ConnectionManager, State};
use thiserror::Error;

#[cfg(feature = "postgres")]
pub type DbConn = diesel::pg::PgConnection;
#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
pub type DbConn = diesel::sqlite::SqliteConnection;

pub type Pool = r2d2::Pool<ConnectionManager<DbConn>>;
pub type PooledConn = r2d2::PooledConnection<ConnectionManager<DbConn>>;

/// Thin wrapper over an r2d2-pooled `diesel` connection pool, bounding the
/// number of open connections against the backing store.
#[derive(Clone)]
pub struct DieselPool {
    inner: Pool,
}

impl DieselPool {
    pub fn new(database_url: &str, pool_size: u32, min_idle: Option<u32>, connection_timeout_ms: u64) -> Result<Self, PoolError> {
        let manager = ConnectionManager::<DbConn>::new(database_url);
        let inner = r2d2::Pool::builder()
            .max_size(pool_size)
            .min_idle(min_idle)
            .connection_timeout(Duration::from_millis(connection_timeout_ms))
            .build(manager)?;
        Ok(Self { inner })
    }

    pub fn get(&self) -> Result<PooledConn, PoolError> {
        Ok(self.inner.get()?)
    }

    pub fn state(&self) -> State {
        self.inner.state()
    }
}

impl Deref for DieselPool {
    type Target = Pool;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error(transparent)]
    R2D2(#[from] r2d2::PoolError),
    #[error(transparent)]
    Build(#[from] r2d2::Error),
}
