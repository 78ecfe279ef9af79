//! Relational backend plumbing: connection pooling and embedded migrations.
//!
//! Exactly one of the `postgres` or `sqlite` Cargo features selects the
//! concrete `diesel` backend compiled into [`DbConn`]; `HISHTORY_POSTGRES_DB`
//! or `HISHTORY_SQLITE_DB` then selects which DSN the pool connects to at
//! runtime.

pub mod pool;

use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

pub use pool::{DbConn, DieselPool, PoolError};

#[cfg(feature = "postgres")]
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/postgres");

#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/sqlite");

pub fn migrate(pool: &DieselPool) -> anyhow::Result<()> {
    let mut conn = pool.get()?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("failed to run migrations: {e}"))?;
    Ok(())
}
