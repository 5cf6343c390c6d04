//! Thin wrapper over a `sqlx::PgPool`. Does not itself define any query -
//! those live as free functions in [`crate::ops`], generic over
//! `sqlx::Executor` so they run unchanged against the pool or against an
//! open transaction. `Store` just owns the pool and hands out transactions.
use sqlx::{PgPool, Postgres, Transaction};

use crate::{config::PoolConfig, error::JobError};

#[derive(Debug, Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &PoolConfig) -> Result<Self, JobError> {
        Ok(Self::new(config.connect().await?))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Every multi-row write during a close operation runs inside one
    /// transaction obtained here; on drop without `commit()`, or on any
    /// propagated error, Postgres rolls it back and no state is observable.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, JobError> {
        Ok(self.pool.begin().await?)
    }

    pub async fn run_migrations(&self) -> Result<(), JobError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| JobError::Storage(sqlx::Error::Migrate(Box::new(e))))
    }
}
