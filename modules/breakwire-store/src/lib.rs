//! Postgres persistence for breakwire. One `Store` handle, cloneable,
//! with entity-focused impl blocks split across modules. Typed domain
//! values (EntitySet, embeddings) serialize to JSONB at this edge only.

pub mod cache;
pub mod canonical;
pub mod ledger;
pub mod snapshots;
pub mod stories;
pub mod submissions;
pub mod users;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;

pub use cache::ReadCache;

const SCHEMA_SQL: &str = include_str!("../schema.sql");

/// Transactional store over Story / CanonicalEvent / Submission /
/// ViralitySnapshot / KudosLedgerEntry / User.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the schema. Every statement is idempotent.
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA_SQL.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Store schema ensured");
        Ok(())
    }

    /// Begin a transaction. Settlement and weekly reset run entirely
    /// inside one of these.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }
}
