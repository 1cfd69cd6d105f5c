use sqlx::PgConnection;
use uuid::Uuid;

use breakwire_common::{BreakwireError, KudosLedgerEntry};

use crate::Store;

fn db_err(e: sqlx::Error) -> BreakwireError {
    BreakwireError::Database(e.to_string())
}

impl Store {
    /// Append a ledger line. Always called inside the transaction that
    /// also moves the user's running total, so the reconciliation
    /// invariant (sum of entries == total) holds at every commit point.
    pub async fn append_ledger_entry(
        &self,
        conn: &mut PgConnection,
        entry: &KudosLedgerEntry,
    ) -> Result<(), BreakwireError> {
        sqlx::query(
            r#"
            INSERT INTO kudos_ledger (id, user_id, amount, reason, story_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.amount)
        .bind(entry.reason.to_string())
        .bind(entry.story_id)
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Signed sum of all ledger lines for a user. Must equal the user's
    /// `total_kudos` field; exposed for the reconciliation check.
    pub async fn ledger_sum_for_user(&self, user_id: Uuid) -> Result<i64, BreakwireError> {
        let sum: Option<i64> =
            sqlx::query_scalar("SELECT SUM(amount)::BIGINT FROM kudos_ledger WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(sum.unwrap_or(0))
    }

    /// Ledger entry count for a story, for audit endpoints and tests.
    pub async fn ledger_count_for_story(&self, story_id: Uuid) -> Result<i64, BreakwireError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM kudos_ledger WHERE story_id = $1")
                .bind(story_id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(count)
    }
}
