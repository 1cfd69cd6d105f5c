use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use breakwire_common::{BreakwireError, UserReputation};

use crate::Store;

#[derive(FromRow)]
struct ReputationRow {
    id: Uuid,
    total_kudos: i64,
    weekly_kudos: i64,
    all_time_rank: Option<i32>,
    weekly_rank: Option<i32>,
}

impl ReputationRow {
    fn into_reputation(self) -> UserReputation {
        UserReputation {
            user_id: self.id,
            total_kudos: self.total_kudos,
            weekly_kudos: self.weekly_kudos,
            all_time_rank: self.all_time_rank,
            weekly_rank: self.weekly_rank,
        }
    }
}

fn db_err(e: sqlx::Error) -> BreakwireError {
    BreakwireError::Database(e.to_string())
}

impl Store {
    /// Create the user row if it does not exist yet.
    pub async fn ensure_user(&self, user_id: Uuid) -> Result<(), BreakwireError> {
        sqlx::query("INSERT INTO users (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Move a user's running totals. Runs inside the same transaction as
    /// the matching ledger append.
    pub async fn credit_kudos(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        amount: i64,
    ) -> Result<(), BreakwireError> {
        let result = sqlx::query(
            "UPDATE users
             SET total_kudos = total_kudos + $2, weekly_kudos = weekly_kudos + $2
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(amount)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(BreakwireError::not_found("user", user_id));
        }
        Ok(())
    }

    pub async fn reputation(&self, user_id: Uuid) -> Result<UserReputation, BreakwireError> {
        let row = sqlx::query_as::<_, ReputationRow>(
            "SELECT id, total_kudos, weekly_kudos, all_time_rank, weekly_rank
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(ReputationRow::into_reputation)
            .ok_or_else(|| BreakwireError::not_found("user", user_id))
    }

    /// Every user's reputation fields, for the full rank recompute.
    pub async fn all_reputations(&self) -> Result<Vec<UserReputation>, BreakwireError> {
        let rows = sqlx::query_as::<_, ReputationRow>(
            "SELECT id, total_kudos, weekly_kudos, all_time_rank, weekly_rank FROM users",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(ReputationRow::into_reputation).collect())
    }

    /// Overwrite derived rank fields. Rank state is never authoritative,
    /// so a redundant rewrite of identical values is harmless.
    pub async fn write_ranks(
        &self,
        ranks: &[(Uuid, Option<i32>, Option<i32>)],
    ) -> Result<(), BreakwireError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for (user_id, all_time_rank, weekly_rank) in ranks {
            sqlx::query("UPDATE users SET all_time_rank = $2, weekly_rank = $3 WHERE id = $1")
                .bind(user_id)
                .bind(all_time_rank)
                .bind(weekly_rank)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    /// Users holding nonzero weekly kudos, locked for the weekly reset.
    pub async fn users_with_weekly_kudos(
        &self,
        conn: &mut PgConnection,
    ) -> Result<Vec<UserReputation>, BreakwireError> {
        let rows = sqlx::query_as::<_, ReputationRow>(
            "SELECT id, total_kudos, weekly_kudos, all_time_rank, weekly_rank
             FROM users WHERE weekly_kudos <> 0 FOR UPDATE",
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(ReputationRow::into_reputation).collect())
    }

    /// Zero one user's weekly kudos and rank. Total kudos untouched.
    pub async fn zero_weekly_kudos(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<(), BreakwireError> {
        sqlx::query("UPDATE users SET weekly_kudos = 0, weekly_rank = NULL WHERE id = $1")
            .bind(user_id)
            .execute(&mut *conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Weekly leaderboard page: nonzero weekly kudos, best first.
    pub async fn weekly_leaderboard(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UserReputation>, BreakwireError> {
        let rows = sqlx::query_as::<_, ReputationRow>(
            "SELECT id, total_kudos, weekly_kudos, all_time_rank, weekly_rank
             FROM users
             WHERE weekly_kudos > 0
             ORDER BY weekly_kudos DESC, id ASC
             LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(ReputationRow::into_reputation).collect())
    }

    pub async fn all_time_leaderboard(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UserReputation>, BreakwireError> {
        let rows = sqlx::query_as::<_, ReputationRow>(
            "SELECT id, total_kudos, weekly_kudos, all_time_rank, weekly_rank
             FROM users
             ORDER BY total_kudos DESC, id ASC
             LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(ReputationRow::into_reputation).collect())
    }
}
