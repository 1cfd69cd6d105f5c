use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use breakwire_common::{BreakwireError, Submission};

use crate::Store;

#[derive(FromRow)]
struct SubmissionRow {
    id: Uuid,
    user_id: Uuid,
    story_id: Uuid,
    submitted_at: DateTime<Utc>,
    is_original_discoverer: bool,
    kudos_earned: Option<i64>,
}

impl SubmissionRow {
    fn into_submission(self) -> Submission {
        Submission {
            id: self.id,
            user_id: self.user_id,
            story_id: self.story_id,
            submitted_at: self.submitted_at,
            is_original_discoverer: self.is_original_discoverer,
            kudos_earned: self.kudos_earned,
        }
    }
}

fn db_err(e: sqlx::Error) -> BreakwireError {
    BreakwireError::Database(e.to_string())
}

/// True when the error is a unique-constraint violation (Postgres 23505).
fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

impl Store {
    /// Record a discovery. A second submission by the same user on the
    /// same story surfaces as a conflict outcome, not an error path.
    pub async fn insert_submission(
        &self,
        submission: &Submission,
    ) -> Result<(), BreakwireError> {
        let result = sqlx::query(
            r#"
            INSERT INTO submissions
                (id, user_id, story_id, submitted_at, is_original_discoverer, kudos_earned)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(submission.id)
        .bind(submission.user_id)
        .bind(submission.story_id)
        .bind(submission.submitted_at)
        .bind(submission.is_original_discoverer)
        .bind(submission.kudos_earned)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(BreakwireError::Conflict(format!(
                "user {} already discovered story {}",
                submission.user_id, submission.story_id
            ))),
            Err(e) => Err(db_err(e)),
        }
    }

    /// All submissions for a story in ascending submission-time order —
    /// the order index and hours-since-first both depend on it.
    pub async fn submissions_for_story(
        &self,
        conn: &mut PgConnection,
        story_id: Uuid,
    ) -> Result<Vec<Submission>, BreakwireError> {
        let rows = sqlx::query_as::<_, SubmissionRow>(
            "SELECT id, user_id, story_id, submitted_at, is_original_discoverer, kudos_earned
             FROM submissions
             WHERE story_id = $1
             ORDER BY submitted_at ASC, id ASC",
        )
        .bind(story_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(SubmissionRow::into_submission).collect())
    }

    pub async fn set_submission_kudos(
        &self,
        conn: &mut PgConnection,
        submission_id: Uuid,
        kudos: i64,
    ) -> Result<(), BreakwireError> {
        sqlx::query("UPDATE submissions SET kudos_earned = $2 WHERE id = $1")
            .bind(submission_id)
            .bind(kudos)
            .execute(&mut *conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
