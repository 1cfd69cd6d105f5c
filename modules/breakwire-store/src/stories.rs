use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, Row};
use uuid::Uuid;

use breakwire_common::{BreakwireError, EntitySet, Story, StoryStatus, ViralityTrend};

use crate::Store;

const STORY_COLUMNS: &str = "id, title, description, source_domain, category, submitter_id, \
     status, canonical_event_id, embedding, entities, virality_score, \
     peak_virality_score, trend, kudos_pool, kudos_distributed, created_at";

/// Raw row shape; JSONB columns decode into typed values in `into_story`.
#[derive(FromRow)]
pub(crate) struct StoryRow {
    id: Uuid,
    title: String,
    description: String,
    source_domain: Option<String>,
    category: Option<String>,
    submitter_id: Uuid,
    status: String,
    canonical_event_id: Option<Uuid>,
    embedding: Option<serde_json::Value>,
    entities: serde_json::Value,
    virality_score: f64,
    peak_virality_score: f64,
    trend: String,
    kudos_pool: i64,
    kudos_distributed: bool,
    created_at: DateTime<Utc>,
}

impl StoryRow {
    pub(crate) fn into_story(self) -> Story {
        Story {
            id: self.id,
            title: self.title,
            description: self.description,
            source_domain: self.source_domain,
            category: self.category,
            submitter_id: self.submitter_id,
            status: parse_status(&self.status),
            canonical_event_id: self.canonical_event_id,
            embedding: self
                .embedding
                .and_then(|v| serde_json::from_value(v).ok()),
            entities: serde_json::from_value(self.entities).unwrap_or_default(),
            virality_score: self.virality_score,
            peak_virality_score: self.peak_virality_score,
            trend: parse_trend(&self.trend),
            kudos_pool: self.kudos_pool,
            kudos_distributed: self.kudos_distributed,
            created_at: self.created_at,
        }
    }
}

pub(crate) fn parse_status(s: &str) -> StoryStatus {
    match s {
        "active" => StoryStatus::Active,
        "settled" => StoryStatus::Settled,
        "rejected" => StoryStatus::Rejected,
        _ => StoryStatus::Pending,
    }
}

pub(crate) fn parse_trend(s: &str) -> ViralityTrend {
    match s {
        "rising" => ViralityTrend::Rising,
        "declining" => ViralityTrend::Declining,
        _ => ViralityTrend::Stable,
    }
}

fn embedding_json(embedding: &Option<Vec<f32>>) -> Option<serde_json::Value> {
    embedding.as_ref().map(|e| serde_json::json!(e))
}

fn entities_json(entities: &EntitySet) -> serde_json::Value {
    serde_json::to_value(entities).unwrap_or_else(|_| serde_json::json!({}))
}

fn db_err(e: sqlx::Error) -> BreakwireError {
    BreakwireError::Database(e.to_string())
}

impl Store {
    pub async fn insert_story(&self, story: &Story) -> Result<(), BreakwireError> {
        sqlx::query(
            r#"
            INSERT INTO stories (id, title, description, source_domain, category,
                submitter_id, status, canonical_event_id, embedding, entities,
                virality_score, peak_virality_score, trend, kudos_pool,
                kudos_distributed, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(story.id)
        .bind(&story.title)
        .bind(&story.description)
        .bind(&story.source_domain)
        .bind(&story.category)
        .bind(story.submitter_id)
        .bind(story.status.to_string())
        .bind(story.canonical_event_id)
        .bind(embedding_json(&story.embedding))
        .bind(entities_json(&story.entities))
        .bind(story.virality_score)
        .bind(story.peak_virality_score)
        .bind(story.trend.to_string())
        .bind(story.kudos_pool)
        .bind(story.kudos_distributed)
        .bind(story.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn story_by_id(&self, id: Uuid) -> Result<Story, BreakwireError> {
        let row = sqlx::query_as::<_, StoryRow>(&format!(
            "SELECT {STORY_COLUMNS} FROM stories WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(StoryRow::into_story)
            .ok_or_else(|| BreakwireError::not_found("story", id))
    }

    /// Bounded candidate set for the match scorer: active/pending stories
    /// carrying an embedding, most recent first.
    pub async fn match_candidates(&self, limit: i64) -> Result<Vec<Story>, BreakwireError> {
        let rows = sqlx::query_as::<_, StoryRow>(&format!(
            "SELECT {STORY_COLUMNS} FROM stories
             WHERE status IN ('pending', 'active') AND embedding IS NOT NULL
             ORDER BY created_at DESC
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(StoryRow::into_story).collect())
    }

    pub async fn active_stories(&self) -> Result<Vec<Story>, BreakwireError> {
        let rows = sqlx::query_as::<_, StoryRow>(&format!(
            "SELECT {STORY_COLUMNS} FROM stories WHERE status = 'active'"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(StoryRow::into_story).collect())
    }

    /// Active stories that have not yet paid out, for the settlement sweep.
    pub async fn settlement_candidates(&self) -> Result<Vec<Story>, BreakwireError> {
        let rows = sqlx::query_as::<_, StoryRow>(&format!(
            "SELECT {STORY_COLUMNS} FROM stories
             WHERE status = 'active' AND kudos_distributed = FALSE"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(StoryRow::into_story).collect())
    }

    /// Move a story through its lifecycle. Disallowed transitions are
    /// rejected here, not at call sites.
    pub async fn transition_status(
        &self,
        id: Uuid,
        next: StoryStatus,
    ) -> Result<(), BreakwireError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM stories WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;

        let current = current.ok_or_else(|| BreakwireError::not_found("story", id))?;
        let from = parse_status(&current);
        if !from.can_transition_to(next) {
            return Err(BreakwireError::IllegalTransition {
                from: from.to_string(),
                to: next.to_string(),
            });
        }

        sqlx::query("UPDATE stories SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(next.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    /// Write back a virality tick: current score, trend, and peak. The
    /// peak only ever ratchets upward, even if two sweeps overlap.
    pub async fn update_virality(
        &self,
        id: Uuid,
        score: f64,
        trend: ViralityTrend,
        peak: f64,
    ) -> Result<(), BreakwireError> {
        let result = sqlx::query(
            "UPDATE stories
             SET virality_score = $2, trend = $3,
                 peak_virality_score = GREATEST(peak_virality_score, $4)
             WHERE id = $1",
        )
        .bind(id)
        .bind(score)
        .bind(trend.to_string())
        .bind(peak)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(BreakwireError::not_found("story", id));
        }
        Ok(())
    }

    pub async fn set_canonical_event(
        &self,
        story_id: Uuid,
        event_id: Uuid,
    ) -> Result<(), BreakwireError> {
        sqlx::query("UPDATE stories SET canonical_event_id = $2 WHERE id = $1")
            .bind(story_id)
            .bind(event_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Row-lock a story for settlement. Concurrent settlement attempts on
    /// the same story serialize here; the loser observes the settled flag.
    pub async fn lock_story_for_settlement(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Story, BreakwireError> {
        let row = sqlx::query(&format!(
            "SELECT {STORY_COLUMNS} FROM stories WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;

        let row: PgRow = row.ok_or_else(|| BreakwireError::not_found("story", id))?;
        let story = StoryRow::from_row(&row).map_err(db_err)?;
        Ok(story.into_story())
    }

    /// Final settlement write: flag, pool total, lifecycle move to settled.
    /// Runs inside the settlement transaction that locked the row.
    pub async fn mark_settled(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        kudos_pool: i64,
    ) -> Result<(), BreakwireError> {
        sqlx::query(
            "UPDATE stories
             SET kudos_distributed = TRUE, kudos_pool = $2, status = 'settled'
             WHERE id = $1",
        )
        .bind(id)
        .bind(kudos_pool)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
