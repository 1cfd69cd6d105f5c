use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use breakwire_common::{BreakwireError, RawMetrics, ViralitySnapshot};

use crate::stories::parse_trend;
use crate::Store;

#[derive(FromRow)]
struct SnapshotRow {
    id: Uuid,
    story_id: Uuid,
    article_count: i32,
    social_mentions: i32,
    search_interest: f64,
    engagement_rate: f64,
    score: f64,
    velocity_change: f64,
    trend: String,
    recorded_at: DateTime<Utc>,
}

impl SnapshotRow {
    fn into_snapshot(self) -> ViralitySnapshot {
        ViralitySnapshot {
            id: self.id,
            story_id: self.story_id,
            metrics: RawMetrics {
                article_count: self.article_count.max(0) as u32,
                social_mentions: self.social_mentions.max(0) as u32,
                search_interest: self.search_interest,
                engagement_rate: self.engagement_rate,
            },
            score: self.score,
            velocity_change: self.velocity_change,
            trend: parse_trend(&self.trend),
            recorded_at: self.recorded_at,
        }
    }
}

fn db_err(e: sqlx::Error) -> BreakwireError {
    BreakwireError::Database(e.to_string())
}

impl Store {
    /// Append one measurement to the time series. Append-only by design.
    pub async fn append_snapshot(
        &self,
        snapshot: &ViralitySnapshot,
    ) -> Result<(), BreakwireError> {
        sqlx::query(
            r#"
            INSERT INTO virality_snapshots
                (id, story_id, article_count, social_mentions, search_interest,
                 engagement_rate, score, velocity_change, trend, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(snapshot.id)
        .bind(snapshot.story_id)
        .bind(snapshot.metrics.article_count as i32)
        .bind(snapshot.metrics.social_mentions as i32)
        .bind(snapshot.metrics.search_interest)
        .bind(snapshot.metrics.engagement_rate)
        .bind(snapshot.score)
        .bind(snapshot.velocity_change)
        .bind(snapshot.trend.to_string())
        .bind(snapshot.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Most recent snapshots first.
    pub async fn recent_snapshots(
        &self,
        story_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ViralitySnapshot>, BreakwireError> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            "SELECT id, story_id, article_count, social_mentions, search_interest,
                    engagement_rate, score, velocity_change, trend, recorded_at
             FROM virality_snapshots
             WHERE story_id = $1
             ORDER BY recorded_at DESC
             LIMIT $2",
        )
        .bind(story_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(SnapshotRow::into_snapshot).collect())
    }
}
