use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use breakwire_common::{BreakwireError, CanonicalEvent, EntitySet};

use crate::Store;

#[derive(FromRow)]
struct CanonicalEventRow {
    id: Uuid,
    title: String,
    description: String,
    embedding: Option<serde_json::Value>,
    entities: serde_json::Value,
    source_domains: serde_json::Value,
    member_count: i32,
    created_at: DateTime<Utc>,
}

impl CanonicalEventRow {
    fn into_event(self) -> CanonicalEvent {
        CanonicalEvent {
            id: self.id,
            title: self.title,
            description: self.description,
            embedding: self
                .embedding
                .and_then(|v| serde_json::from_value(v).ok()),
            entities: serde_json::from_value(self.entities).unwrap_or_default(),
            source_domains: serde_json::from_value(self.source_domains).unwrap_or_default(),
            member_count: self.member_count,
            created_at: self.created_at,
        }
    }
}

fn db_err(e: sqlx::Error) -> BreakwireError {
    BreakwireError::Database(e.to_string())
}

impl Store {
    pub async fn insert_canonical_event(
        &self,
        event: &CanonicalEvent,
    ) -> Result<(), BreakwireError> {
        sqlx::query(
            r#"
            INSERT INTO canonical_events
                (id, title, description, embedding, entities, source_domains,
                 member_count, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.embedding.as_ref().map(|e| serde_json::json!(e)))
        .bind(serde_json::to_value(&event.entities).unwrap_or_default())
        .bind(serde_json::json!(event.source_domains))
        .bind(event.member_count)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn canonical_event_by_id(
        &self,
        id: Uuid,
    ) -> Result<CanonicalEvent, BreakwireError> {
        let row = sqlx::query_as::<_, CanonicalEventRow>(
            "SELECT id, title, description, embedding, entities, source_domains,
                    member_count, created_at
             FROM canonical_events WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(CanonicalEventRow::into_event)
            .ok_or_else(|| BreakwireError::not_found("canonical event", id))
    }

    /// Row-lock a canonical event for merging. Concurrent joins into the
    /// same event serialize here, so each merge sees the previous one's
    /// unions.
    pub async fn lock_canonical_event(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<CanonicalEvent, BreakwireError> {
        let row = sqlx::query_as::<_, CanonicalEventRow>(
            "SELECT id, title, description, embedding, entities, source_domains,
                    member_count, created_at
             FROM canonical_events WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;

        row.map(CanonicalEventRow::into_event)
            .ok_or_else(|| BreakwireError::not_found("canonical event", id))
    }

    /// Persist a merge for one joining submission. Runs inside the
    /// transaction that locked the row; the member count increments in
    /// SQL so it counts every join exactly once.
    pub async fn apply_canonical_merge(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        entities: &EntitySet,
        source_domains: &[String],
    ) -> Result<(), BreakwireError> {
        let result = sqlx::query(
            "UPDATE canonical_events
             SET entities = $2, source_domains = $3,
                 member_count = member_count + 1
             WHERE id = $1",
        )
        .bind(id)
        .bind(serde_json::to_value(entities).unwrap_or_default())
        .bind(serde_json::json!(source_domains))
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(BreakwireError::not_found("canonical event", id));
        }
        Ok(())
    }
}
