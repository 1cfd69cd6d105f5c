//! Integration tests for the Postgres store.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use chrono::Utc;
use uuid::Uuid;

use breakwire_common::{
    BreakwireError, EntitySet, KudosLedgerEntry, KudosReason, RawMetrics, Story, StoryStatus,
    Submission, ViralitySnapshot, ViralityTrend,
};
use breakwire_store::Store;

/// Get a test store, or skip if no test DB is available.
async fn test_store() -> Option<Store> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let store = Store::connect(&url).await.ok()?;
    store.ensure_schema().await.ok()?;
    Some(store)
}

fn story(submitter: Uuid) -> Story {
    Story {
        id: Uuid::new_v4(),
        title: "Bridge closure downtown".into(),
        description: "Main bridge closed after inspection".into(),
        source_domain: Some("example.com".into()),
        category: Some("infrastructure".into()),
        submitter_id: submitter,
        status: StoryStatus::Pending,
        canonical_event_id: None,
        embedding: Some(vec![0.1, 0.2, 0.3]),
        entities: EntitySet {
            locations: vec!["downtown".into()],
            ..Default::default()
        },
        virality_score: 0.0,
        peak_virality_score: 0.0,
        trend: ViralityTrend::Stable,
        kudos_pool: 0,
        kudos_distributed: false,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn story_roundtrips_with_typed_fields() {
    let Some(store) = test_store().await else {
        return;
    };
    let user = Uuid::new_v4();
    store.ensure_user(user).await.unwrap();

    let s = story(user);
    store.insert_story(&s).await.unwrap();

    let loaded = store.story_by_id(s.id).await.unwrap();
    assert_eq!(loaded.title, s.title);
    assert_eq!(loaded.status, StoryStatus::Pending);
    assert_eq!(loaded.entities.locations, vec!["downtown"]);
    assert_eq!(loaded.embedding, Some(vec![0.1, 0.2, 0.3]));
}

#[tokio::test]
async fn missing_story_is_not_found() {
    let Some(store) = test_store().await else {
        return;
    };
    let err = store.story_by_id(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, BreakwireError::NotFound { .. }));
}

#[tokio::test]
async fn duplicate_submission_is_a_conflict() {
    let Some(store) = test_store().await else {
        return;
    };
    let user = Uuid::new_v4();
    store.ensure_user(user).await.unwrap();
    let s = story(user);
    store.insert_story(&s).await.unwrap();

    let sub = Submission {
        id: Uuid::new_v4(),
        user_id: user,
        story_id: s.id,
        submitted_at: Utc::now(),
        is_original_discoverer: true,
        kudos_earned: None,
    };
    store.insert_submission(&sub).await.unwrap();

    let again = Submission {
        id: Uuid::new_v4(),
        ..sub.clone()
    };
    let err = store.insert_submission(&again).await.unwrap_err();
    assert!(matches!(err, BreakwireError::Conflict(_)));
}

#[tokio::test]
async fn illegal_transition_is_rejected_at_store_layer() {
    let Some(store) = test_store().await else {
        return;
    };
    let user = Uuid::new_v4();
    store.ensure_user(user).await.unwrap();
    let s = story(user);
    store.insert_story(&s).await.unwrap();

    // pending -> settled skips activation
    let err = store
        .transition_status(s.id, StoryStatus::Settled)
        .await
        .unwrap_err();
    assert!(matches!(err, BreakwireError::IllegalTransition { .. }));

    store
        .transition_status(s.id, StoryStatus::Active)
        .await
        .unwrap();
    store
        .transition_status(s.id, StoryStatus::Settled)
        .await
        .unwrap();
}

#[tokio::test]
async fn peak_virality_only_ratchets_upward() {
    let Some(store) = test_store().await else {
        return;
    };
    let user = Uuid::new_v4();
    store.ensure_user(user).await.unwrap();
    let s = story(user);
    store.insert_story(&s).await.unwrap();

    store
        .update_virality(s.id, 80.0, ViralityTrend::Rising, 80.0)
        .await
        .unwrap();
    // a tick carrying a stale lower peak must not pull the stored peak down
    store
        .update_virality(s.id, 50.0, ViralityTrend::Declining, 50.0)
        .await
        .unwrap();

    let loaded = store.story_by_id(s.id).await.unwrap();
    assert_eq!(loaded.virality_score, 50.0);
    assert_eq!(loaded.peak_virality_score, 80.0);
}

#[tokio::test]
async fn snapshots_read_most_recent_first() {
    let Some(store) = test_store().await else {
        return;
    };
    let user = Uuid::new_v4();
    store.ensure_user(user).await.unwrap();
    let s = story(user);
    store.insert_story(&s).await.unwrap();

    for (i, score) in [10.0, 20.0, 30.0].iter().enumerate() {
        store
            .append_snapshot(&ViralitySnapshot {
                id: Uuid::new_v4(),
                story_id: s.id,
                metrics: RawMetrics::default(),
                score: *score,
                velocity_change: 0.0,
                trend: ViralityTrend::Stable,
                recorded_at: Utc::now() + chrono::Duration::seconds(i as i64),
            })
            .await
            .unwrap();
    }

    let recent = store.recent_snapshots(s.id, 2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].score, 30.0);
    assert_eq!(recent[1].score, 20.0);
}

#[tokio::test]
async fn ledger_reconciles_with_user_total() {
    let Some(store) = test_store().await else {
        return;
    };
    let user = Uuid::new_v4();
    store.ensure_user(user).await.unwrap();

    let mut tx = store.begin().await.unwrap();
    for amount in [250i64, 90, -40] {
        store
            .append_ledger_entry(
                &mut tx,
                &KudosLedgerEntry {
                    id: Uuid::new_v4(),
                    user_id: user,
                    amount,
                    reason: KudosReason::EarlyDiscovery,
                    story_id: None,
                    created_at: Utc::now(),
                },
            )
            .await
            .unwrap();
        store.credit_kudos(&mut tx, user, amount).await.unwrap();
    }
    tx.commit().await.unwrap();

    let sum = store.ledger_sum_for_user(user).await.unwrap();
    let rep = store.reputation(user).await.unwrap();
    assert_eq!(sum, 300);
    assert_eq!(rep.total_kudos, 300);
    assert_eq!(rep.weekly_kudos, 300);
}
