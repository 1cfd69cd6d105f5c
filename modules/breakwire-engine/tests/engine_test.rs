//! End-to-end engine tests over a real store: intake, settlement, and the
//! weekly reset. Requires a Postgres instance; set DATABASE_TEST_URL or
//! these tests are skipped.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use ai_client::FakeProvider;
use breakwire_common::{
    EntitySet, KudosConfig, MatchConfig, StoryStatus, ViralityConfig,
};
use breakwire_engine::{
    IntakeEngine, IntakeOutcome, Scheduler, SettlementEngine, SettlementOutcome,
    StoredMetricSource, SubmissionRequest, ViralityTracker,
};
use breakwire_store::{ReadCache, Store};

async fn test_store() -> Option<Store> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let store = Store::connect(&url).await.ok()?;
    store.ensure_schema().await.ok()?;
    Some(store)
}

fn quake_entities() -> EntitySet {
    EntitySet {
        people: vec!["maria lopez".into()],
        organizations: vec!["usgs".into()],
        locations: vec!["valparaiso".into()],
        events: vec!["earthquake".into()],
        topics: vec!["disaster".into()],
        ..Default::default()
    }
}

fn intake(store: &Store) -> IntakeEngine {
    let provider = Arc::new(FakeProvider::new().with_entities("earthquake", quake_entities()));
    IntakeEngine::new(
        store.clone(),
        provider.clone(),
        provider,
        MatchConfig::default(),
        Arc::new(ReadCache::new(Duration::from_secs(60))),
    )
}

fn settlement(store: &Store) -> SettlementEngine {
    SettlementEngine::new(
        store.clone(),
        ViralityConfig::default(),
        KudosConfig::default(),
        Arc::new(ReadCache::new(Duration::from_secs(60))),
    )
}

/// Unique per-test vocabulary so stories from concurrent or previous test
/// runs in the same database never score above the semantic floor against
/// each other. The marker dominates the fake embedding; only submissions
/// sharing it look similar.
fn marker() -> String {
    Uuid::new_v4().simple().to_string()
}

fn request(user_id: Uuid, marker: &str) -> SubmissionRequest {
    SubmissionRequest {
        user_id,
        title: format!("Coastal earthquake bulletin {marker}"),
        description: format!("{marker} {marker} {marker} {marker} tremor shakes region"),
        url: Some("https://news.example.com/quake".to_string()),
        category: Some("weather".to_string()),
        force_new: false,
        discover_story_id: None,
    }
}

#[tokio::test]
async fn identical_submissions_create_then_auto_join() {
    let Some(store) = test_store().await else {
        return;
    };
    let engine = intake(&store);
    let topic = marker();

    let first = engine.submit(request(Uuid::new_v4(), &topic)).await.unwrap();
    let IntakeOutcome::Created { story, degraded, .. } = first else {
        panic!("expected created outcome");
    };
    assert!(!degraded);
    assert_eq!(story.status, StoryStatus::Active);
    assert!(story.canonical_event_id.is_some());

    let second = engine.submit(request(Uuid::new_v4(), &topic)).await.unwrap();
    let IntakeOutcome::Joined { story_id, .. } = second else {
        panic!("expected joined outcome, got {second:?}");
    };
    assert_eq!(story_id, story.id);

    // the join folded its entities in and bumped the member count
    let event = store
        .canonical_event_by_id(story.canonical_event_id.unwrap())
        .await
        .unwrap();
    assert_eq!(event.member_count, 2);
    assert_eq!(event.entities.events, vec!["earthquake"]);
}

#[tokio::test]
async fn concurrent_joins_lose_no_members() {
    let Some(store) = test_store().await else {
        return;
    };
    let engine = intake(&store);
    let topic = marker();

    let IntakeOutcome::Created { story, .. } =
        engine.submit(request(Uuid::new_v4(), &topic)).await.unwrap()
    else {
        panic!("expected created outcome");
    };

    let mut a = request(Uuid::new_v4(), &topic);
    a.discover_story_id = Some(story.id);
    let mut b = request(Uuid::new_v4(), &topic);
    b.discover_story_id = Some(story.id);
    b.url = Some("https://mirror.example.org/quake".to_string());

    let (a, b) = tokio::join!(engine.submit(a), engine.submit(b));
    a.unwrap();
    b.unwrap();

    // both joins landed: neither overwrote the other's merge
    let event = store
        .canonical_event_by_id(story.canonical_event_id.unwrap())
        .await
        .unwrap();
    assert_eq!(event.member_count, 3);
    assert!(event.source_domains.contains(&"news.example.com".to_string()));
    assert!(event.source_domains.contains(&"mirror.example.org".to_string()));
}

#[tokio::test]
async fn same_user_cannot_discover_twice() {
    let Some(store) = test_store().await else {
        return;
    };
    let engine = intake(&store);
    let user = Uuid::new_v4();
    let topic = marker();

    let IntakeOutcome::Created { story, .. } =
        engine.submit(request(user, &topic)).await.unwrap()
    else {
        panic!("expected created outcome");
    };

    let mut again = request(user, &topic);
    again.discover_story_id = Some(story.id);
    let err = engine.submit(again).await.unwrap_err();
    assert!(matches!(err, breakwire_common::BreakwireError::Conflict(_)));
}

#[tokio::test]
async fn provider_outage_degrades_instead_of_failing() {
    let Some(store) = test_store().await else {
        return;
    };
    let provider = Arc::new(FakeProvider::new());
    provider.set_fail_embeddings(true);
    provider.set_fail_entities(true);
    let engine = IntakeEngine::new(
        store.clone(),
        provider.clone(),
        provider,
        MatchConfig::default(),
        Arc::new(ReadCache::new(Duration::from_secs(60))),
    );

    let outcome = engine
        .submit(request(Uuid::new_v4(), &marker()))
        .await
        .unwrap();
    let IntakeOutcome::Created { story, degraded, .. } = outcome else {
        panic!("expected created outcome");
    };
    assert!(degraded);
    assert!(story.embedding.is_none());
    assert!(story.canonical_event_id.is_none());
    assert!(story.entities.is_empty());
}

#[tokio::test]
async fn settlement_pays_once_and_reconciles() {
    let Some(store) = test_store().await else {
        return;
    };
    let engine = intake(&store);
    let topic = marker();
    let original = Uuid::new_v4();
    let follower = Uuid::new_v4();

    let IntakeOutcome::Created { story, .. } =
        engine.submit(request(original, &topic)).await.unwrap()
    else {
        panic!("expected created outcome");
    };
    let mut join = request(follower, &topic);
    join.discover_story_id = Some(story.id);
    engine.submit(join).await.unwrap();

    // ran hot, peaked at 80
    store
        .update_virality(story.id, 40.0, breakwire_common::ViralityTrend::Declining, 80.0)
        .await
        .unwrap();

    let settled = settlement(&store).settle_story(story.id).await.unwrap();
    let SettlementOutcome::Settled {
        submissions,
        kudos_pool,
        ..
    } = settled
    else {
        panic!("expected settled outcome, got {settled:?}");
    };
    assert_eq!(submissions, 2);
    // original: floor((100+100+50+40)*2.0) = 580
    // follower: floor((100+90+50+40)*1.0) = 280 (same-hour join)
    assert_eq!(kudos_pool, 580 + 280);

    // peak 80 >= 50: each discoverer also gets the separate 40-point entry
    assert_eq!(store.reputation(original).await.unwrap().total_kudos, 620);
    assert_eq!(store.reputation(follower).await.unwrap().total_kudos, 320);
    assert_eq!(store.ledger_count_for_story(story.id).await.unwrap(), 4);
    assert_eq!(
        store.story_by_id(story.id).await.unwrap().status,
        StoryStatus::Settled
    );

    // second invocation: not eligible, zero ledger delta
    let again = settlement(&store).settle_story(story.id).await.unwrap();
    assert!(matches!(again, SettlementOutcome::NotEligible { .. }));
    assert_eq!(store.ledger_count_for_story(story.id).await.unwrap(), 4);
    assert_eq!(store.reputation(original).await.unwrap().total_kudos, 620);
}

#[tokio::test]
async fn settling_without_submissions_is_not_eligible() {
    let Some(store) = test_store().await else {
        return;
    };
    // a story row with no submissions, inserted directly
    let user = Uuid::new_v4();
    store.ensure_user(user).await.unwrap();
    let story = breakwire_common::Story {
        id: Uuid::new_v4(),
        title: "Orphan story".into(),
        description: "no discoverers".into(),
        source_domain: None,
        category: None,
        submitter_id: user,
        status: StoryStatus::Active,
        canonical_event_id: None,
        embedding: None,
        entities: EntitySet::default(),
        virality_score: 0.0,
        peak_virality_score: 60.0,
        trend: breakwire_common::ViralityTrend::Declining,
        kudos_pool: 0,
        kudos_distributed: false,
        created_at: chrono::Utc::now(),
    };
    store.insert_story(&story).await.unwrap();

    let outcome = settlement(&store).settle_story(story.id).await.unwrap();
    let SettlementOutcome::NotEligible { reason, .. } = outcome else {
        panic!("expected not eligible");
    };
    assert!(reason.contains("no submissions"));
}

#[tokio::test]
async fn pending_story_is_not_settleable() {
    let Some(store) = test_store().await else {
        return;
    };
    // degraded intake leaves the story pending
    let provider = Arc::new(FakeProvider::new());
    provider.set_fail_embeddings(true);
    provider.set_fail_entities(true);
    let engine = IntakeEngine::new(
        store.clone(),
        provider.clone(),
        provider,
        MatchConfig::default(),
        Arc::new(ReadCache::new(Duration::from_secs(60))),
    );
    let user = Uuid::new_v4();
    let IntakeOutcome::Created { story, degraded, .. } = engine
        .submit(request(user, &marker()))
        .await
        .unwrap()
    else {
        panic!("expected created outcome");
    };
    assert!(degraded);
    assert_eq!(story.status, StoryStatus::Pending);

    // even an admin trigger with a hot peak pays nothing out
    store
        .update_virality(story.id, 40.0, breakwire_common::ViralityTrend::Declining, 80.0)
        .await
        .unwrap();
    let outcome = settlement(&store).settle_story(story.id).await.unwrap();
    let SettlementOutcome::NotEligible { reason, .. } = outcome else {
        panic!("expected not eligible, got {outcome:?}");
    };
    assert!(reason.contains("not active"));

    let after = store.story_by_id(story.id).await.unwrap();
    assert_eq!(after.status, StoryStatus::Pending);
    assert!(!after.kudos_distributed);
    assert_eq!(store.ledger_count_for_story(story.id).await.unwrap(), 0);
    assert_eq!(store.reputation(user).await.unwrap().total_kudos, 0);
}

#[tokio::test]
async fn virality_sweep_snapshots_active_stories() {
    let Some(store) = test_store().await else {
        return;
    };
    let engine = intake(&store);
    let IntakeOutcome::Created { story, .. } = engine
        .submit(request(Uuid::new_v4(), &marker()))
        .await
        .unwrap()
    else {
        panic!("expected created outcome");
    };

    let tracker = ViralityTracker::new(
        store.clone(),
        StoredMetricSource::new(store.clone()),
        ViralityConfig::default(),
    );
    tracker.track_story(&store.story_by_id(story.id).await.unwrap()).await.unwrap();

    let snapshots = store.recent_snapshots(story.id, 5).await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert!(snapshots[0].score > 0.0);

    let updated = store.story_by_id(story.id).await.unwrap();
    assert_eq!(updated.virality_score, snapshots[0].score);
    assert!(updated.peak_virality_score >= updated.virality_score);
}

#[tokio::test]
async fn weekly_reset_nets_to_zero_in_ledger() {
    let Some(store) = test_store().await else {
        return;
    };
    let user = Uuid::new_v4();
    store.ensure_user(user).await.unwrap();
    let mut tx = store.begin().await.unwrap();
    store.credit_kudos(&mut tx, user, 340).await.unwrap();
    tx.commit().await.unwrap();

    let cache = Arc::new(ReadCache::new(Duration::from_secs(60)));
    let scheduler = Scheduler::new(
        store.clone(),
        ViralityTracker::new(
            store.clone(),
            StoredMetricSource::new(store.clone()),
            ViralityConfig::default(),
        ),
        settlement(&store),
        cache,
        Duration::from_secs(900),
        Duration::from_secs(1800),
    );
    scheduler.weekly_reset().await.unwrap();

    let rep = store.reputation(user).await.unwrap();
    assert_eq!(rep.weekly_kudos, 0);
    assert_eq!(rep.total_kudos, 340);
    assert_eq!(rep.weekly_rank, None);
    // the offsetting -340 entry landed
    assert_eq!(store.ledger_sum_for_user(user).await.unwrap(), -340);
}
