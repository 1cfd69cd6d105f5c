//! Virality tracking: periodic 0–100 score recomputation per active story,
//! snapshot persistence, and current/peak/trend maintenance.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use breakwire_common::{
    RawMetrics, Story, ViralityConfig, ViralitySnapshot, ViralityTrend,
};
use breakwire_store::Store;

/// Caps for normalizing raw counts onto 0–100.
const ARTICLE_CAP: f64 = 20.0;
const SOCIAL_CAP: f64 = 1000.0;

// ---------------------------------------------------------------------------
// MetricSource — where raw spread signals come from
// ---------------------------------------------------------------------------

#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn metrics_for(&self, story: &Story) -> Result<RawMetrics>;
}

/// Derives raw metrics from what the store already knows about a story:
/// cluster breadth stands in for article coverage, discovery volume for
/// social chatter. A production deployment would back this with real
/// article/social/search feeds behind the same trait.
pub struct StoredMetricSource {
    store: Store,
}

impl StoredMetricSource {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MetricSource for StoredMetricSource {
    async fn metrics_for(&self, story: &Story) -> Result<RawMetrics> {
        let (member_count, domain_count) = match story.canonical_event_id {
            Some(event_id) => {
                let event = self.store.canonical_event_by_id(event_id).await?;
                (event.member_count as u32, event.source_domains.len() as u32)
            }
            None => (1, story.source_domain.iter().count() as u32),
        };

        let mut tx = self.store.begin().await?;
        let submissions = self.store.submissions_for_story(&mut tx, story.id).await?;
        tx.commit().await?;

        let article_count = member_count + domain_count;
        let social_mentions = (submissions.len() as u32) * 25;
        let search_interest = ((domain_count as f64) * 12.5).min(100.0);
        let engagement_rate = engagement_rate(article_count, social_mentions, search_interest);

        Ok(RawMetrics {
            article_count,
            social_mentions,
            search_interest,
            engagement_rate,
        })
    }
}

// ---------------------------------------------------------------------------
// Pure scoring
// ---------------------------------------------------------------------------

fn normalize_articles(count: u32) -> f64 {
    ((count as f64 / ARTICLE_CAP) * 100.0).min(100.0)
}

fn normalize_social(count: u32) -> f64 {
    ((count as f64 / SOCIAL_CAP) * 100.0).min(100.0)
}

/// Blend of the three observed metrics, normalized to [0, 1].
pub fn engagement_rate(article_count: u32, social_mentions: u32, search_interest: f64) -> f64 {
    let blend = (normalize_articles(article_count)
        + normalize_social(social_mentions)
        + search_interest.clamp(0.0, 100.0))
        / 3.0;
    blend / 100.0
}

/// Weighted 0–100 virality score, rounded to one decimal.
pub fn compute_score(metrics: &RawMetrics, config: &ViralityConfig) -> f64 {
    let score = config.article_weight * normalize_articles(metrics.article_count)
        + config.social_weight * normalize_social(metrics.social_mentions)
        + config.search_weight * metrics.search_interest.clamp(0.0, 100.0)
        + config.engagement_weight * (metrics.engagement_rate.clamp(0.0, 1.0) * 100.0);
    (score * 10.0).round() / 10.0
}

pub fn classify_trend(velocity_change: f64, config: &ViralityConfig) -> ViralityTrend {
    if velocity_change >= config.trend_band {
        ViralityTrend::Rising
    } else if velocity_change <= -config.trend_band {
        ViralityTrend::Declining
    } else {
        ViralityTrend::Stable
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Outcome of one sweep over the active stories.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub updated: usize,
    pub failed: usize,
}

pub struct ViralityTracker<M: MetricSource> {
    store: Store,
    source: M,
    config: ViralityConfig,
}

impl<M: MetricSource> ViralityTracker<M> {
    pub fn new(store: Store, source: M, config: ViralityConfig) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    /// One full sweep. Per-story failures are logged and isolated — a bad
    /// story never aborts the batch.
    pub async fn sweep(&self) -> Result<SweepSummary> {
        let stories = self.store.active_stories().await?;
        let mut summary = SweepSummary::default();

        for story in &stories {
            match self.track_story(story).await {
                Ok(()) => summary.updated += 1,
                Err(e) => {
                    warn!(story_id = %story.id, error = %e, "Virality update failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            stories = stories.len(),
            updated = summary.updated,
            failed = summary.failed,
            "Virality sweep complete"
        );
        Ok(summary)
    }

    /// Recompute one story: new snapshot plus current/trend/peak write-back.
    pub async fn track_story(&self, story: &Story) -> Result<()> {
        let metrics = self.source.metrics_for(story).await?;
        let score = compute_score(&metrics, &self.config);

        let previous = self.store.recent_snapshots(story.id, 1).await?;
        let velocity_change = match previous.first() {
            Some(prev) => score - prev.score,
            None => 0.0,
        };
        let trend = classify_trend(velocity_change, &self.config);

        let snapshot = ViralitySnapshot {
            id: Uuid::new_v4(),
            story_id: story.id,
            metrics,
            score,
            velocity_change,
            trend,
            recorded_at: Utc::now(),
        };
        self.store.append_snapshot(&snapshot).await?;

        // Peak only ever moves up once a story is live.
        let peak = story.peak_virality_score.max(score);
        self.store
            .update_virality(story.id, score, trend, peak)
            .await?;
        Ok(())
    }
}
