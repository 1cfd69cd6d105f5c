//! One-shot kudos settlement for stories whose virality has peaked and
//! decayed. Every credit for a story happens inside a single transaction,
//! guarded by a read-then-set of the settle-once flag under row lock.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use breakwire_common::{
    BreakwireError, KudosConfig, KudosLedgerEntry, KudosReason, StoryStatus, ViralityConfig,
};
use breakwire_store::{ReadCache, Store};

use crate::decay::DecayDetector;
use crate::leaderboard::LeaderboardRanker;

/// Kudos per full ten points of peak virality.
const VIRALITY_BONUS_STEP: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    Settled {
        story_id: Uuid,
        submissions: usize,
        kudos_pool: i64,
    },
    /// Already settled, no submissions, or not decaying yet. A no-op,
    /// not an error.
    NotEligible { story_id: Uuid, reason: String },
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SettlementSweep {
    pub settled: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct SettlementEngine {
    store: Store,
    detector: DecayDetector,
    ranker: LeaderboardRanker,
    config: KudosConfig,
    virality: ViralityConfig,
    cache: Arc<ReadCache>,
}

impl SettlementEngine {
    pub fn new(
        store: Store,
        virality: ViralityConfig,
        config: KudosConfig,
        cache: Arc<ReadCache>,
    ) -> Self {
        Self {
            detector: DecayDetector::new(virality.clone()),
            ranker: LeaderboardRanker::new(store.clone()),
            store,
            config,
            virality,
            cache,
        }
    }

    /// One pass over every active, unsettled story: assess decay, settle
    /// the ones that have peaked. Per-story failures are isolated.
    pub async fn sweep(&self) -> Result<SettlementSweep, BreakwireError> {
        let candidates = self.store.settlement_candidates().await?;
        let mut sweep = SettlementSweep::default();

        for story in &candidates {
            let snapshots = self
                .store
                .recent_snapshots(story.id, self.virality.decay_window as i64)
                .await?;
            let verdict = self.detector.assess(&snapshots, story.peak_virality_score);
            if !verdict.decaying {
                sweep.skipped += 1;
                continue;
            }

            let reason = verdict.reason.unwrap_or_default();
            info!(story_id = %story.id, %reason, "Story decayed, settling");
            match self.settle_story(story.id).await {
                Ok(SettlementOutcome::Settled { .. }) => sweep.settled += 1,
                Ok(SettlementOutcome::NotEligible { reason, .. }) => {
                    warn!(story_id = %story.id, %reason, "Settlement skipped");
                    sweep.skipped += 1;
                }
                Err(e) => {
                    error!(story_id = %story.id, error = %e, "Settlement failed");
                    sweep.failed += 1;
                }
            }
        }
        Ok(sweep)
    }

    /// Settle one story, unconditionally on decay (the sweep checks decay;
    /// the admin trigger settles directly). Idempotent: a second call
    /// observes the settled flag under lock and changes nothing.
    pub async fn settle_story(&self, story_id: Uuid) -> Result<SettlementOutcome, BreakwireError> {
        let mut tx = self.store.begin().await?;

        let story = self.store.lock_story_for_settlement(&mut tx, story_id).await?;
        if story.kudos_distributed {
            tx.rollback().await.map_err(|e| BreakwireError::Database(e.to_string()))?;
            return Ok(SettlementOutcome::NotEligible {
                story_id,
                reason: "kudos already distributed".to_string(),
            });
        }
        // Only active stories settle; pending (degraded) and rejected ones
        // never enter the lifecycle move to settled.
        if story.status != StoryStatus::Active {
            tx.rollback().await.map_err(|e| BreakwireError::Database(e.to_string()))?;
            return Ok(SettlementOutcome::NotEligible {
                story_id,
                reason: format!("story is {}, not active", story.status),
            });
        }

        let submissions = self.store.submissions_for_story(&mut tx, story_id).await?;
        let Some(first) = submissions.first() else {
            tx.rollback().await.map_err(|e| BreakwireError::Database(e.to_string()))?;
            return Ok(SettlementOutcome::NotEligible {
                story_id,
                reason: "story has no submissions".to_string(),
            });
        };

        let peak = story.peak_virality_score;
        let first_at = first.submitted_at;
        let viral = peak >= self.config.viral_bonus_peak;
        let mut kudos_pool = 0i64;

        for (index, submission) in submissions.iter().enumerate() {
            let hours_since_first =
                (submission.submitted_at - first_at).num_minutes().max(0) as f64 / 60.0;
            let amount = payout(
                index as u32 + 1,
                hours_since_first,
                peak,
                submission.is_original_discoverer,
                &self.config,
            );
            kudos_pool += amount;

            self.store
                .set_submission_kudos(&mut tx, submission.id, amount)
                .await?;
            self.store
                .credit_kudos(&mut tx, submission.user_id, amount)
                .await?;
            let reason = if submission.is_original_discoverer {
                KudosReason::FirstDiscoverer
            } else {
                KudosReason::EarlyDiscovery
            };
            self.store
                .append_ledger_entry(
                    &mut tx,
                    &KudosLedgerEntry {
                        id: Uuid::new_v4(),
                        user_id: submission.user_id,
                        amount,
                        reason,
                        story_id: Some(story_id),
                        created_at: Utc::now(),
                    },
                )
                .await?;

            // Separate viral-bonus entry, additive on top of the per-
            // submission kudos that already folded the virality bonus in.
            if viral {
                let bonus = virality_bonus(peak);
                self.store
                    .credit_kudos(&mut tx, submission.user_id, bonus)
                    .await?;
                self.store
                    .append_ledger_entry(
                        &mut tx,
                        &KudosLedgerEntry {
                            id: Uuid::new_v4(),
                            user_id: submission.user_id,
                            amount: bonus,
                            reason: KudosReason::ViralBonus,
                            story_id: Some(story_id),
                            created_at: Utc::now(),
                        },
                    )
                    .await?;
            }
        }

        self.store.mark_settled(&mut tx, story_id, kudos_pool).await?;
        tx.commit().await.map_err(|e| BreakwireError::Database(e.to_string()))?;

        info!(
            story_id = %story_id,
            submissions = submissions.len(),
            kudos_pool,
            peak,
            "Story settled"
        );

        self.ranker.recompute().await?;
        self.cache.invalidate_prefix("stories:*");
        self.cache.invalidate_prefix("leaderboards:*");

        Ok(SettlementOutcome::Settled {
            story_id,
            submissions: submissions.len(),
            kudos_pool,
        })
    }
}

/// Per-submission kudos: base plus order, timing, and virality bonuses,
/// doubled for the original discoverer, floored to whole kudos.
pub fn payout(
    order: u32,
    hours_since_first: f64,
    peak_score: f64,
    original_discoverer: bool,
    config: &KudosConfig,
) -> i64 {
    let early = (config.early_bonus_max - (order as i64 - 1) * config.early_bonus_step).max(0);
    let timing = (config.timing_bonus_max - hours_since_first * config.timing_bonus_per_hour)
        .max(0.0);
    let virality = virality_bonus(peak_score);
    let multiplier = if original_discoverer {
        config.first_discoverer_multiplier
    } else {
        1.0
    };
    (((config.base + early + virality) as f64 + timing) * multiplier).floor() as i64
}

/// Five kudos per full ten points of peak virality.
pub fn virality_bonus(peak_score: f64) -> i64 {
    (peak_score / 10.0).floor() as i64 * VIRALITY_BONUS_STEP
}
