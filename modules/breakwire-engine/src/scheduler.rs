//! Background cadences: virality sweeps, settlement sweeps, and the weekly
//! reputation reset. Start/stop are idempotent; shutdown waits for whatever
//! tick is in flight, so a settlement mid-payout always completes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

use breakwire_common::{BreakwireError, KudosLedgerEntry, KudosReason};
use breakwire_store::{ReadCache, Store};

use crate::leaderboard::LeaderboardRanker;
use crate::settlement::SettlementEngine;
use crate::virality::{StoredMetricSource, ViralityTracker};

const WEEKLY_RESET_PERIOD: Duration = Duration::from_secs(7 * 24 * 60 * 60);

struct Running {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

pub struct Scheduler {
    store: Store,
    tracker: Arc<ViralityTracker<StoredMetricSource>>,
    settlement: Arc<SettlementEngine>,
    cache: Arc<ReadCache>,
    virality_interval: Duration,
    settlement_interval: Duration,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    pub fn new(
        store: Store,
        tracker: ViralityTracker<StoredMetricSource>,
        settlement: SettlementEngine,
        cache: Arc<ReadCache>,
        virality_interval: Duration,
        settlement_interval: Duration,
    ) -> Self {
        Self {
            store,
            tracker: Arc::new(tracker),
            settlement: Arc::new(settlement),
            cache,
            virality_interval,
            settlement_interval,
            running: Mutex::new(None),
        }
    }

    /// Spawn the three loops. Calling start on an already-running
    /// scheduler is a no-op, never a duplicate timer.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            warn!("Scheduler already running, start ignored");
            return;
        }

        let (shutdown, _) = watch::channel(false);

        let tracker = self.tracker.clone();
        let virality = spawn_loop(
            "virality",
            self.virality_interval,
            shutdown.subscribe(),
            move || {
                let tracker = tracker.clone();
                async move { virality_tick(&tracker).await }
            },
        );

        let engine = self.settlement.clone();
        let settlement = spawn_loop(
            "settlement",
            self.settlement_interval,
            shutdown.subscribe(),
            move || {
                let engine = engine.clone();
                async move { settlement_tick(&engine).await }
            },
        );

        let store = self.store.clone();
        let cache = self.cache.clone();
        let weekly = spawn_loop(
            "weekly_reset",
            WEEKLY_RESET_PERIOD,
            shutdown.subscribe(),
            move || {
                let store = store.clone();
                let cache = cache.clone();
                async move { weekly_reset_tick(&store, &cache).await }
            },
        );

        *running = Some(Running {
            shutdown,
            handles: vec![virality, settlement, weekly],
        });
        info!(
            virality_secs = self.virality_interval.as_secs(),
            settlement_secs = self.settlement_interval.as_secs(),
            "Scheduler started"
        );
    }

    /// Signal shutdown and wait for in-flight ticks to finish. Stopping a
    /// stopped scheduler is a no-op.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        let _ = running.shutdown.send(true);
        for handle in running.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Scheduler task panicked during shutdown");
            }
        }
        info!("Scheduler stopped");
    }

    /// One virality sweep, runnable without timers for deterministic tests
    /// and the admin surface.
    pub async fn run_virality_tick(&self) {
        virality_tick(&self.tracker).await;
    }

    /// One decay-and-settle sweep.
    pub async fn run_settlement_tick(&self) {
        settlement_tick(&self.settlement).await;
    }

    /// The weekly reset, immediately.
    pub async fn weekly_reset(&self) -> Result<usize, BreakwireError> {
        weekly_reset(&self.store, &self.cache).await
    }
}

fn spawn_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = timer.tick() => tick().await,
                _ = shutdown.changed() => {
                    info!(task = name, "Scheduler task draining");
                    break;
                }
            }
        }
    })
}

async fn virality_tick(tracker: &ViralityTracker<StoredMetricSource>) {
    if let Err(e) = tracker.sweep().await {
        error!(error = %e, "Virality sweep failed");
    }
}

async fn settlement_tick(engine: &SettlementEngine) {
    match engine.sweep().await {
        Ok(sweep) => {
            if sweep.settled > 0 || sweep.failed > 0 {
                info!(
                    settled = sweep.settled,
                    skipped = sweep.skipped,
                    failed = sweep.failed,
                    "Settlement sweep complete"
                );
            }
        }
        Err(e) => error!(error = %e, "Settlement sweep failed"),
    }
}

async fn weekly_reset_tick(store: &Store, cache: &ReadCache) {
    match weekly_reset(store, cache).await {
        Ok(users) => info!(users, "Weekly kudos reset"),
        Err(e) => error!(error = %e, "Weekly reset failed"),
    }
}

/// Zero every user's weekly kudos in one transaction. Each gets a negative
/// `weekly_reset` ledger entry equal to their pre-reset weekly total, so
/// the reset nets to zero in the ledger. All-time totals are untouched.
/// Ranks are rebuilt afterward.
async fn weekly_reset(store: &Store, cache: &ReadCache) -> Result<usize, BreakwireError> {
    let mut tx = store.begin().await?;
    let users = store.users_with_weekly_kudos(&mut tx).await?;
    for user in &users {
        store
            .append_ledger_entry(
                &mut tx,
                &KudosLedgerEntry {
                    id: Uuid::new_v4(),
                    user_id: user.user_id,
                    amount: -user.weekly_kudos,
                    reason: KudosReason::WeeklyReset,
                    story_id: None,
                    created_at: Utc::now(),
                },
            )
            .await?;
        store.zero_weekly_kudos(&mut tx, user.user_id).await?;
    }
    tx.commit()
        .await
        .map_err(|e| BreakwireError::Database(e.to_string()))?;

    LeaderboardRanker::new(store.clone()).recompute().await?;
    cache.invalidate_prefix("leaderboards:*");
    Ok(users.len())
}
