use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Story lifecycle ---

/// Lifecycle of a story. Transitions are enforced at the store layer:
/// Pending → Active → Settled, Pending → Rejected. Everything else is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    Pending,
    Active,
    Settled,
    Rejected,
}

impl StoryStatus {
    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub fn can_transition_to(self, next: StoryStatus) -> bool {
        matches!(
            (self, next),
            (StoryStatus::Pending, StoryStatus::Active)
                | (StoryStatus::Pending, StoryStatus::Rejected)
                | (StoryStatus::Active, StoryStatus::Settled)
        )
    }
}

impl std::fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoryStatus::Pending => write!(f, "pending"),
            StoryStatus::Active => write!(f, "active"),
            StoryStatus::Settled => write!(f, "settled"),
            StoryStatus::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ViralityTrend {
    Rising,
    #[default]
    Stable,
    Declining,
}

impl std::fmt::Display for ViralityTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViralityTrend::Rising => write!(f, "rising"),
            ViralityTrend::Stable => write!(f, "stable"),
            ViralityTrend::Declining => write!(f, "declining"),
        }
    }
}

// --- Entities ---

/// Named entities extracted from a story, grouped by category.
/// This is the typed value object that crosses the store edge as JSON —
/// raw strings never flow through business logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EntitySet {
    #[serde(default)]
    pub people: Vec<String>,
    #[serde(default)]
    pub organizations: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub dates: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl EntitySet {
    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
            && self.organizations.is_empty()
            && self.locations.is_empty()
            && self.events.is_empty()
            && self.dates.is_empty()
            && self.topics.is_empty()
    }

    /// Total entity count across all categories.
    pub fn len(&self) -> usize {
        self.people.len()
            + self.organizations.len()
            + self.locations.len()
            + self.events.len()
            + self.dates.len()
            + self.topics.len()
    }
}

// --- Stories and canonical events ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub source_domain: Option<String>,
    pub category: Option<String>,
    pub submitter_id: Uuid,
    pub status: StoryStatus,
    pub canonical_event_id: Option<Uuid>,
    pub embedding: Option<Vec<f32>>,
    pub entities: EntitySet,
    pub virality_score: f64,
    pub peak_virality_score: f64,
    pub trend: ViralityTrend,
    pub kudos_pool: i64,
    pub kudos_distributed: bool,
    pub created_at: DateTime<Utc>,
}

/// The deduplicated real-world event cluster behind one or more matched
/// story submissions. Entity and domain sets only ever grow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub embedding: Option<Vec<f32>>,
    pub entities: EntitySet,
    pub source_domains: Vec<String>,
    pub member_count: i32,
    pub created_at: DateTime<Utc>,
}

// --- Submissions ---

/// One discovery of a story by a user. At most one per (user, story).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub user_id: Uuid,
    pub story_id: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub is_original_discoverer: bool,
    /// Null until the story settles.
    pub kudos_earned: Option<i64>,
}

// --- Virality time series ---

/// Raw spread signals for one measurement tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct RawMetrics {
    pub article_count: u32,
    pub social_mentions: u32,
    /// 0–100, search-interest style index.
    pub search_interest: f64,
    /// 0.0–1.0 blend of the other three.
    pub engagement_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViralitySnapshot {
    pub id: Uuid,
    pub story_id: Uuid,
    pub metrics: RawMetrics,
    pub score: f64,
    /// Score delta vs the previous snapshot; 0 when there is none.
    pub velocity_change: f64,
    pub trend: ViralityTrend,
    pub recorded_at: DateTime<Utc>,
}

// --- Kudos ledger ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KudosReason {
    EarlyDiscovery,
    FirstDiscoverer,
    ViralBonus,
    WeeklyReset,
}

impl std::fmt::Display for KudosReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KudosReason::EarlyDiscovery => write!(f, "early_discovery"),
            KudosReason::FirstDiscoverer => write!(f, "first_discoverer"),
            KudosReason::ViralBonus => write!(f, "viral_bonus"),
            KudosReason::WeeklyReset => write!(f, "weekly_reset"),
        }
    }
}

/// Append-only ledger line. The per-user sum of `amount` must always equal
/// the user's running kudos total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KudosLedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub reason: KudosReason,
    pub story_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// --- User reputation ---

/// Reputation-relevant user fields. Ranks are derived snapshot state,
/// always rebuildable from the ledger and totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserReputation {
    pub user_id: Uuid,
    pub total_kudos: i64,
    pub weekly_kudos: i64,
    pub all_time_rank: Option<i32>,
    pub weekly_rank: Option<i32>,
}
