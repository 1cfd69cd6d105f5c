//! The breakwire core: multi-signal match scoring and decisions, canonical
//! event merging, virality tracking, peak-decay detection, one-shot kudos
//! settlement, leaderboard ranking, and the scheduler that drives it all.

pub mod canonical;
pub mod decay;
pub mod intake;
pub mod leaderboard;
pub mod match_decision;
pub mod match_scorer;
pub mod scheduler;
pub mod settlement;
pub mod similarity;
pub mod virality;

pub use decay::{DecayDetector, DecayVerdict};
pub use intake::{IntakeEngine, IntakeOutcome, MatchCheck, SubmissionRequest};
pub use leaderboard::LeaderboardRanker;
pub use match_decision::{decide, MatchDecision, MatchKind, SuggestedAction};
pub use match_scorer::{score_candidates, ScoredCandidate, SubScores, SubmissionContext};
pub use scheduler::Scheduler;
pub use settlement::{SettlementEngine, SettlementOutcome, SettlementSweep};
pub use virality::{MetricSource, StoredMetricSource, ViralityTracker};
