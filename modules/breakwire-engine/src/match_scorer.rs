//! Multi-signal match scoring: a submission against each active candidate
//! story. Pure over its inputs; candidate fetching and provider calls
//! happen upstream in the intake engine.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use breakwire_common::{EntitySet, MatchConfig, Story};

use crate::similarity::{cosine_similarity, entity_overlap};

/// Related-category pairs scoring 0.5 instead of 0.0. Order-insensitive.
const CATEGORY_ADJACENCY: &[(&str, &str)] = &[
    ("politics", "government"),
    ("politics", "world"),
    ("business", "finance"),
    ("business", "technology"),
    ("technology", "science"),
    ("health", "science"),
    ("sports", "entertainment"),
    ("crime", "justice"),
    ("weather", "environment"),
    ("environment", "science"),
];

/// Domains treated as major outlets: two distinct majors covering the same
/// item is weak evidence they describe one event.
const MAJOR_OUTLETS: &[&str] = &[
    "reuters.com",
    "apnews.com",
    "bbc.com",
    "bbc.co.uk",
    "nytimes.com",
    "washingtonpost.com",
    "theguardian.com",
    "cnn.com",
    "aljazeera.com",
    "bloomberg.com",
    "wsj.com",
    "ft.com",
];

/// What the scorer knows about the incoming submission.
#[derive(Debug, Clone)]
pub struct SubmissionContext {
    pub title: String,
    pub description: String,
    pub source_domain: Option<String>,
    pub category: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub entities: EntitySet,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct SubScores {
    pub semantic: f64,
    pub entity: f64,
    pub temporal: f64,
    pub category: f64,
    pub source: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ScoredCandidate {
    pub story_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub scores: SubScores,
    pub composite: f64,
}

/// Score every candidate, drop those under the semantic floor, sort by
/// composite descending (ties: fresher story first — more likely the live
/// version of a breaking event), truncate to the configured maximum.
pub fn score_candidates(
    ctx: &SubmissionContext,
    candidates: &[Story],
    config: &MatchConfig,
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .filter_map(|candidate| score_candidate(ctx, candidate, config))
        .collect();

    scored.sort_by(|a, b| {
        b.composite
            .partial_cmp(&a.composite)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    scored.truncate(config.max_candidates);
    scored
}

/// Score one candidate. Returns None when the semantic floor excludes it —
/// a hard prefilter, not a zero entry in the ranking.
fn score_candidate(
    ctx: &SubmissionContext,
    candidate: &Story,
    config: &MatchConfig,
) -> Option<ScoredCandidate> {
    let semantic = match (&ctx.embedding, &candidate.embedding) {
        (Some(a), Some(b)) => cosine_similarity(a, b).clamp(0.0, 1.0),
        _ => return None, // no embedding on either side: nothing to match on
    };
    if semantic < config.semantic_floor {
        return None;
    }

    let entity = entity_overlap(&ctx.entities, &candidate.entities);
    let temporal = temporal_score(ctx.submitted_at, candidate.created_at, config);
    let category = category_score(ctx.category.as_deref(), candidate.category.as_deref());
    let source = source_score(
        ctx.source_domain.as_deref(),
        candidate.source_domain.as_deref(),
    );

    let composite = config.semantic_weight * semantic
        + config.entity_weight * entity
        + config.temporal_weight * temporal
        + config.category_weight * category
        + config.source_weight * source;

    Some(ScoredCandidate {
        story_id: candidate.id,
        title: candidate.title.clone(),
        created_at: candidate.created_at,
        scores: SubScores {
            semantic,
            entity,
            temporal,
            category,
            source,
        },
        composite,
    })
}

/// 1.0 within the peak window, linear decay to 0.0 at the decay window.
fn temporal_score(
    submitted_at: DateTime<Utc>,
    candidate_at: DateTime<Utc>,
    config: &MatchConfig,
) -> f64 {
    let hours_apart = (submitted_at - candidate_at).num_minutes().abs() as f64 / 60.0;
    if hours_apart <= config.temporal_peak_hours {
        1.0
    } else if hours_apart >= config.temporal_decay_hours {
        0.0
    } else {
        let span = config.temporal_decay_hours - config.temporal_peak_hours;
        1.0 - (hours_apart - config.temporal_peak_hours) / span
    }
}

/// Exact 1.0, curated adjacency 0.5, unknown on either side 0.5 neutral,
/// otherwise 0.0.
fn category_score(a: Option<&str>, b: Option<&str>) -> f64 {
    let (Some(a), Some(b)) = (a, b) else {
        return 0.5;
    };
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a == b {
        return 1.0;
    }
    let adjacent = CATEGORY_ADJACENCY
        .iter()
        .any(|(x, y)| (*x == a && *y == b) || (*x == b && *y == a));
    if adjacent {
        0.5
    } else {
        0.0
    }
}

/// Identical domain 1.0; both on the major-outlet list 0.3; else 0.0.
fn source_score(a: Option<&str>, b: Option<&str>) -> f64 {
    let (Some(a), Some(b)) = (a, b) else {
        return 0.0;
    };
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a == b {
        return 1.0;
    }
    if MAJOR_OUTLETS.contains(&a.as_str()) && MAJOR_OUTLETS.contains(&b.as_str()) {
        return 0.3;
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use breakwire_common::{StoryStatus, ViralityTrend};

    fn ctx(embedding: Vec<f32>) -> SubmissionContext {
        SubmissionContext {
            title: "t".into(),
            description: "d".into(),
            source_domain: Some("example.com".into()),
            category: Some("politics".into()),
            embedding: Some(embedding),
            entities: EntitySet::default(),
            submitted_at: Utc::now(),
        }
    }

    fn candidate(embedding: Vec<f32>, created_at: DateTime<Utc>) -> Story {
        Story {
            id: Uuid::new_v4(),
            title: "candidate".into(),
            description: "d".into(),
            source_domain: Some("example.com".into()),
            category: Some("politics".into()),
            submitter_id: Uuid::new_v4(),
            status: StoryStatus::Active,
            canonical_event_id: None,
            embedding: Some(embedding),
            entities: EntitySet::default(),
            virality_score: 0.0,
            peak_virality_score: 0.0,
            trend: ViralityTrend::Stable,
            kudos_pool: 0,
            kudos_distributed: false,
            created_at,
        }
    }

    #[test]
    fn semantic_floor_excludes_candidate_outright() {
        // cos ≈ 0.45 < 0.50 floor, despite perfect temporal/category/source
        let c = ctx(vec![1.0, 0.0]);
        let cand = candidate(vec![0.45, (1.0f64 - 0.45 * 0.45).sqrt() as f32], Utc::now());
        let scored = score_candidates(&c, &[cand], &MatchConfig::default());
        assert!(scored.is_empty());
    }

    #[test]
    fn candidate_without_embedding_is_skipped() {
        let c = ctx(vec![1.0, 0.0]);
        let mut cand = candidate(vec![1.0, 0.0], Utc::now());
        cand.embedding = None;
        assert!(score_candidates(&c, &[cand], &MatchConfig::default()).is_empty());
    }

    #[test]
    fn identical_everything_scores_near_one() {
        let c = ctx(vec![1.0, 0.0]);
        let mut cand = candidate(vec![1.0, 0.0], Utc::now());
        cand.entities = EntitySet {
            events: vec!["vote".into()],
            ..Default::default()
        };
        let mut c = c;
        c.entities = cand.entities.clone();
        let scored = score_candidates(&c, &[cand], &MatchConfig::default());
        // semantic 1.0*0.35 + entity 0.30*0.35 + temporal 1.0*0.15 + category 1.0*0.10 + source 1.0*0.05
        let expected = 0.35 + 0.30 * 0.35 + 0.15 + 0.10 + 0.05;
        assert!((scored[0].composite - expected).abs() < 1e-9);
    }

    #[test]
    fn composite_is_monotonic_in_each_sub_score() {
        let config = MatchConfig::default();
        let now = Utc::now();
        let c = ctx(vec![1.0, 0.0]);

        // temporal: closer candidate must not score lower
        let near = candidate(vec![1.0, 0.0], now - chrono::Duration::hours(2));
        let far = candidate(vec![1.0, 0.0], now - chrono::Duration::hours(30));
        let s_near = score_candidates(&c, &[near], &config)[0].composite;
        let s_far = score_candidates(&c, &[far], &config)[0].composite;
        assert!(s_near > s_far);

        // semantic: higher cosine must not score lower
        let close = candidate(vec![1.0, 0.1], now);
        let closer = candidate(vec![1.0, 0.0], now);
        let s_close = score_candidates(&c, &[close], &config)[0].composite;
        let s_closer = score_candidates(&c, &[closer], &config)[0].composite;
        assert!(s_closer > s_close);
    }

    #[test]
    fn ties_prefer_fresher_candidate() {
        let now = Utc::now();
        let c = ctx(vec![1.0, 0.0]);
        let older = candidate(vec![1.0, 0.0], now - chrono::Duration::hours(3));
        let newer = candidate(vec![1.0, 0.0], now - chrono::Duration::hours(1));
        let newer_id = newer.id;
        // both within the peak temporal window → identical composites
        let scored = score_candidates(&c, &[older, newer], &MatchConfig::default());
        assert_eq!(scored[0].story_id, newer_id);
    }

    #[test]
    fn output_truncates_to_max_candidates() {
        let config = MatchConfig {
            max_candidates: 3,
            ..Default::default()
        };
        let c = ctx(vec![1.0, 0.0]);
        let candidates: Vec<Story> = (0..10)
            .map(|i| candidate(vec![1.0, 0.0], Utc::now() - chrono::Duration::minutes(i)))
            .collect();
        assert_eq!(score_candidates(&c, &candidates, &config).len(), 3);
    }

    // --- temporal_score ---

    #[test]
    fn temporal_full_within_peak_window() {
        let config = MatchConfig::default();
        let now = Utc::now();
        assert_eq!(
            temporal_score(now, now - chrono::Duration::hours(5), &config),
            1.0
        );
    }

    #[test]
    fn temporal_zero_beyond_decay_window() {
        let config = MatchConfig::default();
        let now = Utc::now();
        assert_eq!(
            temporal_score(now, now - chrono::Duration::hours(72), &config),
            0.0
        );
    }

    #[test]
    fn temporal_linear_midpoint() {
        let config = MatchConfig::default();
        let now = Utc::now();
        // 27h is midway between 6h and 48h
        let score = temporal_score(now, now - chrono::Duration::hours(27), &config);
        assert!((score - 0.5).abs() < 0.01);
    }

    // --- category_score ---

    #[test]
    fn category_exact_adjacent_unknown_unrelated() {
        assert_eq!(category_score(Some("politics"), Some("politics")), 1.0);
        assert_eq!(category_score(Some("politics"), Some("government")), 0.5);
        assert_eq!(category_score(Some("government"), Some("politics")), 0.5);
        assert_eq!(category_score(None, Some("politics")), 0.5);
        assert_eq!(category_score(Some("sports"), Some("science")), 0.0);
    }

    // --- source_score ---

    #[test]
    fn source_same_major_and_unrelated() {
        assert_eq!(source_score(Some("example.com"), Some("example.com")), 1.0);
        assert_eq!(source_score(Some("reuters.com"), Some("bbc.com")), 0.3);
        assert_eq!(source_score(Some("reuters.com"), Some("myblog.net")), 0.0);
        assert_eq!(source_score(None, Some("bbc.com")), 0.0);
    }
}
