//! Tiered match decisions over scored candidates.

use breakwire_common::MatchConfig;

use crate::match_scorer::ScoredCandidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    ExactMatch,
    LikelyMatch,
    Related,
    NoMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Join the existing event without asking.
    AutoJoin,
    /// Ask the user to confirm before joining.
    ConfirmJoin,
    /// Create a new story.
    CreateNew,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MatchDecision {
    pub kind: MatchKind,
    pub action: SuggestedAction,
    /// Composite score of the best candidate; 0.0 when there is none.
    pub confidence: f64,
    pub reasoning: String,
    pub best_match: Option<ScoredCandidate>,
    /// Remaining candidates, for the informational `related` surface.
    pub candidates: Vec<ScoredCandidate>,
}

/// Apply the tiered thresholds to the top candidate. `scored` must already
/// be sorted descending; the tie-break (fresher story on equal composite)
/// happened in the scorer.
pub fn decide(scored: Vec<ScoredCandidate>, config: &MatchConfig) -> MatchDecision {
    let Some(top) = scored.first().cloned() else {
        return MatchDecision {
            kind: MatchKind::NoMatch,
            action: SuggestedAction::CreateNew,
            confidence: 0.0,
            reasoning: "No sufficiently similar active stories found".to_string(),
            best_match: None,
            candidates: Vec::new(),
        };
    };

    let (kind, action) = if top.composite >= config.exact_threshold {
        (MatchKind::ExactMatch, SuggestedAction::AutoJoin)
    } else if top.composite >= config.likely_threshold {
        (MatchKind::LikelyMatch, SuggestedAction::ConfirmJoin)
    } else if top.composite >= config.related_threshold {
        (MatchKind::Related, SuggestedAction::CreateNew)
    } else {
        (MatchKind::NoMatch, SuggestedAction::CreateNew)
    };

    let reasoning = build_reasoning(kind, &top);
    let candidates = scored.into_iter().skip(1).collect();

    MatchDecision {
        kind,
        action,
        confidence: top.composite,
        reasoning,
        best_match: Some(top),
        candidates,
    }
}

/// Name the sub-scores that carried the decision, for humans reviewing it.
fn build_reasoning(kind: MatchKind, top: &ScoredCandidate) -> String {
    let mut strong = Vec::new();
    if top.scores.semantic >= 0.75 {
        strong.push("near-identical wording");
    } else if top.scores.semantic >= 0.6 {
        strong.push("similar wording");
    }
    if top.scores.entity >= 0.5 {
        strong.push("shared named entities");
    }
    if top.scores.temporal >= 0.8 {
        strong.push("close in time");
    }
    if top.scores.category >= 1.0 {
        strong.push("same category");
    }

    let evidence = if strong.is_empty() {
        "weak overall signals".to_string()
    } else {
        strong.join(", ")
    };

    match kind {
        MatchKind::ExactMatch => format!(
            "Very likely the same event as \"{}\" ({evidence}; composite {:.2})",
            top.title, top.composite
        ),
        MatchKind::LikelyMatch => format!(
            "Probably matches \"{}\" ({evidence}; composite {:.2}) — confirm before joining",
            top.title, top.composite
        ),
        MatchKind::Related => format!(
            "Related to \"{}\" ({evidence}; composite {:.2}) but distinct enough for a new story",
            top.title, top.composite
        ),
        MatchKind::NoMatch => format!(
            "Best candidate \"{}\" scored only {:.2} ({evidence})",
            top.title, top.composite
        ),
    }
}
