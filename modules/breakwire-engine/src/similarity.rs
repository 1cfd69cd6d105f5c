//! Pure similarity utilities: cosine over embeddings, Jaccard over entity
//! sets, and the category-weighted entity overlap used by the match scorer.

use std::collections::HashSet;

use breakwire_common::EntitySet;

/// Per-category weights for entity overlap. Events identify a story more
/// strongly than the places it happened in.
const ENTITY_WEIGHTS: [(f64, fn(&EntitySet) -> &Vec<String>); 5] = [
    (0.30, |e| &e.events),
    (0.25, |e| &e.people),
    (0.20, |e| &e.organizations),
    (0.15, |e| &e.topics),
    (0.10, |e| &e.locations),
];

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Case-insensitive Jaccard similarity. Two empty sets score 0.0, not 1.0 —
/// absence of evidence is not a match signal.
pub fn jaccard(a: &[String], b: &[String]) -> f64 {
    let set_a: HashSet<String> = a.iter().map(|s| s.to_lowercase()).collect();
    let set_b: HashSet<String> = b.iter().map(|s| s.to_lowercase()).collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    intersection / union
}

/// Weighted per-category Jaccard across entity sets, in [0, 1].
pub fn entity_overlap(a: &EntitySet, b: &EntitySet) -> f64 {
    ENTITY_WEIGHTS
        .iter()
        .map(|(weight, accessor)| weight * jaccard(accessor(a), accessor(b)))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entities(events: &[&str], people: &[&str]) -> EntitySet {
        EntitySet {
            events: events.iter().map(|s| s.to_string()).collect(),
            people: people.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    // --- cosine_similarity tests ---

    #[test]
    fn identical_vectors_similarity_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn orthogonal_vectors_similarity_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-10);
    }

    #[test]
    fn zero_norm_returns_zero() {
        let a = vec![1.0, 2.0];
        let b = vec![0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
        assert_eq!(cosine_similarity(&b, &a), 0.0);
    }

    #[test]
    fn scaled_vectors_are_identical_similarity() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![2.0, 4.0, 6.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-10);
    }

    // --- jaccard tests ---

    #[test]
    fn jaccard_is_case_insensitive() {
        let a = vec!["NASA".to_string(), "SpaceX".to_string()];
        let b = vec!["nasa".to_string(), "spacex".to_string()];
        assert!((jaccard(&a, &b) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn jaccard_partial_overlap() {
        let a = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let b = vec!["b".to_string(), "c".to_string(), "d".to_string()];
        // intersection 2, union 4
        assert!((jaccard(&a, &b) - 0.5).abs() < 1e-10);
    }

    #[test]
    fn both_empty_is_neutral_zero() {
        assert_eq!(jaccard(&[], &[]), 0.0);
    }

    #[test]
    fn one_empty_is_zero() {
        let a = vec!["x".to_string()];
        assert_eq!(jaccard(&a, &[]), 0.0);
    }

    #[test]
    fn duplicate_entries_do_not_inflate() {
        let a = vec!["x".to_string(), "X".to_string(), "x".to_string()];
        let b = vec!["x".to_string()];
        assert!((jaccard(&a, &b) - 1.0).abs() < 1e-10);
    }

    // --- entity_overlap tests ---

    #[test]
    fn entity_weights_sum_to_one() {
        let sum: f64 = ENTITY_WEIGHTS.iter().map(|(w, _)| w).sum();
        assert!((sum - 1.0).abs() < 1e-10);
    }

    #[test]
    fn full_overlap_across_all_categories_is_one() {
        let a = EntitySet {
            people: vec!["p".into()],
            organizations: vec!["o".into()],
            locations: vec!["l".into()],
            events: vec!["e".into()],
            topics: vec!["t".into()],
            ..Default::default()
        };
        assert!((entity_overlap(&a, &a.clone()) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn events_count_more_than_locations() {
        let base = EntitySet::default();
        let event_match = entity_overlap(
            &entities(&["earthquake"], &[]),
            &entities(&["earthquake"], &[]),
        );
        let location_match = entity_overlap(
            &EntitySet {
                locations: vec!["chile".into()],
                ..base.clone()
            },
            &EntitySet {
                locations: vec!["chile".into()],
                ..base
            },
        );
        assert!(event_match > location_match);
        assert!((event_match - 0.30).abs() < 1e-10);
        assert!((location_match - 0.10).abs() < 1e-10);
    }

    #[test]
    fn dates_do_not_contribute() {
        let a = EntitySet {
            dates: vec!["2026-08-01".into()],
            ..Default::default()
        };
        assert_eq!(entity_overlap(&a, &a.clone()), 0.0);
    }
}
