//! Canonical event merge semantics: lowercase-normalized set unions that
//! only ever grow, and are no-ops under retry.

use breakwire_common::{CanonicalEvent, EntitySet, Story};
use chrono::Utc;
use uuid::Uuid;

/// Seed a brand-new canonical event from the story that discovered it.
pub fn seed_from_story(story: &Story) -> CanonicalEvent {
    CanonicalEvent {
        id: Uuid::new_v4(),
        title: story.title.clone(),
        description: story.description.clone(),
        embedding: story.embedding.clone(),
        entities: normalize_entities(&story.entities),
        source_domains: story
            .source_domain
            .iter()
            .map(|d| d.to_lowercase())
            .collect(),
        member_count: 1,
        created_at: Utc::now(),
    }
}

/// Case-insensitive set union into `event`, in place. Returns true if
/// anything actually changed, so callers can skip the write on a retry
/// of an identical merge.
pub fn merge_into(event: &mut CanonicalEvent, entities: &EntitySet, source_domain: Option<&str>) -> bool {
    let mut changed = false;
    changed |= union_category(&mut event.entities.people, &entities.people);
    changed |= union_category(&mut event.entities.organizations, &entities.organizations);
    changed |= union_category(&mut event.entities.locations, &entities.locations);
    changed |= union_category(&mut event.entities.events, &entities.events);
    changed |= union_category(&mut event.entities.dates, &entities.dates);
    changed |= union_category(&mut event.entities.topics, &entities.topics);

    if let Some(domain) = source_domain {
        let domain = domain.to_lowercase();
        if !event.source_domains.contains(&domain) {
            event.source_domains.push(domain);
            changed = true;
        }
    }
    changed
}

/// Lowercase every entity once, dropping case-variant duplicates.
pub fn normalize_entities(entities: &EntitySet) -> EntitySet {
    let mut out = EntitySet::default();
    union_category(&mut out.people, &entities.people);
    union_category(&mut out.organizations, &entities.organizations);
    union_category(&mut out.locations, &entities.locations);
    union_category(&mut out.events, &entities.events);
    union_category(&mut out.dates, &entities.dates);
    union_category(&mut out.topics, &entities.topics);
    out
}

fn union_category(existing: &mut Vec<String>, incoming: &[String]) -> bool {
    let mut changed = false;
    for entity in incoming {
        let normalized = entity.to_lowercase();
        if !existing.contains(&normalized) {
            existing.push(normalized);
            changed = true;
        }
    }
    changed
}
