//! Submission intake: embed and extract entities (degrading gracefully when
//! the provider is down), score against live stories, then join the matched
//! event or create a fresh story.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use ai_client::{EmbedAgent, EntityAgent};
use breakwire_common::{
    BreakwireError, EntitySet, MatchConfig, Story, StoryStatus, Submission, ViralityTrend,
};
use breakwire_store::{ReadCache, Store};

use crate::canonical;
use crate::match_decision::{decide, MatchDecision, SuggestedAction};
use crate::match_scorer::{score_candidates, SubmissionContext};

/// An incoming discovery from a user.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Skip matching entirely and create a new story.
    #[serde(default)]
    pub force_new: bool,
    /// Confirm a previously suggested match and join that story.
    #[serde(default)]
    pub discover_story_id: Option<Uuid>,
}

/// Match-check result: the decision plus the entities extracted along the
/// way, so the client can display what was recognized.
#[derive(Debug, serde::Serialize)]
pub struct MatchCheck {
    #[serde(flatten)]
    pub decision: MatchDecision,
    pub entities: EntitySet,
}

#[derive(Debug, serde::Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IntakeOutcome {
    /// A new story was created, with this user as original discoverer.
    Created {
        story: Story,
        submission_id: Uuid,
        /// True when the provider was unavailable and the story carries no
        /// embedding or canonical event.
        degraded: bool,
    },
    /// The submission joined an existing story.
    Joined {
        story_id: Uuid,
        submission_id: Uuid,
    },
    /// A likely (but not certain) match: nothing was written; the client
    /// should confirm and resubmit with `discoverStoryId` or `forceNew`.
    NeedsConfirmation { decision: MatchDecision },
}

pub struct IntakeEngine {
    store: Store,
    embedder: Arc<dyn EmbedAgent>,
    extractor: Arc<dyn EntityAgent>,
    config: MatchConfig,
    cache: Arc<ReadCache>,
}

impl IntakeEngine {
    pub fn new(
        store: Store,
        embedder: Arc<dyn EmbedAgent>,
        extractor: Arc<dyn EntityAgent>,
        config: MatchConfig,
        cache: Arc<ReadCache>,
    ) -> Self {
        Self {
            store,
            embedder,
            extractor,
            config,
            cache,
        }
    }

    /// Dry-run matching for the pre-submission check endpoint. Writes
    /// nothing.
    pub async fn match_check(
        &self,
        request: &SubmissionRequest,
    ) -> Result<MatchCheck, BreakwireError> {
        let ctx = self.analyze(request).await;
        let decision = self.match_against_live(&ctx).await?;
        Ok(MatchCheck {
            decision,
            entities: ctx.entities,
        })
    }

    /// Full intake: analyze, match, then join or create.
    pub async fn submit(
        &self,
        request: SubmissionRequest,
    ) -> Result<IntakeOutcome, BreakwireError> {
        self.store.ensure_user(request.user_id).await?;

        let ctx = self.analyze(&request).await;

        // User already confirmed a suggested match.
        if let Some(story_id) = request.discover_story_id {
            return self.join_story(story_id, &request, &ctx).await;
        }
        if request.force_new {
            return self.create_story(&request, ctx).await;
        }

        let decision = self.match_against_live(&ctx).await?;
        match decision.action {
            SuggestedAction::AutoJoin => {
                // decide() only returns AutoJoin with a best match present
                let Some(best) = decision.best_match.as_ref() else {
                    return self.create_story(&request, ctx).await;
                };
                info!(story_id = %best.story_id, confidence = decision.confidence,
                    "Auto-joining exact match");
                self.join_story(best.story_id, &request, &ctx).await
            }
            SuggestedAction::ConfirmJoin => Ok(IntakeOutcome::NeedsConfirmation { decision }),
            SuggestedAction::CreateNew => self.create_story(&request, ctx).await,
        }
    }

    /// Embed and extract entities. Provider failure on either side degrades
    /// the context instead of failing the submission.
    async fn analyze(&self, request: &SubmissionRequest) -> SubmissionContext {
        let text = format!("{}\n{}", request.title, request.description);
        let embedding = match self.embedder.embed(&text).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!(error = %e, "Embedding unavailable, degraded matching");
                None
            }
        };
        let entities = match self
            .extractor
            .extract_entities(&request.title, &request.description, request.url.as_deref())
            .await
        {
            Ok(entities) => entities,
            Err(e) => {
                warn!(error = %e, "Entity extraction unavailable, empty entity set");
                EntitySet::default()
            }
        };

        SubmissionContext {
            title: request.title.clone(),
            description: request.description.clone(),
            source_domain: request.url.as_deref().and_then(domain_from_url),
            category: request.category.clone(),
            embedding,
            entities,
            submitted_at: Utc::now(),
        }
    }

    async fn match_against_live(
        &self,
        ctx: &SubmissionContext,
    ) -> Result<MatchDecision, BreakwireError> {
        let candidates = self
            .store
            .match_candidates(self.config.candidate_fetch_limit)
            .await?;
        let scored = score_candidates(ctx, &candidates, &self.config);
        Ok(decide(scored, &self.config))
    }

    /// New story plus, when the embedding is available, its canonical event.
    /// Degraded stories stay pending without an event link.
    async fn create_story(
        &self,
        request: &SubmissionRequest,
        ctx: SubmissionContext,
    ) -> Result<IntakeOutcome, BreakwireError> {
        let degraded = ctx.embedding.is_none();
        let mut story = Story {
            id: Uuid::new_v4(),
            title: request.title.clone(),
            description: request.description.clone(),
            source_domain: ctx.source_domain.clone(),
            category: request.category.clone(),
            submitter_id: request.user_id,
            status: if degraded {
                StoryStatus::Pending
            } else {
                StoryStatus::Active
            },
            canonical_event_id: None,
            embedding: ctx.embedding,
            entities: ctx.entities,
            virality_score: 0.0,
            peak_virality_score: 0.0,
            trend: ViralityTrend::Stable,
            kudos_pool: 0,
            kudos_distributed: false,
            created_at: ctx.submitted_at,
        };
        self.store.insert_story(&story).await?;

        if !degraded {
            let event = canonical::seed_from_story(&story);
            self.store.insert_canonical_event(&event).await?;
            self.store.set_canonical_event(story.id, event.id).await?;
            story.canonical_event_id = Some(event.id);
        }

        let submission = Submission {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            story_id: story.id,
            submitted_at: ctx.submitted_at,
            is_original_discoverer: true,
            kudos_earned: None,
        };
        self.store.insert_submission(&submission).await?;
        self.cache.invalidate_prefix("stories:*");

        info!(story_id = %story.id, degraded, "Story created");
        Ok(IntakeOutcome::Created {
            story,
            submission_id: submission.id,
            degraded,
        })
    }

    /// Record the discovery on an existing story and fold the new entities
    /// into its canonical event. A duplicate (user, story) pair surfaces as
    /// a conflict before any merge happens.
    async fn join_story(
        &self,
        story_id: Uuid,
        request: &SubmissionRequest,
        ctx: &SubmissionContext,
    ) -> Result<IntakeOutcome, BreakwireError> {
        let story = self.store.story_by_id(story_id).await?;

        let submission = Submission {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            story_id,
            submitted_at: ctx.submitted_at,
            is_original_discoverer: false,
            kudos_earned: None,
        };
        self.store.insert_submission(&submission).await?;

        if let Some(event_id) = story.canonical_event_id {
            // Concurrent joins serialize on the event row lock, so every
            // merge folds into the unions the previous one committed.
            let mut tx = self.store.begin().await?;
            let mut event = self.store.lock_canonical_event(&mut tx, event_id).await?;
            canonical::merge_into(&mut event, &ctx.entities, ctx.source_domain.as_deref());
            self.store
                .apply_canonical_merge(&mut tx, event.id, &event.entities, &event.source_domains)
                .await?;
            tx.commit().await.map_err(|e| BreakwireError::Database(e.to_string()))?;
        }
        self.cache.invalidate_prefix("stories:*");

        info!(%story_id, user_id = %request.user_id, "Submission joined story");
        Ok(IntakeOutcome::Joined {
            story_id,
            submission_id: submission.id,
        })
    }
}

/// Host of the submitted URL, lowercased, without a leading `www.`.
fn domain_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.trim_start_matches("www.").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_strips_www_and_lowercases() {
        assert_eq!(
            domain_from_url("https://WWW.Example.COM/a/b?c=1"),
            Some("example.com".to_string())
        );
    }

    #[test]
    fn domain_keeps_subdomains() {
        assert_eq!(
            domain_from_url("https://news.example.com/story"),
            Some("news.example.com".to_string())
        );
    }

    #[test]
    fn unparseable_url_yields_none() {
        assert_eq!(domain_from_url("not a url"), None);
        assert_eq!(domain_from_url(""), None);
    }
}
