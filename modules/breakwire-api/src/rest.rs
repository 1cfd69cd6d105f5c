//! REST handlers for the public and admin surfaces.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use breakwire_common::{BreakwireError, UserReputation};
use breakwire_engine::{IntakeOutcome, SubmissionRequest};

use crate::AppState;

const DEFAULT_PAGE: i64 = 50;
const MAX_PAGE: i64 = 100;

// --- Query structs ---

#[derive(Deserialize)]
pub struct LeaderboardQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Deserialize)]
pub struct ViralityQuery {
    /// Number of history snapshots to return.
    history: Option<i64>,
}

// --- Helpers ---

fn error_response(e: BreakwireError) -> Response {
    let status = match &e {
        BreakwireError::Validation(_) => StatusCode::BAD_REQUEST,
        BreakwireError::NotFound { .. } => StatusCode::NOT_FOUND,
        BreakwireError::Conflict(_) | BreakwireError::IllegalTransition { .. } => {
            StatusCode::CONFLICT
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!(error = %e, "Request failed");
    }
    (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
}

fn page_bounds(query: &LeaderboardQuery) -> (i64, i64) {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    let offset = query.offset.unwrap_or(0).max(0);
    (limit, offset)
}

fn leaderboard_json(entries: &[UserReputation], weekly: bool) -> serde_json::Value {
    let rows: Vec<serde_json::Value> = entries
        .iter()
        .map(|r| {
            serde_json::json!({
                "userId": r.user_id,
                "kudos": if weekly { r.weekly_kudos } else { r.total_kudos },
                "rank": if weekly { r.weekly_rank } else { r.all_time_rank },
            })
        })
        .collect();
    serde_json::json!({ "entries": rows })
}

// --- Handlers ---

/// Dry-run matching: decision, confidence, reasoning, best match,
/// candidates, and the extracted entities. Writes nothing.
pub async fn api_match_check(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmissionRequest>,
) -> Response {
    match state.intake.match_check(&body).await {
        Ok(check) => Json(check).into_response(),
        Err(e) => error_response(e),
    }
}

/// Full submission intake. `forceNew` bypasses matching; `discoverStoryId`
/// confirms a previously suggested match.
pub async fn api_submit(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmissionRequest>,
) -> Response {
    match state.intake.submit(body).await {
        Ok(outcome) => {
            let status = match &outcome {
                IntakeOutcome::Created { .. } => StatusCode::CREATED,
                _ => StatusCode::OK,
            };
            (status, Json(outcome)).into_response()
        }
        Err(e) => error_response(e),
    }
}

pub async fn api_story_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    let key = format!("stories:{id}");
    if let Some(cached) = state.cache.get(&key) {
        return Json(cached).into_response();
    }
    match state.store.story_by_id(id).await {
        Ok(story) => {
            let value = serde_json::json!(story);
            state.cache.put(&key, value.clone());
            Json(value).into_response()
        }
        Err(e) => error_response(e),
    }
}

pub async fn api_story_virality(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<ViralityQuery>,
) -> Response {
    let history = query.history.unwrap_or(20).clamp(1, MAX_PAGE);
    let window = state.engine_config.virality.decay_window as i64;

    let story = match state.store.story_by_id(id).await {
        Ok(story) => story,
        Err(e) => return error_response(e),
    };
    let snapshots = match state.store.recent_snapshots(id, history.max(window)).await {
        Ok(snapshots) => snapshots,
        Err(e) => return error_response(e),
    };
    let verdict = state.detector.assess(&snapshots, story.peak_virality_score);

    let history: Vec<serde_json::Value> = snapshots
        .iter()
        .take(history as usize)
        .map(|s| {
            serde_json::json!({
                "score": s.score,
                "velocityChange": s.velocity_change,
                "trend": s.trend,
                "recordedAt": s.recorded_at,
            })
        })
        .collect();

    Json(serde_json::json!({
        "storyId": story.id,
        "current": story.virality_score,
        "peak": story.peak_virality_score,
        "trend": story.trend,
        "isDecaying": verdict.decaying,
        "decayReason": verdict.reason,
        "history": history,
    }))
    .into_response()
}

pub async fn api_leaderboard_weekly(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LeaderboardQuery>,
) -> Response {
    let (limit, offset) = page_bounds(&query);
    let key = format!("leaderboards:weekly:{limit}:{offset}");
    if let Some(cached) = state.cache.get(&key) {
        return Json(cached).into_response();
    }
    match state.store.weekly_leaderboard(limit, offset).await {
        Ok(entries) => {
            let value = leaderboard_json(&entries, true);
            state.cache.put(&key, value.clone());
            Json(value).into_response()
        }
        Err(e) => error_response(e),
    }
}

pub async fn api_leaderboard_alltime(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LeaderboardQuery>,
) -> Response {
    let (limit, offset) = page_bounds(&query);
    let key = format!("leaderboards:alltime:{limit}:{offset}");
    if let Some(cached) = state.cache.get(&key) {
        return Json(cached).into_response();
    }
    match state.store.all_time_leaderboard(limit, offset).await {
        Ok(entries) => {
            let value = leaderboard_json(&entries, false);
            state.cache.put(&key, value.clone());
            Json(value).into_response()
        }
        Err(e) => error_response(e),
    }
}

pub async fn api_user_reputation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.store.reputation(id).await {
        Ok(rep) => Json(serde_json::json!({
            "userId": rep.user_id,
            "totalKudos": rep.total_kudos,
            "weeklyKudos": rep.weekly_kudos,
            "allTimeRank": rep.all_time_rank,
            "weeklyRank": rep.weekly_rank,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// Manual settlement for one story. Idempotent: an already-settled story
/// comes back as a not-eligible outcome, not an error.
pub async fn api_admin_settle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.settlement.settle_story(id).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_bounds_clamp_limit_and_offset() {
        let q = LeaderboardQuery {
            limit: Some(10_000),
            offset: Some(-5),
        };
        assert_eq!(page_bounds(&q), (MAX_PAGE, 0));

        let q = LeaderboardQuery {
            limit: None,
            offset: None,
        };
        assert_eq!(page_bounds(&q), (DEFAULT_PAGE, 0));
    }

    #[test]
    fn leaderboard_json_picks_the_right_board() {
        let rep = UserReputation {
            user_id: Uuid::new_v4(),
            total_kudos: 900,
            weekly_kudos: 120,
            all_time_rank: Some(3),
            weekly_rank: Some(1),
        };
        let weekly = leaderboard_json(std::slice::from_ref(&rep), true);
        assert_eq!(weekly["entries"][0]["kudos"], 120);
        assert_eq!(weekly["entries"][0]["rank"], 1);

        let all_time = leaderboard_json(&[rep], false);
        assert_eq!(all_time["entries"][0]["kudos"], 900);
        assert_eq!(all_time["entries"][0]["rank"], 3);
    }
}
