use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use duel_core::types::Micros;
use duel_core::now_ms;
use duel_matchmaking::JoinQueueOutcome;

use crate::error::{ApiResult, AuthUser};
use crate::notify::{duration_label, notify_match_found, parse_duration};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct JoinRequest {
    duration: String,
    bet: Micros,
}

pub async fn join(
    State(state): State<AppState>,
    AuthUser(address): AuthUser,
    Json(req): Json<JoinRequest>,
) -> ApiResult<Value> {
    let duration = parse_duration(&req.duration)?;
    let outcome = state
        .matchmaking
        .join_queue(address, None, duration, req.bet, now_ms())
        .await?;
    match outcome {
        JoinQueueOutcome::Queued => Ok(Json(json!({ "queued": true }))),
        JoinQueueOutcome::Matched { new_match, .. } => {
            notify_match_found(&state, &new_match).await;
            Ok(Json(json!({ "queued": false, "matchId": new_match.id })))
        }
    }
}

#[derive(Deserialize)]
pub struct LeaveRequest {
    duration: Option<String>,
    bet: Option<Micros>,
}

pub async fn leave(
    State(state): State<AppState>,
    AuthUser(address): AuthUser,
    Json(req): Json<LeaveRequest>,
) -> ApiResult<Value> {
    match (req.duration, req.bet) {
        (Some(d), Some(bet)) => {
            let duration = parse_duration(&d)?;
            state.matchmaking.leave_queue(&address, duration, bet).await?;
        }
        _ => {
            state.matchmaking.remove_from_all_queues(&address).await?;
        }
    }
    Ok(Json(json!({ "left": true })))
}

#[derive(Serialize)]
pub struct QueueStatsEntry {
    duration: String,
    bet: Micros,
    count: usize,
}

pub async fn stats(State(state): State<AppState>) -> ApiResult<Vec<QueueStatsEntry>> {
    let stats = state.matchmaking.queue_stats().await?;
    Ok(Json(
        stats
            .into_iter()
            .map(|(duration, bet, count)| QueueStatsEntry { duration: duration_label(duration).into(), bet, count })
            .collect(),
    ))
}
