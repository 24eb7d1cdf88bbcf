//! Read-only match views: a single match, the active list, a player's
//! active match, its positions, history, and the claim summary a client
//! renders after settlement. No mutation lives here — everything that
//! changes a match goes through the WS command handlers or the match
//! actor (`duel-match-engine`) instead.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use duel_core::now_ms;
use duel_core::Error;
use duel_persistence::MatchRepo;
use duel_position_engine::PositionEngine;
use duel_settlement::active_match_is_stale;

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn get_match(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let m = MatchRepo::new(state.store.clone())
        .get(&id)
        .await?
        .ok_or_else(|| Error::MatchNotFound(id))?;
    Ok(Json(serde_json::to_value(m)?))
}

const ACTIVE_STATUSES: [&str; 2] = ["active", "awaiting_deposits"];
const TERMINAL_STATUSES: [&str; 4] = ["completed", "tied", "forfeited", "cancelled"];

pub async fn active_list(State(state): State<AppState>) -> ApiResult<Value> {
    let matches = MatchRepo::new(state.store.clone());
    let mut all = Vec::new();
    for status in ACTIVE_STATUSES {
        all.extend(matches.find_by_status(status).await?);
    }
    Ok(Json(serde_json::to_value(all)?))
}

pub async fn active_for_player(State(state): State<AppState>, Path(address): Path<String>) -> ApiResult<Value> {
    let matches = MatchRepo::new(state.store.clone());
    let now = now_ms();
    for status in ACTIVE_STATUSES {
        for m in matches.find_by_status(status).await? {
            if !m.has_player(&address) {
                continue;
            }
            if active_match_is_stale(&m, now, state.config.tuning.active_stale_ms, state.config.tuning.deposit_stale_ms) {
                continue;
            }
            return Ok(Json(serde_json::to_value(m)?));
        }
    }
    Ok(Json(Value::Null))
}

pub async fn positions(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let engine = PositionEngine::new(state.store.clone(), state.closing.clone());
    let positions = engine.all_positions_for_match(&id).await?;
    Ok(Json(serde_json::to_value(positions)?))
}

fn default_page() -> usize {
    1
}
fn default_limit() -> usize {
    20
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_page")]
    page: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

pub async fn history(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> ApiResult<Value> {
    let matches = MatchRepo::new(state.store.clone());
    let mut mine = Vec::new();
    for status in TERMINAL_STATUSES {
        for m in matches.find_by_status(status).await? {
            if m.has_player(&address) {
                mine.push(m);
            }
        }
    }
    mine.sort_by(|a, b| b.settled_at.unwrap_or(b.end_time).cmp(&a.settled_at.unwrap_or(a.end_time)));

    let page = q.page.max(1);
    let start = (page - 1) * q.limit;
    let page_items: Vec<_> = mine.into_iter().skip(start).take(q.limit).collect();
    Ok(Json(serde_json::to_value(page_items)?))
}

pub async fn claim_info(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let m = MatchRepo::new(state.store.clone())
        .get(&id)
        .await?
        .ok_or_else(|| Error::MatchNotFound(id))?;
    Ok(Json(json!({
        "matchId": m.id,
        "status": m.status,
        "winner": m.winner,
        "player1Roi": m.player1_roi,
        "player2Roi": m.player2_roi,
        "onChainSettled": m.on_chain_settled,
        "settledAt": m.settled_at,
    })))
}
