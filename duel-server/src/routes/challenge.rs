//! Direct-challenge flow: a lightweight alternative to queue pairing where
//! one player invites another by address (§3's `Challenge` record). Bet
//! freezing and match creation follow the same shape as matchmaking
//! (`duel-matchmaking::Matchmaking::join_queue`), just triggered by an
//! accept instead of a second queue entry.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use duel_core::types::{is_allowed_bet, Challenge, ChallengeStatus, Match, MatchDuration, Micros};
use duel_core::{now_ms, Error};
use duel_persistence::{ChallengeRepo, MatchRepo};

use crate::error::{ApiError, ApiResult, AuthUser};
use crate::notify::notify_match_found;
use crate::state::AppState;

pub async fn pending(State(state): State<AppState>, AuthUser(address): AuthUser) -> ApiResult<Vec<Challenge>> {
    let now = now_ms();
    let challenges = ChallengeRepo::new(state.store.clone())
        .find_pending()
        .await?
        .into_iter()
        .filter(|c| (c.from == address || c.to == address) && !c.is_expired(now))
        .collect();
    Ok(Json(challenges))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    to_address: String,
    duration: MatchDuration,
    bet: Micros,
}

pub async fn create(
    State(state): State<AppState>,
    AuthUser(address): AuthUser,
    Json(req): Json<CreateRequest>,
) -> ApiResult<Challenge> {
    if req.to_address == address {
        return Err(ApiError(Error::Validation("cannot challenge yourself".into())));
    }
    if !is_allowed_bet(req.bet) {
        return Err(ApiError(Error::Validation("bet is not one of the allowed sizes".into())));
    }
    if !state.ledger.freeze_for_match(&address, req.bet).await? {
        return Err(ApiError(Error::InsufficientBalance));
    }

    let now = now_ms();
    let challenges = ChallengeRepo::new(state.store.clone());
    let challenge = Challenge {
        id: String::new(),
        from: address,
        to: req.to_address,
        duration: req.duration,
        bet: req.bet,
        status: ChallengeStatus::Pending,
        created_at: now,
        expires_at: now + state.config.tuning.challenge_expiry_ms,
        match_id: None,
    };
    let id = challenges.push(&challenge).await?;
    let mut saved = challenge;
    saved.id = id;
    challenges.set(&saved).await?;
    Ok(Json(saved))
}

async fn load_pending_challenge_as_recipient(
    state: &AppState,
    id: &str,
    caller: &str,
) -> Result<Challenge, ApiError> {
    let challenge = ChallengeRepo::new(state.store.clone())
        .get(id)
        .await?
        .ok_or_else(|| Error::ChallengeNotFound(id.to_string()))?;
    if challenge.to != caller {
        return Err(ApiError(Error::Permission("only the challenged player may respond".into())));
    }
    if challenge.status != ChallengeStatus::Pending || challenge.is_expired(now_ms()) {
        return Err(ApiError(Error::Validation("challenge is no longer pending".into())));
    }
    Ok(challenge)
}

pub async fn accept(
    State(state): State<AppState>,
    AuthUser(address): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Match> {
    let mut challenge = load_pending_challenge_as_recipient(&state, &id, &address).await?;

    if !state.ledger.freeze_for_match(&address, challenge.bet).await? {
        return Err(ApiError(Error::InsufficientBalance));
    }

    let now = now_ms();
    let matches = MatchRepo::new(state.store.clone());
    let match_id = state.store.push("matches", Value::Null).await.map_err(ApiError)?;
    let new_match = Match::new_active(match_id, challenge.from.clone(), address, challenge.duration, challenge.bet, now);
    matches.set(&new_match).await?;

    challenge.status = ChallengeStatus::Matched;
    challenge.match_id = Some(new_match.id.clone());
    ChallengeRepo::new(state.store.clone()).set(&challenge).await?;

    notify_match_found(&state, &new_match).await;
    Ok(Json(new_match))
}

pub async fn decline(
    State(state): State<AppState>,
    AuthUser(address): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Challenge> {
    let mut challenge = load_pending_challenge_as_recipient(&state, &id, &address).await?;
    state.ledger.unfreeze_balance(&challenge.from, challenge.bet).await?;
    challenge.status = ChallengeStatus::Declined;
    ChallengeRepo::new(state.store.clone()).set(&challenge).await?;
    Ok(Json(challenge))
}
