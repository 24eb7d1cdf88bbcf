//! §6.1's auth boundary: nonce issuance and verification. The real
//! wallet-signature check is an explicit non-goal (§1: "authentication/JWT
//! issuance... treated as a thin transport layer over the core"); this
//! implements just the nonce single-use contract and mints the opaque
//! bearer token `duel-core::auth` already defines.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use duel_core::types::User;
use duel_core::Error;
use duel_persistence::UserRepo;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct NonceQuery {
    address: String,
}

pub async fn nonce(State(state): State<AppState>, Query(q): Query<NonceQuery>) -> ApiResult<Value> {
    let nonce = format!("{:08x}{:08x}", rand::random::<u32>(), rand::random::<u32>());
    let message = format!("Sign in to duel-engine. Address: {}. Nonce: {}", q.address, nonce);
    state.nonces.lock().await.insert(q.address.clone(), nonce.clone());
    Ok(Json(json!({ "nonce": nonce, "message": message })))
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    address: String,
    signature: String,
    nonce: String,
}

pub async fn verify(State(state): State<AppState>, Json(req): Json<VerifyRequest>) -> ApiResult<Value> {
    if req.signature.trim().is_empty() {
        return Err(ApiError(Error::Validation("missing signature".into())));
    }

    {
        let mut nonces = state.nonces.lock().await;
        match nonces.remove(&req.address) {
            Some(expected) if expected == req.nonce => {}
            _ => return Err(ApiError(Error::Auth("invalid or already-consumed nonce".into()))),
        }
    }

    let users = UserRepo::new(state.store.clone());
    if users.get(&req.address).await?.is_none() {
        let user = User::new(req.address.clone(), req.address.clone());
        users.set(&user).await?;
        state
            .ledger
            .credit(&req.address, state.config.tuning.demo_balance_micros)
            .await?;
    }

    let token = duel_core::auth::issue_token(&req.address, state.config.auth.token_secret.as_bytes())?;
    Ok(Json(json!({ "token": token, "address": req.address })))
}
