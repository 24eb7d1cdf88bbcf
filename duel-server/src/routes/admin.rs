//! Authority-only endpoints: platform stats, rake withdrawal, and forcing a
//! settlement retry. `PersistenceT` has no "list every child" primitive, so
//! the aggregate stats handler reads the raw `users`/`ledgers` subtrees
//! directly rather than through `UserRepo`/`LedgerRepo`, which only address
//! one child at a time.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use duel_core::constants::PLATFORM_VAULT_ADDR;
use duel_core::types::{LedgerEntry, Micros};
use duel_core::Error;

use crate::error::{ApiError, ApiResult, AuthUser};
use crate::state::AppState;

fn require_admin(state: &AppState, address: &str) -> Result<(), ApiError> {
    if state.config.auth.admin_addresses.iter().any(|a| a == address) {
        Ok(())
    } else {
        Err(ApiError(Error::Permission("admin access required".into())))
    }
}

pub async fn check(State(state): State<AppState>, AuthUser(address): AuthUser) -> ApiResult<Value> {
    let is_admin = state.config.auth.admin_addresses.iter().any(|a| a == &address);
    Ok(Json(json!({ "isAdmin": is_admin })))
}

pub async fn stats(State(state): State<AppState>, AuthUser(address): AuthUser) -> ApiResult<Value> {
    require_admin(&state, &address)?;

    let user_count = match state.store.get("users").await? {
        Some(Value::Object(children)) => children.len(),
        _ => 0,
    };

    let (total_locked, vault_balance) = match state.store.get("ledgers").await? {
        Some(Value::Object(children)) => {
            let mut total: Micros = 0;
            let mut vault: Micros = 0;
            for (owner, v) in children {
                let entry: LedgerEntry = serde_json::from_value(v)?;
                if owner == PLATFORM_VAULT_ADDR {
                    vault = entry.total;
                } else {
                    total += entry.total;
                }
            }
            (total, vault)
        }
        _ => (0, 0),
    };

    Ok(Json(json!({
        "userCount": user_count,
        "totalLockedMicros": total_locked,
        "vaultBalanceMicros": vault_balance,
    })))
}

#[derive(Deserialize)]
pub struct WithdrawRakeRequest {
    amount: Micros,
}

pub async fn withdraw_rake(
    State(state): State<AppState>,
    AuthUser(address): AuthUser,
    Json(req): Json<WithdrawRakeRequest>,
) -> ApiResult<Value> {
    require_admin(&state, &address)?;
    if req.amount <= 0 {
        return Err(ApiError(Error::Validation("withdrawal amount must be positive".into())));
    }
    let tx_signature = state
        .ledger
        .process_withdrawal(&PLATFORM_VAULT_ADDR.to_string(), req.amount, state.chain.as_ref())
        .await?;
    Ok(Json(json!({ "txSignature": tx_signature })))
}

pub async fn retry_settlement(
    State(state): State<AppState>,
    AuthUser(address): AuthUser,
    Path(match_id): Path<String>,
) -> ApiResult<Value> {
    require_admin(&state, &address)?;
    state.settlement.retry_onchain_settlement(&match_id).await?;
    Ok(Json(json!({ "retried": true })))
}
