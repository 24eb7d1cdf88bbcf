use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use duel_core::types::{BalanceEvent, BalanceView, Micros};
use duel_core::Error;
use duel_persistence::BalanceEventRepo;

use crate::error::{ApiError, ApiResult, AuthUser};
use crate::state::AppState;

pub async fn get_balance(State(state): State<AppState>, AuthUser(address): AuthUser) -> ApiResult<BalanceView> {
    Ok(Json(state.ledger.balance_of(&address).await?))
}

pub async fn vault_address(State(state): State<AppState>) -> ApiResult<Value> {
    let pda = state.chain.get_platform_pda().await?;
    Ok(Json(json!({ "address": pda })))
}

/// `confirmDeposit` (§4.2) needs an amount to credit; a real on-chain
/// collaborator would read it off the verified transaction itself, but
/// `duel-chain`'s mock has no transaction-lookup surface, so the caller
/// supplies it and the mock's `player_profile_exists` stands in for the
/// recipient/sender/mint verification step.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    tx_signature: String,
    amount: Micros,
}

pub async fn deposit(
    State(state): State<AppState>,
    AuthUser(address): AuthUser,
    Json(req): Json<DepositRequest>,
) -> ApiResult<Value> {
    let balance = state
        .ledger
        .confirm_deposit(&address, &req.tx_signature, req.amount, state.chain.as_ref())
        .await?;
    Ok(Json(json!({ "newBalance": balance })))
}

#[derive(Deserialize)]
pub struct WithdrawRequest {
    amount: Micros,
}

pub async fn withdraw(
    State(state): State<AppState>,
    AuthUser(address): AuthUser,
    Json(req): Json<WithdrawRequest>,
) -> ApiResult<Value> {
    if req.amount <= 0 {
        return Err(ApiError(Error::Validation("withdrawal amount must be positive".into())));
    }
    let tx_signature = state
        .ledger
        .process_withdrawal(&address, req.amount, state.chain.as_ref())
        .await?;
    Ok(Json(json!({ "txSignature": tx_signature })))
}

fn default_limit() -> usize {
    50
}

#[derive(Deserialize)]
pub struct TransactionsQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

pub async fn transactions(
    State(state): State<AppState>,
    AuthUser(address): AuthUser,
    Query(q): Query<TransactionsQuery>,
) -> ApiResult<Vec<BalanceEvent>> {
    let mut events = BalanceEventRepo::new(state.store.clone()).list_for_owner(&address).await?;
    events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    events.truncate(q.limit);
    Ok(Json(events))
}
