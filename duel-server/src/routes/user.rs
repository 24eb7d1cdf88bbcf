use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use duel_core::types::{validate_gamer_tag, User};
use duel_core::Error;
use duel_persistence::UserRepo;

use crate::error::{ApiResult, AuthUser};
use crate::state::AppState;

pub async fn get_user(State(state): State<AppState>, Path(address): Path<String>) -> ApiResult<User> {
    let user = UserRepo::new(state.store.clone())
        .get(&address)
        .await?
        .ok_or_else(|| Error::UserNotFound(address.clone()))?;
    Ok(Json(user))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetGamerTagRequest {
    gamer_tag: String,
}

pub async fn set_gamer_tag(
    State(state): State<AppState>,
    AuthUser(address): AuthUser,
    Json(req): Json<SetGamerTagRequest>,
) -> ApiResult<User> {
    let cleaned = validate_gamer_tag(&req.gamer_tag)?;
    let users = UserRepo::new(state.store.clone());
    let mut user = users
        .get(&address)
        .await?
        .ok_or_else(|| Error::UserNotFound(address.clone()))?;
    user.gamer_tag = cleaned;
    users.set(&user).await?;
    Ok(Json(user))
}
