//! The HTTP surface (§6.1): thin delegation into the core collaborators,
//! wiring handlers onto a single router rather than containing domain
//! logic itself.

mod admin;
mod auth;
mod balance;
mod challenge;
mod match_;
mod queue;
mod user;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::ws::ws_handler;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);
    let middleware = ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/auth/nonce", get(auth::nonce))
        .route("/auth/verify", post(auth::verify))
        .route("/user/:address", get(user::get_user))
        .route("/user/gamer-tag", put(user::set_gamer_tag))
        .route("/balance", get(balance::get_balance))
        .route("/balance/vault", get(balance::vault_address))
        .route("/balance/deposit", post(balance::deposit))
        .route("/balance/withdraw", post(balance::withdraw))
        .route("/balance/transactions", get(balance::transactions))
        .route("/balance/admin/check", get(admin::check))
        .route("/balance/admin/stats", get(admin::stats))
        .route("/balance/admin/withdraw-rake", post(admin::withdraw_rake))
        .route("/queue/join", post(queue::join))
        .route("/queue/leave", delete(queue::leave))
        .route("/queue/stats", get(queue::stats))
        .route("/challenge/pending", get(challenge::pending))
        .route("/challenge/create", post(challenge::create))
        .route("/challenge/:id/accept", post(challenge::accept))
        .route("/challenge/:id/decline", post(challenge::decline))
        .route("/match/:id", get(match_::get_match))
        .route("/match/active/list", get(match_::active_list))
        .route("/match/active/:address", get(match_::active_for_player))
        .route("/match/:id/positions", get(match_::positions))
        .route("/match/history/:address", get(match_::history))
        .route("/match/:id/claim-info", get(match_::claim_info))
        .route("/match/:id/retry-settlement", post(admin::retry_settlement))
        .layer(middleware)
        .with_state(state)
}
