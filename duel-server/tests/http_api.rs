//! End-to-end HTTP coverage for the clean-match path: two players sign in,
//! deposit, join the queue, get paired, and the queue stats endpoint
//! reflects the state in between. Driven in-process via `tower::
//! ServiceExt::oneshot` against the router `duel-server` builds for real,
//! no network socket involved.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use duel_env::Config;
use duel_server::routes::build_router;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn post(router: &axum::Router, uri: &str, token: Option<&str>, body: Value) -> axum::response::Response {
    let mut builder = Request::builder().method("POST").uri(uri).header("content-type", "application/json");
    if let Some(t) = token {
        builder = builder.header("authorization", format!("Bearer {t}"));
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();
    router.clone().oneshot(request).await.unwrap()
}

async fn get(router: &axum::Router, uri: &str, token: Option<&str>) -> axum::response::Response {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(t) = token {
        builder = builder.header("authorization", format!("Bearer {t}"));
    }
    router.clone().oneshot(builder.body(Body::empty()).unwrap()).await.unwrap()
}

async fn sign_in(router: &axum::Router, address: &str) -> String {
    let nonce_resp = get(router, &format!("/auth/nonce?address={address}"), None).await;
    assert_eq!(nonce_resp.status(), StatusCode::OK);
    let nonce_body = body_json(nonce_resp).await;
    let nonce = nonce_body["nonce"].as_str().unwrap().to_string();

    let verify_resp = post(
        router,
        "/auth/verify",
        None,
        json!({ "address": address, "signature": "any-non-empty-signature", "nonce": nonce }),
    )
    .await;
    assert_eq!(verify_resp.status(), StatusCode::OK);
    let verify_body = body_json(verify_resp).await;
    verify_body["token"].as_str().unwrap().to_string()
}

fn router() -> axum::Router {
    let (state, _shutdowns) = duel_server::build_state(Config::default());
    build_router(state)
}

#[tokio::test]
async fn sign_in_credits_a_demo_balance() {
    let router = router();
    let token = sign_in(&router, "player-one").await;

    let balance_resp = get(&router, "/balance", Some(&token)).await;
    assert_eq!(balance_resp.status(), StatusCode::OK);
    let balance = body_json(balance_resp).await;
    assert_eq!(balance["total"], Config::default().tuning.demo_balance_micros);
    assert_eq!(balance["frozen"], 0);
}

#[tokio::test]
async fn balance_requires_a_bearer_token() {
    let router = router();
    let resp = get(&router, "/balance", None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn two_players_joining_the_same_queue_slot_get_paired() {
    let router = router();
    let token_a = sign_in(&router, "player-a").await;
    let token_b = sign_in(&router, "player-b").await;

    let join_a = post(&router, "/queue/join", Some(&token_a), json!({ "duration": "5m", "bet": 10_000_000 })).await;
    assert_eq!(join_a.status(), StatusCode::OK);
    let join_a_body = body_json(join_a).await;
    assert_eq!(join_a_body["queued"], true);

    let stats_resp = get(&router, "/queue/stats", None).await;
    let stats = body_json(stats_resp).await;
    assert_eq!(stats.as_array().unwrap().len(), 1);
    assert_eq!(stats[0]["count"], 1);

    let join_b = post(&router, "/queue/join", Some(&token_b), json!({ "duration": "5m", "bet": 10_000_000 })).await;
    assert_eq!(join_b.status(), StatusCode::OK);
    let join_b_body = body_json(join_b).await;
    assert_eq!(join_b_body["queued"], false);
    let match_id = join_b_body["matchId"].as_str().unwrap().to_string();

    let match_resp = get(&router, &format!("/match/{match_id}"), None).await;
    assert_eq!(match_resp.status(), StatusCode::OK);
    let m = body_json(match_resp).await;
    assert_eq!(m["status"], "active");
    assert_eq!(m["betAmount"], 10_000_000);

    let empty_stats_resp = get(&router, "/queue/stats", None).await;
    let empty_stats = body_json(empty_stats_resp).await;
    assert!(empty_stats.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn challenge_accept_creates_a_match_and_freezes_both_bets() {
    let router = router();
    let token_a = sign_in(&router, "challenger").await;
    let token_b = sign_in(&router, "challenged").await;

    let create_resp = post(
        &router,
        "/challenge/create",
        Some(&token_a),
        json!({ "toAddress": "challenged", "duration": "15m", "bet": 20_000_000 }),
    )
    .await;
    assert_eq!(create_resp.status(), StatusCode::OK);
    let challenge = body_json(create_resp).await;
    let challenge_id = challenge["id"].as_str().unwrap().to_string();

    let accept_resp = post(&router, &format!("/challenge/{challenge_id}/accept"), Some(&token_b), json!({})).await;
    assert_eq!(accept_resp.status(), StatusCode::OK);
    let m = body_json(accept_resp).await;
    assert_eq!(m["status"], "active");

    let balance_a = body_json(get(&router, "/balance", Some(&token_a)).await).await;
    assert_eq!(balance_a["frozen"], 20_000_000);
    let balance_b = body_json(get(&router, "/balance", Some(&token_b)).await).await;
    assert_eq!(balance_b["frozen"], 20_000_000);
}

#[tokio::test]
async fn admin_endpoints_are_forbidden_without_admin_allowlist_membership() {
    let router = router();
    let token = sign_in(&router, "not-an-admin").await;
    let resp = get(&router, "/balance/admin/stats", Some(&token)).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}
