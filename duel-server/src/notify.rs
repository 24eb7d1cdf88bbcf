//! Small helpers shared between the WS command handlers and the HTTP routes
//! that can also produce a freshly-paired match (queue admission, challenge
//! acceptance): looking up a gamer tag, rendering a duration label, and
//! pushing the `match_found` push to both players via their user rooms
//! rather than a direct socket write, so it works regardless of which
//! surface triggered the pairing.

use duel_core::types::{Addr, Match, MatchDuration};
use duel_core::Error;
use duel_persistence::UserRepo;
use duel_session::ServerMessage;

use crate::state::AppState;

pub fn parse_duration(raw: &str) -> Result<MatchDuration, Error> {
    match raw {
        "5m" => Ok(MatchDuration::FiveMinutes),
        "15m" => Ok(MatchDuration::FifteenMinutes),
        "1h" => Ok(MatchDuration::OneHour),
        "4h" => Ok(MatchDuration::FourHours),
        "24h" => Ok(MatchDuration::TwentyFourHours),
        other => Err(Error::Validation(format!("unknown match duration {other}"))),
    }
}

pub fn duration_label(d: MatchDuration) -> &'static str {
    match d {
        MatchDuration::FiveMinutes => "5m",
        MatchDuration::FifteenMinutes => "15m",
        MatchDuration::OneHour => "1h",
        MatchDuration::FourHours => "4h",
        MatchDuration::TwentyFourHours => "24h",
    }
}

pub async fn gamer_tag_of(state: &AppState, address: &Addr) -> String {
    UserRepo::new(state.store.clone())
        .get(address)
        .await
        .ok()
        .flatten()
        .map(|u| u.gamer_tag)
        .unwrap_or_else(|| address.clone())
}

pub async fn notify_match_found(state: &AppState, m: &Match) {
    let p1_tag = gamer_tag_of(state, &m.player1).await;
    let p2_tag = gamer_tag_of(state, &m.player2).await;
    let label = duration_label(m.duration).to_string();
    state
        .sessions
        .broadcast_to_user(
            &m.player1,
            ServerMessage::MatchFound {
                match_id: m.id.clone(),
                opponent_tag: p2_tag,
                duration: label.clone(),
                bet: m.bet_amount,
                start_time: m.start_time,
                end_time: m.end_time,
            },
        )
        .await;
    state
        .sessions
        .broadcast_to_user(
            &m.player2,
            ServerMessage::MatchFound {
                match_id: m.id.clone(),
                opponent_tag: p1_tag,
                duration: label,
                bet: m.bet_amount,
                start_time: m.start_time,
                end_time: m.end_time,
            },
        )
        .await;
}
