use serde::{Deserialize, Serialize};

use super::common::{Addr, Micros};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    pub total_pnl: Micros,
    pub games_played: u32,
    pub current_streak: i32,
    pub best_streak: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub address: Addr,
    pub gamer_tag: String,
    pub stats: UserStats,
    pub clan_id: Option<String>,
}

impl User {
    pub fn new(address: Addr, gamer_tag: String) -> Self {
        Self {
            address,
            gamer_tag: sanitize_gamer_tag(&gamer_tag),
            stats: UserStats::default(),
            clan_id: None,
        }
    }
}

/// Strips C0 control characters and DEL, matching spec §3's "sanitised"
/// requirement for gamer tags and chat content alike.
pub fn strip_control_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}

pub fn sanitize_gamer_tag(raw: &str) -> String {
    strip_control_chars(raw).trim().to_string()
}

pub fn validate_gamer_tag(raw: &str) -> Result<String, crate::error::Error> {
    let cleaned = sanitize_gamer_tag(raw);
    if cleaned.is_empty() || cleaned.chars().count() > 16 {
        return Err(crate::error::Error::Validation(
            "gamer tag must be 1-16 printable characters".into(),
        ));
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_characters() {
        assert_eq!(strip_control_chars("ab\u{0007}c\u{007f}d"), "abcd");
    }

    #[test]
    fn rejects_empty_or_overlong_tags() {
        assert!(validate_gamer_tag("\u{0007}").is_err());
        assert!(validate_gamer_tag(&"a".repeat(17)).is_err());
        assert!(validate_gamer_tag("nova").is_ok());
    }
}
