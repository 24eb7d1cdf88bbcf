//! Configuration of the duel engine.

use std::path::Path;

use serde::Deserialize;
use tokio::{fs::File, io::AsyncReadExt};

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC signing secret for the opaque bearer tokens minted by `duel-core::auth`.
    pub token_secret: String,
    /// Addresses allowed to call the `/balance/admin/*` and
    /// `/match/:id/retry-settlement` endpoints (§6.1's "authority-only").
    #[serde(default)]
    pub admin_addresses: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: "dev-insecure-secret-do-not-use-in-production".into(),
            admin_addresses: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub endpoint: String,
    #[serde(default)]
    pub use_mock: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:12002".into(),
            use_mock: true,
        }
    }
}

/// The tunables named in `duel_core::constants`, externalized so operators
/// can adjust them without recompiling. Defaults mirror the constants.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub price_max_age_ms: u64,
    pub forfeit_grace_ms: u64,
    pub auth_timeout_ms: u64,
    pub ws_ping_interval_ms: u64,
    pub pong_timeout_ms: u64,
    pub ws_rate_limit_max: u32,
    pub ws_rate_limit_window_ms: u64,
    pub ws_max_message_bytes: usize,
    pub max_connections_per_user: usize,
    pub opponent_broadcast_interval_ms: u64,
    pub price_feed_interval_ms: u64,
    pub settlement_interval_ms: u64,
    pub tie_eps: f64,
    pub demo_balance_micros: i64,
    pub rake_bps: i64,
    pub chat_max_length: usize,
    pub active_stale_ms: u64,
    pub deposit_stale_ms: u64,
    pub challenge_expiry_ms: u64,
    pub challenge_expiry_sweep_ms: u64,
    pub settlement_retry_sweep_ms: u64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        use duel_core::constants::*;
        Self {
            price_max_age_ms: PRICE_MAX_AGE_MS,
            forfeit_grace_ms: FORFEIT_GRACE_MS,
            auth_timeout_ms: AUTH_TIMEOUT_MS,
            ws_ping_interval_ms: WS_PING_INTERVAL_MS,
            pong_timeout_ms: PONG_TIMEOUT_MS,
            ws_rate_limit_max: WS_RATE_LIMIT_MAX,
            ws_rate_limit_window_ms: WS_RATE_LIMIT_WINDOW_MS,
            ws_max_message_bytes: WS_MAX_MESSAGE_BYTES,
            max_connections_per_user: MAX_CONNECTIONS_PER_USER,
            opponent_broadcast_interval_ms: OPPONENT_BROADCAST_INTERVAL_MS,
            price_feed_interval_ms: PRICE_FEED_INTERVAL_MS,
            settlement_interval_ms: SETTLEMENT_INTERVAL_MS,
            tie_eps: TIE_EPS,
            demo_balance_micros: DEMO_BALANCE_MICROS,
            rake_bps: RAKE_BPS,
            chat_max_length: CHAT_MAX_LENGTH,
            active_stale_ms: ACTIVE_STALE_MS,
            deposit_stale_ms: DEPOSIT_STALE_MS,
            challenge_expiry_ms: CHALLENGE_EXPIRY_MS,
            challenge_expiry_sweep_ms: CHALLENGE_EXPIRY_SWEEP_MS,
            settlement_retry_sweep_ms: SETTLEMENT_RETRY_SWEEP_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PersistenceConfig {
    /// Path to a storage backend, when the in-memory store is not used.
    /// Left unset by the dev/test config; `duel-persistence` falls back to
    /// `InMemoryStore`.
    pub data_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub chain: ChainConfig,
    pub tuning: TuningConfig,
    pub persistence: PersistenceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            chain: ChainConfig::default(),
            tuning: TuningConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl Config {
    pub async fn from_path(path: &Path) -> Config {
        tracing::info!("Loading configuration from {:?}", path);
        let mut buf = String::with_capacity(1024);
        let mut f = File::open(path)
            .await
            .unwrap_or_else(|e| panic!("Config file not found at {:?}: {}", path, e));
        f.read_to_string(&mut buf)
            .await
            .expect("Failed to read config file");
        match toml::from_str(&buf) {
            Ok(config) => config,
            Err(e) => panic!("Invalid config file: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_core_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.tuning.tie_eps, duel_core::constants::TIE_EPS);
        assert_eq!(cfg.server.port, 8080);
    }

    #[test]
    fn parses_a_partial_toml_document() {
        let toml_str = r#"
            [server]
            port = 9090

            [auth]
            token_secret = "abc123"

            [chain]
            endpoint = "http://localhost:12002"
        "#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.auth.token_secret, "abc123");
        assert_eq!(cfg.tuning.rake_bps, duel_core::constants::RAKE_BPS);
    }
}
