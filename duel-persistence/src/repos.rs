use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};

use duel_core::types::{
    BalanceEvent, Challenge, LedgerEntry, Match, Position, QueueEntry, User,
};
use duel_core::Result;

use crate::trait_::PersistenceT;

fn encode<T: Serialize>(v: &T) -> Result<Value> {
    Ok(serde_json::to_value(v)?)
}

fn decode<T: DeserializeOwned>(v: Value) -> Result<T> {
    Ok(serde_json::from_value(v)?)
}

/// `users/{address}`.
pub struct UserRepo {
    store: Arc<dyn PersistenceT>,
}

impl UserRepo {
    pub fn new(store: Arc<dyn PersistenceT>) -> Self {
        Self { store }
    }

    pub async fn get(&self, address: &str) -> Result<Option<User>> {
        match self.store.get(&format!("users/{address}")).await? {
            Some(v) => Ok(Some(decode(v)?)),
            None => Ok(None),
        }
    }

    pub async fn set(&self, user: &User) -> Result<()> {
        self.store.set(&format!("users/{}", user.address), encode(user)?).await
    }

    pub async fn update(&self, address: &str, partial: Value) -> Result<()> {
        self.store.update(&format!("users/{address}"), partial).await
    }
}

/// `ledgers/{owner}`.
pub struct LedgerRepo {
    store: Arc<dyn PersistenceT>,
}

impl LedgerRepo {
    pub fn new(store: Arc<dyn PersistenceT>) -> Self {
        Self { store }
    }

    pub async fn get(&self, owner: &str) -> Result<Option<LedgerEntry>> {
        match self.store.get(&format!("ledgers/{owner}")).await? {
            Some(v) => Ok(Some(decode(v)?)),
            None => Ok(None),
        }
    }

    pub async fn set(&self, owner: &str, entry: &LedgerEntry) -> Result<()> {
        self.store.set(&format!("ledgers/{owner}"), encode(entry)?).await
    }
}

/// `balanceEvents/{id}`, append-only audit trail for ledger mutations.
pub struct BalanceEventRepo {
    store: Arc<dyn PersistenceT>,
}

impl BalanceEventRepo {
    pub fn new(store: Arc<dyn PersistenceT>) -> Self {
        Self { store }
    }

    pub async fn push(&self, event: &BalanceEvent) -> Result<String> {
        self.store.push("balanceEvents", encode(event)?).await
    }

    /// Whether a deposit with this on-chain signature has already been
    /// credited, for the idempotent-claim check in `duel-ledger`.
    pub async fn signature_already_used(&self, signature: &str) -> Result<bool> {
        let rows = self
            .store
            .query("balanceEvents", "signature", &json!(signature))
            .await?;
        Ok(!rows.is_empty())
    }

    pub async fn list_for_owner(&self, owner: &str) -> Result<Vec<BalanceEvent>> {
        let rows = self.store.query("balanceEvents", "owner", &json!(owner)).await?;
        rows.into_iter().map(|r| decode(r.value)).collect()
    }
}

/// `matches/{id}`.
pub struct MatchRepo {
    store: Arc<dyn PersistenceT>,
}

impl MatchRepo {
    pub fn new(store: Arc<dyn PersistenceT>) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Match>> {
        match self.store.get(&format!("matches/{id}")).await? {
            Some(v) => Ok(Some(decode(v)?)),
            None => Ok(None),
        }
    }

    pub async fn set(&self, m: &Match) -> Result<()> {
        self.store.set(&format!("matches/{}", m.id), encode(m)?).await
    }

    pub async fn update(&self, id: &str, partial: Value) -> Result<()> {
        self.store.update(&format!("matches/{id}"), partial).await
    }

    pub async fn find_by_status(&self, status: &str) -> Result<Vec<Match>> {
        let rows = self.store.query("matches", "status", &json!(status)).await?;
        rows.into_iter().map(|r| decode(r.value)).collect()
    }
}

/// `positions/{id}`, flat rather than nested under `matches/{id}` so the
/// single-closer mutex (§4.5) and match-end settlement sweep can both
/// address a position by id alone.
pub struct PositionRepo {
    store: Arc<dyn PersistenceT>,
}

impl PositionRepo {
    pub fn new(store: Arc<dyn PersistenceT>) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Position>> {
        match self.store.get(&format!("positions/{id}")).await? {
            Some(v) => Ok(Some(decode(v)?)),
            None => Ok(None),
        }
    }

    pub async fn set(&self, p: &Position) -> Result<()> {
        self.store.set(&format!("positions/{}", p.id), encode(p)?).await
    }

    pub async fn update(&self, id: &str, partial: Value) -> Result<()> {
        self.store.update(&format!("positions/{id}"), partial).await
    }

    pub async fn find_open_for_match(&self, match_id: &str) -> Result<Vec<Position>> {
        let all = self.find_all_for_match(match_id).await?;
        Ok(all.into_iter().filter(|p| p.is_open()).collect())
    }

    /// Includes already-closed positions, for PnL aggregation at settlement
    /// time (§4.11 step 3 needs every position a player touched, not just
    /// the ones still open when the timer fires).
    pub async fn find_all_for_match(&self, match_id: &str) -> Result<Vec<Position>> {
        let rows = self.store.query("positions", "matchId", &json!(match_id)).await?;
        rows.into_iter().map(|r| decode(r.value)).collect()
    }
}

/// `queues/{durationSecs}_{bet}/{player}`, one child tree per `(duration,
/// bet)` key as required by §4.6.
pub struct QueueRepo {
    store: Arc<dyn PersistenceT>,
}

impl QueueRepo {
    pub fn new(store: Arc<dyn PersistenceT>) -> Self {
        Self { store }
    }

    fn queue_path(duration_secs: u64, bet: i64) -> String {
        format!("queues/{duration_secs}_{bet}")
    }

    pub async fn insert(&self, duration_secs: u64, bet: i64, entry: &QueueEntry) -> Result<()> {
        let path = format!("{}/{}", Self::queue_path(duration_secs, bet), entry.player);
        self.store.set(&path, encode(entry)?).await
    }

    pub async fn remove(&self, duration_secs: u64, bet: i64, player: &str) -> Result<()> {
        let path = format!("{}/{}", Self::queue_path(duration_secs, bet), player);
        self.store.remove(&path).await
    }

    pub async fn list(&self, duration_secs: u64, bet: i64) -> Result<Vec<QueueEntry>> {
        let path = Self::queue_path(duration_secs, bet);
        match self.store.get(&path).await? {
            Some(Value::Object(children)) => children
                .into_values()
                .map(decode)
                .collect::<Result<Vec<_>>>(),
            _ => Ok(Vec::new()),
        }
    }
}

/// `challenges/{id}`.
pub struct ChallengeRepo {
    store: Arc<dyn PersistenceT>,
}

impl ChallengeRepo {
    pub fn new(store: Arc<dyn PersistenceT>) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Challenge>> {
        match self.store.get(&format!("challenges/{id}")).await? {
            Some(v) => Ok(Some(decode(v)?)),
            None => Ok(None),
        }
    }

    pub async fn push(&self, challenge: &Challenge) -> Result<String> {
        self.store.push("challenges", encode(challenge)?).await
    }

    pub async fn set(&self, challenge: &Challenge) -> Result<()> {
        self.store
            .set(&format!("challenges/{}", challenge.id), encode(challenge)?)
            .await
    }

    pub async fn update(&self, id: &str, partial: Value) -> Result<()> {
        self.store.update(&format!("challenges/{id}"), partial).await
    }

    pub async fn find_pending(&self) -> Result<Vec<Challenge>> {
        let rows = self.store.query("challenges", "status", &json!("pending")).await?;
        rows.into_iter().map(|r| decode(r.value)).collect()
    }
}
