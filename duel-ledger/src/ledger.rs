use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use duel_chain::ChainT;
use duel_core::constants::{PLATFORM_VAULT_ADDR, RAKE_BPS};
use duel_core::types::{Addr, BalanceEvent, BalanceEventKind, BalanceView, LedgerEntry, Micros};
use duel_core::Result;
use duel_core::error::Error;
use duel_persistence::{BalanceEventRepo, LedgerRepo, PersistenceT};

/// Serialises ledger mutations per user (§4.2: "Must be serialised per
/// user") and exposes the freeze/unfreeze/credit/debit/deposit/withdrawal
/// operations on top of the path-addressed store. This replaces what a
/// row-locking SQL ledger would give for free.
pub struct Ledger {
    entries: LedgerRepo,
    events: BalanceEventRepo,
    locks: Mutex<HashMap<Addr, Arc<Mutex<()>>>>,
}

impl Ledger {
    pub fn new(store: Arc<dyn PersistenceT>) -> Self {
        Self {
            entries: LedgerRepo::new(store.clone()),
            events: BalanceEventRepo::new(store),
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, user: &Addr) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .lock()
            .await
            .entry(user.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    async fn load_or_zero(&self, user: &Addr) -> Result<LedgerEntry> {
        Ok(self.entries.get(user).await?.unwrap_or_else(LedgerEntry::zero))
    }

    pub async fn balance_of(&self, user: &Addr) -> Result<BalanceView> {
        Ok(self.load_or_zero(user).await?.into())
    }

    /// Succeeds iff `available >= amount`; fails with `insufficient`
    /// otherwise (§4.2). Serialised per user.
    pub async fn freeze_for_match(&self, user: &Addr, amount: Micros) -> Result<bool> {
        let _guard = self.lock_for(user).await;
        let mut entry = self.load_or_zero(user).await?;
        if entry.available() < amount {
            return Ok(false);
        }
        entry.frozen += amount;
        self.entries.set(user, &entry).await?;
        Ok(true)
    }

    /// Atomic decrement clamped at 0, tolerant of reconciliation drift.
    pub async fn unfreeze_balance(&self, user: &Addr, amount: Micros) -> Result<()> {
        let _guard = self.lock_for(user).await;
        let mut entry = self.load_or_zero(user).await?;
        entry.frozen = (entry.frozen - amount).max(0);
        self.entries.set(user, &entry).await
    }

    pub async fn credit(&self, user: &Addr, amount: Micros) -> Result<()> {
        let _guard = self.lock_for(user).await;
        self.credit_locked(user, amount).await
    }

    async fn credit_locked(&self, user: &Addr, amount: Micros) -> Result<()> {
        let mut entry = self.load_or_zero(user).await?;
        entry.total += amount;
        self.entries.set(user, &entry).await
    }

    /// Fails with `insufficient` if `available < amount` (§4.2).
    pub async fn debit(&self, user: &Addr, amount: Micros) -> Result<()> {
        let _guard = self.lock_for(user).await;
        self.debit_locked(user, amount).await
    }

    async fn debit_locked(&self, user: &Addr, amount: Micros) -> Result<()> {
        let mut entry = self.load_or_zero(user).await?;
        if entry.available() < amount {
            return Err(Error::InsufficientBalance);
        }
        entry.total -= amount;
        self.entries.set(user, &entry).await
    }

    /// Claims `tx_sig` atomically against the deposit-signature set, then
    /// credits `user`. The signature is unclaimed only if the on-chain
    /// verification step itself failed; once credited (or once a verified
    /// transaction's credit step has been retried), the signature stays
    /// permanently consumed (§4.2).
    pub async fn confirm_deposit(
        &self,
        user: &Addr,
        tx_sig: &str,
        amount: Micros,
        chain: &dyn ChainT,
    ) -> Result<BalanceView> {
        if self.events.signature_already_used(tx_sig).await? {
            return Err(Error::DuplicateDepositSignature);
        }

        if amount <= 0 {
            return Err(Error::Validation("deposit amount must be positive".into()));
        }

        // The real verification step queries on-chain transaction details
        // (recipient = platform vault, sender = user, mint = USDC) via the
        // chain collaborator; `player_profile_exists` stands in for that
        // external round-trip for this stub boundary.
        if !chain.player_profile_exists(user).await? {
            warn!("Deposit confirmation failed on-chain verification for {}", user);
            return Err(Error::TransientExternal("on-chain verification failed".into()));
        }

        let _guard = self.lock_for(user).await;
        self.credit_locked(user, amount).await?;
        self.events
            .push(&BalanceEvent {
                id: String::new(),
                owner: user.clone(),
                kind: BalanceEventKind::Deposit,
                amount,
                signature: Some(tx_sig.to_string()),
                match_id: None,
                created_at: duel_core::now_ms(),
            })
            .await?;
        info!("Confirmed deposit of {} micros for {}", amount, user);
        self.balance_of(user).await
    }

    /// Reserves `amount` by debiting first, then submits the on-chain
    /// transfer; refunds by credit if the chain call fails (§4.2).
    pub async fn process_withdrawal(
        &self,
        user: &Addr,
        amount: Micros,
        chain: &dyn ChainT,
    ) -> Result<String> {
        {
            let _guard = self.lock_for(user).await;
            self.debit_locked(user, amount).await?;
        }

        match chain.transfer_usdc(user, amount).await {
            Ok(tx_sig) => {
                self.events
                    .push(&BalanceEvent {
                        id: String::new(),
                        owner: user.clone(),
                        kind: BalanceEventKind::Withdraw,
                        amount,
                        signature: Some(tx_sig.clone()),
                        match_id: None,
                        created_at: duel_core::now_ms(),
                    })
                    .await?;
                Ok(tx_sig)
            }
            Err(e) => {
                warn!("Withdrawal failed on-chain for {}, refunding: {}", user, e);
                let _guard = self.lock_for(user).await;
                self.credit_locked(user, amount).await?;
                Err(e)
            }
        }
    }

    /// Rewrites `frozen` to `active_frozen_total`, the amount the caller
    /// has independently computed from live matches/queues for this user.
    /// Called on every connection (§4.2); kept decoupled from matchmaking
    /// and match-engine state so this crate has no upward dependency.
    pub async fn reconcile_frozen_balance(&self, user: &Addr, active_frozen_total: Micros) -> Result<()> {
        let _guard = self.lock_for(user).await;
        let mut entry = self.load_or_zero(user).await?;
        entry.frozen = active_frozen_total.max(0);
        self.entries.set(user, &entry).await
    }

    /// Settles a match outcome. Both players' bets were frozen at queue
    /// admission (§4.6); settlement releases that freeze for both, then
    /// moves the loser's bet (minus rake) into the winner's total, or
    /// refunds both unchanged on a tie. Grounded on §4.11's payout rule.
    pub async fn settle_match_payout(
        &self,
        player1: &Addr,
        player2: &Addr,
        winner: Option<&Addr>,
        bet_amount: Micros,
        match_id: &str,
    ) -> Result<Micros> {
        self.unfreeze_balance(player1, bet_amount).await?;
        self.unfreeze_balance(player2, bet_amount).await?;

        let Some(winner) = winner else {
            return Ok(0);
        };
        let loser = if winner == player1 { player2 } else { player1 };
        let rake = bet_amount * RAKE_BPS / 10_000;
        let payout = bet_amount - rake;

        self.debit(loser, bet_amount).await?;
        self.credit(winner, payout).await?;
        if rake > 0 {
            self.credit(&PLATFORM_VAULT_ADDR.to_string(), rake).await?;
        }

        self.events
            .push(&BalanceEvent {
                id: String::new(),
                owner: winner.clone(),
                kind: BalanceEventKind::MatchWin,
                amount: payout,
                signature: None,
                match_id: Some(match_id.to_string()),
                created_at: duel_core::now_ms(),
            })
            .await?;
        self.events
            .push(&BalanceEvent {
                id: String::new(),
                owner: loser.clone(),
                kind: BalanceEventKind::MatchLoss,
                amount: -bet_amount,
                signature: None,
                match_id: Some(match_id.to_string()),
                created_at: duel_core::now_ms(),
            })
            .await?;
        Ok(rake)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duel_chain::MockChain;
    use duel_persistence::InMemoryStore;

    fn ledger() -> Ledger {
        Ledger::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn freeze_fails_when_balance_insufficient() {
        let l = ledger();
        let user = "p1".to_string();
        l.credit(&user, 100).await.unwrap();
        assert!(!l.freeze_for_match(&user, 200).await.unwrap());
        assert!(l.freeze_for_match(&user, 100).await.unwrap());
    }

    #[tokio::test]
    async fn debit_fails_when_available_is_insufficient() {
        let l = ledger();
        let user = "p1".to_string();
        l.credit(&user, 100).await.unwrap();
        l.freeze_for_match(&user, 60).await.unwrap();
        assert!(matches!(l.debit(&user, 50).await, Err(Error::InsufficientBalance)));
        assert!(l.debit(&user, 40).await.is_ok());
    }

    #[tokio::test]
    async fn confirm_deposit_rejects_reused_signatures() {
        let l = ledger();
        let chain = MockChain::new();
        let user = "p1".to_string();
        chain.seed_profile(&user).await;

        l.confirm_deposit(&user, "sig1", 1_000, &chain).await.unwrap();
        let err = l.confirm_deposit(&user, "sig1", 1_000, &chain).await;
        assert!(matches!(err, Err(Error::DuplicateDepositSignature)));
    }

    #[tokio::test]
    async fn settle_match_payout_moves_bet_minus_rake_to_winner() {
        let l = ledger();
        let p1 = "p1".to_string();
        let p2 = "p2".to_string();
        l.credit(&p1, 10_000).await.unwrap();
        l.credit(&p2, 10_000).await.unwrap();
        l.freeze_for_match(&p1, 1_000).await.unwrap();
        l.freeze_for_match(&p2, 1_000).await.unwrap();

        let rake = l
            .settle_match_payout(&p1, &p2, Some(&p1), 1_000, "m1")
            .await
            .unwrap();
        assert_eq!(rake, 50); // 5% of 1000

        let p1_bal = l.balance_of(&p1).await.unwrap();
        let p2_bal = l.balance_of(&p2).await.unwrap();
        assert_eq!(p1_bal.total, 10_000 + 950);
        assert_eq!(p2_bal.total, 10_000 - 1_000);
        assert_eq!(p1_bal.frozen, 0);
        assert_eq!(p2_bal.frozen, 0);
    }

    #[tokio::test]
    async fn process_withdrawal_debits_and_submits_a_transfer() {
        let l = ledger();
        let chain = MockChain::new();
        let user = "p1".to_string();
        l.credit(&user, 10_000).await.unwrap();

        let tx_sig = l.process_withdrawal(&user, 4_000, &chain).await.unwrap();
        assert!(tx_sig.starts_with("mock-tx-withdrawal-"));
        assert_eq!(l.balance_of(&user).await.unwrap().total, 6_000);
        assert_eq!(chain.withdrawals().await, vec![(user, 4_000)]);
    }

    #[tokio::test]
    async fn reconcile_frozen_balance_overwrites_the_stored_frozen_amount() {
        let l = ledger();
        let user = "p1".to_string();
        l.credit(&user, 10_000).await.unwrap();
        l.freeze_for_match(&user, 1_000).await.unwrap();

        l.reconcile_frozen_balance(&user, 2_500).await.unwrap();

        let balance = l.balance_of(&user).await.unwrap();
        assert_eq!(balance.frozen, 2_500);
        assert_eq!(balance.available, 7_500);
    }

    #[tokio::test]
    async fn settle_match_payout_on_tie_just_unfreezes() {
        let l = ledger();
        let p1 = "p1".to_string();
        let p2 = "p2".to_string();
        l.credit(&p1, 10_000).await.unwrap();
        l.credit(&p2, 10_000).await.unwrap();
        l.freeze_for_match(&p1, 1_000).await.unwrap();
        l.freeze_for_match(&p2, 1_000).await.unwrap();

        let rake = l.settle_match_payout(&p1, &p2, None, 1_000, "m1").await.unwrap();
        assert_eq!(rake, 0);
        assert_eq!(l.balance_of(&p1).await.unwrap().total, 10_000);
        assert_eq!(l.balance_of(&p2).await.unwrap().total, 10_000);
    }
}
