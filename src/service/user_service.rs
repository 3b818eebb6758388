//! Users and balance mutations.
//!
//! [`UserService::adjust_balance`] is the only path that changes a balance.
//! It locks the user row, rejects overdrafts, writes the new balance, appends
//! the paired history row and stages a [`LedgerEvent::BalanceChanged`], all
//! inside the caller's unit of work.

use crate::domain::{
    BalanceChange, BalanceHistory, DiscordId, HistoryRefs, LedgerEvent, NewBalanceHistory,
    TransactionType, User,
};
use crate::error::{LedgerError, Result};
use crate::persistence::{StoreTransaction, UserRepository};

use super::UnitOfWork;

/// Most history rows returned by one [`UserService::balance_history`] call.
pub const MAX_HISTORY_LIMIT: i64 = 100;

/// User and balance operations bound to one unit of work.
#[derive(Debug)]
pub struct UserService<'a, T: StoreTransaction> {
    uow: &'a mut UnitOfWork<T>,
}

impl<'a, T: StoreTransaction> UserService<'a, T> {
    pub(crate) fn new(uow: &'a mut UnitOfWork<T>) -> Self {
        Self { uow }
    }

    /// Returns the user, creating it with the starting balance if missing.
    ///
    /// An existing user is returned unchanged; no balance moves.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ReadOnlyScope`] for the global scope, or a
    /// persistence error.
    pub async fn get_or_create_user(
        &mut self,
        discord_id: DiscordId,
        username: &str,
    ) -> Result<User> {
        self.uow.ensure_writable()?;
        let starting_balance = self.uow.settings().starting_balance;
        let user =
            UserRepository::create(self.uow.repo()?, discord_id, username, starting_balance)
                .await?;
        tracing::debug!(guild_id = %user.guild_id, %discord_id, "user ensured");
        Ok(user)
    }

    /// Fetches an existing user.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if the user does not exist.
    pub async fn get_user(&mut self, discord_id: DiscordId) -> Result<User> {
        UserRepository::get_by_id(self.uow.repo()?, discord_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("user", discord_id))
    }

    /// Applies a signed balance change and records it.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] if `delta` is zero or overflows.
    /// - [`LedgerError::NotFound`] if the user does not exist.
    /// - [`LedgerError::InsufficientFunds`] if the debit exceeds the balance.
    pub async fn adjust_balance(
        &mut self,
        discord_id: DiscordId,
        delta: i64,
        transaction_type: TransactionType,
        refs: HistoryRefs,
    ) -> Result<BalanceChange> {
        self.uow.ensure_writable()?;
        if delta == 0 {
            return Err(LedgerError::InvalidAmount { amount: delta });
        }
        let guild_id = self.uow.guild_id();
        let now = self.uow.now();
        let repo = self.uow.repo()?;

        let user = repo
            .get_for_update(discord_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("user", discord_id))?;
        let before = user.balance;
        let after = before
            .checked_add(delta)
            .ok_or(LedgerError::InvalidAmount { amount: delta })?;
        if after < 0 {
            return Err(LedgerError::InsufficientFunds {
                discord_id,
                balance: before,
                required: delta.saturating_neg(),
            });
        }

        repo.update_balance(discord_id, after).await?;
        repo.record(&NewBalanceHistory {
            discord_id,
            balance_before: before,
            balance_after: after,
            transaction_type,
            refs,
        })
        .await?;

        self.uow.stage(LedgerEvent::BalanceChanged {
            guild_id,
            discord_id,
            old_balance: before,
            new_balance: after,
            change_amount: delta,
            transaction_type,
            timestamp: now,
        });

        tracing::info!(
            %guild_id,
            %discord_id,
            before,
            after,
            %transaction_type,
            "balance adjusted"
        );
        Ok(BalanceChange {
            discord_id,
            before,
            after,
        })
    }

    /// Moves `amount` from one user to another.
    ///
    /// Both rows are locked in ascending id order before either changes, so
    /// two opposite transfers cannot deadlock each other.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] if `amount <= 0`.
    /// - [`LedgerError::SelfTransfer`] if sender and recipient are the same.
    /// - [`LedgerError::NotFound`] if either user does not exist.
    /// - [`LedgerError::InsufficientFunds`] if the sender cannot cover it.
    pub async fn transfer(
        &mut self,
        from: DiscordId,
        to: DiscordId,
        amount: i64,
    ) -> Result<(BalanceChange, BalanceChange)> {
        self.uow.ensure_writable()?;
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount { amount });
        }
        if from == to {
            return Err(LedgerError::SelfTransfer);
        }

        let (first, second) = if from < to { (from, to) } else { (to, from) };
        let repo = self.uow.repo()?;
        for id in [first, second] {
            if repo.get_for_update(id).await?.is_none() {
                return Err(LedgerError::not_found("user", id));
            }
        }

        let sent = self
            .adjust_balance(from, -amount, TransactionType::TransferOut, HistoryRefs::none())
            .await?;
        let received = self
            .adjust_balance(to, amount, TransactionType::TransferIn, HistoryRefs::none())
            .await?;
        Ok((sent, received))
    }

    /// Returns the richest user of the guild, lowest id first on ties.
    ///
    /// # Errors
    ///
    /// Returns a persistence error.
    pub async fn get_current_high_roller(&mut self) -> Result<Option<User>> {
        self.uow.repo()?.top_by_balance().await
    }

    /// Returns a user's history, newest first, capped at
    /// [`MAX_HISTORY_LIMIT`] rows.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if the user does not exist.
    pub async fn balance_history(
        &mut self,
        discord_id: DiscordId,
        limit: i64,
    ) -> Result<Vec<BalanceHistory>> {
        self.get_user(discord_id).await?;
        let limit = limit.clamp(1, MAX_HISTORY_LIMIT);
        self.uow.repo()?.list_for_user(discord_id, limit).await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use tokio_test::assert_ok;

    use super::super::test_support::{
        GUILD, OTHER_GUILD, STARTING_BALANCE, TestLedger, alice, bob, carol,
    };
    use super::*;

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let t = TestLedger::new();
        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let first = assert_ok!(uow.users().get_or_create_user(alice(), "alice").await);
        let second = assert_ok!(uow.users().get_or_create_user(alice(), "renamed").await);
        assert_eq!(first, second);
        assert_eq!(second.balance, STARTING_BALANCE);
        assert!(uow.staged().is_empty());
    }

    #[tokio::test]
    async fn adjust_balance_records_history_and_stages_event() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice()]).await);

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let change = assert_ok!(
            uow.users()
                .adjust_balance(alice(), -250, TransactionType::Bet, HistoryRefs::none())
                .await
        );
        assert_eq!((change.before, change.after), (1_000, 750));
        assert_eq!(uow.staged().len(), 1);
        let history = assert_ok!(uow.users().balance_history(alice(), 10).await);
        let Some(row) = history.first() else {
            panic!("history row missing");
        };
        assert_eq!(row.change_amount, -250);
        assert_eq!(row.transaction_type, TransactionType::Bet);
    }

    #[tokio::test]
    async fn overdraft_fails_and_leaves_balance_unchanged() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice()]).await);

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let result = uow
            .users()
            .adjust_balance(alice(), -1_001, TransactionType::Bet, HistoryRefs::none())
            .await;
        let Err(LedgerError::InsufficientFunds {
            discord_id,
            balance,
            required,
        }) = result
        else {
            panic!("expected insufficient funds, got {result:?}");
        };
        assert_eq!((discord_id, balance, required), (alice(), 1_000, 1_001));
        assert!(uow.staged().is_empty());
        drop(uow);

        assert_eq!(assert_ok!(t.balance(GUILD, alice()).await), 1_000);
    }

    #[tokio::test]
    async fn zero_delta_is_rejected() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice()]).await);
        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let result = uow
            .users()
            .adjust_balance(alice(), 0, TransactionType::Bet, HistoryRefs::none())
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidAmount { amount: 0 })));
    }

    #[tokio::test]
    async fn transfer_moves_funds_between_users() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice(), bob()]).await);

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let (sent, received) = assert_ok!(uow.users().transfer(alice(), bob(), 300).await);
        assert_eq!(sent.delta(), -300);
        assert_eq!(received.delta(), 300);
        assert_ok!(uow.commit().await);

        assert_eq!(assert_ok!(t.balance(GUILD, alice()).await), 700);
        assert_eq!(assert_ok!(t.balance(GUILD, bob()).await), 1_300);
    }

    #[tokio::test]
    async fn transfer_validation() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice(), bob()]).await);
        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);

        let zero = uow.users().transfer(alice(), bob(), 0).await;
        assert!(matches!(zero, Err(LedgerError::InvalidAmount { .. })));
        let selfie = uow.users().transfer(alice(), alice(), 5).await;
        assert!(matches!(selfie, Err(LedgerError::SelfTransfer)));
        let missing = uow.users().transfer(alice(), carol(), 5).await;
        assert!(matches!(missing, Err(LedgerError::NotFound { .. })));
        let broke = uow.users().transfer(alice(), bob(), 5_000).await;
        assert!(matches!(broke, Err(LedgerError::InsufficientFunds { .. })));
    }

    #[tokio::test]
    async fn failed_transfer_leaves_nothing_behind() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice(), bob()]).await);

        {
            let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
            assert_ok!(uow.users().transfer(alice(), bob(), 100).await);
            // Second debit fails; the whole unit of work is abandoned.
            let result = uow.users().transfer(alice(), bob(), 950).await;
            assert!(result.is_err());
        }

        assert_eq!(assert_ok!(t.balance(GUILD, alice()).await), 1_000);
        assert_eq!(assert_ok!(t.balance(GUILD, bob()).await), 1_000);
        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let history = assert_ok!(uow.users().balance_history(alice(), 10).await);
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn balance_equals_start_plus_history() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice(), bob(), carol()]).await);

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        assert_ok!(uow.users().transfer(alice(), bob(), 120).await);
        assert_ok!(uow.users().transfer(bob(), carol(), 400).await);
        assert_ok!(uow.users().transfer(carol(), alice(), 75).await);
        assert_ok!(uow.commit().await);

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        for id in [alice(), bob(), carol()] {
            let user = assert_ok!(uow.users().get_user(id).await);
            let history = assert_ok!(uow.users().balance_history(id, MAX_HISTORY_LIMIT).await);
            let sum: i64 = history.iter().map(|h| h.change_amount).sum();
            assert_eq!(user.balance, STARTING_BALANCE + sum);
        }
        assert_eq!(t.store.total_balance(GUILD).await, 3 * STARTING_BALANCE);
    }

    #[tokio::test]
    async fn high_roller_prefers_lowest_id_on_tie() {
        let t = TestLedger::new();
        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        assert!(assert_ok!(uow.users().get_current_high_roller().await).is_none());
        drop(uow);

        assert_ok!(t.seed_with_balance(GUILD, carol(), 5_000).await);
        assert_ok!(t.seed_with_balance(GUILD, bob(), 5_000).await);
        assert_ok!(t.seed_with_balance(GUILD, alice(), 10).await);
        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let Some(top) = assert_ok!(uow.users().get_current_high_roller().await) else {
            panic!("guild has users");
        };
        assert_eq!(top.discord_id, bob());
    }

    #[tokio::test]
    async fn guilds_are_isolated() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice(), bob()]).await);
        assert_ok!(t.seed(OTHER_GUILD, &[alice()]).await);

        let mut uow = assert_ok!(t.ledger.begin(OTHER_GUILD).await);
        let result = uow.users().transfer(alice(), bob(), 10).await;
        assert!(matches!(result, Err(LedgerError::NotFound { .. })));
    }

    #[tokio::test]
    async fn concurrent_transfers_do_not_lose_updates() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice(), bob()]).await);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = t.ledger.clone();
            handles.push(tokio::spawn(async move {
                let mut uow = ledger.begin(GUILD).await?;
                uow.users().transfer(alice(), bob(), 10).await?;
                uow.commit().await
            }));
        }
        for handle in handles {
            let Ok(result) = handle.await else {
                panic!("transfer task panicked");
            };
            assert_ok!(result);
        }

        assert_eq!(assert_ok!(t.balance(GUILD, alice()).await), 900);
        assert_eq!(assert_ok!(t.balance(GUILD, bob()).await), 1_100);
    }
}
