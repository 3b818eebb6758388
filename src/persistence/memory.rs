//! In-memory implementation of the persistence layer.
//!
//! [`MemoryStore`] keeps all guilds in one [`MemoryState`] behind a
//! `tokio::sync::Mutex`. Beginning a transaction takes the lock for the
//! whole transaction and works on a private copy of the state; commit writes
//! the copy back, rollback (or drop) discards it. Transactions therefore run
//! strictly one after another, which is stronger than the row locks the
//! PostgreSQL store takes. Holding two transactions at once from the same
//! task deadlocks.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    BalanceHistoryRepository, BetRepository, GroupWagerRepository, Store, StoreTransaction,
    UserRepository, WagerRepository, WagerVoteRepository,
};
use crate::domain::{
    BalanceHistory, Bet, BetId, DiscordId, GroupWager, GroupWagerDetail, GroupWagerId,
    GroupWagerOption, GroupWagerParticipant, GroupWagerState, GuildId, NewBalanceHistory, NewBet,
    NewGroupWager, NewWager, OptionId, User, Wager, WagerId, WagerState, WagerVote,
};
use crate::error::{LedgerError, Result};

/// Complete contents of a [`MemoryStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    users: BTreeMap<(GuildId, DiscordId), User>,
    history: Vec<BalanceHistory>,
    bets: Vec<Bet>,
    wagers: BTreeMap<WagerId, Wager>,
    votes: Vec<WagerVote>,
    group_wagers: BTreeMap<GroupWagerId, GroupWager>,
    options: Vec<GroupWagerOption>,
    participants: Vec<GroupWagerParticipant>,
    last_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn group_wager_in(&self, guild_id: GuildId, id: GroupWagerId) -> Option<&GroupWager> {
        self.group_wagers.get(&id).filter(|w| w.guild_id == guild_id)
    }
}

/// Store that keeps everything in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next [`StoreTransaction::commit`] fail with
    /// [`LedgerError::Persistence`] and discard its writes.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Sum of all balances in a guild.
    pub async fn total_balance(&self, guild_id: GuildId) -> i64 {
        self.state
            .lock()
            .await
            .users
            .values()
            .filter(|u| u.guild_id == guild_id)
            .map(|u| u.balance)
            .sum()
    }

    /// Sum of the pots of all non-terminal group wagers in a guild.
    pub async fn open_pots(&self, guild_id: GuildId) -> i64 {
        self.state
            .lock()
            .await
            .group_wagers
            .values()
            .filter(|w| w.guild_id == guild_id && !w.state.is_terminal())
            .map(|w| w.total_pot)
            .sum()
    }
}

impl Store for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self, guild_id: GuildId) -> Result<MemoryTransaction> {
        let shared = Arc::clone(&self.state).lock_owned().await;
        let working = shared.clone();
        Ok(MemoryTransaction {
            guild_id,
            shared,
            working,
            fail_next_commit: Arc::clone(&self.fail_next_commit),
        })
    }
}

/// One open in-memory transaction scoped to a guild.
pub struct MemoryTransaction {
    guild_id: GuildId,
    shared: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_next_commit: Arc<AtomicBool>,
}

impl fmt::Debug for MemoryTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransaction")
            .field("guild_id", &self.guild_id)
            .finish_non_exhaustive()
    }
}

impl StoreTransaction for MemoryTransaction {
    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    async fn commit(self) -> Result<()> {
        let Self {
            mut shared,
            working,
            fail_next_commit,
            ..
        } = self;
        if fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::Persistence("commit failed".to_string()));
        }
        *shared = working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

impl UserRepository for MemoryTransaction {
    async fn get_by_id(&mut self, discord_id: DiscordId) -> Result<Option<User>> {
        Ok(self.working.users.get(&(self.guild_id, discord_id)).cloned())
    }

    async fn get_for_update(&mut self, discord_id: DiscordId) -> Result<Option<User>> {
        Ok(self.working.users.get(&(self.guild_id, discord_id)).cloned())
    }

    async fn create(
        &mut self,
        discord_id: DiscordId,
        username: &str,
        balance: i64,
    ) -> Result<User> {
        let guild_id = self.guild_id;
        let user = self
            .working
            .users
            .entry((guild_id, discord_id))
            .or_insert_with(|| {
                let now = Utc::now();
                User {
                    discord_id,
                    guild_id,
                    username: username.to_string(),
                    balance,
                    created_at: now,
                    updated_at: now,
                }
            });
        Ok(user.clone())
    }

    async fn update_balance(&mut self, discord_id: DiscordId, balance: i64) -> Result<()> {
        let user = self
            .working
            .users
            .get_mut(&(self.guild_id, discord_id))
            .ok_or_else(|| LedgerError::not_found("user", discord_id))?;
        if balance < 0 {
            return Err(LedgerError::Persistence(format!(
                "balance check violated for user {discord_id}"
            )));
        }
        user.balance = balance;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn top_by_balance(&mut self) -> Result<Option<User>> {
        let top = self
            .working
            .users
            .values()
            .filter(|u| u.guild_id == self.guild_id)
            .min_by(|a, b| {
                b.balance
                    .cmp(&a.balance)
                    .then_with(|| a.discord_id.cmp(&b.discord_id))
            });
        Ok(top.cloned())
    }
}

impl BalanceHistoryRepository for MemoryTransaction {
    async fn record(&mut self, entry: &NewBalanceHistory) -> Result<BalanceHistory> {
        if !self
            .working
            .users
            .contains_key(&(self.guild_id, entry.discord_id))
        {
            return Err(LedgerError::not_found("user", entry.discord_id));
        }
        let row = BalanceHistory {
            id: self.working.next_id(),
            discord_id: entry.discord_id,
            guild_id: self.guild_id,
            balance_before: entry.balance_before,
            balance_after: entry.balance_after,
            change_amount: entry.change_amount(),
            transaction_type: entry.transaction_type,
            refs: entry.refs,
            created_at: Utc::now(),
        };
        self.working.history.push(row.clone());
        Ok(row)
    }

    async fn list_for_user(
        &mut self,
        discord_id: DiscordId,
        limit: i64,
    ) -> Result<Vec<BalanceHistory>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .working
            .history
            .iter()
            .rev()
            .filter(|h| h.guild_id == self.guild_id && h.discord_id == discord_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

impl BetRepository for MemoryTransaction {
    async fn create(&mut self, bet: &NewBet) -> Result<Bet> {
        let row = Bet {
            id: BetId::new(self.working.next_id()),
            discord_id: bet.discord_id,
            guild_id: self.guild_id,
            amount: bet.amount,
            win_probability: bet.win_probability,
            won: bet.won,
            win_amount: bet.win_amount,
            created_at: Utc::now(),
        };
        self.working.bets.push(row.clone());
        Ok(row)
    }
}

impl WagerRepository for MemoryTransaction {
    async fn create(&mut self, wager: &NewWager) -> Result<Wager> {
        let row = Wager {
            id: WagerId::new(self.working.next_id()),
            guild_id: self.guild_id,
            proposer_discord_id: wager.proposer_discord_id,
            target_discord_id: wager.target_discord_id,
            amount: wager.amount,
            condition: wager.condition.clone(),
            state: WagerState::Proposed,
            winner_discord_id: None,
            message_id: wager.message_id,
            channel_id: wager.channel_id,
            created_at: Utc::now(),
            accepted_at: None,
            resolved_at: None,
        };
        self.working.wagers.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_by_id(&mut self, id: WagerId) -> Result<Option<Wager>> {
        Ok(self
            .working
            .wagers
            .get(&id)
            .filter(|w| w.guild_id == self.guild_id)
            .cloned())
    }

    async fn update(&mut self, wager: &Wager) -> Result<()> {
        let guild_id = self.guild_id;
        let stored = self
            .working
            .wagers
            .get_mut(&wager.id)
            .filter(|w| w.guild_id == guild_id)
            .ok_or_else(|| LedgerError::not_found("wager", wager.id))?;
        stored.state = wager.state;
        stored.winner_discord_id = wager.winner_discord_id;
        stored.accepted_at = wager.accepted_at;
        stored.resolved_at = wager.resolved_at;
        stored.message_id = wager.message_id;
        stored.channel_id = wager.channel_id;
        Ok(())
    }
}

impl WagerVoteRepository for MemoryTransaction {
    async fn upsert(
        &mut self,
        wager_id: WagerId,
        voter: DiscordId,
        vote_for: DiscordId,
    ) -> Result<WagerVote> {
        let now = Utc::now();
        if let Some(existing) = self
            .working
            .votes
            .iter_mut()
            .find(|v| v.wager_id == wager_id && v.voter_discord_id == voter)
        {
            existing.vote_for_discord_id = vote_for;
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let vote = WagerVote {
            wager_id,
            voter_discord_id: voter,
            vote_for_discord_id: vote_for,
            updated_at: now,
        };
        self.working.votes.push(vote.clone());
        Ok(vote)
    }

    async fn list_for_wager(&mut self, wager_id: WagerId) -> Result<Vec<WagerVote>> {
        let in_guild = self
            .working
            .wagers
            .get(&wager_id)
            .is_some_and(|w| w.guild_id == self.guild_id);
        if !in_guild {
            return Ok(Vec::new());
        }
        let mut votes: Vec<WagerVote> = self
            .working
            .votes
            .iter()
            .filter(|v| v.wager_id == wager_id)
            .cloned()
            .collect();
        votes.sort_by_key(|v| v.voter_discord_id);
        Ok(votes)
    }
}

impl GroupWagerRepository for MemoryTransaction {
    async fn create(&mut self, wager: &NewGroupWager) -> Result<GroupWagerDetail> {
        let header = GroupWager {
            id: GroupWagerId::new(self.working.next_id()),
            guild_id: self.guild_id,
            creator_discord_id: wager.creator_discord_id,
            condition: wager.condition.clone(),
            state: GroupWagerState::Active,
            wager_type: wager.wager_type,
            min_participants: wager.min_participants,
            max_participants: wager.max_participants,
            total_pot: 0,
            voting_period_minutes: wager.voting_period_minutes,
            voting_starts_at: wager.voting_starts_at,
            voting_ends_at: wager.voting_ends_at,
            winning_option_id: None,
            resolver_discord_id: None,
            resolved_at: None,
            message_id: wager.message_id,
            channel_id: wager.channel_id,
            created_at: Utc::now(),
        };
        self.working.group_wagers.insert(header.id, header.clone());

        let mut options = Vec::with_capacity(wager.options.len());
        for (order, option) in (0_i32..).zip(wager.options.iter()) {
            let row = GroupWagerOption {
                id: OptionId::new(self.working.next_id()),
                group_wager_id: header.id,
                option_text: option.text.clone(),
                option_order: order,
                total_amount: 0,
                odds_multiplier: option.odds_multiplier,
            };
            self.working.options.push(row.clone());
            options.push(row);
        }

        Ok(GroupWagerDetail {
            wager: header,
            options,
            participants: Vec::new(),
        })
    }

    async fn get_by_id(&mut self, id: GroupWagerId) -> Result<Option<GroupWager>> {
        Ok(self.working.group_wager_in(self.guild_id, id).cloned())
    }

    async fn get_detail_by_id(&mut self, id: GroupWagerId) -> Result<Option<GroupWagerDetail>> {
        let Some(wager) = self.working.group_wager_in(self.guild_id, id).cloned() else {
            return Ok(None);
        };
        let mut options: Vec<GroupWagerOption> = self
            .working
            .options
            .iter()
            .filter(|o| o.group_wager_id == id)
            .cloned()
            .collect();
        options.sort_by_key(|o| o.option_order);
        let participants = self
            .working
            .participants
            .iter()
            .filter(|p| p.group_wager_id == id)
            .cloned()
            .collect();
        Ok(Some(GroupWagerDetail {
            wager,
            options,
            participants,
        }))
    }

    async fn update_state(&mut self, wager: &GroupWager) -> Result<()> {
        let guild_id = self.guild_id;
        let stored = self
            .working
            .group_wagers
            .get_mut(&wager.id)
            .filter(|w| w.guild_id == guild_id)
            .ok_or_else(|| LedgerError::not_found("group wager", wager.id))?;
        stored.state = wager.state;
        stored.winning_option_id = wager.winning_option_id;
        stored.resolver_discord_id = wager.resolver_discord_id;
        stored.resolved_at = wager.resolved_at;
        Ok(())
    }

    async fn record_bet(
        &mut self,
        id: GroupWagerId,
        option_id: OptionId,
        discord_id: DiscordId,
        amount: i64,
        at: DateTime<Utc>,
    ) -> Result<GroupWagerParticipant> {
        let guild_id = self.guild_id;
        let wager = self
            .working
            .group_wagers
            .get_mut(&id)
            .filter(|w| w.guild_id == guild_id)
            .ok_or_else(|| LedgerError::not_found("group wager", id))?;
        wager.total_pot += amount;

        let option = self
            .working
            .options
            .iter_mut()
            .find(|o| o.id == option_id && o.group_wager_id == id)
            .ok_or_else(|| LedgerError::not_found("option", option_id))?;
        option.total_amount += amount;

        if let Some(existing) = self
            .working
            .participants
            .iter_mut()
            .find(|p| p.group_wager_id == id && p.discord_id == discord_id)
        {
            existing.amount += amount;
            return Ok(existing.clone());
        }
        let participant = GroupWagerParticipant {
            group_wager_id: id,
            discord_id,
            option_id,
            amount,
            joined_at: at,
        };
        self.working.participants.push(participant.clone());
        Ok(participant)
    }

    async fn list_expired_active(&mut self, now: DateTime<Utc>) -> Result<Vec<GroupWager>> {
        Ok(self
            .working
            .group_wagers
            .values()
            .filter(|w| {
                w.guild_id == self.guild_id
                    && w.state == GroupWagerState::Active
                    && w.voting_ends_at <= now
            })
            .cloned()
            .collect())
    }

    async fn get_guilds_with_active_wagers(&mut self) -> Result<Vec<GuildId>> {
        let mut guilds: Vec<GuildId> = self
            .working
            .group_wagers
            .values()
            .filter(|w| w.state == GroupWagerState::Active)
            .map(|w| w.guild_id)
            .collect();
        guilds.sort_unstable();
        guilds.dedup();
        Ok(guilds)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use tokio_test::assert_ok;

    use super::*;
    use crate::domain::{GroupWagerType, NewGroupWagerOption};

    const GUILD: GuildId = GuildId::new(1);
    const OTHER_GUILD: GuildId = GuildId::new(2);

    #[tokio::test]
    async fn uncommitted_writes_are_discarded() {
        let store = MemoryStore::new();
        let mut tx = assert_ok!(store.begin(GUILD).await);
        assert_ok!(UserRepository::create(&mut tx, DiscordId::new(1), "alice", 500).await);
        assert_ok!(tx.rollback().await);

        let mut tx = assert_ok!(store.begin(GUILD).await);
        let user = assert_ok!(UserRepository::get_by_id(&mut tx, DiscordId::new(1)).await);
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let store = MemoryStore::new();
        let mut tx = assert_ok!(store.begin(GUILD).await);
        assert_ok!(UserRepository::create(&mut tx, DiscordId::new(1), "alice", 500).await);
        assert_ok!(tx.commit().await);

        assert_eq!(store.total_balance(GUILD).await, 500);
    }

    #[tokio::test]
    async fn failed_commit_discards_writes_once() {
        let store = MemoryStore::new();
        store.fail_next_commit();

        let mut tx = assert_ok!(store.begin(GUILD).await);
        assert_ok!(UserRepository::create(&mut tx, DiscordId::new(1), "alice", 500).await);
        let result = tx.commit().await;
        assert!(matches!(result, Err(LedgerError::Persistence(_))));
        assert_eq!(store.total_balance(GUILD).await, 0);

        let mut tx = assert_ok!(store.begin(GUILD).await);
        assert_ok!(UserRepository::create(&mut tx, DiscordId::new(1), "alice", 500).await);
        assert_ok!(tx.commit().await);
        assert_eq!(store.total_balance(GUILD).await, 500);
    }

    #[tokio::test]
    async fn create_user_returns_existing_row() {
        let store = MemoryStore::new();
        let mut tx = assert_ok!(store.begin(GUILD).await);
        assert_ok!(UserRepository::create(&mut tx, DiscordId::new(1), "alice", 500).await);
        let again = assert_ok!(UserRepository::create(&mut tx, DiscordId::new(1), "bob", 9).await);
        assert_eq!(again.username, "alice");
        assert_eq!(again.balance, 500);
    }

    #[tokio::test]
    async fn users_are_scoped_by_guild() {
        let store = MemoryStore::new();
        let mut tx = assert_ok!(store.begin(GUILD).await);
        assert_ok!(UserRepository::create(&mut tx, DiscordId::new(1), "alice", 500).await);
        assert_ok!(tx.commit().await);

        let mut tx = assert_ok!(store.begin(OTHER_GUILD).await);
        let user = assert_ok!(UserRepository::get_by_id(&mut tx, DiscordId::new(1)).await);
        assert!(user.is_none());
        let result = tx.update_balance(DiscordId::new(1), 10).await;
        assert!(matches!(result, Err(LedgerError::NotFound { .. })));
    }

    #[tokio::test]
    async fn top_by_balance_breaks_ties_by_lowest_id() {
        let store = MemoryStore::new();
        let mut tx = assert_ok!(store.begin(GUILD).await);
        assert_ok!(UserRepository::create(&mut tx, DiscordId::new(9), "nine", 700).await);
        assert_ok!(UserRepository::create(&mut tx, DiscordId::new(3), "three", 700).await);
        assert_ok!(UserRepository::create(&mut tx, DiscordId::new(1), "one", 100).await);
        let Some(top) = assert_ok!(tx.top_by_balance().await) else {
            panic!("guild has users");
        };
        assert_eq!(top.discord_id, DiscordId::new(3));
    }

    #[tokio::test]
    async fn record_bet_accumulates_position_and_totals() {
        let store = MemoryStore::new();
        let mut tx = assert_ok!(store.begin(GUILD).await);
        let now = Utc::now();
        let detail = assert_ok!(
            GroupWagerRepository::create(
                &mut tx,
                &NewGroupWager {
                    creator_discord_id: None,
                    condition: "who wins".to_string(),
                    wager_type: GroupWagerType::Pool,
                    min_participants: 2,
                    max_participants: None,
                    voting_period_minutes: 60,
                    voting_starts_at: now,
                    voting_ends_at: now,
                    options: vec![
                        NewGroupWagerOption {
                            text: "red".to_string(),
                            odds_multiplier: None,
                        },
                        NewGroupWagerOption {
                            text: "blue".to_string(),
                            odds_multiplier: None,
                        },
                    ],
                    message_id: None,
                    channel_id: None,
                },
            )
            .await
        );
        let Some(red) = detail.options.first() else {
            panic!("options were inserted");
        };
        let id = detail.wager.id;
        assert_ok!(tx.record_bet(id, red.id, DiscordId::new(1), 100, now).await);
        let position = assert_ok!(tx.record_bet(id, red.id, DiscordId::new(1), 50, now).await);
        assert_eq!(position.amount, 150);

        let Some(detail) = assert_ok!(tx.get_detail_by_id(id).await) else {
            panic!("wager exists");
        };
        assert_eq!(detail.wager.total_pot, 150);
        assert_eq!(detail.participant_count(), 1);
        assert_eq!(detail.option(red.id).map(|o| o.total_amount), Some(150));

        let expired = assert_ok!(tx.list_expired_active(now).await);
        assert_eq!(expired.len(), 1);
        let guilds = assert_ok!(tx.get_guilds_with_active_wagers().await);
        assert_eq!(guilds, vec![GUILD]);
    }
}
