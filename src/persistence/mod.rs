//! Persistence layer: repository capabilities and transactional stores.
//!
//! A [`Store`] opens guild-scoped transactions. A transaction implements every
//! repository trait, so one value is the whole set of repository handles for
//! a unit of work. Every method runs inside that transaction; nothing is
//! visible to other transactions until [`StoreTransaction::commit`].
//!
//! Two implementations exist: [`postgres::PostgresStore`] (`sqlx`, row
//! locks via `SELECT … FOR UPDATE`) and [`memory::MemoryStore`] (whole-state
//! lock, copy-on-begin), which tests use in place of a database.

pub mod memory;
pub mod models;
pub mod postgres;

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::domain::{
    Bet, BalanceHistory, DiscordId, GroupWager, GroupWagerDetail, GroupWagerId,
    GroupWagerParticipant, GuildId, NewBalanceHistory, NewBet, NewGroupWager, NewWager, OptionId,
    User, Wager, WagerId, WagerVote,
};
use crate::error::Result;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// User accounts of the transaction's guild.
pub trait UserRepository: Send {
    /// Fetches a user without locking.
    fn get_by_id(
        &mut self,
        discord_id: DiscordId,
    ) -> impl Future<Output = Result<Option<User>>> + Send;

    /// Fetches a user and locks the row until the transaction ends.
    fn get_for_update(
        &mut self,
        discord_id: DiscordId,
    ) -> impl Future<Output = Result<Option<User>>> + Send;

    /// Inserts a user with `balance`, or returns the existing row unchanged.
    fn create(
        &mut self,
        discord_id: DiscordId,
        username: &str,
        balance: i64,
    ) -> impl Future<Output = Result<User>> + Send;

    /// Overwrites a user's balance.
    fn update_balance(
        &mut self,
        discord_id: DiscordId,
        balance: i64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Returns the user with the highest balance, ties broken by lowest id.
    fn top_by_balance(&mut self) -> impl Future<Output = Result<Option<User>>> + Send;
}

/// Append-only audit trail.
pub trait BalanceHistoryRepository: Send {
    /// Appends a history row.
    fn record(
        &mut self,
        entry: &NewBalanceHistory,
    ) -> impl Future<Output = Result<BalanceHistory>> + Send;

    /// Lists a user's history, newest first.
    fn list_for_user(
        &mut self,
        discord_id: DiscordId,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<BalanceHistory>>> + Send;
}

/// Single-shot bets.
pub trait BetRepository: Send {
    /// Inserts a settled bet.
    fn create(&mut self, bet: &NewBet) -> impl Future<Output = Result<Bet>> + Send;
}

/// 1-on-1 wagers.
pub trait WagerRepository: Send {
    /// Inserts a wager in the `proposed` state.
    fn create(&mut self, wager: &NewWager) -> impl Future<Output = Result<Wager>> + Send;

    /// Fetches a wager and locks the row until the transaction ends.
    fn get_by_id(&mut self, id: WagerId) -> impl Future<Output = Result<Option<Wager>>> + Send;

    /// Persists state, winner and timestamps.
    fn update(&mut self, wager: &Wager) -> impl Future<Output = Result<()>> + Send;
}

/// Votes on 1-on-1 wagers.
pub trait WagerVoteRepository: Send {
    /// Inserts or replaces the voter's choice.
    fn upsert(
        &mut self,
        wager_id: WagerId,
        voter: DiscordId,
        vote_for: DiscordId,
    ) -> impl Future<Output = Result<WagerVote>> + Send;

    /// Lists all votes on a wager.
    fn list_for_wager(
        &mut self,
        wager_id: WagerId,
    ) -> impl Future<Output = Result<Vec<WagerVote>>> + Send;
}

/// Group wagers, their options and participants.
pub trait GroupWagerRepository: Send {
    /// Inserts a wager in the `active` state together with its options.
    fn create(
        &mut self,
        wager: &NewGroupWager,
    ) -> impl Future<Output = Result<GroupWagerDetail>> + Send;

    /// Fetches a wager header and locks the row until the transaction ends.
    fn get_by_id(
        &mut self,
        id: GroupWagerId,
    ) -> impl Future<Output = Result<Option<GroupWager>>> + Send;

    /// Fetches a wager with options and participants.
    fn get_detail_by_id(
        &mut self,
        id: GroupWagerId,
    ) -> impl Future<Output = Result<Option<GroupWagerDetail>>> + Send;

    /// Persists state, winning option, resolver and resolution time.
    fn update_state(&mut self, wager: &GroupWager) -> impl Future<Output = Result<()>> + Send;

    /// Adds `amount` to a user's position, the option total and the pot.
    fn record_bet(
        &mut self,
        id: GroupWagerId,
        option_id: OptionId,
        discord_id: DiscordId,
        amount: i64,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<GroupWagerParticipant>> + Send;

    /// Lists `active` wagers whose betting window ended at or before `now`.
    fn list_expired_active(
        &mut self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<GroupWager>>> + Send;

    /// Lists every guild that has at least one `active` wager. Not scoped to
    /// the transaction's guild.
    fn get_guilds_with_active_wagers(
        &mut self,
    ) -> impl Future<Output = Result<Vec<GuildId>>> + Send;
}

/// One open database transaction scoped to a guild.
pub trait StoreTransaction:
    UserRepository
    + BalanceHistoryRepository
    + BetRepository
    + WagerRepository
    + WagerVoteRepository
    + GroupWagerRepository
    + Send
    + std::fmt::Debug
    + 'static
{
    /// Guild every repository call is scoped to.
    fn guild_id(&self) -> GuildId;

    /// Makes all writes durable.
    fn commit(self) -> impl Future<Output = Result<()>> + Send;

    /// Discards all writes.
    fn rollback(self) -> impl Future<Output = Result<()>> + Send;
}

/// Factory for [`StoreTransaction`]s.
pub trait Store: Clone + Send + Sync + std::fmt::Debug + 'static {
    /// Transaction type.
    type Tx: StoreTransaction;

    /// Opens a transaction scoped to `guild_id`.
    fn begin(&self, guild_id: GuildId) -> impl Future<Output = Result<Self::Tx>> + Send;
}
