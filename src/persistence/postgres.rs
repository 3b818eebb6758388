//! PostgreSQL implementation of the persistence layer.
//!
//! Each [`PgTransaction`] wraps one `sqlx` transaction. Rows that a service
//! reads before writing (users, wagers, group wagers) are fetched with
//! `SELECT … FOR UPDATE`, so two concurrent units of work touching the same
//! row serialize on the row lock instead of losing an update. Dropping a
//! transaction without committing rolls it back.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use super::models::{
    BalanceHistoryRow, BetRow, GroupWagerOptionRow, GroupWagerParticipantRow, GroupWagerRow,
    UserRow, WagerRow, WagerVoteRow,
};
use super::{
    BalanceHistoryRepository, BetRepository, GroupWagerRepository, Store, StoreTransaction,
    UserRepository, WagerRepository, WagerVoteRepository,
};
use crate::domain::{
    Bet, BalanceHistory, DiscordId, GroupWager, GroupWagerDetail, GroupWagerId,
    GroupWagerParticipant, GroupWagerState, GuildId, NewBalanceHistory, NewBet, NewGroupWager,
    NewWager, OptionId, User, Wager, WagerId, WagerState, WagerVote,
};
use crate::error::{LedgerError, Result};

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] if the database is unreachable.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(connect_timeout)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Applies the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::Persistence(e.to_string()))
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Store for PostgresStore {
    type Tx = PgTransaction;

    async fn begin(&self, guild_id: GuildId) -> Result<PgTransaction> {
        let tx = self.pool.begin().await?;
        Ok(PgTransaction { guild_id, tx })
    }
}

/// One open PostgreSQL transaction scoped to a guild.
pub struct PgTransaction {
    guild_id: GuildId,
    tx: Transaction<'static, Postgres>,
}

impl fmt::Debug for PgTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgTransaction")
            .field("guild_id", &self.guild_id)
            .finish_non_exhaustive()
    }
}

impl StoreTransaction for PgTransaction {
    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

impl UserRepository for PgTransaction {
    async fn get_by_id(&mut self, discord_id: DiscordId) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT discord_id, guild_id, username, balance, created_at, updated_at \
             FROM users WHERE guild_id = $1 AND discord_id = $2",
        )
        .bind(self.guild_id.get())
        .bind(discord_id.get())
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(User::from))
    }

    async fn get_for_update(&mut self, discord_id: DiscordId) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT discord_id, guild_id, username, balance, created_at, updated_at \
             FROM users WHERE guild_id = $1 AND discord_id = $2 FOR UPDATE",
        )
        .bind(self.guild_id.get())
        .bind(discord_id.get())
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(User::from))
    }

    async fn create(
        &mut self,
        discord_id: DiscordId,
        username: &str,
        balance: i64,
    ) -> Result<User> {
        sqlx::query(
            "INSERT INTO users (guild_id, discord_id, username, balance) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (guild_id, discord_id) DO NOTHING",
        )
        .bind(self.guild_id.get())
        .bind(discord_id.get())
        .bind(username)
        .bind(balance)
        .execute(&mut *self.tx)
        .await?;

        let row = sqlx::query_as::<_, UserRow>(
            "SELECT discord_id, guild_id, username, balance, created_at, updated_at \
             FROM users WHERE guild_id = $1 AND discord_id = $2",
        )
        .bind(self.guild_id.get())
        .bind(discord_id.get())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn update_balance(&mut self, discord_id: DiscordId, balance: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users SET balance = $1, \
             updated_at = now() WHERE guild_id = $2 AND discord_id = $3",
        )
        .bind(balance)
        .bind(self.guild_id.get())
        .bind(discord_id.get())
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found("user", discord_id));
        }
        Ok(())
    }

    async fn top_by_balance(&mut self) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT discord_id, guild_id, username, balance, created_at, updated_at \
             FROM users WHERE guild_id = $1 ORDER BY balance DESC, discord_id ASC LIMIT 1",
        )
        .bind(self.guild_id.get())
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(User::from))
    }
}

impl BalanceHistoryRepository for PgTransaction {
    async fn record(&mut self, entry: &NewBalanceHistory) -> Result<BalanceHistory> {
        let row = sqlx::query_as::<_, BalanceHistoryRow>(
            "INSERT INTO balance_history \
             (guild_id, discord_id, balance_before, balance_after, change_amount, \
             transaction_type, related_bet_id, related_wager_id, related_group_wager_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING id, discord_id, guild_id, balance_before, balance_after, change_amount, \
             transaction_type, related_bet_id, related_wager_id, related_group_wager_id, \
             created_at",
        )
        .bind(self.guild_id.get())
        .bind(entry.discord_id.get())
        .bind(entry.balance_before)
        .bind(entry.balance_after)
        .bind(entry.change_amount())
        .bind(entry.transaction_type.as_str())
        .bind(entry.refs.bet_id.map(|id| id.get()))
        .bind(entry.refs.wager_id.map(|id| id.get()))
        .bind(entry.refs.group_wager_id.map(|id| id.get()))
        .fetch_one(&mut *self.tx)
        .await?;
        BalanceHistory::try_from(row)
    }

    async fn list_for_user(
        &mut self,
        discord_id: DiscordId,
        limit: i64,
    ) -> Result<Vec<BalanceHistory>> {
        let rows = sqlx::query_as::<_, BalanceHistoryRow>(
            "SELECT id, discord_id, guild_id, balance_before, balance_after, change_amount, \
             transaction_type, related_bet_id, related_wager_id, related_group_wager_id, \
             created_at \
             FROM balance_history WHERE guild_id = $1 AND discord_id = $2 \
             ORDER BY id DESC LIMIT $3",
        )
        .bind(self.guild_id.get())
        .bind(discord_id.get())
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(BalanceHistory::try_from).collect()
    }
}

impl BetRepository for PgTransaction {
    async fn create(&mut self, bet: &NewBet) -> Result<Bet> {
        let row = sqlx::query_as::<_, BetRow>(
            "INSERT INTO bets (guild_id, discord_id, amount, win_probability, won, win_amount) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, discord_id, guild_id, amount, win_probability, won, win_amount, \
             created_at",
        )
        .bind(self.guild_id.get())
        .bind(bet.discord_id.get())
        .bind(bet.amount)
        .bind(bet.win_probability)
        .bind(bet.won)
        .bind(bet.win_amount)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }
}

impl WagerRepository for PgTransaction {
    async fn create(&mut self, wager: &NewWager) -> Result<Wager> {
        let row = sqlx::query_as::<_, WagerRow>(
            "INSERT INTO wagers \
             (guild_id, proposer_discord_id, target_discord_id, amount, condition, state, \
             message_id, channel_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING id, guild_id, proposer_discord_id, target_discord_id, amount, condition, \
             state, winner_discord_id, message_id, channel_id, created_at, accepted_at, \
             resolved_at",
        )
        .bind(self.guild_id.get())
        .bind(wager.proposer_discord_id.get())
        .bind(wager.target_discord_id.get())
        .bind(wager.amount)
        .bind(wager.condition.as_str())
        .bind(WagerState::Proposed.as_str())
        .bind(wager.message_id)
        .bind(wager.channel_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Wager::try_from(row)
    }

    async fn get_by_id(&mut self, id: WagerId) -> Result<Option<Wager>> {
        let row = sqlx::query_as::<_, WagerRow>(
            "SELECT id, guild_id, proposer_discord_id, target_discord_id, amount, condition, \
             state, winner_discord_id, message_id, channel_id, created_at, accepted_at, \
             resolved_at \
             FROM wagers WHERE guild_id = $1 AND id = $2 FOR UPDATE",
        )
        .bind(self.guild_id.get())
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Wager::try_from).transpose()
    }

    async fn update(&mut self, wager: &Wager) -> Result<()> {
        let result = sqlx::query(
            "UPDATE wagers SET state = $1, winner_discord_id = $2, accepted_at = $3, \
             resolved_at = $4, message_id = $5, channel_id = $6 \
             WHERE guild_id = $7 AND id = $8",
        )
        .bind(wager.state.as_str())
        .bind(wager.winner_discord_id.map(|id| id.get()))
        .bind(wager.accepted_at)
        .bind(wager.resolved_at)
        .bind(wager.message_id)
        .bind(wager.channel_id)
        .bind(self.guild_id.get())
        .bind(wager.id.get())
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found("wager", wager.id));
        }
        Ok(())
    }
}

impl WagerVoteRepository for PgTransaction {
    async fn upsert(
        &mut self,
        wager_id: WagerId,
        voter: DiscordId,
        vote_for: DiscordId,
    ) -> Result<WagerVote> {
        let row = sqlx::query_as::<_, WagerVoteRow>(
            "INSERT INTO wager_votes (wager_id, guild_id, voter_discord_id, vote_for_discord_id) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (wager_id, voter_discord_id) \
             DO UPDATE SET vote_for_discord_id = EXCLUDED.vote_for_discord_id, updated_at = now() \
             RETURNING wager_id, voter_discord_id, vote_for_discord_id, updated_at",
        )
        .bind(wager_id.get())
        .bind(self.guild_id.get())
        .bind(voter.get())
        .bind(vote_for.get())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn list_for_wager(&mut self, wager_id: WagerId) -> Result<Vec<WagerVote>> {
        let rows = sqlx::query_as::<_, WagerVoteRow>(
            "SELECT wager_id, voter_discord_id, vote_for_discord_id, updated_at \
             FROM wager_votes WHERE guild_id = $1 AND wager_id = $2 ORDER BY voter_discord_id",
        )
        .bind(self.guild_id.get())
        .bind(wager_id.get())
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(WagerVote::from).collect())
    }
}

impl PgTransaction {
    async fn fetch_group_wager(
        &mut self,
        id: GroupWagerId,
        lock: bool,
    ) -> Result<Option<GroupWager>> {
        let sql = if lock {
            "SELECT id, guild_id, creator_discord_id, condition, state, wager_type, \
             min_participants, max_participants, total_pot, voting_period_minutes, \
             voting_starts_at, voting_ends_at, winning_option_id, resolver_discord_id, \
             resolved_at, message_id, channel_id, created_at \
             FROM group_wagers WHERE guild_id = $1 AND id = $2 FOR UPDATE"
        } else {
            "SELECT id, guild_id, creator_discord_id, condition, state, wager_type, \
             min_participants, max_participants, total_pot, voting_period_minutes, \
             voting_starts_at, voting_ends_at, winning_option_id, resolver_discord_id, \
             resolved_at, message_id, channel_id, created_at \
             FROM group_wagers WHERE guild_id = $1 AND id = $2"
        };
        let row = sqlx::query_as::<_, GroupWagerRow>(sql)
            .bind(self.guild_id.get())
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(GroupWager::try_from).transpose()
    }
}

impl GroupWagerRepository for PgTransaction {
    async fn create(&mut self, wager: &NewGroupWager) -> Result<GroupWagerDetail> {
        let row = sqlx::query_as::<_, GroupWagerRow>(
            "INSERT INTO group_wagers \
             (guild_id, creator_discord_id, condition, state, wager_type, min_participants, \
             max_participants, voting_period_minutes, voting_starts_at, voting_ends_at, \
             message_id, channel_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING id, guild_id, creator_discord_id, condition, state, wager_type, \
             min_participants, max_participants, total_pot, voting_period_minutes, \
             voting_starts_at, voting_ends_at, winning_option_id, resolver_discord_id, \
             resolved_at, message_id, channel_id, created_at",
        )
        .bind(self.guild_id.get())
        .bind(wager.creator_discord_id.map(|id| id.get()))
        .bind(wager.condition.as_str())
        .bind(GroupWagerState::Active.as_str())
        .bind(wager.wager_type.as_str())
        .bind(wager.min_participants)
        .bind(wager.max_participants)
        .bind(wager.voting_period_minutes)
        .bind(wager.voting_starts_at)
        .bind(wager.voting_ends_at)
        .bind(wager.message_id)
        .bind(wager.channel_id)
        .fetch_one(&mut *self.tx)
        .await?;
        let header = GroupWager::try_from(row)?;

        let mut options = Vec::with_capacity(wager.options.len());
        for (order, option) in (0_i32..).zip(wager.options.iter()) {
            let row = sqlx::query_as::<_, GroupWagerOptionRow>(
                "INSERT INTO group_wager_options \
                 (group_wager_id, option_text, option_order, odds_multiplier) \
                 VALUES ($1, $2, $3, $4) \
                 RETURNING id, group_wager_id, option_text, option_order, total_amount, \
                 odds_multiplier",
            )
            .bind(header.id.get())
            .bind(option.text.as_str())
            .bind(order)
            .bind(option.odds_multiplier)
            .fetch_one(&mut *self.tx)
            .await?;
            options.push(row.into());
        }

        Ok(GroupWagerDetail {
            wager: header,
            options,
            participants: Vec::new(),
        })
    }

    async fn get_by_id(&mut self, id: GroupWagerId) -> Result<Option<GroupWager>> {
        self.fetch_group_wager(id, true).await
    }

    async fn get_detail_by_id(&mut self, id: GroupWagerId) -> Result<Option<GroupWagerDetail>> {
        let Some(wager) = self.fetch_group_wager(id, false).await? else {
            return Ok(None);
        };

        let options = sqlx::query_as::<_, GroupWagerOptionRow>(
            "SELECT id, group_wager_id, option_text, option_order, total_amount, odds_multiplier \
             FROM group_wager_options WHERE group_wager_id = $1 ORDER BY option_order",
        )
        .bind(id.get())
        .fetch_all(&mut *self.tx)
        .await?;

        let participants = sqlx::query_as::<_, GroupWagerParticipantRow>(
            "SELECT group_wager_id, discord_id, option_id, amount, joined_at \
             FROM group_wager_participants WHERE group_wager_id = $1 ORDER BY joined_at, id",
        )
        .bind(id.get())
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(Some(GroupWagerDetail {
            wager,
            options: options.into_iter().map(Into::into).collect(),
            participants: participants.into_iter().map(Into::into).collect(),
        }))
    }

    async fn update_state(&mut self, wager: &GroupWager) -> Result<()> {
        let result = sqlx::query(
            "UPDATE group_wagers SET state = $1, winning_option_id = $2, resolver_discord_id = $3, \
             resolved_at = $4, updated_at = now() WHERE guild_id = $5 AND id = $6",
        )
        .bind(wager.state.as_str())
        .bind(wager.winning_option_id.map(|id| id.get()))
        .bind(wager.resolver_discord_id.map(|id| id.get()))
        .bind(wager.resolved_at)
        .bind(self.guild_id.get())
        .bind(wager.id.get())
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found("group wager", wager.id));
        }
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
        let row = sqlx::query_as::<_, GroupWagerParticipantRow>(
            "INSERT INTO group_wager_participants \
             (group_wager_id, guild_id, discord_id, option_id, amount, joined_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (group_wager_id, discord_id) \
             DO UPDATE SET amount = group_wager_participants.amount + EXCLUDED.amount, \
             updated_at = EXCLUDED.joined_at \
             RETURNING group_wager_id, discord_id, option_id, amount, joined_at",
        )
        .bind(id.get())
        .bind(self.guild_id.get())
        .bind(discord_id.get())
        .bind(option_id.get())
        .bind(amount)
        .bind(at)
        .fetch_one(&mut *self.tx)
        .await?;

        sqlx::query(
            "UPDATE group_wager_options SET total_amount = total_amount + $1 \
             WHERE id = $2 AND group_wager_id = $3",
        )
        .bind(amount)
        .bind(option_id.get())
        .bind(id.get())
        .execute(&mut *self.tx)
        .await?;

        sqlx::query(
            "UPDATE group_wagers SET total_pot = total_pot + $1, updated_at = now() \
             WHERE guild_id = $2 AND id = $3",
        )
        .bind(amount)
        .bind(self.guild_id.get())
        .bind(id.get())
        .execute(&mut *self.tx)
        .await?;

        Ok(row.into())
    }

    async fn list_expired_active(&mut self, now: DateTime<Utc>) -> Result<Vec<GroupWager>> {
        let rows = sqlx::query_as::<_, GroupWagerRow>(
            "SELECT id, guild_id, creator_discord_id, condition, state, wager_type, \
             min_participants, max_participants, total_pot, voting_period_minutes, \
             voting_starts_at, voting_ends_at, winning_option_id, resolver_discord_id, \
             resolved_at, message_id, channel_id, created_at \
             FROM group_wagers WHERE guild_id = $1 AND state = $2 AND voting_ends_at <= $3 \
             ORDER BY id FOR UPDATE",
        )
        .bind(self.guild_id.get())
        .bind(GroupWagerState::Active.as_str())
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(GroupWager::try_from).collect()
    }

    async fn get_guilds_with_active_wagers(&mut self) -> Result<Vec<GuildId>> {
        let rows = sqlx::query_scalar::<_, i64>(
            "SELECT DISTINCT guild_id FROM group_wagers WHERE state = $1 ORDER BY guild_id",
        )
        .bind(GroupWagerState::Active.as_str())
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(GuildId::new).collect())
    }
}
