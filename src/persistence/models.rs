//! Database row types and their conversion into domain values.
//!
//! Enum columns are stored as `TEXT`; a row that holds an unknown value
//! converts into [`LedgerError::Persistence`].

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::domain::{
    Bet, BalanceHistory, BetId, DiscordId, GroupWager, GroupWagerId, GroupWagerOption,
    GroupWagerParticipant, GuildId, HistoryRefs, OptionId, User, Wager, WagerId, WagerVote,
};
use crate::error::LedgerError;

fn parse_column<T: std::str::FromStr<Err = String>>(value: &str) -> Result<T, LedgerError> {
    value.parse().map_err(LedgerError::Persistence)
}

/// A row from the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    /// Discord user id.
    pub discord_id: i64,
    /// Owning guild.
    pub guild_id: i64,
    /// Display name cache.
    pub username: String,
    /// Balance in bits.
    pub balance: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            discord_id: DiscordId::new(row.discord_id),
            guild_id: GuildId::new(row.guild_id),
            username: row.username,
            balance: row.balance,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// A row from the `balance_history` table.
#[derive(Debug, Clone, FromRow)]
pub struct BalanceHistoryRow {
    /// Row id.
    pub id: i64,
    /// Account owner.
    pub discord_id: i64,
    /// Owning guild.
    pub guild_id: i64,
    /// Balance before.
    pub balance_before: i64,
    /// Balance after.
    pub balance_after: i64,
    /// Delta.
    pub change_amount: i64,
    /// Transaction type text.
    pub transaction_type: String,
    /// Originating bet.
    pub related_bet_id: Option<i64>,
    /// Originating wager.
    pub related_wager_id: Option<i64>,
    /// Originating group wager.
    pub related_group_wager_id: Option<i64>,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<BalanceHistoryRow> for BalanceHistory {
    type Error = LedgerError;

    fn try_from(row: BalanceHistoryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            discord_id: DiscordId::new(row.discord_id),
            guild_id: GuildId::new(row.guild_id),
            balance_before: row.balance_before,
            balance_after: row.balance_after,
            change_amount: row.change_amount,
            transaction_type: parse_column(&row.transaction_type)?,
            refs: HistoryRefs {
                bet_id: row.related_bet_id.map(BetId::new),
                wager_id: row.related_wager_id.map(WagerId::new),
                group_wager_id: row.related_group_wager_id.map(GroupWagerId::new),
            },
            created_at: row.created_at,
        })
    }
}

/// A row from the `bets` table.
#[derive(Debug, Clone, FromRow)]
pub struct BetRow {
    /// Row id.
    pub id: i64,
    /// Bettor.
    pub discord_id: i64,
    /// Owning guild.
    pub guild_id: i64,
    /// Stake.
    pub amount: i64,
    /// Chance of winning.
    pub win_probability: f64,
    /// Outcome.
    pub won: bool,
    /// Winnings.
    pub win_amount: i64,
    /// Settlement time.
    pub created_at: DateTime<Utc>,
}

impl From<BetRow> for Bet {
    fn from(row: BetRow) -> Self {
        Self {
            id: BetId::new(row.id),
            discord_id: DiscordId::new(row.discord_id),
            guild_id: GuildId::new(row.guild_id),
            amount: row.amount,
            win_probability: row.win_probability,
            won: row.won,
            win_amount: row.win_amount,
            created_at: row.created_at,
        }
    }
}

/// A row from the `wagers` table.
#[derive(Debug, Clone, FromRow)]
pub struct WagerRow {
    /// Row id.
    pub id: i64,
    /// Owning guild.
    pub guild_id: i64,
    /// Proposer.
    pub proposer_discord_id: i64,
    /// Target.
    pub target_discord_id: i64,
    /// Stake.
    pub amount: i64,
    /// Condition text.
    pub condition: String,
    /// State text.
    pub state: String,
    /// Winner.
    pub winner_discord_id: Option<i64>,
    /// Display linkage.
    pub message_id: Option<i64>,
    /// Display linkage.
    pub channel_id: Option<i64>,
    /// Proposal time.
    pub created_at: DateTime<Utc>,
    /// Acceptance time.
    pub accepted_at: Option<DateTime<Utc>>,
    /// Resolution time.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<WagerRow> for Wager {
    type Error = LedgerError;

    fn try_from(row: WagerRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: WagerId::new(row.id),
            guild_id: GuildId::new(row.guild_id),
            proposer_discord_id: DiscordId::new(row.proposer_discord_id),
            target_discord_id: DiscordId::new(row.target_discord_id),
            amount: row.amount,
            condition: row.condition,
            state: parse_column(&row.state)?,
            winner_discord_id: row.winner_discord_id.map(DiscordId::new),
            message_id: row.message_id,
            channel_id: row.channel_id,
            created_at: row.created_at,
            accepted_at: row.accepted_at,
            resolved_at: row.resolved_at,
        })
    }
}

/// A row from the `wager_votes` table.
#[derive(Debug, Clone, FromRow)]
pub struct WagerVoteRow {
    /// Wager voted on.
    pub wager_id: i64,
    /// Voter.
    pub voter_discord_id: i64,
    /// Chosen winner.
    pub vote_for_discord_id: i64,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

impl From<WagerVoteRow> for WagerVote {
    fn from(row: WagerVoteRow) -> Self {
        Self {
            wager_id: WagerId::new(row.wager_id),
            voter_discord_id: DiscordId::new(row.voter_discord_id),
            vote_for_discord_id: DiscordId::new(row.vote_for_discord_id),
            updated_at: row.updated_at,
        }
    }
}

/// A row from the `group_wagers` table.
#[derive(Debug, Clone, FromRow)]
pub struct GroupWagerRow {
    /// Row id.
    pub id: i64,
    /// Owning guild.
    pub guild_id: i64,
    /// Creator, if any.
    pub creator_discord_id: Option<i64>,
    /// Condition text.
    pub condition: String,
    /// State text.
    pub state: String,
    /// Wager type text.
    pub wager_type: String,
    /// Minimum participants.
    pub min_participants: i32,
    /// Maximum participants.
    pub max_participants: Option<i32>,
    /// Pot.
    pub total_pot: i64,
    /// Window length.
    pub voting_period_minutes: i64,
    /// Window start.
    pub voting_starts_at: DateTime<Utc>,
    /// Window end.
    pub voting_ends_at: DateTime<Utc>,
    /// Winning option.
    pub winning_option_id: Option<i64>,
    /// Resolver.
    pub resolver_discord_id: Option<i64>,
    /// Resolution time.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Display linkage.
    pub message_id: Option<i64>,
    /// Display linkage.
    pub channel_id: Option<i64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<GroupWagerRow> for GroupWager {
    type Error = LedgerError;

    fn try_from(row: GroupWagerRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: GroupWagerId::new(row.id),
            guild_id: GuildId::new(row.guild_id),
            creator_discord_id: row.creator_discord_id.map(DiscordId::new),
            condition: row.condition,
            state: parse_column(&row.state)?,
            wager_type: parse_column(&row.wager_type)?,
            min_participants: row.min_participants,
            max_participants: row.max_participants,
            total_pot: row.total_pot,
            voting_period_minutes: row.voting_period_minutes,
            voting_starts_at: row.voting_starts_at,
            voting_ends_at: row.voting_ends_at,
            winning_option_id: row.winning_option_id.map(OptionId::new),
            resolver_discord_id: row.resolver_discord_id.map(DiscordId::new),
            resolved_at: row.resolved_at,
            message_id: row.message_id,
            channel_id: row.channel_id,
            created_at: row.created_at,
        })
    }
}

/// A row from the `group_wager_options` table.
#[derive(Debug, Clone, FromRow)]
pub struct GroupWagerOptionRow {
    /// Row id.
    pub id: i64,
    /// Parent wager.
    pub group_wager_id: i64,
    /// Label.
    pub option_text: String,
    /// Position.
    pub option_order: i32,
    /// Stake total.
    pub total_amount: i64,
    /// Fixed multiplier (house only).
    pub odds_multiplier: Option<f64>,
}

impl From<GroupWagerOptionRow> for GroupWagerOption {
    fn from(row: GroupWagerOptionRow) -> Self {
        Self {
            id: OptionId::new(row.id),
            group_wager_id: GroupWagerId::new(row.group_wager_id),
            option_text: row.option_text,
            option_order: row.option_order,
            total_amount: row.total_amount,
            odds_multiplier: row.odds_multiplier,
        }
    }
}

/// A row from the `group_wager_participants` table.
#[derive(Debug, Clone, FromRow)]
pub struct GroupWagerParticipantRow {
    /// Parent wager.
    pub group_wager_id: i64,
    /// Bettor.
    pub discord_id: i64,
    /// Backed option.
    pub option_id: i64,
    /// Stake.
    pub amount: i64,
    /// First bet time.
    pub joined_at: DateTime<Utc>,
}

impl From<GroupWagerParticipantRow> for GroupWagerParticipant {
    fn from(row: GroupWagerParticipantRow) -> Self {
        Self {
            group_wager_id: GroupWagerId::new(row.group_wager_id),
            discord_id: DiscordId::new(row.discord_id),
            option_id: OptionId::new(row.option_id),
            amount: row.amount,
            joined_at: row.joined_at,
        }
    }
}
