//! Users, balance history, and transaction types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{BetId, DiscordId, GroupWagerId, GuildId, WagerId};

/// A guild member's account. `(guild_id, discord_id)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Discord user id.
    pub discord_id: DiscordId,
    /// Owning guild.
    pub guild_id: GuildId,
    /// Display name cache.
    pub username: String,
    /// Settled funds in bits. Never negative.
    pub balance: i64,
    /// Account creation time.
    pub created_at: DateTime<Utc>,
    /// Last balance or username change.
    pub updated_at: DateTime<Utc>,
}

/// Why a balance changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Single-shot probability bet outcome.
    Bet,
    /// Winner side of a 1-on-1 wager.
    WagerWin,
    /// Loser side of a 1-on-1 wager.
    WagerLoss,
    /// Incoming transfer.
    TransferIn,
    /// Outgoing transfer.
    TransferOut,
    /// Stake placed on a group wager option.
    GroupWagerBet,
    /// Group wager payout.
    GroupWagerWin,
    /// Stake returned from a cancelled group wager.
    GroupWagerRefund,
}

impl TransactionType {
    /// Returns the database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bet => "bet",
            Self::WagerWin => "wager_win",
            Self::WagerLoss => "wager_loss",
            Self::TransferIn => "transfer_in",
            Self::TransferOut => "transfer_out",
            Self::GroupWagerBet => "group_wager_bet",
            Self::GroupWagerWin => "group_wager_win",
            Self::GroupWagerRefund => "group_wager_refund",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bet" => Ok(Self::Bet),
            "wager_win" => Ok(Self::WagerWin),
            "wager_loss" => Ok(Self::WagerLoss),
            "transfer_in" => Ok(Self::TransferIn),
            "transfer_out" => Ok(Self::TransferOut),
            "group_wager_bet" => Ok(Self::GroupWagerBet),
            "group_wager_win" => Ok(Self::GroupWagerWin),
            "group_wager_refund" => Ok(Self::GroupWagerRefund),
            other => Err(format!("unknown transaction type: {other}")),
        }
    }
}

/// Optional links from a history row to the entity that caused it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRefs {
    /// Originating single-shot bet.
    pub bet_id: Option<BetId>,
    /// Originating 1-on-1 wager.
    pub wager_id: Option<WagerId>,
    /// Originating group wager.
    pub group_wager_id: Option<GroupWagerId>,
}

impl HistoryRefs {
    /// No originating entity (e.g. transfers).
    #[must_use]
    pub const fn none() -> Self {
        Self {
            bet_id: None,
            wager_id: None,
            group_wager_id: None,
        }
    }

    /// Links to a single-shot bet.
    #[must_use]
    pub const fn bet(id: BetId) -> Self {
        Self {
            bet_id: Some(id),
            ..Self::none()
        }
    }

    /// Links to a 1-on-1 wager.
    #[must_use]
    pub const fn wager(id: WagerId) -> Self {
        Self {
            wager_id: Some(id),
            ..Self::none()
        }
    }

    /// Links to a group wager.
    #[must_use]
    pub const fn group_wager(id: GroupWagerId) -> Self {
        Self {
            group_wager_id: Some(id),
            ..Self::none()
        }
    }
}

/// Immutable audit row written alongside every balance mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceHistory {
    /// Row id, increasing with insertion order.
    pub id: i64,
    /// Account owner.
    pub discord_id: DiscordId,
    /// Owning guild.
    pub guild_id: GuildId,
    /// Balance before the change.
    pub balance_before: i64,
    /// Balance after the change.
    pub balance_after: i64,
    /// Always `balance_after - balance_before`.
    pub change_amount: i64,
    /// Reason for the change.
    pub transaction_type: TransactionType,
    /// Originating entity, if any.
    pub refs: HistoryRefs,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
}

/// Insert payload for [`BalanceHistory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBalanceHistory {
    /// Account owner.
    pub discord_id: DiscordId,
    /// Balance before the change.
    pub balance_before: i64,
    /// Balance after the change.
    pub balance_after: i64,
    /// Reason for the change.
    pub transaction_type: TransactionType,
    /// Originating entity, if any.
    pub refs: HistoryRefs,
}

impl NewBalanceHistory {
    /// Derived delta.
    #[must_use]
    pub const fn change_amount(&self) -> i64 {
        self.balance_after - self.balance_before
    }
}

/// Before/after pair returned by a balance adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    /// Account owner.
    pub discord_id: DiscordId,
    /// Balance before the change.
    pub before: i64,
    /// Balance after the change.
    pub after: i64,
}

impl BalanceChange {
    /// Signed delta.
    #[must_use]
    pub const fn delta(&self) -> i64 {
        self.after - self.before
    }
}
