//! Multi-option group wagers and their payout math.
//!
//! A group wager offers between two and ten options. Users stake bits on
//! exactly one option; stakes are debited immediately. When the resolver
//! picks the winning option, winners are paid either pari-mutuel (`pool`:
//! the whole pot is split proportionally among winners) or at fixed odds
//! (`house`: each winner receives `stake × multiplier`).
//!
//! All money is integer bits. Pool payouts use exact integer arithmetic
//! (`stake × pot / winning_total`, truncated). House payouts multiply by a
//! floating-point multiplier and truncate.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{DiscordId, GroupWagerId, GuildId, OptionId};

/// Lifecycle of a group wager.
///
/// ```text
/// active ──expiry sweep──▶ pending_resolution ──resolve──▶ resolved
///   │  └─────────────────resolve (after expiry)──────────▶ resolved
///   └──cancel──▶ cancelled ◀──cancel── pending_resolution
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupWagerState {
    /// Accepting bets until `voting_ends_at`.
    Active,
    /// Betting closed; waiting for a resolver.
    PendingResolution,
    /// Paid out. Terminal.
    Resolved,
    /// Refunded. Terminal.
    Cancelled,
}

impl GroupWagerState {
    /// Returns the database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PendingResolution => "pending_resolution",
            Self::Resolved => "resolved",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns `true` for states with no outgoing transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Cancelled)
    }
}

impl fmt::Display for GroupWagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupWagerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "pending_resolution" => Ok(Self::PendingResolution),
            "resolved" => Ok(Self::Resolved),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown group wager state: {other}")),
        }
    }
}

/// Payout model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupWagerType {
    /// Pari-mutuel: winners split the whole pot.
    Pool,
    /// Fixed odds set at creation.
    House,
}

impl GroupWagerType {
    /// Returns the database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pool => "pool",
            Self::House => "house",
        }
    }
}

impl fmt::Display for GroupWagerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupWagerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pool" => Ok(Self::Pool),
            "house" => Ok(Self::House),
            other => Err(format!("unknown group wager type: {other}")),
        }
    }
}

/// Group wager header row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupWager {
    /// Row id.
    pub id: GroupWagerId,
    /// Owning guild.
    pub guild_id: GuildId,
    /// `None` for system/house-originated wagers.
    pub creator_discord_id: Option<DiscordId>,
    /// Free-text condition.
    pub condition: String,
    /// Current state.
    pub state: GroupWagerState,
    /// Payout model.
    pub wager_type: GroupWagerType,
    /// Distinct participants required to resolve.
    pub min_participants: i32,
    /// Cap on distinct participants, if any.
    pub max_participants: Option<i32>,
    /// Sum of all stakes (denormalized).
    pub total_pot: i64,
    /// Betting window length in minutes.
    pub voting_period_minutes: i64,
    /// Start of the betting window.
    pub voting_starts_at: DateTime<Utc>,
    /// End of the betting window.
    pub voting_ends_at: DateTime<Utc>,
    /// Set once resolved.
    pub winning_option_id: Option<OptionId>,
    /// Who resolved it.
    pub resolver_discord_id: Option<DiscordId>,
    /// Resolution time.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Display linkage, opaque to the ledger.
    pub message_id: Option<i64>,
    /// Display linkage, opaque to the ledger.
    pub channel_id: Option<i64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl GroupWager {
    /// Returns `true` once `now` has reached the end of the betting window.
    #[must_use]
    pub fn voting_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.voting_ends_at
    }
}

/// One choice in a group wager. `(group_wager_id, option_order)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupWagerOption {
    /// Row id.
    pub id: OptionId,
    /// Parent wager.
    pub group_wager_id: GroupWagerId,
    /// Label shown to users.
    pub option_text: String,
    /// Zero-based position.
    pub option_order: i32,
    /// Sum of stakes on this option.
    pub total_amount: i64,
    /// Fixed multiplier for `house` wagers. Always `None` for `pool` wagers;
    /// use [`GroupWagerDetail::display_multiplier`] instead.
    pub odds_multiplier: Option<f64>,
}

/// A user's position in a group wager. `(group_wager_id, discord_id)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupWagerParticipant {
    /// Parent wager.
    pub group_wager_id: GroupWagerId,
    /// Bettor.
    pub discord_id: DiscordId,
    /// Backed option.
    pub option_id: OptionId,
    /// Total stake.
    pub amount: i64,
    /// First bet time.
    pub joined_at: DateTime<Utc>,
}

/// Insert payload for a group wager and its options.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGroupWager {
    /// `None` for system wagers.
    pub creator_discord_id: Option<DiscordId>,
    /// Free-text condition.
    pub condition: String,
    /// Payout model.
    pub wager_type: GroupWagerType,
    /// Distinct participants required to resolve.
    pub min_participants: i32,
    /// Cap on distinct participants.
    pub max_participants: Option<i32>,
    /// Betting window length.
    pub voting_period_minutes: i64,
    /// Start of the betting window.
    pub voting_starts_at: DateTime<Utc>,
    /// End of the betting window.
    pub voting_ends_at: DateTime<Utc>,
    /// Options in display order.
    pub options: Vec<NewGroupWagerOption>,
    /// Display linkage.
    pub message_id: Option<i64>,
    /// Display linkage.
    pub channel_id: Option<i64>,
}

/// Insert payload for one option.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGroupWagerOption {
    /// Label.
    pub text: String,
    /// Fixed multiplier (house only).
    pub odds_multiplier: Option<f64>,
}

/// A wager together with its options and participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupWagerDetail {
    /// Header row.
    pub wager: GroupWager,
    /// Options ordered by `option_order`.
    pub options: Vec<GroupWagerOption>,
    /// Participants ordered by join time.
    pub participants: Vec<GroupWagerParticipant>,
}

impl GroupWagerDetail {
    /// Looks up an option of this wager.
    #[must_use]
    pub fn option(&self, id: OptionId) -> Option<&GroupWagerOption> {
        self.options.iter().find(|o| o.id == id)
    }

    /// Looks up a user's position.
    #[must_use]
    pub fn participant(&self, discord_id: DiscordId) -> Option<&GroupWagerParticipant> {
        self.participants
            .iter()
            .find(|p| p.discord_id == discord_id)
    }

    /// Number of distinct participants.
    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Multiplier shown next to an option.
    ///
    /// For `house` wagers this is the fixed multiplier. For `pool` wagers it
    /// is recomputed from current totals as `total_pot / max(option_total, 1)`
    /// and is informational only.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn display_multiplier(&self, option: &GroupWagerOption) -> f64 {
        match self.wager.wager_type {
            GroupWagerType::House => option.odds_multiplier.unwrap_or(1.0),
            GroupWagerType::Pool => {
                self.wager.total_pot as f64 / option.total_amount.max(1) as f64
            }
        }
    }
}

/// Amount credited to one winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    /// Winner.
    pub discord_id: DiscordId,
    /// Winner's stake.
    pub stake: i64,
    /// Credited amount, stake included.
    pub amount: i64,
}

/// Computes the payouts for `winning_option`, in ascending `discord_id`
/// order.
///
/// Losers are not listed: their stakes were debited at bet time. For pool
/// wagers whose winning option has no stake, nobody is paid and the pot is
/// retained. Returns `None` if any payout does not fit in an `i64`.
#[must_use]
pub fn calculate_payouts(
    detail: &GroupWagerDetail,
    winning_option: &GroupWagerOption,
) -> Option<Vec<Payout>> {
    let winners = detail
        .participants
        .iter()
        .filter(|p| p.option_id == winning_option.id);

    let mut payouts = match detail.wager.wager_type {
        GroupWagerType::Pool => {
            let option_total = i128::from(winning_option.total_amount);
            if option_total <= 0 {
                return Some(Vec::new());
            }
            let pot = i128::from(detail.wager.total_pot);
            winners
                .map(|p| {
                    let amount = i64::try_from(i128::from(p.amount) * pot / option_total).ok()?;
                    Some(Payout {
                        discord_id: p.discord_id,
                        stake: p.amount,
                        amount,
                    })
                })
                .collect::<Option<Vec<_>>>()?
        }
        GroupWagerType::House => {
            let multiplier = winning_option.odds_multiplier.unwrap_or(1.0);
            winners
                .map(|p| {
                    Some(Payout {
                        discord_id: p.discord_id,
                        stake: p.amount,
                        amount: apply_multiplier(p.amount, multiplier)?,
                    })
                })
                .collect::<Option<Vec<_>>>()?
        }
    };
    payouts.sort_by_key(|p| p.discord_id);
    Some(payouts)
}

/// 2^63, the first float past `i64::MAX`.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Floors `stake * multiplier`, or `None` if the product is not finite or
/// leaves the `i64` range.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn apply_multiplier(stake: i64, multiplier: f64) -> Option<i64> {
    let product = (stake as f64 * multiplier).floor();
    (product.is_finite() && product >= -I64_BOUND && product < I64_BOUND)
        .then_some(product as i64)
}
