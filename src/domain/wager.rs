//! 1-on-1 wagers resolved by peer vote.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{DiscordId, GuildId, WagerId};

/// Lifecycle of a 1-on-1 wager.
///
/// ```text
/// proposed ──accept──▶ voting ──agreeing votes──▶ resolved
///    │
///    ├──decline──▶ declined
///    └──cancel───▶ cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WagerState {
    /// Waiting for the target to respond.
    Proposed,
    /// Accepted; participants are voting on the winner.
    Voting,
    /// Settled. Terminal.
    Resolved,
    /// Target declined. Terminal.
    Declined,
    /// Proposer withdrew. Terminal.
    Cancelled,
}

impl WagerState {
    /// Returns the database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Voting => "voting",
            Self::Resolved => "resolved",
            Self::Declined => "declined",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns `true` for states with no outgoing transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Declined | Self::Cancelled)
    }
}

impl fmt::Display for WagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WagerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proposed" => Ok(Self::Proposed),
            "voting" => Ok(Self::Voting),
            "resolved" => Ok(Self::Resolved),
            "declined" => Ok(Self::Declined),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown wager state: {other}")),
        }
    }
}

/// A 1-on-1 wager between a proposer and a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wager {
    /// Row id.
    pub id: WagerId,
    /// Owning guild.
    pub guild_id: GuildId,
    /// User who proposed the wager.
    pub proposer_discord_id: DiscordId,
    /// User challenged by the proposer.
    pub target_discord_id: DiscordId,
    /// Stake each side puts up.
    pub amount: i64,
    /// Free-text condition.
    pub condition: String,
    /// Current state.
    pub state: WagerState,
    /// Set once resolved.
    pub winner_discord_id: Option<DiscordId>,
    /// Display linkage, opaque to the ledger.
    pub message_id: Option<i64>,
    /// Display linkage, opaque to the ledger.
    pub channel_id: Option<i64>,
    /// Proposal time.
    pub created_at: DateTime<Utc>,
    /// Acceptance time.
    pub accepted_at: Option<DateTime<Utc>>,
    /// Resolution time.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Wager {
    /// Returns `true` if `id` is the proposer or the target.
    #[must_use]
    pub fn is_participant(&self, id: DiscordId) -> bool {
        id == self.proposer_discord_id || id == self.target_discord_id
    }

    /// Returns the participant that is not `id`.
    #[must_use]
    pub fn counterparty(&self, id: DiscordId) -> DiscordId {
        if id == self.proposer_discord_id {
            self.target_discord_id
        } else {
            self.proposer_discord_id
        }
    }
}

/// Insert payload for [`Wager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWager {
    /// Proposing user.
    pub proposer_discord_id: DiscordId,
    /// Challenged user.
    pub target_discord_id: DiscordId,
    /// Stake.
    pub amount: i64,
    /// Free-text condition.
    pub condition: String,
    /// Display linkage.
    pub message_id: Option<i64>,
    /// Display linkage.
    pub channel_id: Option<i64>,
}

/// A participant's choice of winner. `(wager_id, voter_discord_id)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagerVote {
    /// Wager voted on.
    pub wager_id: WagerId,
    /// Voting participant.
    pub voter_discord_id: DiscordId,
    /// Participant the voter claims won.
    pub vote_for_discord_id: DiscordId,
    /// Last time the vote was cast or changed.
    pub updated_at: DateTime<Utc>,
}

/// Result of counting the votes on a wager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteTally {
    /// At least one participant has not voted.
    Pending,
    /// Both voted for different winners.
    Disputed,
    /// Both voted for the same winner.
    Agreed(DiscordId),
}

/// Counts the participants' votes.
///
/// Votes from anyone other than the two participants are ignored.
#[must_use]
pub fn tally_votes(wager: &Wager, votes: &[WagerVote]) -> VoteTally {
    let find = |voter: DiscordId| {
        votes
            .iter()
            .find(|v| v.voter_discord_id == voter)
            .map(|v| v.vote_for_discord_id)
    };
    match (
        find(wager.proposer_discord_id),
        find(wager.target_discord_id),
    ) {
        (Some(a), Some(b)) if a == b => VoteTally::Agreed(a),
        (Some(_), Some(_)) => VoteTally::Disputed,
        _ => VoteTally::Pending,
    }
}
