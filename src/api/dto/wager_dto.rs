//! 1-on-1 wager DTOs.

use serde::{Deserialize, Serialize};

use crate::domain::{DiscordId, Wager, WagerVote};
use crate::service::ProposeWager;

/// Request body for `POST /wagers`.
#[derive(Debug, Deserialize)]
pub struct ProposeWagerRequest {
    /// Proposing user.
    pub proposer: DiscordId,
    /// Challenged user.
    pub target: DiscordId,
    /// Stake each side puts up.
    pub amount: i64,
    /// Free-text condition.
    pub condition: String,
    /// Display linkage.
    #[serde(default)]
    pub message_id: Option<i64>,
    /// Display linkage.
    #[serde(default)]
    pub channel_id: Option<i64>,
}

impl From<ProposeWagerRequest> for ProposeWager {
    fn from(req: ProposeWagerRequest) -> Self {
        Self {
            proposer: req.proposer,
            target: req.target,
            amount: req.amount,
            condition: req.condition,
            message_id: req.message_id,
            channel_id: req.channel_id,
        }
    }
}

/// Request body for `POST /wagers/{id}/respond`.
#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    /// Responding user, must be the target.
    pub discord_id: DiscordId,
    /// `true` to accept, `false` to decline.
    pub accept: bool,
}

/// Request body for `POST /wagers/{id}/votes`.
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    /// Voting participant.
    pub voter: DiscordId,
    /// Participant the voter claims won.
    pub vote_for: DiscordId,
}

/// Request body for cancellation endpoints.
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    /// Caller.
    pub discord_id: DiscordId,
}

/// Response body for `GET /wagers/{id}`.
#[derive(Debug, Serialize)]
pub struct WagerDetailResponse {
    /// Wager row.
    #[serde(flatten)]
    pub wager: Wager,
    /// Votes on record.
    pub votes: Vec<WagerVote>,
}
