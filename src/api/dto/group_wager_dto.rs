//! Group wager DTOs.

use serde::{Deserialize, Serialize};

use crate::domain::{
    DiscordId, GroupWager, GroupWagerDetail, GroupWagerParticipant, GroupWagerType,
    NewGroupWagerOption, OptionId,
};
use crate::service::CreateGroupWager;

/// One option in a `POST /group-wagers` request.
#[derive(Debug, Deserialize)]
pub struct OptionRequest {
    /// Label.
    pub text: String,
    /// Fixed multiplier, required for house wagers.
    #[serde(default)]
    pub odds: Option<f64>,
}

/// Request body for `POST /group-wagers`.
#[derive(Debug, Deserialize)]
pub struct CreateGroupWagerRequest {
    /// Creating user, omitted for system wagers.
    #[serde(default)]
    pub creator: Option<DiscordId>,
    /// Free-text condition.
    pub condition: String,
    /// `pool` or `house`.
    pub wager_type: GroupWagerType,
    /// Options in display order.
    pub options: Vec<OptionRequest>,
    /// Betting window length.
    pub voting_period_minutes: i64,
    /// Participants required to resolve.
    #[serde(default)]
    pub min_participants: Option<i32>,
    /// Cap on participants.
    #[serde(default)]
    pub max_participants: Option<i32>,
    /// Display linkage.
    #[serde(default)]
    pub message_id: Option<i64>,
    /// Display linkage.
    #[serde(default)]
    pub channel_id: Option<i64>,
}

impl From<CreateGroupWagerRequest> for CreateGroupWager {
    fn from(req: CreateGroupWagerRequest) -> Self {
        Self {
            creator: req.creator,
            condition: req.condition,
            wager_type: req.wager_type,
            options: req
                .options
                .into_iter()
                .map(|o| NewGroupWagerOption {
                    text: o.text,
                    odds_multiplier: o.odds,
                })
                .collect(),
            voting_period_minutes: req.voting_period_minutes,
            min_participants: req.min_participants,
            max_participants: req.max_participants,
            message_id: req.message_id,
            channel_id: req.channel_id,
        }
    }
}

/// Request body for `POST /group-wagers/{id}/bets`.
#[derive(Debug, Deserialize)]
pub struct GroupBetRequest {
    /// Bettor.
    pub discord_id: DiscordId,
    /// Backed option.
    pub option_id: OptionId,
    /// Stake added to the position.
    pub amount: i64,
}

/// Request body for `POST /group-wagers/{id}/resolve`.
#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    /// Resolving user.
    pub resolver: DiscordId,
    /// Winning option.
    pub winning_option_id: OptionId,
}

/// Option with its current display multiplier.
#[derive(Debug, Serialize)]
pub struct OptionView {
    /// Option id.
    pub id: OptionId,
    /// Label.
    pub text: String,
    /// Zero-based position.
    pub order: i32,
    /// Sum of stakes.
    pub total_amount: i64,
    /// Fixed odds for house wagers, current pot ratio for pool wagers.
    pub multiplier: f64,
}

/// Response body for `GET /group-wagers/{id}` and `POST /group-wagers`.
#[derive(Debug, Serialize)]
pub struct GroupWagerResponse {
    /// Header row.
    #[serde(flatten)]
    pub wager: GroupWager,
    /// Options with display multipliers.
    pub options: Vec<OptionView>,
    /// Positions ordered by join time.
    pub participants: Vec<GroupWagerParticipant>,
}

impl From<GroupWagerDetail> for GroupWagerResponse {
    fn from(detail: GroupWagerDetail) -> Self {
        let options = detail
            .options
            .iter()
            .map(|o| OptionView {
                id: o.id,
                text: o.option_text.clone(),
                order: o.option_order,
                total_amount: o.total_amount,
                multiplier: detail.display_multiplier(o),
            })
            .collect();
        Self {
            wager: detail.wager,
            options,
            participants: detail.participants,
        }
    }
}
