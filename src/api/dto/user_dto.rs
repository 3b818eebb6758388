//! User, transfer and single-shot bet DTOs.

use serde::{Deserialize, Serialize};

use crate::domain::{BalanceChange, DiscordId, User};

/// Request body for `POST /users`.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    /// Discord user id.
    pub discord_id: DiscordId,
    /// Display name, stored on first creation only.
    #[serde(default)]
    pub username: String,
}

/// Query parameters for `GET /users/{discord_id}/history`.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryParams {
    /// Maximum rows, newest first. Defaults to 20, capped at 100.
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

fn default_history_limit() -> i64 {
    20
}

/// Response body for `GET /high-roller`.
#[derive(Debug, Serialize)]
pub struct HighRollerResponse {
    /// Richest user, `None` for a guild without users.
    pub high_roller: Option<User>,
}

/// Request body for `POST /transfers`.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    /// Debited user.
    pub from: DiscordId,
    /// Credited user.
    pub to: DiscordId,
    /// Bits moved.
    pub amount: i64,
}

/// Response body for `POST /transfers`.
#[derive(Debug, Serialize)]
pub struct TransferResponse {
    /// Sender's balance movement.
    pub from: BalanceChange,
    /// Recipient's balance movement.
    pub to: BalanceChange,
}

/// Request body for `POST /bets`.
#[derive(Debug, Deserialize)]
pub struct PlaceBetRequest {
    /// Bettor.
    pub discord_id: DiscordId,
    /// Stake.
    pub amount: i64,
    /// Chance of winning, strictly between 0 and 1.
    pub win_probability: f64,
}
