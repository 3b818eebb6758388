//! Ledger error types with HTTP status code mapping.
//!
//! [`LedgerError`] is the single error type returned by every service
//! operation. Variants carry structured context (ids, amounts, states) and
//! leave user-facing wording to the calling layer. Any error returned from a
//! service means the caller must not commit its unit of work.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{DiscordId, OptionId};

/// Structured JSON error response body.
///
/// ```json
/// {
///   "error": {
///     "code": 4001,
///     "kind": "insufficient_funds",
///     "message": "insufficient funds: user 42 has 10, needs 50"
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code, stable kind and message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Stable machine-readable kind.
    pub kind: &'static str,
    /// Diagnostic message.
    pub message: String,
}

/// Errors raised by the ledger core.
///
/// # Error Code Ranges
///
/// | Range     | Category            | HTTP Status                  |
/// |-----------|---------------------|------------------------------|
/// | 1000–1999 | Validation          | 400 Bad Request              |
/// | 2000–2999 | Not found           | 404 Not Found                |
/// | 3000–3999 | Server              | 500 Internal Server Error    |
/// | 4000–4999 | Funds / state       | 409 Conflict / 422           |
/// | 5000–5999 | Authorization       | 403 Forbidden                |
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Non-positive or otherwise unusable quantity.
    #[error("invalid amount: {amount}")]
    InvalidAmount {
        /// Offending amount.
        amount: i64,
    },

    /// Balance too low for the requested debit.
    #[error("insufficient funds: user {discord_id} has {balance}, needs {required}")]
    InsufficientFunds {
        /// Deficient account.
        discord_id: DiscordId,
        /// Current balance.
        balance: i64,
        /// Amount that was needed.
        required: i64,
    },

    /// Group wager no longer accepts the operation.
    #[error("group wager is not active (state: {state})")]
    WagerNotActive {
        /// Current state.
        state: String,
    },

    /// State machine violation.
    #[error("wrong state: expected {expected}, found {actual}")]
    WrongState {
        /// State(s) the operation requires.
        expected: &'static str,
        /// Actual state.
        actual: String,
    },

    /// Betting window has closed.
    #[error("voting period ended at {ended_at}")]
    VotingPeriodEnded {
        /// End of the betting window.
        ended_at: DateTime<Utc>,
    },

    /// Resolution attempted while bets are still accepted.
    #[error("voting period still open until {ends_at}")]
    VotingStillOpen {
        /// End of the betting window.
        ends_at: DateTime<Utc>,
    },

    /// User already backs another option of this group wager.
    #[error("already participating on option {option_id}")]
    AlreadyParticipating {
        /// Option the user already backs.
        option_id: OptionId,
    },

    /// Too few distinct participants to resolve.
    #[error("not enough participants: {actual} of {required}")]
    NotEnoughParticipants {
        /// Configured minimum.
        required: i32,
        /// Current count.
        actual: usize,
    },

    /// Group wager is full.
    #[error("participant limit of {max} reached")]
    ParticipantLimitReached {
        /// Configured maximum.
        max: i32,
    },

    /// Caller is neither proposer nor target.
    #[error("user {0} is not a participant")]
    NotParticipant(DiscordId),

    /// Caller is not the wager's target.
    #[error("user {0} is not the target of this wager")]
    NotTarget(DiscordId),

    /// Caller is not the wager's proposer.
    #[error("user {0} is not the proposer of this wager")]
    NotProposer(DiscordId),

    /// Caller may not resolve or cancel this group wager.
    #[error("user {0} is not authorized for this operation")]
    NotAuthorized(DiscordId),

    /// Vote names someone outside the wager.
    #[error("user {0} is not a valid vote target")]
    InvalidVoteTarget(DiscordId),

    /// Proposer and target are the same user.
    #[error("cannot wager against yourself")]
    SelfWager,

    /// Sender and recipient are the same user.
    #[error("cannot transfer to yourself")]
    SelfTransfer,

    /// Empty or over-long condition text.
    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    /// Option list rejected (count, blank or duplicate text).
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Voting period outside the allowed range.
    #[error("invalid voting period: {minutes} minutes (allowed {min}..={max})")]
    InvalidVotingPeriod {
        /// Requested minutes.
        minutes: i64,
        /// Lower bound.
        min: i64,
        /// Upper bound.
        max: i64,
    },

    /// House odds missing or not a positive finite number.
    #[error("invalid odds: {0}")]
    InvalidOdds(String),

    /// Participant limits are inconsistent.
    #[error("invalid participant limits: min {min}, max {max:?}")]
    InvalidParticipantLimits {
        /// Requested minimum.
        min: i32,
        /// Requested maximum.
        max: Option<i32>,
    },

    /// Bet probability outside the configured bounds.
    #[error("invalid win probability: {0}")]
    InvalidProbability(f64),

    /// Unknown id.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// Requested id.
        id: i64,
    },

    /// Mutation attempted through the global (guild `0`) scope.
    #[error("global scope is read-only")]
    ReadOnlyScope,

    /// Unit of work already committed or rolled back.
    #[error("unit of work is already closed")]
    TransactionClosed,

    /// Database failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Internal invariant broken.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Shorthand for [`LedgerError::NotFound`].
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<i64>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidAmount { .. } => 1001,
            Self::SelfWager => 1002,
            Self::SelfTransfer => 1003,
            Self::InvalidCondition(_) => 1004,
            Self::InvalidOptions(_) => 1005,
            Self::InvalidVotingPeriod { .. } => 1006,
            Self::InvalidOdds(_) => 1007,
            Self::InvalidParticipantLimits { .. } => 1008,
            Self::InvalidProbability(_) => 1009,
            Self::InvalidVoteTarget(_) => 1010,
            Self::NotFound { .. } => 2001,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::TransactionClosed => 3002,
            Self::InsufficientFunds { .. } => 4001,
            Self::WagerNotActive { .. } => 4002,
            Self::WrongState { .. } => 4003,
            Self::VotingPeriodEnded { .. } => 4004,
            Self::VotingStillOpen { .. } => 4005,
            Self::AlreadyParticipating { .. } => 4006,
            Self::NotEnoughParticipants { .. } => 4007,
            Self::ParticipantLimitReached { .. } => 4008,
            Self::NotParticipant(_) => 5001,
            Self::NotTarget(_) => 5002,
            Self::NotProposer(_) => 5003,
            Self::NotAuthorized(_) => 5004,
            Self::ReadOnlyScope => 5005,
        }
    }

    /// Returns the stable snake_case kind for this variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::WagerNotActive { .. } => "wager_not_active",
            Self::WrongState { .. } => "wrong_state",
            Self::VotingPeriodEnded { .. } => "voting_period_ended",
            Self::VotingStillOpen { .. } => "voting_still_open",
            Self::AlreadyParticipating { .. } => "already_participating",
            Self::NotEnoughParticipants { .. } => "not_enough_participants",
            Self::ParticipantLimitReached { .. } => "participant_limit_reached",
            Self::NotParticipant(_) => "not_participant",
            Self::NotTarget(_) => "not_target",
            Self::NotProposer(_) => "not_proposer",
            Self::NotAuthorized(_) => "not_authorized",
            Self::InvalidVoteTarget(_) => "invalid_vote_target",
            Self::SelfWager => "self_wager",
            Self::SelfTransfer => "self_transfer",
            Self::InvalidCondition(_) => "invalid_condition",
            Self::InvalidOptions(_) => "invalid_options",
            Self::InvalidVotingPeriod { .. } => "invalid_voting_period",
            Self::InvalidOdds(_) => "invalid_odds",
            Self::InvalidParticipantLimits { .. } => "invalid_participant_limits",
            Self::InvalidProbability(_) => "invalid_probability",
            Self::NotFound { .. } => "not_found",
            Self::ReadOnlyScope => "read_only_scope",
            Self::TransactionClosed => "transaction_closed",
            Self::Persistence(_) => "persistence",
            Self::Internal(_) => "internal",
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidAmount { .. }
            | Self::SelfWager
            | Self::SelfTransfer
            | Self::InvalidCondition(_)
            | Self::InvalidOptions(_)
            | Self::InvalidVotingPeriod { .. }
            | Self::InvalidOdds(_)
            | Self::InvalidParticipantLimits { .. }
            | Self::InvalidProbability(_)
            | Self::InvalidVoteTarget(_) => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::WagerNotActive { .. }
            | Self::WrongState { .. }
            | Self::VotingPeriodEnded { .. }
            | Self::VotingStillOpen { .. }
            | Self::AlreadyParticipating { .. }
            | Self::NotEnoughParticipants { .. }
            | Self::ParticipantLimitReached { .. } => StatusCode::CONFLICT,
            Self::NotParticipant(_)
            | Self::NotTarget(_)
            | Self::NotProposer(_)
            | Self::NotAuthorized(_)
            | Self::ReadOnlyScope => StatusCode::FORBIDDEN,
            Self::Persistence(_) | Self::Internal(_) | Self::TransactionClosed => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                kind: self.kind(),
                message: self.to_string(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn funds_errors_are_unprocessable() {
        let err = LedgerError::InsufficientFunds {
            discord_id: DiscordId::new(42),
            balance: 10,
            required: 50,
        };
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.error_code(), 4001);
        assert_eq!(err.kind(), "insufficient_funds");
        assert_eq!(err.to_string(), "insufficient funds: user 42 has 10, needs 50");
    }

    #[test]
    fn not_found_helper_accepts_typed_ids() {
        let err = LedgerError::not_found("wager", crate::domain::WagerId::new(9));
        assert_eq!(err.to_string(), "wager not found: 9");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn authorization_errors_are_forbidden() {
        assert_eq!(
            LedgerError::NotTarget(DiscordId::new(1)).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(LedgerError::ReadOnlyScope.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn into_response_sets_status() {
        let response = LedgerError::SelfWager.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
