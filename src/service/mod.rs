//! Service layer: business logic orchestration.
//!
//! [`Ledger`] opens guild-scoped [`UnitOfWork`]s. Each service is a short-lived
//! borrow of a unit of work (`uow.users()`, `uow.wagers()`, ...): it runs its
//! reads and writes inside the unit's transaction and stages events on it.
//! Nothing is durable or published until the caller commits.
//!
//! ```text
//! let mut uow = ledger.begin(guild_id).await?;
//! uow.users().transfer(from, to, 500).await?;
//! uow.commit().await?;
//! ```

pub mod bet_service;
pub mod expiration;
pub mod group_wager_service;
pub mod ledger;
pub mod unit_of_work;
pub mod user_service;
pub mod wager_service;

#[cfg(test)]
pub(crate) mod test_support;

pub use bet_service::BetService;
pub use expiration::{ExpirationSweeper, SweepReport};
pub use group_wager_service::{CreateGroupWager, GroupWagerService, Settlement};
pub use ledger::Ledger;
pub use unit_of_work::UnitOfWork;
pub use user_service::UserService;
pub use wager_service::{ProposeWager, VoteOutcome, WagerService};

/// Longest accepted condition text, in characters.
pub const MAX_CONDITION_LEN: usize = 500;

/// Trims a condition and checks it is non-empty and not over-long.
pub(crate) fn validate_condition(condition: &str) -> crate::error::Result<String> {
    let trimmed = condition.trim();
    if trimmed.is_empty() {
        return Err(crate::error::LedgerError::InvalidCondition(
            "condition is empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_CONDITION_LEN {
        return Err(crate::error::LedgerError::InvalidCondition(format!(
            "condition exceeds {MAX_CONDITION_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}
