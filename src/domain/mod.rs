//! Domain layer: identifiers, entities, payout math, and the event system.
//!
//! Entities here are plain values returned by repositories. Nothing in this
//! module touches the database or holds state between calls, except the
//! process-wide [`EventBus`].

pub mod bet;
pub mod clock;
pub mod event_bus;
pub mod group_wager;
pub mod ids;
pub mod ledger_event;
pub mod user;
pub mod wager;

pub use bet::{Bet, NewBet};
pub use clock::{Clock, ManualClock, SystemClock};
pub use event_bus::EventBus;
pub use group_wager::{
    GroupWager, GroupWagerDetail, GroupWagerOption, GroupWagerParticipant, GroupWagerState,
    GroupWagerType, NewGroupWager, NewGroupWagerOption, Payout,
};
pub use ids::{BetId, DiscordId, GroupWagerId, GuildId, OptionId, WagerId};
pub use ledger_event::{EventKind, LedgerEvent};
pub use user::{
    BalanceChange, BalanceHistory, HistoryRefs, NewBalanceHistory, TransactionType, User,
};
pub use wager::{NewWager, VoteTally, Wager, WagerState, WagerVote};
