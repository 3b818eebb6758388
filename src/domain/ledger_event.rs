//! Domain events describing committed ledger changes.
//!
//! Services stage a [`LedgerEvent`] on their unit of work for every change
//! they make. The unit of work publishes staged events through the
//! [`super::EventBus`] only after the database transaction commits, so a
//! subscriber never sees an event for a change that did not persist.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::group_wager::GroupWagerState;
use super::ids::{DiscordId, GroupWagerId, GuildId, WagerId};
use super::user::TransactionType;
use super::wager::WagerState;

/// Discriminant of a [`LedgerEvent`], used for filtered subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// [`LedgerEvent::BalanceChanged`].
    BalanceChanged,
    /// [`LedgerEvent::WagerStateChanged`].
    WagerStateChanged,
    /// [`LedgerEvent::GroupWagerStateChanged`].
    GroupWagerStateChanged,
}

/// Domain event emitted after a committed change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A user's balance changed.
    BalanceChanged {
        /// Guild the account belongs to.
        guild_id: GuildId,
        /// Account owner.
        discord_id: DiscordId,
        /// Balance before the change.
        old_balance: i64,
        /// Balance after the change.
        new_balance: i64,
        /// `new_balance - old_balance`.
        change_amount: i64,
        /// Reason for the change.
        transaction_type: TransactionType,
        /// When the change was made.
        timestamp: DateTime<Utc>,
    },

    /// A 1-on-1 wager moved between states.
    WagerStateChanged {
        /// Guild the wager belongs to.
        guild_id: GuildId,
        /// Wager identifier.
        wager_id: WagerId,
        /// State before the transition.
        old_state: WagerState,
        /// State after the transition.
        new_state: WagerState,
        /// Display linkage.
        message_id: Option<i64>,
        /// Display linkage.
        channel_id: Option<i64>,
        /// When the transition happened.
        timestamp: DateTime<Utc>,
    },

    /// A group wager moved between states.
    GroupWagerStateChanged {
        /// Guild the wager belongs to.
        guild_id: GuildId,
        /// Wager identifier.
        group_wager_id: GroupWagerId,
        /// State before the transition.
        old_state: GroupWagerState,
        /// State after the transition.
        new_state: GroupWagerState,
        /// Display linkage.
        message_id: Option<i64>,
        /// Display linkage.
        channel_id: Option<i64>,
        /// When the transition happened.
        timestamp: DateTime<Utc>,
    },
}

impl LedgerEvent {
    /// Returns the guild this event belongs to.
    #[must_use]
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::BalanceChanged { guild_id, .. }
            | Self::WagerStateChanged { guild_id, .. }
            | Self::GroupWagerStateChanged { guild_id, .. } => *guild_id,
        }
    }

    /// Returns the event discriminant.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::BalanceChanged { .. } => EventKind::BalanceChanged,
            Self::WagerStateChanged { .. } => EventKind::WagerStateChanged,
            Self::GroupWagerStateChanged { .. } => EventKind::GroupWagerStateChanged,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::BalanceChanged { .. } => "balance_changed",
            Self::WagerStateChanged { .. } => "wager_state_changed",
            Self::GroupWagerStateChanged { .. } => "group_wager_state_changed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balance_event() -> LedgerEvent {
        LedgerEvent::BalanceChanged {
            guild_id: GuildId::new(5),
            discord_id: DiscordId::new(77),
            old_balance: 100,
            new_balance: 60,
            change_amount: -40,
            transaction_type: TransactionType::TransferOut,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn kind_and_type_str_agree() {
        let event = balance_event();
        assert_eq!(event.kind(), EventKind::BalanceChanged);
        assert_eq!(event.event_type_str(), "balance_changed");
        assert_eq!(event.guild_id(), GuildId::new(5));
    }

    #[test]
    fn serializes_with_tag_and_snake_case_values() {
        let json = serde_json::to_string(&balance_event()).unwrap_or_default();
        assert!(json.contains("\"event_type\":\"balance_changed\""));
        assert!(json.contains("\"transaction_type\":\"transfer_out\""));
        assert!(json.contains("-40"));
    }

    #[test]
    fn group_wager_event_serializes_states() {
        let event = LedgerEvent::GroupWagerStateChanged {
            guild_id: GuildId::new(1),
            group_wager_id: GroupWagerId::new(3),
            old_state: GroupWagerState::Active,
            new_state: GroupWagerState::PendingResolution,
            message_id: Some(11),
            channel_id: Some(12),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap_or_default();
        assert!(json.contains("pending_resolution"));
        assert_eq!(event.kind(), EventKind::GroupWagerStateChanged);
    }
}
