//! Type-safe identifiers.
//!
//! Every id in the ledger is a signed 64-bit integer on the wire and in the
//! database (`BIGINT`). Discord snowflakes fit in `i64`, and row ids come from
//! `BIGSERIAL` columns. Each kind gets its own newtype so that a wager id can
//! never be passed where a Discord user id is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw integer id.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw integer id.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Tenant boundary. All entities are scoped by guild.
    GuildId
);

define_id!(
    /// Discord user snowflake.
    DiscordId
);

define_id!(
    /// Row id of a 1-on-1 wager.
    WagerId
);

define_id!(
    /// Row id of a group wager.
    GroupWagerId
);

define_id!(
    /// Row id of a group wager option.
    OptionId
);

define_id!(
    /// Row id of a single-shot bet.
    BetId
);

impl GuildId {
    /// Sentinel guild used for cross-guild discovery queries. Units of work
    /// opened for it are read-only.
    pub const GLOBAL: Self = Self(0);

    /// Returns `true` for the [`GuildId::GLOBAL`] sentinel.
    #[must_use]
    pub const fn is_global(self) -> bool {
        self.0 == 0
    }
}
