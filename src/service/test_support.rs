//! Fixtures shared by the service tests.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};

use super::Ledger;
use crate::config::EngineSettings;
use crate::domain::{DiscordId, EventBus, GuildId, ManualClock, User};
use crate::error::Result;
use crate::persistence::{MemoryStore, UserRepository};

pub(crate) const GUILD: GuildId = GuildId::new(1_000);
pub(crate) const OTHER_GUILD: GuildId = GuildId::new(2_000);
pub(crate) const STARTING_BALANCE: i64 = 1_000;
pub(crate) const RESOLVER: DiscordId = DiscordId::new(900);

pub(crate) fn alice() -> DiscordId {
    DiscordId::new(1)
}

pub(crate) fn bob() -> DiscordId {
    DiscordId::new(2)
}

pub(crate) fn carol() -> DiscordId {
    DiscordId::new(3)
}

pub(crate) fn dave() -> DiscordId {
    DiscordId::new(4)
}

/// A ledger over a [`MemoryStore`] with a manual clock.
pub(crate) struct TestLedger {
    pub(crate) ledger: Ledger<MemoryStore>,
    pub(crate) store: MemoryStore,
    pub(crate) clock: Arc<ManualClock>,
}

impl TestLedger {
    pub(crate) fn new() -> Self {
        let settings = EngineSettings {
            starting_balance: STARTING_BALANCE,
            resolver_ids: BTreeSet::from([RESOLVER]),
            ..EngineSettings::default()
        };
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0)
                .single()
                .unwrap_or_default(),
        ));
        let ledger = Ledger::new(
            store.clone(),
            EventBus::new(256),
            settings,
            Arc::clone(&clock) as Arc<dyn crate::domain::Clock>,
        );
        Self {
            ledger,
            store,
            clock,
        }
    }

    /// Creates users with the starting balance in one committed unit of work.
    pub(crate) async fn seed(&self, guild_id: GuildId, users: &[DiscordId]) -> Result<()> {
        let mut uow = self.ledger.begin(guild_id).await?;
        for &id in users {
            uow.users()
                .get_or_create_user(id, &format!("user-{id}"))
                .await?;
        }
        uow.commit().await
    }

    /// Creates one user with an arbitrary balance and no history.
    pub(crate) async fn seed_with_balance(
        &self,
        guild_id: GuildId,
        id: DiscordId,
        balance: i64,
    ) -> Result<()> {
        let mut uow = self.ledger.begin(guild_id).await?;
        UserRepository::create(uow.repo()?, id, &format!("user-{id}"), balance).await?;
        uow.commit().await
    }

    /// Reads a committed balance.
    pub(crate) async fn balance(&self, guild_id: GuildId, id: DiscordId) -> Result<i64> {
        let mut uow = self.ledger.begin(guild_id).await?;
        let user: User = uow.users().get_user(id).await?;
        Ok(user.balance)
    }
}
