//! Entry point of the ledger core.

use std::sync::Arc;

use super::UnitOfWork;
use crate::config::EngineSettings;
use crate::domain::{Clock, EventBus, GuildId};
use crate::error::Result;
use crate::persistence::Store;

/// Opens units of work against a [`Store`].
///
/// Cheap to clone: every field is a shared handle. One `Ledger` is built at
/// startup and shared by the HTTP handlers and the expiration sweeper.
#[derive(Debug, Clone)]
pub struct Ledger<S: Store> {
    store: S,
    event_bus: EventBus,
    settings: Arc<EngineSettings>,
    clock: Arc<dyn Clock>,
}

impl<S: Store> Ledger<S> {
    /// Creates a new `Ledger`.
    #[must_use]
    pub fn new(
        store: S,
        event_bus: EventBus,
        settings: EngineSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            event_bus,
            settings: Arc::new(settings),
            clock,
        }
    }

    /// Opens a unit of work scoped to `guild_id`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::LedgerError::Persistence`] if the store cannot
    /// start a transaction.
    pub async fn begin(&self, guild_id: GuildId) -> Result<UnitOfWork<S::Tx>> {
        let tx = self.store.begin(guild_id).await?;
        Ok(UnitOfWork::new(
            tx,
            self.event_bus.clone(),
            Arc::clone(&self.settings),
            Arc::clone(&self.clock),
        ))
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Returns the engine rules.
    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Returns a reference to the underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }
}
