//! One database transaction plus its buffered event outbox.
//!
//! A [`UnitOfWork`] is obtained from [`super::Ledger::begin`]. Services borrow
//! it mutably, run their repository calls inside its transaction and stage
//! [`LedgerEvent`]s on it. [`UnitOfWork::commit`] commits the transaction and
//! only then publishes the staged events, in staging order. Rolling back, or
//! dropping the unit of work without committing, discards both.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{BetService, GroupWagerService, UserService, WagerService};
use crate::config::EngineSettings;
use crate::domain::{Clock, EventBus, GuildId, LedgerEvent};
use crate::error::{LedgerError, Result};
use crate::persistence::StoreTransaction;

/// Guild-scoped transaction with deferred event publication.
#[derive(Debug)]
pub struct UnitOfWork<T: StoreTransaction> {
    guild_id: GuildId,
    tx: Option<T>,
    outbox: Vec<LedgerEvent>,
    event_bus: EventBus,
    settings: Arc<EngineSettings>,
    clock: Arc<dyn Clock>,
}

impl<T: StoreTransaction> UnitOfWork<T> {
    pub(crate) fn new(
        tx: T,
        event_bus: EventBus,
        settings: Arc<EngineSettings>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let guild_id = tx.guild_id();
        tracing::debug!(%guild_id, "unit of work opened");
        Self {
            guild_id,
            tx: Some(tx),
            outbox: Vec::new(),
            event_bus,
            settings,
            clock,
        }
    }

    /// Guild every operation is scoped to.
    #[must_use]
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Engine rules.
    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Current time according to the injected clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Returns `false` once committed or rolled back.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.tx.is_some()
    }

    /// Repository handles of the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::TransactionClosed`] after commit or rollback.
    pub fn repo(&mut self) -> Result<&mut T> {
        self.tx.as_mut().ok_or(LedgerError::TransactionClosed)
    }

    /// Fails for the global scope, which only serves discovery queries.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ReadOnlyScope`] when opened for
    /// [`GuildId::GLOBAL`].
    pub fn ensure_writable(&self) -> Result<()> {
        if self.guild_id.is_global() {
            return Err(LedgerError::ReadOnlyScope);
        }
        Ok(())
    }

    /// Buffers an event until commit.
    pub fn stage(&mut self, event: LedgerEvent) {
        self.outbox.push(event);
    }

    /// Events staged so far.
    #[must_use]
    pub fn staged(&self) -> &[LedgerEvent] {
        &self.outbox
    }

    /// Commits the transaction, then publishes staged events in order.
    ///
    /// If the commit fails the staged events are dropped unpublished.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::TransactionClosed`] if already closed, or the
    /// store's commit error.
    pub async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(LedgerError::TransactionClosed)?;
        let events = std::mem::take(&mut self.outbox);
        if let Err(err) = tx.commit().await {
            tracing::warn!(
                guild_id = %self.guild_id,
                discarded = events.len(),
                error = %err,
                "commit failed, staged events discarded"
            );
            return Err(err);
        }
        let staged = events.len();
        for event in events {
            let _ = self.event_bus.publish(event);
        }
        tracing::debug!(guild_id = %self.guild_id, events = staged, "unit of work committed");
        Ok(())
    }

    /// Aborts the transaction and discards staged events.
    ///
    /// Calling this after [`Self::commit`] or a previous rollback does
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns the store's rollback error.
    pub async fn rollback(&mut self) -> Result<()> {
        self.outbox.clear();
        let Some(tx) = self.tx.take() else {
            return Ok(());
        };
        tracing::debug!(guild_id = %self.guild_id, "unit of work rolled back");
        tx.rollback().await
    }

    /// User and balance operations.
    pub fn users(&mut self) -> UserService<'_, T> {
        UserService::new(self)
    }

    /// Single-shot bets.
    pub fn bets(&mut self) -> BetService<'_, T> {
        BetService::new(self)
    }

    /// 1-on-1 wagers.
    pub fn wagers(&mut self) -> WagerService<'_, T> {
        WagerService::new(self)
    }

    /// Group wagers.
    pub fn group_wagers(&mut self) -> GroupWagerService<'_, T> {
        GroupWagerService::new(self)
    }
}

impl<T: StoreTransaction> Drop for UnitOfWork<T> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::debug!(
                guild_id = %self.guild_id,
                discarded = self.outbox.len(),
                "unit of work dropped without commit, rolling back"
            );
        }
    }
}
