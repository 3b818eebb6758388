//! Periodic closing of group wagers whose betting window has ended.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use super::Ledger;
use crate::domain::GuildId;
use crate::error::Result;
use crate::persistence::{GroupWagerRepository, Store};

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Guilds that had at least one active wager.
    pub guilds_scanned: usize,
    /// Wagers moved to `pending_resolution`.
    pub transitioned: usize,
    /// Guilds whose unit of work failed.
    pub failed_guilds: Vec<GuildId>,
}

/// Moves expired `active` group wagers to `pending_resolution`, one unit of
/// work per guild.
#[derive(Debug, Clone)]
pub struct ExpirationSweeper<S: Store> {
    ledger: Ledger<S>,
    interval: Duration,
}

impl<S: Store> ExpirationSweeper<S> {
    /// Creates a sweeper that runs every `interval`.
    #[must_use]
    pub fn new(ledger: Ledger<S>, interval: Duration) -> Self {
        Self { ledger, interval }
    }

    /// Runs a single sweep over every guild with active wagers.
    ///
    /// A failing guild is logged and reported; the remaining guilds are
    /// still swept.
    ///
    /// # Errors
    ///
    /// Returns an error only if the guild list cannot be read.
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let guilds = {
            let mut global = self.ledger.begin(GuildId::GLOBAL).await?;
            let guilds = global.repo()?.get_guilds_with_active_wagers().await;
            global.rollback().await?;
            guilds?
        };

        let mut report = SweepReport {
            guilds_scanned: guilds.len(),
            ..SweepReport::default()
        };
        for guild_id in guilds {
            match self.sweep_guild(guild_id).await {
                Ok(count) => report.transitioned += count,
                Err(e) => {
                    tracing::warn!(%guild_id, error = %e, "expiration sweep failed for guild");
                    report.failed_guilds.push(guild_id);
                }
            }
        }

        if report.transitioned > 0 || !report.failed_guilds.is_empty() {
            tracing::info!(
                guilds = report.guilds_scanned,
                transitioned = report.transitioned,
                failed = report.failed_guilds.len(),
                "expiration sweep finished"
            );
        } else {
            tracing::debug!(guilds = report.guilds_scanned, "expiration sweep found nothing");
        }
        Ok(report)
    }

    async fn sweep_guild(&self, guild_id: GuildId) -> Result<usize> {
        let mut uow = self.ledger.begin(guild_id).await?;
        let closed = uow.group_wagers().transition_expired_wagers().await?;
        uow.commit().await?;
        Ok(closed.len())
    }

    /// Sweeps on every tick until `shutdown` flips to `true` or its sender
    /// is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(interval_secs = self.interval.as_secs(), "expiration sweeper started");

        loop {
            tokio::select! {
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        tracing::warn!(error = %e, "expiration sweep aborted");
                    }
                }
            }
        }
        tracing::info!("expiration sweeper stopped");
    }
}
