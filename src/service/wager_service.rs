//! 1-on-1 wagers between a proposer and a target, settled by peer vote.
//!
//! No funds move at proposal or acceptance. Both sides' balances are checked
//! at acceptance; settlement debits the loser and credits the winner once
//! both participants vote for the same winner.

use serde::Serialize;

use crate::domain::{
    DiscordId, HistoryRefs, LedgerEvent, NewWager, TransactionType, VoteTally, Wager, WagerId,
    WagerState, WagerVote, wager::tally_votes,
};
use crate::error::{LedgerError, Result};
use crate::persistence::{StoreTransaction, WagerRepository};

use super::{UnitOfWork, validate_condition};

/// Input for [`WagerService::propose`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposeWager {
    /// Proposing user.
    pub proposer: DiscordId,
    /// Challenged user.
    pub target: DiscordId,
    /// Stake each side puts up.
    pub amount: i64,
    /// Free-text condition.
    pub condition: String,
    /// Display linkage.
    pub message_id: Option<i64>,
    /// Display linkage.
    pub channel_id: Option<i64>,
}

/// Result of [`WagerService::cast_vote`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteOutcome {
    /// Wager after the vote, `resolved` if the votes agreed.
    pub wager: Wager,
    /// Votes currently on record.
    pub votes: Vec<WagerVote>,
    /// Winner, once both participants agree.
    pub winner: Option<DiscordId>,
    /// `true` if both voted for different winners.
    pub disputed: bool,
}

/// 1-on-1 wager operations bound to one unit of work.
#[derive(Debug)]
pub struct WagerService<'a, T: StoreTransaction> {
    uow: &'a mut UnitOfWork<T>,
}

impl<'a, T: StoreTransaction> WagerService<'a, T> {
    pub(crate) fn new(uow: &'a mut UnitOfWork<T>) -> Self {
        Self { uow }
    }

    /// Proposes a wager to `target`.
    ///
    /// The proposer must exist and currently hold `amount`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] if `amount <= 0`.
    /// - [`LedgerError::SelfWager`] if proposer and target are the same.
    /// - [`LedgerError::InvalidCondition`] for a blank or over-long condition.
    /// - [`LedgerError::NotFound`] / [`LedgerError::InsufficientFunds`] for
    ///   the proposer.
    pub async fn propose(&mut self, request: ProposeWager) -> Result<Wager> {
        self.uow.ensure_writable()?;
        if request.amount <= 0 {
            return Err(LedgerError::InvalidAmount {
                amount: request.amount,
            });
        }
        if request.proposer == request.target {
            return Err(LedgerError::SelfWager);
        }
        let condition = validate_condition(&request.condition)?;

        let repo = self.uow.repo()?;
        ensure_funds(repo, request.proposer, request.amount).await?;

        let wager = WagerRepository::create(
            repo,
            &NewWager {
                proposer_discord_id: request.proposer,
                target_discord_id: request.target,
                amount: request.amount,
                condition,
                message_id: request.message_id,
                channel_id: request.channel_id,
            },
        )
        .await?;

        tracing::info!(
            guild_id = %wager.guild_id,
            wager_id = %wager.id,
            proposer = %wager.proposer_discord_id,
            target = %wager.target_discord_id,
            amount = wager.amount,
            "wager proposed"
        );
        Ok(wager)
    }

    /// Accepts or declines a proposed wager.
    ///
    /// On accept both participants must currently hold the stake.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] for an unknown wager.
    /// - [`LedgerError::NotTarget`] if `responder` is not the target.
    /// - [`LedgerError::WrongState`] unless the wager is `proposed`.
    /// - [`LedgerError::InsufficientFunds`] naming the deficient party.
    pub async fn respond(
        &mut self,
        wager_id: WagerId,
        responder: DiscordId,
        accept: bool,
    ) -> Result<Wager> {
        self.uow.ensure_writable()?;
        let now = self.uow.now();
        let repo = self.uow.repo()?;
        let mut wager = load(repo, wager_id).await?;
        if responder != wager.target_discord_id {
            return Err(LedgerError::NotTarget(responder));
        }
        require_state(&wager, WagerState::Proposed)?;

        let old_state = wager.state;
        if accept {
            let (first, second) = ordered(wager.proposer_discord_id, wager.target_discord_id);
            ensure_funds(repo, first, wager.amount).await?;
            ensure_funds(repo, second, wager.amount).await?;
            wager.state = WagerState::Voting;
            wager.accepted_at = Some(now);
        } else {
            wager.state = WagerState::Declined;
        }
        repo.update(&wager).await?;
        self.stage_transition(&wager, old_state);

        tracing::info!(
            guild_id = %wager.guild_id,
            wager_id = %wager.id,
            state = %wager.state,
            "wager answered"
        );
        Ok(wager)
    }

    /// Records a participant's vote and settles the wager once both agree.
    ///
    /// A participant may change their vote by voting again. Disagreeing
    /// votes leave the wager in `voting` until one side changes.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] for an unknown wager.
    /// - [`LedgerError::NotParticipant`] if `voter` is not a participant.
    /// - [`LedgerError::WrongState`] unless the wager is `voting`.
    /// - [`LedgerError::InvalidVoteTarget`] if `vote_for` is not a participant.
    /// - [`LedgerError::InsufficientFunds`] if the loser can no longer pay.
    pub async fn cast_vote(
        &mut self,
        wager_id: WagerId,
        voter: DiscordId,
        vote_for: DiscordId,
    ) -> Result<VoteOutcome> {
        self.uow.ensure_writable()?;
        let repo = self.uow.repo()?;
        let wager = load(repo, wager_id).await?;
        if !wager.is_participant(voter) {
            return Err(LedgerError::NotParticipant(voter));
        }
        require_state(&wager, WagerState::Voting)?;
        if !wager.is_participant(vote_for) {
            return Err(LedgerError::InvalidVoteTarget(vote_for));
        }

        repo.upsert(wager_id, voter, vote_for).await?;
        let votes = repo.list_for_wager(wager_id).await?;
        tracing::debug!(
            guild_id = %wager.guild_id,
            wager_id = %wager.id,
            %voter,
            %vote_for,
            "vote recorded"
        );

        match tally_votes(&wager, &votes) {
            VoteTally::Agreed(winner) => {
                let wager = self.settle(wager, winner).await?;
                Ok(VoteOutcome {
                    wager,
                    votes,
                    winner: Some(winner),
                    disputed: false,
                })
            }
            VoteTally::Disputed => Ok(VoteOutcome {
                wager,
                votes,
                winner: None,
                disputed: true,
            }),
            VoteTally::Pending => Ok(VoteOutcome {
                wager,
                votes,
                winner: None,
                disputed: false,
            }),
        }
    }

    /// Withdraws a proposed wager.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] for an unknown wager.
    /// - [`LedgerError::NotProposer`] if `caller` is not the proposer.
    /// - [`LedgerError::WrongState`] unless the wager is `proposed`.
    pub async fn cancel(&mut self, wager_id: WagerId, caller: DiscordId) -> Result<Wager> {
        self.uow.ensure_writable()?;
        let repo = self.uow.repo()?;
        let mut wager = load(repo, wager_id).await?;
        if caller != wager.proposer_discord_id {
            return Err(LedgerError::NotProposer(caller));
        }
        require_state(&wager, WagerState::Proposed)?;

        let old_state = wager.state;
        wager.state = WagerState::Cancelled;
        repo.update(&wager).await?;
        self.stage_transition(&wager, old_state);

        tracing::info!(guild_id = %wager.guild_id, wager_id = %wager.id, "wager cancelled");
        Ok(wager)
    }

    /// Fetches a wager.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] for an unknown wager.
    pub async fn get(&mut self, wager_id: WagerId) -> Result<Wager> {
        load(self.uow.repo()?, wager_id).await
    }

    /// Lists the votes on a wager.
    ///
    /// # Errors
    ///
    /// Returns a persistence error.
    pub async fn votes(&mut self, wager_id: WagerId) -> Result<Vec<WagerVote>> {
        self.uow.repo()?.list_for_wager(wager_id).await
    }

    async fn settle(&mut self, mut wager: Wager, winner: DiscordId) -> Result<Wager> {
        let loser = wager.counterparty(winner);
        let repo = self.uow.repo()?;
        let (first, second) = ordered(loser, winner);
        for discord_id in [first, second] {
            let required = if discord_id == loser { wager.amount } else { 0 };
            ensure_funds(repo, discord_id, required).await?;
        }

        let refs = HistoryRefs::wager(wager.id);
        let mut users = self.uow.users();
        users
            .adjust_balance(loser, -wager.amount, TransactionType::WagerLoss, refs)
            .await?;
        users
            .adjust_balance(winner, wager.amount, TransactionType::WagerWin, refs)
            .await?;

        let old_state = wager.state;
        wager.state = WagerState::Resolved;
        wager.winner_discord_id = Some(winner);
        wager.resolved_at = Some(self.uow.now());
        self.uow.repo()?.update(&wager).await?;
        self.stage_transition(&wager, old_state);

        tracing::info!(
            guild_id = %wager.guild_id,
            wager_id = %wager.id,
            %winner,
            %loser,
            amount = wager.amount,
            "wager resolved"
        );
        Ok(wager)
    }

    fn stage_transition(&mut self, wager: &Wager, old_state: WagerState) {
        let timestamp = self.uow.now();
        self.uow.stage(LedgerEvent::WagerStateChanged {
            guild_id: wager.guild_id,
            wager_id: wager.id,
            old_state,
            new_state: wager.state,
            message_id: wager.message_id,
            channel_id: wager.channel_id,
            timestamp,
        });
    }
}

async fn load<T: StoreTransaction>(repo: &mut T, wager_id: WagerId) -> Result<Wager> {
    WagerRepository::get_by_id(repo, wager_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("wager", wager_id))
}

fn require_state(wager: &Wager, expected: WagerState) -> Result<()> {
    if wager.state != expected {
        return Err(LedgerError::WrongState {
            expected: expected.as_str(),
            actual: wager.state.to_string(),
        });
    }
    Ok(())
}

fn ordered(a: DiscordId, b: DiscordId) -> (DiscordId, DiscordId) {
    if a <= b { (a, b) } else { (b, a) }
}

async fn ensure_funds<T: StoreTransaction>(
    repo: &mut T,
    discord_id: DiscordId,
    amount: i64,
) -> Result<()> {
    let user = repo
        .get_for_update(discord_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("user", discord_id))?;
    if user.balance < amount {
        return Err(LedgerError::InsufficientFunds {
            discord_id,
            balance: user.balance,
            required: amount,
        });
    }
    Ok(())
}
