//! Group wagers: creation, betting, expiry, resolution and cancellation.
//!
//! Stakes are debited when a bet is placed and accumulate in the wager's
//! pot. Resolution credits winners according to the payout model (see
//! [`crate::domain::group_wager`]); cancellation refunds every stake.

use std::collections::HashSet;

use chrono::Duration;
use serde::Serialize;

use crate::domain::{
    DiscordId, GroupWager, GroupWagerDetail, GroupWagerId, GroupWagerParticipant, GroupWagerState,
    GroupWagerType, HistoryRefs, LedgerEvent, NewGroupWager, NewGroupWagerOption, OptionId, Payout,
    TransactionType, group_wager::calculate_payouts,
};
use crate::error::{LedgerError, Result};
use crate::persistence::{GroupWagerRepository, StoreTransaction, UserRepository};

use super::{UnitOfWork, validate_condition};

/// Input for [`GroupWagerService::create`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreateGroupWager {
    /// Creating user, `None` for system wagers.
    pub creator: Option<DiscordId>,
    /// Free-text condition.
    pub condition: String,
    /// Payout model.
    pub wager_type: GroupWagerType,
    /// Options in display order. House wagers carry an odds multiplier on
    /// every option; pool wagers on none.
    pub options: Vec<NewGroupWagerOption>,
    /// Betting window length.
    pub voting_period_minutes: i64,
    /// Defaults per payout model when `None`.
    pub min_participants: Option<i32>,
    /// Unlimited when `None`.
    pub max_participants: Option<i32>,
    /// Display linkage.
    pub message_id: Option<i64>,
    /// Display linkage.
    pub channel_id: Option<i64>,
}

/// Balance movements performed by a resolution or cancellation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settlement {
    /// Wager after the transition.
    pub wager: GroupWager,
    /// Credits made, one per paid user.
    pub payouts: Vec<Payout>,
}

/// Group wager operations bound to one unit of work.
#[derive(Debug)]
pub struct GroupWagerService<'a, T: StoreTransaction> {
    uow: &'a mut UnitOfWork<T>,
}

impl<'a, T: StoreTransaction> GroupWagerService<'a, T> {
    pub(crate) fn new(uow: &'a mut UnitOfWork<T>) -> Self {
        Self { uow }
    }

    /// Creates an `active` group wager whose betting window starts now.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidCondition`] for a blank or over-long condition.
    /// - [`LedgerError::InvalidOptions`] for a bad option count, a blank
    ///   option or options that differ only by case.
    /// - [`LedgerError::InvalidVotingPeriod`] outside the configured range.
    /// - [`LedgerError::InvalidOdds`] for missing or extra odds, or odds
    ///   outside `(0, max_house_odds]`.
    /// - [`LedgerError::InvalidParticipantLimits`] for inconsistent limits.
    /// - [`LedgerError::NotFound`] if the creator does not exist.
    pub async fn create(&mut self, request: CreateGroupWager) -> Result<GroupWagerDetail> {
        self.uow.ensure_writable()?;
        let condition = validate_condition(&request.condition)?;
        let options = self.validate_options(request.wager_type, request.options)?;

        let settings = self.uow.settings();
        let (min, max) = (settings.min_voting_minutes, settings.max_voting_minutes);
        if !(min..=max).contains(&request.voting_period_minutes) {
            return Err(LedgerError::InvalidVotingPeriod {
                minutes: request.voting_period_minutes,
                min,
                max,
            });
        }

        let min_participants = request.min_participants.unwrap_or(match request.wager_type {
            GroupWagerType::Pool => settings.default_pool_min_participants,
            GroupWagerType::House => settings.default_house_min_participants,
        });
        let limits_ok = min_participants >= 0
            && request
                .max_participants
                .is_none_or(|max| max >= min_participants.max(1));
        if !limits_ok {
            return Err(LedgerError::InvalidParticipantLimits {
                min: min_participants,
                max: request.max_participants,
            });
        }

        let now = self.uow.now();
        let repo = self.uow.repo()?;
        if let Some(creator) = request.creator
            && UserRepository::get_by_id(&mut *repo, creator).await?.is_none()
        {
            return Err(LedgerError::not_found("user", creator));
        }

        let detail = GroupWagerRepository::create(
            repo,
            &NewGroupWager {
                creator_discord_id: request.creator,
                condition,
                wager_type: request.wager_type,
                min_participants,
                max_participants: request.max_participants,
                voting_period_minutes: request.voting_period_minutes,
                voting_starts_at: now,
                voting_ends_at: now + Duration::minutes(request.voting_period_minutes),
                options,
                message_id: request.message_id,
                channel_id: request.channel_id,
            },
        )
        .await?;

        tracing::info!(
            guild_id = %detail.wager.guild_id,
            group_wager_id = %detail.wager.id,
            wager_type = %detail.wager.wager_type,
            options = detail.options.len(),
            ends_at = %detail.wager.voting_ends_at,
            "group wager created"
        );
        Ok(detail)
    }

    /// Stakes `amount` on an option.
    ///
    /// A user backs at most one option per wager; further bets on the same
    /// option add to the existing position.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] for an unknown wager or option.
    /// - [`LedgerError::WagerNotActive`] unless the wager is `active`.
    /// - [`LedgerError::VotingPeriodEnded`] once the window has closed.
    /// - [`LedgerError::InvalidAmount`] if `amount <= 0`.
    /// - [`LedgerError::AlreadyParticipating`] for a different option.
    /// - [`LedgerError::ParticipantLimitReached`] if the wager is full.
    /// - [`LedgerError::InsufficientFunds`] if the stake exceeds the balance.
    pub async fn place_bet(
        &mut self,
        id: GroupWagerId,
        discord_id: DiscordId,
        option_id: OptionId,
        amount: i64,
    ) -> Result<GroupWagerParticipant> {
        self.uow.ensure_writable()?;
        let now = self.uow.now();
        let repo = self.uow.repo()?;
        let wager = load(repo, id).await?;
        if wager.state != GroupWagerState::Active {
            return Err(LedgerError::WagerNotActive {
                state: wager.state.to_string(),
            });
        }
        if wager.voting_ended(now) {
            return Err(LedgerError::VotingPeriodEnded {
                ended_at: wager.voting_ends_at,
            });
        }
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount { amount });
        }

        let detail = load_detail(repo, id).await?;
        if detail.option(option_id).is_none() {
            return Err(LedgerError::not_found("option", option_id));
        }
        match detail.participant(discord_id) {
            Some(position) if position.option_id != option_id => {
                return Err(LedgerError::AlreadyParticipating {
                    option_id: position.option_id,
                });
            }
            Some(_) => {}
            None => {
                if let Some(max) = wager.max_participants
                    && detail.participant_count() >= usize::try_from(max).unwrap_or(0)
                {
                    return Err(LedgerError::ParticipantLimitReached { max });
                }
            }
        }

        self.uow
            .users()
            .adjust_balance(
                discord_id,
                -amount,
                TransactionType::GroupWagerBet,
                HistoryRefs::group_wager(id),
            )
            .await?;
        let position = self
            .uow
            .repo()?
            .record_bet(id, option_id, discord_id, amount, now)
            .await?;

        tracing::info!(
            guild_id = %wager.guild_id,
            group_wager_id = %id,
            %discord_id,
            %option_id,
            amount,
            position = position.amount,
            "group wager bet placed"
        );
        Ok(position)
    }

    /// Closes betting on every `active` wager of the guild whose window has
    /// ended, moving it to `pending_resolution`.
    ///
    /// # Errors
    ///
    /// Returns a persistence error.
    pub async fn transition_expired_wagers(&mut self) -> Result<Vec<GroupWager>> {
        self.uow.ensure_writable()?;
        let now = self.uow.now();
        let expired = self.uow.repo()?.list_expired_active(now).await?;

        let mut transitioned = Vec::with_capacity(expired.len());
        for mut wager in expired {
            let old_state = wager.state;
            wager.state = GroupWagerState::PendingResolution;
            self.uow.repo()?.update_state(&wager).await?;
            self.stage_transition(&wager, old_state);
            tracing::info!(
                guild_id = %wager.guild_id,
                group_wager_id = %wager.id,
                ended_at = %wager.voting_ends_at,
                "group wager betting closed"
            );
            transitioned.push(wager);
        }
        Ok(transitioned)
    }

    /// Declares the winning option and pays the winners.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] for an unknown wager or option.
    /// - [`LedgerError::NotAuthorized`] unless `resolver` is a configured
    ///   resolver.
    /// - [`LedgerError::VotingStillOpen`] for an `active` wager whose window
    ///   has not ended.
    /// - [`LedgerError::WrongState`] for a resolved or cancelled wager.
    /// - [`LedgerError::NotEnoughParticipants`] below the minimum.
    /// - [`LedgerError::InvalidAmount`] if a payout does not fit in an `i64`.
    pub async fn resolve(
        &mut self,
        id: GroupWagerId,
        resolver: DiscordId,
        winning_option_id: OptionId,
    ) -> Result<Settlement> {
        self.uow.ensure_writable()?;
        let now = self.uow.now();
        let is_resolver = self.uow.settings().is_resolver(resolver);
        let repo = self.uow.repo()?;
        let mut wager = load(repo, id).await?;
        if !is_resolver {
            return Err(LedgerError::NotAuthorized(resolver));
        }
        match wager.state {
            GroupWagerState::Active if !wager.voting_ended(now) => {
                return Err(LedgerError::VotingStillOpen {
                    ends_at: wager.voting_ends_at,
                });
            }
            GroupWagerState::Active | GroupWagerState::PendingResolution => {}
            GroupWagerState::Resolved | GroupWagerState::Cancelled => {
                return Err(open_state_required(wager.state));
            }
        }

        let detail = load_detail(repo, id).await?;
        let Some(winning) = detail.option(winning_option_id) else {
            return Err(LedgerError::not_found("option", winning_option_id));
        };
        let participants = detail.participant_count();
        if participants < usize::try_from(wager.min_participants).unwrap_or(0) {
            return Err(LedgerError::NotEnoughParticipants {
                required: wager.min_participants,
                actual: participants,
            });
        }

        let Some(payouts) = calculate_payouts(&detail, winning) else {
            tracing::warn!(
                guild_id = %wager.guild_id,
                group_wager_id = %id,
                %winning_option_id,
                "group wager payout overflows"
            );
            return Err(LedgerError::InvalidAmount {
                amount: winning.total_amount,
            });
        };
        let payouts: Vec<Payout> = payouts.into_iter().filter(|p| p.amount > 0).collect();
        let refs = HistoryRefs::group_wager(id);
        for payout in &payouts {
            self.uow
                .users()
                .adjust_balance(
                    payout.discord_id,
                    payout.amount,
                    TransactionType::GroupWagerWin,
                    refs,
                )
                .await?;
        }

        let old_state = wager.state;
        wager.state = GroupWagerState::Resolved;
        wager.winning_option_id = Some(winning_option_id);
        wager.resolver_discord_id = Some(resolver);
        wager.resolved_at = Some(now);
        self.uow.repo()?.update_state(&wager).await?;
        self.stage_transition(&wager, old_state);

        let paid: i64 = payouts.iter().map(|p| p.amount).sum();
        tracing::info!(
            guild_id = %wager.guild_id,
            group_wager_id = %id,
            %resolver,
            %winning_option_id,
            winners = payouts.len(),
            paid,
            pot = wager.total_pot,
            "group wager resolved"
        );
        Ok(Settlement { wager, payouts })
    }

    /// Cancels an open wager and refunds every stake in full.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] for an unknown wager.
    /// - [`LedgerError::NotAuthorized`] unless `canceller` is the creator or
    ///   a configured resolver.
    /// - [`LedgerError::WrongState`] for a resolved or cancelled wager.
    pub async fn cancel(&mut self, id: GroupWagerId, canceller: DiscordId) -> Result<Settlement> {
        self.uow.ensure_writable()?;
        let now = self.uow.now();
        let is_resolver = self.uow.settings().is_resolver(canceller);
        let repo = self.uow.repo()?;
        let mut wager = load(repo, id).await?;
        if wager.creator_discord_id != Some(canceller) && !is_resolver {
            return Err(LedgerError::NotAuthorized(canceller));
        }
        if wager.state.is_terminal() {
            return Err(open_state_required(wager.state));
        }

        let detail = load_detail(repo, id).await?;
        let mut refunds: Vec<Payout> = detail
            .participants
            .iter()
            .map(|p| Payout {
                discord_id: p.discord_id,
                stake: p.amount,
                amount: p.amount,
            })
            .collect();
        refunds.sort_by_key(|r| r.discord_id);
        let refs = HistoryRefs::group_wager(id);
        for refund in &refunds {
            self.uow
                .users()
                .adjust_balance(
                    refund.discord_id,
                    refund.amount,
                    TransactionType::GroupWagerRefund,
                    refs,
                )
                .await?;
        }

        let old_state = wager.state;
        wager.state = GroupWagerState::Cancelled;
        wager.resolved_at = Some(now);
        self.uow.repo()?.update_state(&wager).await?;
        self.stage_transition(&wager, old_state);

        tracing::info!(
            guild_id = %wager.guild_id,
            group_wager_id = %id,
            %canceller,
            refunds = refunds.len(),
            "group wager cancelled"
        );
        Ok(Settlement {
            wager,
            payouts: refunds,
        })
    }

    /// Fetches a wager with its options and participants.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] for an unknown wager.
    pub async fn get_detail(&mut self, id: GroupWagerId) -> Result<GroupWagerDetail> {
        load_detail(self.uow.repo()?, id).await
    }

    fn validate_options(
        &self,
        wager_type: GroupWagerType,
        options: Vec<NewGroupWagerOption>,
    ) -> Result<Vec<NewGroupWagerOption>> {
        let settings = self.uow.settings();
        if !(settings.min_options..=settings.max_options).contains(&options.len()) {
            return Err(LedgerError::InvalidOptions(format!(
                "expected {} to {} options, got {}",
                settings.min_options,
                settings.max_options,
                options.len()
            )));
        }

        let mut seen = HashSet::with_capacity(options.len());
        let mut cleaned = Vec::with_capacity(options.len());
        for option in options {
            let text = option.text.trim().to_string();
            if text.is_empty() {
                return Err(LedgerError::InvalidOptions("option text is empty".to_string()));
            }
            if !seen.insert(text.to_lowercase()) {
                return Err(LedgerError::InvalidOptions(format!("duplicate option: {text}")));
            }
            match (wager_type, option.odds_multiplier) {
                (GroupWagerType::House, Some(odds))
                    if odds.is_finite() && odds > 0.0 && odds <= settings.max_house_odds => {}
                (GroupWagerType::House, Some(odds)) => {
                    return Err(LedgerError::InvalidOdds(format!("{odds} for option {text}")));
                }
                (GroupWagerType::House, None) => {
                    return Err(LedgerError::InvalidOdds(format!("missing odds for option {text}")));
                }
                (GroupWagerType::Pool, Some(_)) => {
                    return Err(LedgerError::InvalidOdds("pool options take no odds".to_string()));
                }
                (GroupWagerType::Pool, None) => {}
            }
            cleaned.push(NewGroupWagerOption {
                text,
                odds_multiplier: option.odds_multiplier,
            });
        }
        Ok(cleaned)
    }

    fn stage_transition(&mut self, wager: &GroupWager, old_state: GroupWagerState) {
        let timestamp = self.uow.now();
        self.uow.stage(LedgerEvent::GroupWagerStateChanged {
            guild_id: wager.guild_id,
            group_wager_id: wager.id,
            old_state,
            new_state: wager.state,
            message_id: wager.message_id,
            channel_id: wager.channel_id,
            timestamp,
        });
    }
}

async fn load<T: StoreTransaction>(repo: &mut T, id: GroupWagerId) -> Result<GroupWager> {
    GroupWagerRepository::get_by_id(repo, id)
        .await?
        .ok_or_else(|| LedgerError::not_found("group wager", id))
}

async fn load_detail<T: StoreTransaction>(
    repo: &mut T,
    id: GroupWagerId,
) -> Result<GroupWagerDetail> {
    repo.get_detail_by_id(id)
        .await?
        .ok_or_else(|| LedgerError::not_found("group wager", id))
}

fn open_state_required(actual: GroupWagerState) -> LedgerError {
    LedgerError::WrongState {
        expected: "active or pending_resolution",
        actual: actual.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use tokio_test::assert_ok;

    use super::super::test_support::{GUILD, RESOLVER, TestLedger, alice, bob, carol, dave};
    use super::*;

    fn option(text: &str, odds: Option<f64>) -> NewGroupWagerOption {
        NewGroupWagerOption {
            text: text.to_string(),
            odds_multiplier: odds,
        }
    }

    fn pool_request() -> CreateGroupWager {
        CreateGroupWager {
            creator: Some(alice()),
            condition: "which team wins the cup".to_string(),
            wager_type: GroupWagerType::Pool,
            options: vec![option("Red", None), option("Blue", None)],
            voting_period_minutes: 60,
            min_participants: Some(2),
            max_participants: None,
            message_id: Some(5),
            channel_id: Some(6),
        }
    }

    fn option_id(detail: &GroupWagerDetail, order: usize) -> OptionId {
        let Some(option) = detail.options.get(order) else {
            panic!("option {order} missing");
        };
        option.id
    }

    async fn create(t: &TestLedger, request: CreateGroupWager) -> GroupWagerDetail {
        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let detail = assert_ok!(uow.group_wagers().create(request).await);
        assert_ok!(uow.commit().await);
        detail
    }

    async fn bet(t: &TestLedger, id: GroupWagerId, user: DiscordId, option: OptionId, amount: i64) {
        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        assert_ok!(uow.group_wagers().place_bet(id, user, option, amount).await);
        assert_ok!(uow.commit().await);
    }

    fn expire(t: &TestLedger) {
        t.clock.advance(Duration::minutes(61));
    }

    #[tokio::test]
    async fn create_validates_options_and_window() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice()]).await);
        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);

        let mut one = pool_request();
        one.options.truncate(1);
        let one = uow.group_wagers().create(one).await;
        assert!(matches!(one, Err(LedgerError::InvalidOptions(_))));

        let mut dupes = pool_request();
        dupes.options = vec![option("Red", None), option("RED ", None)];
        let dupes = uow.group_wagers().create(dupes).await;
        assert!(matches!(dupes, Err(LedgerError::InvalidOptions(_))));

        let mut short = pool_request();
        short.voting_period_minutes = 4;
        let short = uow.group_wagers().create(short).await;
        assert!(matches!(short, Err(LedgerError::InvalidVotingPeriod { .. })));

        let mut long = pool_request();
        long.voting_period_minutes = 10_081;
        let long = uow.group_wagers().create(long).await;
        assert!(matches!(long, Err(LedgerError::InvalidVotingPeriod { .. })));

        let mut house = pool_request();
        house.wager_type = GroupWagerType::House;
        let house = uow.group_wagers().create(house).await;
        assert!(matches!(house, Err(LedgerError::InvalidOdds(_))));

        let mut limits = pool_request();
        limits.max_participants = Some(1);
        let limits = uow.group_wagers().create(limits).await;
        assert!(matches!(limits, Err(LedgerError::InvalidParticipantLimits { .. })));
    }

    #[tokio::test]
    async fn create_opens_an_active_window() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice()]).await);
        let detail = create(&t, pool_request()).await;

        assert_eq!(detail.wager.state, GroupWagerState::Active);
        assert_eq!(detail.wager.total_pot, 0);
        assert_eq!(
            detail.wager.voting_ends_at - detail.wager.voting_starts_at,
            Duration::minutes(60)
        );
        assert!(detail.options.iter().all(|o| o.total_amount == 0));
        let orders: Vec<i32> = detail.options.iter().map(|o| o.option_order).collect();
        assert_eq!(orders, vec![0, 1]);
    }

    #[tokio::test]
    async fn pool_resolution_pays_proportional_shares() {
        let t = TestLedger::new();
        assert_ok!(t.seed_with_balance(GUILD, alice(), 1_000).await);
        assert_ok!(t.seed_with_balance(GUILD, bob(), 1_000).await);
        assert_ok!(t.seed_with_balance(GUILD, carol(), 1_000).await);
        let detail = create(&t, pool_request()).await;
        let id = detail.wager.id;
        let (red, blue) = (option_id(&detail, 0), option_id(&detail, 1));

        bet(&t, id, alice(), red, 100).await;
        bet(&t, id, bob(), red, 150).await;
        bet(&t, id, carol(), blue, 750).await;
        expire(&t);

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let settlement = assert_ok!(uow.group_wagers().resolve(id, RESOLVER, red).await);
        assert_ok!(uow.commit().await);

        assert_eq!(settlement.wager.state, GroupWagerState::Resolved);
        assert_eq!(settlement.wager.winning_option_id, Some(red));
        assert_eq!(assert_ok!(t.balance(GUILD, alice()).await), 900 + 400);
        assert_eq!(assert_ok!(t.balance(GUILD, bob()).await), 850 + 600);
        assert_eq!(assert_ok!(t.balance(GUILD, carol()).await), 250);
        assert!(settlement.payouts.iter().all(|p| p.discord_id != carol()));
    }

    #[tokio::test]
    async fn unbacked_winning_option_pays_nobody() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice(), bob()]).await);
        let mut request = pool_request();
        request.options.push(option("Green", None));
        let detail = create(&t, request).await;
        let id = detail.wager.id;

        bet(&t, id, alice(), option_id(&detail, 0), 100).await;
        bet(&t, id, bob(), option_id(&detail, 1), 200).await;
        expire(&t);

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let settlement = assert_ok!(
            uow.group_wagers()
                .resolve(id, RESOLVER, option_id(&detail, 2))
                .await
        );
        assert!(settlement.payouts.is_empty());
        assert_ok!(uow.commit().await);

        assert_eq!(assert_ok!(t.balance(GUILD, alice()).await), 900);
        assert_eq!(assert_ok!(t.balance(GUILD, bob()).await), 800);
    }

    #[tokio::test]
    async fn house_resolution_pays_fixed_odds() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice(), bob()]).await);
        let mut request = pool_request();
        request.wager_type = GroupWagerType::House;
        request.min_participants = None;
        request.options = vec![option("Yes", Some(2.5)), option("No", Some(1.5))];
        let detail = create(&t, request).await;
        assert_eq!(detail.wager.min_participants, 1);
        let id = detail.wager.id;

        bet(&t, id, alice(), option_id(&detail, 0), 101).await;
        bet(&t, id, bob(), option_id(&detail, 1), 100).await;
        expire(&t);

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        assert_ok!(uow.group_wagers().resolve(id, RESOLVER, option_id(&detail, 0)).await);
        assert_ok!(uow.commit().await);

        // floor(101 * 2.5) = 252
        assert_eq!(assert_ok!(t.balance(GUILD, alice()).await), 899 + 252);
        assert_eq!(assert_ok!(t.balance(GUILD, bob()).await), 900);
    }

    #[tokio::test]
    async fn bets_accumulate_on_one_option_only() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice()]).await);
        let detail = create(&t, pool_request()).await;
        let id = detail.wager.id;
        let (red, blue) = (option_id(&detail, 0), option_id(&detail, 1));

        bet(&t, id, alice(), red, 100).await;
        bet(&t, id, alice(), red, 50).await;

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let switch = uow.group_wagers().place_bet(id, alice(), blue, 10).await;
        let Err(LedgerError::AlreadyParticipating { option_id }) = switch else {
            panic!("expected already participating, got {switch:?}");
        };
        assert_eq!(option_id, red);

        let detail = assert_ok!(uow.group_wagers().get_detail(id).await);
        assert_eq!(detail.wager.total_pot, 150);
        assert_eq!(detail.participant_count(), 1);
        assert_eq!(detail.participant(alice()).map(|p| p.amount), Some(150));
    }

    #[tokio::test]
    async fn place_bet_validation() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice(), bob(), carol()]).await);
        let mut request = pool_request();
        request.max_participants = Some(2);
        let detail = create(&t, request).await;
        let id = detail.wager.id;
        let red = option_id(&detail, 0);

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let zero = uow.group_wagers().place_bet(id, alice(), red, 0).await;
        assert!(matches!(zero, Err(LedgerError::InvalidAmount { .. })));
        let broke = uow.group_wagers().place_bet(id, alice(), red, 1_001).await;
        assert!(matches!(broke, Err(LedgerError::InsufficientFunds { .. })));
        let unknown = uow
            .group_wagers()
            .place_bet(id, alice(), OptionId::new(-1), 10)
            .await;
        assert!(matches!(unknown, Err(LedgerError::NotFound { .. })));

        assert_ok!(uow.group_wagers().place_bet(id, alice(), red, 10).await);
        assert_ok!(uow.group_wagers().place_bet(id, bob(), red, 10).await);
        let full = uow.group_wagers().place_bet(id, carol(), red, 10).await;
        assert!(matches!(full, Err(LedgerError::ParticipantLimitReached { max: 2 })));
        assert_ok!(uow.group_wagers().place_bet(id, bob(), red, 10).await);
    }

    #[tokio::test]
    async fn too_few_participants_blocks_resolution() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice()]).await);
        let detail = create(&t, pool_request()).await;
        let id = detail.wager.id;
        let red = option_id(&detail, 0);
        bet(&t, id, alice(), red, 100).await;
        expire(&t);

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let result = uow.group_wagers().resolve(id, RESOLVER, red).await;
        assert!(matches!(
            result,
            Err(LedgerError::NotEnoughParticipants {
                required: 2,
                actual: 1
            })
        ));
        assert!(uow.staged().is_empty());
        drop(uow);

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let detail = assert_ok!(uow.group_wagers().get_detail(id).await);
        assert_eq!(detail.wager.state, GroupWagerState::Active);
        drop(uow);
        assert_eq!(assert_ok!(t.balance(GUILD, alice()).await), 900);
    }

    #[tokio::test]
    async fn resolve_requires_resolver_and_closed_window() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice(), bob()]).await);
        let detail = create(&t, pool_request()).await;
        let id = detail.wager.id;
        let red = option_id(&detail, 0);

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let stranger = uow.group_wagers().resolve(id, alice(), red).await;
        assert!(matches!(stranger, Err(LedgerError::NotAuthorized(_))));
        let early = uow.group_wagers().resolve(id, RESOLVER, red).await;
        assert!(matches!(early, Err(LedgerError::VotingStillOpen { .. })));
    }

    #[tokio::test]
    async fn cancellation_refunds_every_stake() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice(), bob()]).await);
        let detail = create(&t, pool_request()).await;
        let id = detail.wager.id;
        bet(&t, id, alice(), option_id(&detail, 0), 100).await;
        bet(&t, id, bob(), option_id(&detail, 1), 200).await;
        let mut rx = t.ledger.event_bus().subscribe();

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let denied = uow.group_wagers().cancel(id, bob()).await;
        assert!(matches!(denied, Err(LedgerError::NotAuthorized(_))));
        let settlement = assert_ok!(uow.group_wagers().cancel(id, alice()).await);
        assert_eq!(settlement.wager.state, GroupWagerState::Cancelled);
        let refunds: Vec<(DiscordId, i64)> = settlement
            .payouts
            .iter()
            .map(|p| (p.discord_id, p.amount))
            .collect();
        assert_eq!(refunds, vec![(alice(), 100), (bob(), 200)]);
        assert_ok!(uow.commit().await);

        assert_eq!(assert_ok!(t.balance(GUILD, alice()).await), 1_000);
        assert_eq!(assert_ok!(t.balance(GUILD, bob()).await), 1_000);

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        let Some(LedgerEvent::GroupWagerStateChanged {
            old_state,
            new_state,
            message_id,
            ..
        }) = last
        else {
            panic!("expected a state change event last");
        };
        assert_eq!(old_state, GroupWagerState::Active);
        assert_eq!(new_state, GroupWagerState::Cancelled);
        assert_eq!(message_id, Some(5));

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let again = uow.group_wagers().cancel(id, RESOLVER).await;
        assert!(matches!(again, Err(LedgerError::WrongState { .. })));
    }

    #[tokio::test]
    async fn expired_wagers_close_and_reject_bets() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice(), bob(), dave()]).await);
        let detail = create(&t, pool_request()).await;
        let id = detail.wager.id;
        let red = option_id(&detail, 0);
        bet(&t, id, alice(), red, 100).await;

        t.clock.advance(Duration::minutes(60));
        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let late = uow.group_wagers().place_bet(id, bob(), red, 10).await;
        assert!(matches!(late, Err(LedgerError::VotingPeriodEnded { .. })));

        let closed = assert_ok!(uow.group_wagers().transition_expired_wagers().await);
        assert_eq!(closed.len(), 1);
        assert_eq!(uow.staged().len(), 1);
        assert_ok!(uow.commit().await);

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let after = uow.group_wagers().place_bet(id, dave(), red, 10).await;
        assert!(matches!(after, Err(LedgerError::WagerNotActive { .. })));
        let none_left = assert_ok!(uow.group_wagers().transition_expired_wagers().await);
        assert!(none_left.is_empty());
    }

    fn house_request(yes: f64, no: f64) -> CreateGroupWager {
        CreateGroupWager {
            wager_type: GroupWagerType::House,
            min_participants: None,
            options: vec![option("Yes", Some(yes)), option("No", Some(no))],
            ..pool_request()
        }
    }

    async fn resolve(t: &TestLedger, id: GroupWagerId, winning: OptionId) -> Settlement {
        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let settlement = assert_ok!(uow.group_wagers().resolve(id, RESOLVER, winning).await);
        assert_ok!(uow.commit().await);
        settlement
    }

    async fn sweep(t: &TestLedger) {
        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        assert_ok!(uow.group_wagers().transition_expired_wagers().await);
        assert_ok!(uow.commit().await);
    }

    fn last_transition(
        rx: &mut tokio::sync::broadcast::Receiver<LedgerEvent>,
    ) -> (GroupWagerState, GroupWagerState) {
        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            if let LedgerEvent::GroupWagerStateChanged {
                old_state,
                new_state,
                ..
            } = event
            {
                last = Some((old_state, new_state));
            }
        }
        let Some(transition) = last else {
            panic!("no group wager transition published");
        };
        transition
    }

    #[tokio::test]
    async fn house_odds_above_the_limit_are_rejected() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice()]).await);
        let limit = t.ledger.settings().max_house_odds;

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let huge = uow.group_wagers().create(house_request(1e300, 2.0)).await;
        assert!(matches!(huge, Err(LedgerError::InvalidOdds(_))));
        let over = uow.group_wagers().create(house_request(limit + 0.5, 2.0)).await;
        assert!(matches!(over, Err(LedgerError::InvalidOdds(_))));
        let zero = uow.group_wagers().create(house_request(0.0, 2.0)).await;
        assert!(matches!(zero, Err(LedgerError::InvalidOdds(_))));
        assert_ok!(uow.group_wagers().create(house_request(limit, 2.0)).await);
    }

    #[tokio::test]
    async fn overflowing_house_payout_fails_resolution() {
        let t = TestLedger::new();
        let stake = i64::MAX / 2;
        assert_ok!(t.seed_with_balance(GUILD, alice(), stake).await);
        let detail = create(&t, house_request(4.0, 2.0)).await;
        let id = detail.wager.id;
        let yes = option_id(&detail, 0);
        bet(&t, id, alice(), yes, stake).await;
        expire(&t);

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let result = uow.group_wagers().resolve(id, RESOLVER, yes).await;
        assert!(matches!(result, Err(LedgerError::InvalidAmount { .. })));
        assert!(uow.staged().is_empty());
        drop(uow);

        assert_eq!(assert_ok!(t.balance(GUILD, alice()).await), 0);
        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let detail = assert_ok!(uow.group_wagers().get_detail(id).await);
        assert_eq!(detail.wager.state, GroupWagerState::Active);
        assert_eq!(detail.wager.total_pot, stake);
    }

    #[tokio::test]
    async fn resolving_a_swept_wager_leaves_pending_resolution() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice(), bob()]).await);
        let detail = create(&t, pool_request()).await;
        let id = detail.wager.id;
        let red = option_id(&detail, 0);
        bet(&t, id, alice(), red, 100).await;
        bet(&t, id, bob(), option_id(&detail, 1), 100).await;
        expire(&t);
        sweep(&t).await;

        let mut rx = t.ledger.event_bus().subscribe();
        let settlement = resolve(&t, id, red).await;
        assert_eq!(settlement.wager.state, GroupWagerState::Resolved);
        assert_eq!(
            last_transition(&mut rx),
            (GroupWagerState::PendingResolution, GroupWagerState::Resolved)
        );
        assert_eq!(assert_ok!(t.balance(GUILD, alice()).await), 1_100);

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let again = uow.group_wagers().resolve(id, RESOLVER, red).await;
        assert!(matches!(again, Err(LedgerError::WrongState { .. })));
        let cancel = uow.group_wagers().cancel(id, RESOLVER).await;
        assert!(matches!(cancel, Err(LedgerError::WrongState { .. })));
    }

    #[tokio::test]
    async fn resolving_an_expired_active_wager_records_active() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice(), bob()]).await);
        let detail = create(&t, pool_request()).await;
        let id = detail.wager.id;
        let red = option_id(&detail, 0);
        bet(&t, id, alice(), red, 100).await;
        bet(&t, id, bob(), red, 100).await;
        expire(&t);

        let mut rx = t.ledger.event_bus().subscribe();
        resolve(&t, id, red).await;
        assert_eq!(
            last_transition(&mut rx),
            (GroupWagerState::Active, GroupWagerState::Resolved)
        );
    }

    #[tokio::test]
    async fn pending_resolution_wagers_can_be_cancelled() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice(), bob()]).await);
        let detail = create(&t, pool_request()).await;
        let id = detail.wager.id;
        let red = option_id(&detail, 0);
        bet(&t, id, alice(), red, 100).await;
        bet(&t, id, bob(), option_id(&detail, 1), 250).await;
        expire(&t);
        sweep(&t).await;

        let mut rx = t.ledger.event_bus().subscribe();
        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let settlement = assert_ok!(uow.group_wagers().cancel(id, RESOLVER).await);
        assert_ok!(uow.commit().await);
        assert_eq!(settlement.wager.state, GroupWagerState::Cancelled);
        assert_eq!(
            last_transition(&mut rx),
            (GroupWagerState::PendingResolution, GroupWagerState::Cancelled)
        );
        assert_eq!(assert_ok!(t.balance(GUILD, alice()).await), 1_000);
        assert_eq!(assert_ok!(t.balance(GUILD, bob()).await), 1_000);

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let resolved = uow.group_wagers().resolve(id, RESOLVER, red).await;
        assert!(matches!(resolved, Err(LedgerError::WrongState { .. })));
    }

    #[tokio::test]
    async fn settlements_credit_users_in_ascending_id_order() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice(), bob(), carol()]).await);
        let detail = create(&t, pool_request()).await;
        let id = detail.wager.id;
        let (red, blue) = (option_id(&detail, 0), option_id(&detail, 1));
        bet(&t, id, carol(), red, 100).await;
        bet(&t, id, bob(), blue, 100).await;
        bet(&t, id, alice(), red, 100).await;

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let refunds = assert_ok!(uow.group_wagers().cancel(id, RESOLVER).await);
        drop(uow);
        let refunded: Vec<DiscordId> = refunds.payouts.iter().map(|p| p.discord_id).collect();
        assert_eq!(refunded, vec![alice(), bob(), carol()]);

        expire(&t);
        let mut rx = t.ledger.event_bus().subscribe();
        let settlement = resolve(&t, id, red).await;
        let paid: Vec<DiscordId> = settlement.payouts.iter().map(|p| p.discord_id).collect();
        assert_eq!(paid, vec![alice(), carol()]);

        let mut credited = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let LedgerEvent::BalanceChanged { discord_id, .. } = event {
                credited.push(discord_id);
            }
        }
        assert_eq!(credited, vec![alice(), carol()]);
    }

    #[tokio::test]
    async fn pots_and_balances_are_conserved_until_resolution() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice(), bob(), carol()]).await);
        let detail = create(&t, pool_request()).await;
        let id = detail.wager.id;
        bet(&t, id, alice(), option_id(&detail, 0), 120).await;
        bet(&t, id, bob(), option_id(&detail, 1), 80).await;
        bet(&t, id, carol(), option_id(&detail, 1), 45).await;

        let circulating = t.store.total_balance(GUILD).await + t.store.open_pots(GUILD).await;
        assert_eq!(circulating, 3_000);
    }
}
