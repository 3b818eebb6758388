//! Single-shot probability bets.

use rand::Rng;

use crate::domain::{Bet, DiscordId, HistoryRefs, NewBet, TransactionType, bet::potential_winnings};
use crate::error::{LedgerError, Result};
use crate::persistence::{BetRepository, StoreTransaction};

use super::UnitOfWork;

/// Single-shot bets bound to one unit of work.
#[derive(Debug)]
pub struct BetService<'a, T: StoreTransaction> {
    uow: &'a mut UnitOfWork<T>,
}

impl<'a, T: StoreTransaction> BetService<'a, T> {
    pub(crate) fn new(uow: &'a mut UnitOfWork<T>) -> Self {
        Self { uow }
    }

    /// Places and settles a bet in one step.
    ///
    /// A uniform roll in `[0, 1)` below `win_probability` wins
    /// [`potential_winnings`] on top of the stake; otherwise the stake is
    /// lost. The settled bet is stored and the balance adjusted with
    /// [`TransactionType::Bet`] referencing it. A win that rounds down to
    /// zero bits leaves the balance untouched.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] if `amount <= 0`.
    /// - [`LedgerError::InvalidProbability`] outside the configured bounds.
    /// - [`LedgerError::NotFound`] if the user does not exist.
    /// - [`LedgerError::InsufficientFunds`] if the stake exceeds the balance.
    pub async fn place_bet<R>(
        &mut self,
        discord_id: DiscordId,
        amount: i64,
        win_probability: f64,
        rng: &mut R,
    ) -> Result<Bet>
    where
        R: Rng + Send + ?Sized,
    {
        self.uow.ensure_writable()?;
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount { amount });
        }
        let settings = self.uow.settings();
        if !win_probability.is_finite()
            || win_probability < settings.min_bet_probability
            || win_probability > settings.max_bet_probability
        {
            return Err(LedgerError::InvalidProbability(win_probability));
        }

        let repo = self.uow.repo()?;
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

        let won = rng.r#gen::<f64>() < win_probability;
        let win_amount = if won {
            potential_winnings(amount, win_probability)
        } else {
            0
        };
        let bet = BetRepository::create(
            repo,
            &NewBet {
                discord_id,
                amount,
                win_probability,
                won,
                win_amount,
            },
        )
        .await?;

        let delta = bet.balance_delta();
        if delta != 0 {
            self.uow
                .users()
                .adjust_balance(
                    discord_id,
                    delta,
                    TransactionType::Bet,
                    HistoryRefs::bet(bet.id),
                )
                .await?;
        }

        tracing::info!(
            guild_id = %self.uow.guild_id(),
            %discord_id,
            bet_id = %bet.id,
            amount,
            won,
            win_amount,
            "bet settled"
        );
        Ok(bet)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use rand::rngs::mock::StepRng;
    use tokio_test::assert_ok;

    use super::super::test_support::{GUILD, TestLedger, alice};
    use super::*;

    fn always_low() -> StepRng {
        StepRng::new(0, 0)
    }

    fn always_high() -> StepRng {
        StepRng::new(u64::MAX, 0)
    }

    #[tokio::test]
    async fn winning_bet_pays_fair_odds() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice()]).await);

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let bet = assert_ok!(uow.bets().place_bet(alice(), 100, 0.25, &mut always_low()).await);
        assert!(bet.won);
        assert_eq!(bet.win_amount, 300);
        assert_ok!(uow.commit().await);

        assert_eq!(assert_ok!(t.balance(GUILD, alice()).await), 1_300);
    }

    #[tokio::test]
    async fn losing_bet_forfeits_stake_and_links_history() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice()]).await);

        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let bet = assert_ok!(uow.bets().place_bet(alice(), 100, 0.5, &mut always_high()).await);
        assert!(!bet.won);
        let history = assert_ok!(uow.users().balance_history(alice(), 1).await);
        let Some(row) = history.first() else {
            panic!("history row missing");
        };
        assert_eq!(row.change_amount, -100);
        assert_eq!(row.refs.bet_id, Some(bet.id));
        assert_ok!(uow.commit().await);

        assert_eq!(assert_ok!(t.balance(GUILD, alice()).await), 900);
    }

    #[tokio::test]
    async fn bet_validation() {
        let t = TestLedger::new();
        assert_ok!(t.seed(GUILD, &[alice()]).await);
        let mut uow = assert_ok!(t.ledger.begin(GUILD).await);
        let mut rng = always_low();

        let zero = uow.bets().place_bet(alice(), 0, 0.5, &mut rng).await;
        assert!(matches!(zero, Err(LedgerError::InvalidAmount { .. })));
        let certain = uow.bets().place_bet(alice(), 10, 1.0, &mut rng).await;
        assert!(matches!(certain, Err(LedgerError::InvalidProbability(_))));
        let nan = uow.bets().place_bet(alice(), 10, f64::NAN, &mut rng).await;
        assert!(matches!(nan, Err(LedgerError::InvalidProbability(_))));
        let broke = uow.bets().place_bet(alice(), 1_001, 0.5, &mut rng).await;
        assert!(matches!(broke, Err(LedgerError::InsufficientFunds { .. })));
    }
}
