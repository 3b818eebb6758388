//! Single-shot probability bets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{BetId, DiscordId, GuildId};

/// A settled single-shot bet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    /// Row id.
    pub id: BetId,
    /// Bettor.
    pub discord_id: DiscordId,
    /// Owning guild.
    pub guild_id: GuildId,
    /// Stake.
    pub amount: i64,
    /// Chance of winning, in `(0, 1)`.
    pub win_probability: f64,
    /// Outcome.
    pub won: bool,
    /// Bits won on top of the stake; `0` on a loss.
    pub win_amount: i64,
    /// Settlement time.
    pub created_at: DateTime<Utc>,
}

impl Bet {
    /// Signed balance effect of this bet.
    #[must_use]
    pub const fn balance_delta(&self) -> i64 {
        if self.won { self.win_amount } else { -self.amount }
    }
}

/// Insert payload for [`Bet`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewBet {
    /// Bettor.
    pub discord_id: DiscordId,
    /// Stake.
    pub amount: i64,
    /// Chance of winning.
    pub win_probability: f64,
    /// Outcome.
    pub won: bool,
    /// Bits won on top of the stake.
    pub win_amount: i64,
}

/// Fair-odds winnings for a stake: `floor(amount × (1 − p) / p)`.
///
/// A bet at probability `p` that wins returns this on top of the stake.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn potential_winnings(amount: i64, win_probability: f64) -> i64 {
    if win_probability <= 0.0 || !win_probability.is_finite() {
        return 0;
    }
    (amount as f64 * (1.0 - win_probability) / win_probability).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_odds_double_the_stake() {
        assert_eq!(potential_winnings(100, 0.5), 100);
    }

    #[test]
    fn long_odds_pay_more() {
        assert_eq!(potential_winnings(100, 0.25), 300);
        assert_eq!(potential_winnings(100, 0.75), 33);
    }

    #[test]
    fn degenerate_probability_pays_nothing() {
        assert_eq!(potential_winnings(100, 0.0), 0);
        assert_eq!(potential_winnings(100, f64::NAN), 0);
    }

    #[test]
    fn balance_delta_sign_follows_outcome() {
        let mut bet = Bet {
            id: BetId::new(1),
            discord_id: DiscordId::new(1),
            guild_id: GuildId::new(1),
            amount: 40,
            win_probability: 0.5,
            won: false,
            win_amount: 0,
            created_at: Utc::now(),
        };
        assert_eq!(bet.balance_delta(), -40);
        bet.won = true;
        bet.win_amount = 40;
        assert_eq!(bet.balance_delta(), 40);
    }
}
