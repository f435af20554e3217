//! Quarter-line settlement.
//!
//! Every market type reduces to one signed margin, measured from the wagered
//! side's point of view and counting only goals scored after placement:
//!
//! | market | margin |
//! |--------|--------|
//! | OVER   | goals since − line |
//! | UNDER  | line − goals since |
//! | HOME   | (home since − away since) + line |
//! | AWAY   | (away since − home since) + line |
//!
//! The margin then goes through a single five-way ladder.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::{MarketType, Score, Wager, WagerStatus};

const QUARTER: Decimal = Decimal::from_parts(25, 0, 0, false, 2);
const HALF: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Outcome to apply to a wager. Settlement never touches the wager itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub status: WagerStatus,
    pub profit: Decimal,
}

/// Settle `wager` against an already-validated final score.
pub fn settle(wager: &Wager, final_score: Score) -> Settlement {
    let m = margin(
        wager.market_type,
        wager.handicap_line,
        wager.score_at_placement,
        final_score,
    );
    ladder(m, wager.stake, wager.price_at_placement)
}

pub fn margin(market: MarketType, line: Decimal, at_placement: Score, final_score: Score) -> Decimal {
    let home_since = goals(final_score.home) - goals(at_placement.home);
    let away_since = goals(final_score.away) - goals(at_placement.away);
    match market {
        MarketType::Over => (home_since + away_since) - line,
        MarketType::Under => line - (home_since + away_since),
        MarketType::Home => (home_since - away_since) + line,
        MarketType::Away => (away_since - home_since) + line,
    }
}

/// `> 0.25` WON, `= 0.25` HALF_WON, `= 0` PUSH, `= -0.25` HALF_LOST, else LOST.
pub fn ladder(margin: Decimal, stake: Decimal, price: Decimal) -> Settlement {
    let win = stake * (price - Decimal::ONE);
    let (status, profit) = if margin > QUARTER {
        (WagerStatus::Won, win)
    } else if margin == QUARTER {
        (WagerStatus::HalfWon, win * HALF)
    } else if margin.is_zero() {
        (WagerStatus::Push, Decimal::ZERO)
    } else if margin == -QUARTER {
        (WagerStatus::HalfLost, -(stake * HALF))
    } else {
        (WagerStatus::Lost, -stake)
    };
    Settlement { status, profit }
}

fn goals(n: u32) -> Decimal {
    Decimal::from(n)
}
