//! Per-venue rebalancing decisions.
//!
//! Cash venues are steered toward half of their maximum long position with a
//! hysteresis band: no action is taken while the observed position stays
//! between 40% and 60% of the target. Net-out venues are simply closed
//! whenever any exposure above a small epsilon remains.

use crate::config::MarginMode;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Upper edge of the cash-mode dead zone, as a fraction of the target.
const UPPER_BAND: Decimal = dec!(0.60);
/// Lower edge of the cash-mode dead zone, as a fraction of the target.
const LOWER_BAND: Decimal = dec!(0.40);
/// Net-out positions smaller than this are left alone.
pub const NET_OUT_EPSILON: Decimal = dec!(0.005);

/// What kind of corrective order a venue needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectiveIntent {
    /// Position above the band: sell down to half the target
    SellExcess,
    /// Position below the band: buy up to half the target
    BuyShortfall,
    /// Net-out exposure present: close the whole position
    CloseOut,
}

/// Decide whether a venue's observed position needs correction.
///
/// Returns `None` inside the dead zone (cash) or below the epsilon
/// (net-out).
pub fn evaluate_position(
    mode: MarginMode,
    observed: Decimal,
    target: Decimal,
) -> Option<CorrectiveIntent> {
    match mode {
        MarginMode::Cash => {
            if observed > target * UPPER_BAND {
                Some(CorrectiveIntent::SellExcess)
            } else if observed < target * LOWER_BAND {
                Some(CorrectiveIntent::BuyShortfall)
            } else {
                None
            }
        }
        MarginMode::NetOut => {
            if observed.abs() > NET_OUT_EPSILON {
                Some(CorrectiveIntent::CloseOut)
            } else {
                None
            }
        }
    }
}

/// Base asset amount to sell so holdings return to half the target.
pub fn sell_amount(free: Decimal, target: Decimal) -> Decimal {
    free - target / dec!(2)
}

/// Base asset amount to buy so holdings return to half the target.
pub fn buy_amount(free: Decimal, target: Decimal) -> Decimal {
    target / dec!(2) - free
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cash_sell_above_band() {
        let intent = evaluate_position(MarginMode::Cash, dec!(7), dec!(10));
        assert_eq!(intent, Some(CorrectiveIntent::SellExcess));
    }

    #[test]
    fn test_cash_buy_below_band() {
        let intent = evaluate_position(MarginMode::Cash, dec!(3), dec!(10));
        assert_eq!(intent, Some(CorrectiveIntent::BuyShortfall));
    }

    #[test]
    fn test_cash_dead_zone() {
        assert_eq!(evaluate_position(MarginMode::Cash, dec!(5), dec!(10)), None);
        // Band edges are exclusive
        assert_eq!(evaluate_position(MarginMode::Cash, dec!(6), dec!(10)), None);
        assert_eq!(evaluate_position(MarginMode::Cash, dec!(4), dec!(10)), None);
    }

    #[test]
    fn test_net_out_closes_above_epsilon() {
        assert_eq!(
            evaluate_position(MarginMode::NetOut, dec!(0.01), dec!(10)),
            Some(CorrectiveIntent::CloseOut)
        );
        // Short exposure counts too
        assert_eq!(
            evaluate_position(MarginMode::NetOut, dec!(-0.01), dec!(10)),
            Some(CorrectiveIntent::CloseOut)
        );
    }

    #[test]
    fn test_net_out_ignores_dust() {
        assert_eq!(
            evaluate_position(MarginMode::NetOut, dec!(0.003), dec!(10)),
            None
        );
    }

    #[test]
    fn test_correction_amounts() {
        assert_eq!(sell_amount(dec!(7), dec!(10)), dec!(2));
        assert_eq!(buy_amount(dec!(3), dec!(10)), dec!(2));
    }
}
