use duel_core::types::Micros;

/// Unrealised PnL for a position (§4.4): `(exit − entry) · size · leverage
/// / entry` for a long, negated for a short. All inputs are pre-validated
/// by the caller.
pub fn unrealised_pnl(entry: Micros, exit: Micros, size: Micros, leverage: u32, is_long: bool) -> Micros {
    let delta = exit - entry;
    let raw = (delta as i128) * (size as i128) * (leverage as i128) / (entry as i128);
    let pnl = raw as Micros;
    if is_long {
        pnl
    } else {
        -pnl
    }
}

/// ROI as a fraction of the demo balance. Capped to `>= -1.0` for display
/// purposes only — server-side bookkeeping uses the uncapped value (§4.4).
pub fn roi(total_pnl: Micros, demo_balance: Micros) -> f64 {
    total_pnl as f64 / demo_balance as f64
}

pub fn roi_for_display(total_pnl: Micros, demo_balance: Micros) -> f64 {
    roi(total_pnl, demo_balance).max(-1.0)
}

/// Solves `pnl = -size` for the exit price at which a position loses 100%
/// of its margin (§4.4): `entry · (1 − 1/leverage)` for long, `entry · (1
/// + 1/leverage)` for short.
pub fn liquidation_price(entry: Micros, leverage: u32, is_long: bool) -> Micros {
    let entry = entry as f64;
    let leverage = leverage as f64;
    let price = if is_long {
        entry * (1.0 - 1.0 / leverage)
    } else {
        entry * (1.0 + 1.0 / leverage)
    };
    price.round() as Micros
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_profits_when_price_rises() {
        let pnl = unrealised_pnl(100_000_000, 110_000_000, 1_000_000, 10, true);
        assert_eq!(pnl, 100_000);
    }

    #[test]
    fn short_profits_when_price_falls() {
        let pnl = unrealised_pnl(100_000_000, 90_000_000, 1_000_000, 10, false);
        assert_eq!(pnl, 100_000);
    }

    #[test]
    fn long_liquidation_price_is_below_entry() {
        let liq = liquidation_price(100_000_000, 10, true);
        assert_eq!(liq, 90_000_000);
    }

    #[test]
    fn short_liquidation_price_is_above_entry() {
        let liq = liquidation_price(100_000_000, 10, false);
        assert_eq!(liq, 110_000_000);
    }

    #[test]
    fn pnl_at_liquidation_price_equals_negative_size() {
        let entry = 100_000_000;
        let size = 1_000_000;
        let leverage = 5;
        let liq = liquidation_price(entry, leverage, true);
        let pnl = unrealised_pnl(entry, liq, size, leverage, true);
        assert_eq!(pnl, -size);
    }

    #[test]
    fn roi_for_display_is_capped_at_minus_one() {
        assert_eq!(roi_for_display(-20_000_000, 10_000_000), -1.0);
        assert_eq!(roi(-20_000_000, 10_000_000), -2.0);
    }
}
