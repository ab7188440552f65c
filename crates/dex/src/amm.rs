//! Constant-product pricing shared by the AMM venue clients.

/// Output amount for a constant-product swap after the pool fee.
///
/// `dy = y * dx' / (x + dx')` with `dx' = dx * (10000 - fee_bps) / 10000`.
/// Returns `None` when either reserve is empty or the input rounds to zero.
pub fn constant_product_out(
    amount_in: u64,
    reserve_in: u64,
    reserve_out: u64,
    fee_bps: u32,
) -> Option<u64> {
    if reserve_in == 0 || reserve_out == 0 {
        return None;
    }
    let fee_bps = fee_bps.min(10_000) as u128;
    let amount_in_after_fee = amount_in as u128 * (10_000 - fee_bps) / 10_000;
    if amount_in_after_fee == 0 {
        return None;
    }
    let dy = reserve_out as u128 * amount_in_after_fee / (reserve_in as u128 + amount_in_after_fee);
    Some(dy as u64)
}

/// Execution price impact versus the spot price, in basis points.
pub fn price_impact_bps(amount_in: u64, reserve_in: u64, reserve_out: u64, amount_out: u64) -> u32 {
    if reserve_in == 0 {
        return 0;
    }
    let spot_out = amount_in as u128 * reserve_out as u128 / reserve_in as u128;
    if spot_out == 0 || amount_out as u128 >= spot_out {
        return 0;
    }
    ((spot_out - amount_out as u128) * 10_000 / spot_out) as u32
}

/// Convert a venue API's UI amount to base units.
pub fn to_base_units(ui_amount: f64, decimals: u8) -> u64 {
    (ui_amount * 10f64.powi(decimals as i32)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_reserves_have_no_price() {
        assert_eq!(constant_product_out(1_000, 0, 1_000_000, 30), None);
        assert_eq!(constant_product_out(1_000, 1_000_000, 0, 30), None);
    }

    #[test]
    fn fee_reduces_output() {
        let no_fee = constant_product_out(1_000_000, 10_000_000, 10_000_000, 0).unwrap();
        let with_fee = constant_product_out(1_000_000, 10_000_000, 10_000_000, 30).unwrap();
        assert!(with_fee < no_fee);
    }

    #[test]
    fn small_trade_approaches_spot() {
        // A tiny trade against deep reserves should land near the spot rate.
        let out = constant_product_out(1_000, 1_000_000_000_000, 2_000_000_000_000, 0).unwrap();
        assert_eq!(out, 1_999);
        assert!(price_impact_bps(1_000, 1_000_000_000_000, 2_000_000_000_000, out) <= 1);
    }

    #[test]
    fn large_trade_has_visible_impact() {
        let reserve = 1_000_000_000u64;
        let out = constant_product_out(reserve / 10, reserve, reserve, 0).unwrap();
        let impact = price_impact_bps(reserve / 10, reserve, reserve, out);
        // Trading 10% of reserves moves the price by roughly 9%.
        assert!(impact > 800 && impact < 1_000, "impact={impact}");
    }

    #[test]
    fn ui_amount_conversion() {
        assert_eq!(to_base_units(1.5, 9), 1_500_000_000);
        assert_eq!(to_base_units(0.000_001, 6), 1);
    }
}
