//! Property-based tests for act pricing
//!
//! Each monetary figure is rounded on its own, so the gross amount must stay within a
//! rounding step of net + VAT and every figure must sit on a 2-decimal grid.

use proptest::prelude::*;
use snow_acts::utils::{ActAmounts, round};

fn on_cent_grid(value: f64) -> bool {
    (value * 100.0 - (value * 100.0).round()).abs() < 1e-4
}

/// Volumes as produced by trip aggregation: three decimal places.
fn volume_strategy() -> impl Strategy<Value = f64> {
    (1u32..=10_000_000).prop_map(|millis| millis as f64 / 1000.0)
}

fn price_strategy() -> impl Strategy<Value = f64> {
    (1u32..=100_000).prop_map(|cents| cents as f64 / 100.0)
}

fn vat_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![Just(0.0), Just(12.0), Just(16.0), (0u32..=3000).prop_map(|bp| bp as f64 / 100.0)]
}

proptest! {
    #[test]
    fn gross_is_net_plus_vat(
        volume in volume_strategy(),
        price in price_strategy(),
        vat in vat_strategy(),
    ) {
        let amounts = ActAmounts::compute(volume, price, vat);
        let diff = amounts.amount_with_vat - (amounts.amount_wo_vat + amounts.vat_amount);
        prop_assert!(diff.abs() < 1e-6, "diff {diff} for {amounts:?}");
    }

    #[test]
    fn figures_sit_on_the_cent_grid(
        volume in volume_strategy(),
        price in price_strategy(),
        vat in vat_strategy(),
    ) {
        let amounts = ActAmounts::compute(volume, price, vat);
        prop_assert!(on_cent_grid(amounts.amount_wo_vat));
        prop_assert!(on_cent_grid(amounts.vat_amount));
        prop_assert!(on_cent_grid(amounts.amount_with_vat));
    }

    #[test]
    fn net_amount_is_within_half_a_cent(
        volume in volume_strategy(),
        price in price_strategy(),
    ) {
        let amounts = ActAmounts::compute(volume, price, 12.0);
        prop_assert!((amounts.amount_wo_vat - volume * price).abs() <= 0.005 + 1e-6);
    }

    #[test]
    fn rounding_is_symmetric(value in -1.0e6f64..1.0e6, precision in 0u32..=4) {
        prop_assert_eq!(round(-value, precision), -round(value, precision));
    }
}
