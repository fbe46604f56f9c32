//! Rounding, act numbering and file name helpers

use super::types::{CalendarDay, Id};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Rounds half away from zero at `precision` decimal places.
///
/// The midpoint is decided on the shortest decimal form of `value`, so `1.005` (stored as
/// 1.00499..) still rounds up to `1.01`. Values outside the decimal range fall back to
/// binary rounding.
pub fn round(value: f64, precision: u32) -> f64 {
    Decimal::from_str(&value.to_string())
        .ok()
        .and_then(|exact| {
            exact
                .round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero)
                .to_f64()
        })
        .unwrap_or_else(|| {
            let factor = 10f64.powi(precision as i32);
            (value * factor).round() / factor
        })
}

/// Amounts derived from a billed volume. Each figure is rounded on its own at 2 places.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActAmounts {
    pub amount_wo_vat: f64,
    pub vat_amount: f64,
    pub amount_with_vat: f64,
}

impl ActAmounts {
    pub fn compute(volume_m3: f64, price_per_m3: f64, vat_rate: f64) -> Self {
        let amount_wo_vat = round(volume_m3 * price_per_m3, 2);
        let vat_amount = round(amount_wo_vat * vat_rate / 100.0, 2);
        let amount_with_vat = round(amount_wo_vat + vat_amount, 2);

        Self {
            amount_wo_vat,
            vat_amount,
            amount_with_vat,
        }
    }
}

/// `{prefix}-{first 8 chars of the contract id, upper-cased}-{YYYYMMDD}`
///
/// Two contracts sharing an id prefix collide on the same day; the ledger rejects the second.
pub fn build_act_number(prefix: &str, contract_id: &Id, act_date: &CalendarDay) -> String {
    let hash: String = contract_id.to_string().to_uppercase().chars().take(8).collect();
    format!("{}-{}-{}", prefix, hash, act_date.compact())
}

/// Keeps `[A-Za-z0-9_-]`, maps everything else to `-` and trims dashes from both ends.
pub fn sanitize_file_name(input: &str) -> String {
    let mapped: String = input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    mapped.trim_matches('-').to_string()
}
