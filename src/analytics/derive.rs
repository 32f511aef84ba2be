//! Derived metric computation.
//!
//! All division operations are safe against zero or negative denominators
//! and never produce NaN / Infinity.

use super::types::{BillingRecord, ConversionResult, Recommendation, UnitConversion};

pub fn total_spend(records: &[BillingRecord]) -> f64 {
    records.iter().map(|r| r.amount).sum()
}

pub fn total_savings(recommendations: &[Recommendation]) -> f64 {
    recommendations.iter().map(|r| r.monthly_savings).sum()
}

/// Savings as a share of spend, clamped to 0–100.
///
/// Savings that overflow to `+inf` against a positive spend score 100.
pub fn efficiency_score(savings: f64, spend: f64) -> f64 {
    if savings == f64::INFINITY && spend > 0.0 && spend.is_finite() {
        return 100.0;
    }
    safe_pct(savings, spend).clamp(0.0, 100.0)
}

/// Percentage safe against a non-positive denominator. Returns 0.0 in that
/// case. Result is rounded to 2 decimal places.
pub fn safe_pct(numerator: f64, denominator: f64) -> f64 {
    if denominator <= 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        0.0
    } else {
        let pct = (numerator / denominator) * 100.0;
        (pct * 100.0).round() / 100.0
    }
}

/// Whole units affordable with `savings`; never negative.
pub fn units_of(savings: f64, unit_price: f64) -> u64 {
    if savings <= 0.0 || unit_price <= 0.0 || !savings.is_finite() {
        0
    } else {
        (savings / unit_price).floor() as u64
    }
}

pub fn convert(savings: f64, conversions: &[UnitConversion]) -> Vec<ConversionResult> {
    conversions
        .iter()
        .map(|c| ConversionResult {
            name: c.name.clone(),
            unit_price: c.unit_price,
            units: units_of(savings, c.unit_price),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
