//! Metrics engine: merges billing records and recommendations into a
//! [`CostReport`].
//!
//! # Module structure
//!
//! - [`types`]: billing, recommendation, conversion and report structs
//! - [`derive`]: totals, efficiency score, unit conversions
//! - [`grade`]: threshold table to letter grade
//! - [`select`]: stable top-N selection
//!
//! No I/O happens here; the same inputs always give the same report.

pub mod derive;
pub mod grade;
pub mod select;
pub mod types;

use tracing::debug;

use crate::config::MetricsConfig;

pub use types::{BillingRecord, ConversionResult, CostReport, Recommendation, UnitConversion};

/// Build the report for one invocation. `partial` marks a degraded
/// recommendation fetch.
pub fn build_report(
    billing: &[BillingRecord],
    recommendations: &[Recommendation],
    metrics: &MetricsConfig,
    partial: bool,
) -> CostReport {
    let total_spend = derive::total_spend(billing);
    let total_savings = derive::total_savings(recommendations);
    let efficiency_score = derive::efficiency_score(total_savings, total_spend);
    let grade = grade::grade_for(efficiency_score, &metrics.grades, &metrics.fallback_grade);

    debug!(
        component = "metrics",
        operation = "build_report",
        billing_rows = billing.len(),
        recommendations = recommendations.len(),
        total_spend,
        total_savings,
        efficiency_score,
        grade,
        "Built cost report"
    );

    CostReport {
        total_spend,
        total_savings,
        efficiency_score,
        grade: grade.to_string(),
        top_cost_drivers: select::top_n(billing, metrics.top_n, |r| r.amount),
        top_recommendations: select::top_n(recommendations, metrics.top_n, |r| r.monthly_savings),
        conversions: derive::convert(total_savings, &metrics.conversions),
        partial,
        billing_row_count: billing.len(),
        currency: metrics.currency.clone(),
    }
}
