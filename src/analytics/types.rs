//! Shared types for the metrics engine.
//!
//! Billing records come from the decoded query result; recommendations come
//! from an independent source. Nothing ties a recommendation to a billing
//! row, so the two only meet at the total level.

use serde::{Deserialize, Serialize};

use crate::query::{DecodeError, DecodedTable};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// One cost driver: a label (service, account, ...) and its spend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingRecord {
    pub label: String,
    pub amount: f64,
}

impl BillingRecord {
    pub fn new(label: impl Into<String>, amount: f64) -> Self {
        Self {
            label: label.into(),
            amount,
        }
    }

    /// Extract records from a decoded table, keeping row order.
    ///
    /// The amount column is expected to be one of the decoder's required
    /// numeric columns; a gap here still surfaces as a [`DecodeError`].
    pub fn from_table(
        table: &DecodedTable,
        label_column: &str,
        amount_column: &str,
    ) -> Result<Vec<Self>, DecodeError> {
        for column in [label_column, amount_column] {
            if !table.columns().iter().any(|c| c == column) {
                return Err(DecodeError::MissingColumn(column.to_string()));
            }
        }
        table
            .records()
            .iter()
            .enumerate()
            .map(|(idx, record)| {
                let label = record.text(label_column).unwrap_or_default().to_string();
                let amount =
                    record
                        .number(amount_column)
                        .ok_or_else(|| DecodeError::NotNumeric {
                            row: idx + 1,
                            column: amount_column.to_string(),
                            value: record.text(amount_column).unwrap_or_default().to_string(),
                        })?;
                Ok(Self { label, amount })
            })
            .collect()
    }
}

/// An optimization opportunity from the recommendation source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: String,
    /// Estimated monthly savings, in the report currency.
    #[serde(alias = "estimated_monthly_savings")]
    pub monthly_savings: f64,
    #[serde(default)]
    pub description: String,
}

impl Recommendation {
    pub fn new(category: impl Into<String>, monthly_savings: f64, description: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            monthly_savings,
            description: description.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit conversions
// ---------------------------------------------------------------------------

/// A tangible equivalent for the savings figure ("coffee cups at $5").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitConversion {
    /// Plural display name, e.g. "coffee cups".
    pub name: String,
    pub unit_price: f64,
}

impl UnitConversion {
    pub fn new(name: impl Into<String>, unit_price: f64) -> Self {
        Self {
            name: name.into(),
            unit_price,
        }
    }

    pub fn default_set() -> Vec<Self> {
        vec![
            Self::new("coffee cups", 5.0),
            Self::new("team pizza parties", 50.0),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionResult {
    pub name: String,
    pub unit_price: f64,
    pub units: u64,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Immutable result of the metrics engine; input to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostReport {
    pub total_spend: f64,
    pub total_savings: f64,
    /// 0–100, two decimals.
    pub efficiency_score: f64,
    pub grade: String,
    pub top_cost_drivers: Vec<BillingRecord>,
    pub top_recommendations: Vec<Recommendation>,
    pub conversions: Vec<ConversionResult>,
    /// Recommendations could not be fetched; savings figures are incomplete.
    pub partial: bool,
    pub billing_row_count: usize,
    pub currency: String,
}

impl CostReport {
    /// No billing rows: the renderer switches to the "no data" document.
    pub fn is_empty(&self) -> bool {
        self.billing_row_count == 0
    }
}
