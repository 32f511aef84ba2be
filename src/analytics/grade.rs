//! Letter grades from an explicit threshold table.

use serde::{Deserialize, Serialize};

/// A score strictly above `above` earns `grade`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeBand {
    pub above: f64,
    pub grade: String,
}

impl GradeBand {
    pub fn new(above: f64, grade: impl Into<String>) -> Self {
        Self {
            above,
            grade: grade.into(),
        }
    }

    pub fn default_table() -> Vec<Self> {
        vec![
            Self::new(90.0, "A+"),
            Self::new(80.0, "A"),
            Self::new(70.0, "B+"),
            Self::new(60.0, "B"),
            Self::new(50.0, "C+"),
        ]
    }
}

/// Thresholds must be finite and strictly descending, grades non-empty.
pub fn validate_table(table: &[GradeBand]) -> Result<(), String> {
    for (idx, band) in table.iter().enumerate() {
        if !band.above.is_finite() {
            return Err(format!("metrics.grades[{idx}] threshold is not finite"));
        }
        if band.grade.trim().is_empty() {
            return Err(format!("metrics.grades[{idx}] has an empty grade"));
        }
        if idx > 0 && band.above >= table[idx - 1].above {
            return Err(format!(
                "metrics.grades must be strictly descending: {} follows {}",
                band.above,
                table[idx - 1].above
            ));
        }
    }
    Ok(())
}

/// First band the score is strictly above; a score on a threshold lands in
/// the band below it.
pub fn grade_for<'a>(score: f64, table: &'a [GradeBand], fallback: &'a str) -> &'a str {
    table
        .iter()
        .find(|band| score > band.above)
        .map(|band| band.grade.as_str())
        .unwrap_or(fallback)
}
