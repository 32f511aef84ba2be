//! Plain-text alternative body.

use std::fmt::Write as _;

use super::{RenderOptions, format_amount, share_of};
use crate::analytics::CostReport;

const PARTIAL_NOTICE: &str =
    "NOTE: Recommendations are unavailable for this run. Savings figures are incomplete.";

fn header(out: &mut String, options: &RenderOptions) {
    let _ = writeln!(out, "{}", options.subject_prefix);
    let _ = writeln!(
        out,
        "{} / {}",
        options.query_name,
        options.report_date.format("%Y-%m-%d")
    );
    out.push('\n');
}

pub fn report_text(report: &CostReport, options: &RenderOptions) -> String {
    let currency = report.currency.as_str();
    let mut out = String::with_capacity(1024);
    header(&mut out, options);

    if report.partial {
        let _ = writeln!(out, "{PARTIAL_NOTICE}\n");
    }

    let _ = writeln!(out, "SPEND VS. SAVINGS");
    let _ = writeln!(out, "  Total spend:               {}", format_amount(report.total_spend, currency));
    let _ = writeln!(out, "  Potential monthly savings: {}", format_amount(report.total_savings, currency));
    let _ = writeln!(out, "  Billing rows:              {}", report.billing_row_count);
    out.push('\n');

    let _ = writeln!(out, "EFFICIENCY");
    let _ = writeln!(
        out,
        "  Grade {} (score {:.2} / 100)",
        report.grade, report.efficiency_score
    );
    for conversion in &report.conversions {
        let _ = writeln!(out, "  = {} {}", conversion.units, conversion.name);
    }
    out.push('\n');

    let _ = writeln!(out, "TOP COST DRIVERS");
    for (idx, record) in report.top_cost_drivers.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {}. {}  {}  ({})",
            idx + 1,
            record.label,
            format_amount(record.amount, currency),
            share_of(record.amount, report.total_spend)
        );
    }
    out.push('\n');

    let _ = writeln!(out, "TOP RECOMMENDATIONS");
    if report.top_recommendations.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for (idx, rec) in report.top_recommendations.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {}. {}  {}/month",
            idx + 1,
            rec.category,
            format_amount(rec.monthly_savings, currency)
        );
        if !rec.description.is_empty() {
            let _ = writeln!(out, "     {}", rec.description);
        }
    }
    out
}

pub fn no_data_text(options: &RenderOptions, partial: bool) -> String {
    let mut out = String::new();
    header(&mut out, options);
    let _ = writeln!(
        out,
        "No billing data: the query completed but returned no rows for this period."
    );
    if partial {
        let _ = writeln!(out, "\n{PARTIAL_NOTICE}");
    }
    out
}

pub fn export_text(columns: &[String], rows: usize, options: &RenderOptions) -> String {
    let mut out = String::new();
    header(&mut out, options);
    let _ = writeln!(out, "Data export: {rows} rows. The full result is attached as CSV.");
    if !columns.is_empty() {
        let _ = writeln!(out, "Columns: {}", columns.join(", "));
    }
    out
}
