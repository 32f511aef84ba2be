//! HTML email body.
//!
//! Mail clients strip `<style>` blocks, so every style is inline. All dynamic
//! text goes through [`html_escape`].

use std::fmt::Write as _;

use super::{RenderOptions, format_amount, share_of};
use crate::analytics::CostReport;

const BODY_STYLE: &str = "font-family:Helvetica,Arial,sans-serif;color:#1f2933;max-width:720px;margin:0 auto;padding:16px;";
const H1_STYLE: &str = "font-size:22px;margin:0 0 4px 0;";
const H2_STYLE: &str = "font-size:16px;margin:24px 0 8px 0;border-bottom:1px solid #d9e2ec;padding-bottom:4px;";
const META_STYLE: &str = "color:#627d98;font-size:13px;margin:0 0 16px 0;";
const TABLE_STYLE: &str = "border-collapse:collapse;width:100%;font-size:14px;";
const TH_STYLE: &str = "text-align:left;background:#f0f4f8;padding:6px 8px;border-bottom:1px solid #d9e2ec;";
const TD_STYLE: &str = "padding:6px 8px;border-bottom:1px solid #f0f4f8;";
const NUM_STYLE: &str = "padding:6px 8px;border-bottom:1px solid #f0f4f8;text-align:right;white-space:nowrap;";
const NOTICE_STYLE: &str = "background:#fff3c4;border-left:4px solid #f0b429;padding:8px 12px;margin:12px 0;font-size:14px;";
const GRADE_STYLE: &str = "font-size:32px;font-weight:bold;color:#0b69a3;";

/// Escape HTML special characters.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn open_document(out: &mut String, title: &str, options: &RenderOptions) {
    let _ = write!(
        out,
        r#"<!DOCTYPE html><html><head><meta charset="utf-8"><title>{title}</title></head><body style="{BODY_STYLE}"><h1 style="{H1_STYLE}">{prefix}</h1><p style="{META_STYLE}">{query} &middot; {date}</p>"#,
        title = html_escape(title),
        prefix = html_escape(&options.subject_prefix),
        query = html_escape(&options.query_name),
        date = options.report_date.format("%Y-%m-%d"),
    );
}

fn close_document(out: &mut String) {
    out.push_str("</body></html>");
}

fn partial_notice(out: &mut String) {
    let _ = write!(
        out,
        r#"<p style="{NOTICE_STYLE}">Recommendations are unavailable for this run. Savings figures are incomplete.</p>"#
    );
}

pub fn report_html(report: &CostReport, options: &RenderOptions) -> String {
    let currency = report.currency.as_str();
    let mut out = String::with_capacity(4096);
    open_document(&mut out, &options.subject(None), options);

    if report.partial {
        partial_notice(&mut out);
    }

    // Spend vs savings
    let _ = write!(
        out,
        r#"<h2 style="{H2_STYLE}">Spend vs. savings</h2><table style="{TABLE_STYLE}"><tr><td style="{TD_STYLE}">Total spend</td><td style="{NUM_STYLE}">{spend}</td></tr><tr><td style="{TD_STYLE}">Potential monthly savings</td><td style="{NUM_STYLE}">{savings}</td></tr><tr><td style="{TD_STYLE}">Billing rows</td><td style="{NUM_STYLE}">{rows}</td></tr></table>"#,
        spend = html_escape(&format_amount(report.total_spend, currency)),
        savings = html_escape(&format_amount(report.total_savings, currency)),
        rows = report.billing_row_count,
    );

    // Grade
    let _ = write!(
        out,
        r#"<h2 style="{H2_STYLE}">Efficiency</h2><p><span style="{GRADE_STYLE}">{grade}</span> &nbsp; score {score:.2} / 100</p>"#,
        grade = html_escape(&report.grade),
        score = report.efficiency_score,
    );
    if !report.conversions.is_empty() {
        out.push_str("<p>That is roughly ");
        let parts: Vec<String> = report
            .conversions
            .iter()
            .map(|c| format!("<strong>{}</strong> {}", c.units, html_escape(&c.name)))
            .collect();
        out.push_str(&parts.join(" or "));
        out.push_str(" per month.</p>");
    }

    // Cost drivers
    let _ = write!(
        out,
        r#"<h2 style="{H2_STYLE}">Top cost drivers</h2><table style="{TABLE_STYLE}"><tr><th style="{TH_STYLE}">Item</th><th style="{TH_STYLE}">Amount</th><th style="{TH_STYLE}">Share</th></tr>"#
    );
    for record in &report.top_cost_drivers {
        let _ = write!(
            out,
            r#"<tr><td style="{TD_STYLE}">{label}</td><td style="{NUM_STYLE}">{amount}</td><td style="{NUM_STYLE}">{share}</td></tr>"#,
            label = html_escape(&record.label),
            amount = html_escape(&format_amount(record.amount, currency)),
            share = share_of(record.amount, report.total_spend),
        );
    }
    out.push_str("</table>");

    // Recommendations
    let _ = write!(out, r#"<h2 style="{H2_STYLE}">Top recommendations</h2>"#);
    if report.top_recommendations.is_empty() {
        out.push_str("<p>No recommendations.</p>");
    } else {
        let _ = write!(
            out,
            r#"<table style="{TABLE_STYLE}"><tr><th style="{TH_STYLE}">Category</th><th style="{TH_STYLE}">Monthly savings</th><th style="{TH_STYLE}">Description</th></tr>"#
        );
        for rec in &report.top_recommendations {
            let _ = write!(
                out,
                r#"<tr><td style="{TD_STYLE}">{category}</td><td style="{NUM_STYLE}">{savings}</td><td style="{TD_STYLE}">{description}</td></tr>"#,
                category = html_escape(&rec.category),
                savings = html_escape(&format_amount(rec.monthly_savings, currency)),
                description = html_escape(&rec.description),
            );
        }
        out.push_str("</table>");
    }

    close_document(&mut out);
    out
}

pub fn no_data_html(options: &RenderOptions, partial: bool) -> String {
    let mut out = String::with_capacity(1024);
    open_document(&mut out, &options.subject(Some("no data")), options);
    let _ = write!(
        out,
        r#"<h2 style="{H2_STYLE}">No billing data</h2><p>The query completed but returned no billing rows for this period. No totals or grade were computed.</p>"#
    );
    if partial {
        partial_notice(&mut out);
    }
    close_document(&mut out);
    out
}

pub fn export_html(columns: &[String], rows: usize, options: &RenderOptions) -> String {
    let mut out = String::with_capacity(1024);
    open_document(&mut out, &options.subject(None), options);
    let _ = write!(
        out,
        r#"<h2 style="{H2_STYLE}">Data export</h2><p>{rows} rows exported. The full result is attached as CSV.</p>"#
    );
    if !columns.is_empty() {
        let escaped: Vec<String> = columns.iter().map(|c| html_escape(c)).collect();
        let _ = write!(out, "<p>Columns: {}</p>", escaped.join(", "));
    }
    close_document(&mut out);
    out
}
