//! Report rendering: HTML body, plain-text alternative and CSV attachment.
//!
//! # Module structure
//!
//! - [`html`]: inline-styled HTML body
//! - [`text`]: plain-text alternative
//! - [`csv`]: always-quoted CSV writer and its reader
//! - [`filename`]: attachment filename from query name and date
//!
//! A report with no billing rows renders as a distinct "no data" document so
//! the recipient can tell an empty period from a broken pipeline.

pub mod csv;
pub mod filename;
pub mod html;
pub mod text;

use std::time::Instant;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::analytics::CostReport;
use crate::query::ResultSet;

pub use self::csv::{CsvError, parse_csv, write_csv};
pub use self::filename::report_filename;

pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// Which document was produced.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Report,
    NoData,
    Export,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Rendered output, ready for the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDocument {
    pub kind: DocumentKind,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl ReportDocument {
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Per-invocation rendering inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub query_name: String,
    pub report_date: NaiveDate,
    pub subject_prefix: String,
}

impl RenderOptions {
    pub fn new(query_name: impl Into<String>, report_date: NaiveDate, subject_prefix: impl Into<String>) -> Self {
        Self {
            query_name: query_name.into(),
            report_date,
            subject_prefix: subject_prefix.into(),
        }
    }

    /// `{prefix} — {query_name} ({date})` plus an optional marker.
    pub fn subject(&self, marker: Option<&str>) -> String {
        let mut subject = format!(
            "{} — {} ({})",
            self.subject_prefix,
            self.query_name,
            self.report_date.format("%Y-%m-%d")
        );
        if let Some(marker) = marker {
            subject.push_str(" [");
            subject.push_str(marker);
            subject.push(']');
        }
        subject
    }
}

/// Render the cost report, or the "no data" document when it has no rows.
pub fn render_report(report: &CostReport, options: &RenderOptions) -> ReportDocument {
    let started = Instant::now();
    let document = if report.is_empty() {
        render_no_data(options, report.partial)
    } else {
        ReportDocument {
            kind: DocumentKind::Report,
            subject: options.subject(report.partial.then_some("partial")),
            html: html::report_html(report, options),
            text: text::report_text(report, options),
            attachments: Vec::new(),
        }
    };
    debug!(
        component = "renderer",
        operation = "render_report",
        kind = ?document.kind,
        html_bytes = document.html.len(),
        duration_ms = started.elapsed().as_millis() as u64,
        "Rendered report"
    );
    document
}

pub fn render_no_data(options: &RenderOptions, partial: bool) -> ReportDocument {
    ReportDocument {
        kind: DocumentKind::NoData,
        subject: options.subject(Some("no data")),
        html: html::no_data_html(options, partial),
        text: text::no_data_text(options, partial),
        attachments: Vec::new(),
    }
}

/// Plain data export: row count and columns, data in the attachment.
pub fn render_export(result_set: &ResultSet, options: &RenderOptions) -> ReportDocument {
    let columns: &[String] = result_set.header().map(|h| h.as_slice()).unwrap_or(&[]);
    let rows = result_set.data_row_count();
    let marker = (rows == 0).then_some("no data");
    ReportDocument {
        kind: DocumentKind::Export,
        subject: options.subject(marker),
        html: html::export_html(columns, rows, options),
        text: text::export_text(columns, rows, options),
        attachments: Vec::new(),
    }
}

/// The full result set as an always-quoted CSV attachment.
pub fn csv_attachment(result_set: &ResultSet, options: &RenderOptions) -> Attachment {
    Attachment {
        filename: report_filename(&options.query_name, options.report_date),
        content_type: CSV_CONTENT_TYPE.to_string(),
        bytes: write_csv(result_set.rows()).into_bytes(),
    }
}

/// `$1,234.50`; negative amounts as `-$5.00`.
pub fn format_amount(amount: f64, currency: &str) -> String {
    let cents = (amount.abs() * 100.0).round();
    let whole = (cents / 100.0).trunc() as u64;
    let frac = (cents % 100.0) as u64;
    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0.0 && cents > 0.0 { "-" } else { "" };
    format!("{sign}{currency}{grouped}.{frac:02}")
}

/// Share of the total as a percentage string; `-` when the total is not positive.
pub(crate) fn share_of(amount: f64, total: f64) -> String {
    if total > 0.0 {
        format!("{:.1}%", amount / total * 100.0)
    } else {
        "-".to_string()
    }
}
