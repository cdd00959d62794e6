//! Report renderers.
//!
//! Every format is written from the same table projection of a
//! `ReportDocument`, so counts, values and percentages agree across CSV,
//! spreadsheet and PDF output.

pub mod csv;
pub mod excel;
pub mod pdf;

use chrono::{DateTime, Utc};
use domain::models::{ReportDocument, ReportFormat, ReportItem, ReportType};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

/// Shown instead of tables when the filtered result set is empty.
pub const NO_DATA_MESSAGE: &str = "No data matched the report filters.";

/// Rendering failure.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Spreadsheet rendering failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("PDF rendering failed: {0}")]
    Pdf(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A rendered report ready to attach to an email.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub filename: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// `<report-type>-report-<YYYYMMDD-HHMM>.<ext>`
pub fn artifact_filename(
    report_type: ReportType,
    generated_at: DateTime<Utc>,
    format: ReportFormat,
) -> String {
    format!(
        "{}-report-{}.{}",
        report_type.as_str(),
        generated_at.format("%Y%m%d-%H%M"),
        format.extension()
    )
}

/// Render `document` in `format`.
pub fn render(
    document: &ReportDocument,
    format: ReportFormat,
    organization: &str,
) -> Result<Artifact, RenderError> {
    let bytes = match format {
        ReportFormat::Csv => csv::render(document, organization),
        ReportFormat::Excel => excel::render(document, organization)?,
        ReportFormat::Pdf => pdf::render(document, organization)?,
    };

    Ok(Artifact {
        filename: artifact_filename(document.report_type, document.generated_at, format),
        mime_type: format.mime_type(),
        bytes,
    })
}

/// One table cell. Numbers keep their type so spreadsheets get numeric cells.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Count(u64),
    Money(Decimal),
    Percent(f64),
}

impl Cell {
    /// Text form shared by CSV and PDF.
    pub fn display(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Count(n) => n.to_string(),
            Cell::Money(d) => format!("{:.2}", d.round_dp(2)),
            Cell::Percent(p) => format!("{:.2}", p),
        }
    }

    /// Numeric form for spreadsheets, `None` for text.
    pub fn number(&self) -> Option<f64> {
        match self {
            Cell::Text(_) => None,
            Cell::Count(n) => Some(*n as f64),
            Cell::Money(d) => d.round_dp(2).to_f64(),
            Cell::Percent(p) => Some(*p),
        }
    }
}

fn text(value: impl Into<String>) -> Cell {
    Cell::Text(value.into())
}

fn optional(value: Option<&str>) -> Cell {
    text(value.unwrap_or_default())
}

/// A titled table with a header row.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// Label/value pairs printed above the tables.
pub fn header_lines(document: &ReportDocument, organization: &str) -> Vec<(String, String)> {
    let mut lines = vec![
        ("Report".to_string(), document.title.clone()),
        ("Organization".to_string(), organization.to_string()),
        (
            "Generated At".to_string(),
            document.generated_at.format("%Y-%m-%d %H:%M UTC").to_string(),
        ),
    ];
    lines.extend(
        document
            .filters
            .iter()
            .map(|f| (format!("Filter: {}", f.name), f.value.clone())),
    );
    lines
}

/// Headline totals, in display order.
pub fn summary_cards(document: &ReportDocument) -> Vec<(&'static str, Cell)> {
    let totals = &document.totals;
    vec![
        ("Total Items", Cell::Count(totals.total_items)),
        ("Total Value", Cell::Money(totals.total_value)),
        ("Total Cost", Cell::Money(totals.total_cost)),
        ("Average Value", Cell::Money(totals.average_value)),
    ]
}

/// One table per summary section.
pub fn summary_tables(document: &ReportDocument) -> Vec<Table> {
    document
        .sections
        .iter()
        .map(|section| {
            let key_header = section
                .title
                .strip_prefix("By ")
                .unwrap_or(&section.title)
                .to_string();
            Table {
                title: section.title.clone(),
                headers: vec![
                    key_header,
                    "Count".to_string(),
                    "Total Value".to_string(),
                    "Percentage".to_string(),
                ],
                rows: section
                    .groups
                    .iter()
                    .map(|g| {
                        vec![
                            text(g.key.clone()),
                            Cell::Count(g.count),
                            Cell::Money(g.total_value),
                            Cell::Percent(g.percentage),
                        ]
                    })
                    .collect(),
            }
        })
        .collect()
}

pub const ITEM_COLUMNS: [&str; 11] = [
    "Reference",
    "Name",
    "Status",
    "Category",
    "Location",
    "Site",
    "Department",
    "Assignee",
    "Cost",
    "Value",
    "Date",
];

fn item_row(item: &ReportItem) -> Vec<Cell> {
    vec![
        text(item.reference.clone()),
        text(item.name.clone()),
        optional(item.status.as_deref()),
        optional(item.category.as_deref()),
        optional(item.location.as_deref()),
        optional(item.site.as_deref()),
        optional(item.department.as_deref()),
        optional(item.assignee.as_deref()),
        item.cost.map(Cell::Money).unwrap_or_else(|| text("")),
        item.value.map(Cell::Money).unwrap_or_else(|| text("")),
        text(item.date.map(|d| d.to_string()).unwrap_or_default()),
    ]
}

/// The itemized table, when the document carries one.
pub fn item_table(document: &ReportDocument) -> Option<Table> {
    document.items.as_ref().map(|items| Table {
        title: "Items".to_string(),
        headers: ITEM_COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows: items.iter().map(item_row).collect(),
    })
}

/// Note for rows dropped by the itemized row cap.
pub fn omitted_note(document: &ReportDocument) -> Option<String> {
    match document.omitted_items {
        0 => None,
        1 => Some("1 more row omitted".to_string()),
        n => Some(format!("{} more rows omitted", n)),
    }
}
