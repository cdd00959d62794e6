//! Report document models.
//!
//! A `ReportDocument` is produced once per run, rendered, and dropped.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::report_schedule::ReportType;

/// Label used when an item has no value for a grouping dimension.
pub const UNASSIGNED: &str = "Unassigned";

/// One business entity row returned by the report data source.
///
/// The shape is normalized across report types: `date` is the purchase,
/// checkout, service, audit or transaction date depending on the type, and
/// `value` is the current (book) value where one exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportItem {
    pub id: String,
    pub reference: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub cost: Option<Decimal>,
    #[serde(default)]
    pub value: Option<Decimal>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub fully_depreciated: bool,
}

impl ReportItem {
    /// Group key of this item along `dimension`.
    pub fn dimension_value(&self, dimension: Dimension) -> &str {
        let value = match dimension {
            Dimension::Status => self.status.as_deref(),
            Dimension::Category => self.category.as_deref(),
            Dimension::Location => self.location.as_deref(),
            Dimension::Site => self.site.as_deref(),
            Dimension::Department => self.department.as_deref(),
        };
        match value {
            Some(v) if !v.trim().is_empty() => v,
            _ => UNASSIGNED,
        }
    }

    /// Value counted towards group totals: current value, falling back to cost.
    pub fn effective_value(&self) -> Decimal {
        self.value.or(self.cost).unwrap_or(Decimal::ZERO)
    }
}

/// Grouping dimension for aggregate statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Status,
    Category,
    Location,
    Site,
    Department,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Category => "category",
            Self::Location => "location",
            Self::Site => "site",
            Self::Department => "department",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Status => "Status",
            Self::Category => "Category",
            Self::Location => "Location",
            Self::Site => "Site",
            Self::Department => "Department",
        }
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "status" => Ok(Self::Status),
            "category" => Ok(Self::Category),
            "location" => Ok(Self::Location),
            "site" => Ok(Self::Site),
            "department" => Ok(Self::Department),
            other => Err(format!("Unknown dimension: {}", other)),
        }
    }
}

impl ReportType {
    /// Dimension a report of this type groups by when no `groupBy` filter is set.
    pub fn natural_dimension(&self) -> Dimension {
        match self {
            ReportType::Assets
            | ReportType::Checkout
            | ReportType::Maintenance
            | ReportType::Audit
            | ReportType::Lease
            | ReportType::Reservation => Dimension::Status,
            ReportType::Depreciation | ReportType::Transaction => Dimension::Category,
            ReportType::Location => Dimension::Location,
        }
    }
}

/// Aggregate statistics for one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SummaryGroup {
    pub key: String,
    pub count: u64,
    pub total_value: Decimal,
    /// Share of the filtered item count, rounded to two decimals.
    pub percentage: f64,
}

/// A table of groups along one dimension (or a cross-tab of two).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SummarySection {
    pub title: String,
    pub groups: Vec<SummaryGroup>,
}

/// Headline numbers shown as summary cards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportTotals {
    pub total_items: u64,
    pub total_value: Decimal,
    pub total_cost: Decimal,
    pub average_value: Decimal,
}

/// A filter that was honored, for display in the artifact header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedFilter {
    pub name: String,
    pub value: String,
}

/// In-memory report produced per run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportDocument {
    pub report_type: ReportType,
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub filters: Vec<AppliedFilter>,
    pub totals: ReportTotals,
    pub sections: Vec<SummarySection>,
    /// Itemized rows, present when the list was requested.
    pub items: Option<Vec<ReportItem>>,
    /// Rows dropped from `items` by the itemized row cap.
    pub omitted_items: usize,
}

impl ReportDocument {
    /// Whether the filtered result set was empty.
    pub fn is_empty(&self) -> bool {
        self.totals.total_items == 0
    }
}
