//! Saved report filters.
//!
//! Schedules carry an opaque key/value map. Each report type honors its own
//! subset of keys; unknown keys and unparseable values are ignored so stored
//! schedules keep working as the filter schema evolves.

use chrono::{DateTime, NaiveDate};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::debug;

use super::report::{AppliedFilter, Dimension, ReportItem};
use super::report_schedule::ReportType;

/// Filter keys understood by the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKey {
    Status,
    Category,
    Location,
    Site,
    Department,
    DateFrom,
    DateTo,
    MinCost,
    MaxCost,
    FullyDepreciated,
    GroupBy,
}

impl FilterKey {
    const ALL: [FilterKey; 11] = [
        FilterKey::Status,
        FilterKey::Category,
        FilterKey::Location,
        FilterKey::Site,
        FilterKey::Department,
        FilterKey::DateFrom,
        FilterKey::DateTo,
        FilterKey::MinCost,
        FilterKey::MaxCost,
        FilterKey::FullyDepreciated,
        FilterKey::GroupBy,
    ];

    /// Canonical (camelCase) key name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Category => "category",
            Self::Location => "location",
            Self::Site => "site",
            Self::Department => "department",
            Self::DateFrom => "dateFrom",
            Self::DateTo => "dateTo",
            Self::MinCost => "minCost",
            Self::MaxCost => "maxCost",
            Self::FullyDepreciated => "fullyDepreciated",
            Self::GroupBy => "groupBy",
        }
    }

    fn alias(&self) -> Option<&'static str> {
        match self {
            Self::DateFrom => Some("date_from"),
            Self::DateTo => Some("date_to"),
            Self::MinCost => Some("min_cost"),
            Self::MaxCost => Some("max_cost"),
            Self::FullyDepreciated => Some("fully_depreciated"),
            Self::GroupBy => Some("group_by"),
            _ => None,
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == key || k.alias() == Some(key))
    }
}

impl ReportType {
    /// Filter keys honored by this report type.
    pub fn supported_filters(&self) -> &'static [FilterKey] {
        use FilterKey::*;
        match self {
            ReportType::Assets => &[
                Status, Category, Location, Site, Department, DateFrom, DateTo, MinCost,
                MaxCost, GroupBy,
            ],
            ReportType::Checkout => &[
                Status, Category, Location, Site, Department, DateFrom, DateTo, GroupBy,
            ],
            ReportType::Location => &[Location, Site, Category, Status, GroupBy],
            ReportType::Maintenance => &[
                Status, Category, Location, Site, DateFrom, DateTo, MinCost, MaxCost, GroupBy,
            ],
            ReportType::Audit => &[Status, Location, Site, Department, DateFrom, DateTo, GroupBy],
            ReportType::Depreciation => &[
                Category,
                Location,
                Site,
                Department,
                DateFrom,
                DateTo,
                MinCost,
                MaxCost,
                FullyDepreciated,
                GroupBy,
            ],
            ReportType::Lease => &[
                Status, Category, Site, DateFrom, DateTo, MinCost, MaxCost, GroupBy,
            ],
            ReportType::Reservation => &[
                Status, Category, Location, Site, DateFrom, DateTo, GroupBy,
            ],
            ReportType::Transaction => &[
                Status, Category, Location, Site, Department, DateFrom, DateTo, MinCost,
                MaxCost, GroupBy,
            ],
        }
    }
}

/// How aggregate statistics are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    /// One table along a single dimension.
    By(Dimension),
    /// Status table, category table and a category × status cross-tab.
    Summary,
}

impl FromStr for Grouping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("summary") {
            Ok(Grouping::Summary)
        } else {
            s.parse::<Dimension>().map(Grouping::By)
        }
    }
}

/// Parsed, typed filters for one report type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportFilters {
    pub statuses: Vec<String>,
    pub categories: Vec<String>,
    pub locations: Vec<String>,
    pub sites: Vec<String>,
    pub departments: Vec<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub min_cost: Option<Decimal>,
    pub max_cost: Option<Decimal>,
    pub fully_depreciated: Option<bool>,
    pub group_by: Option<Grouping>,
}

impl ReportFilters {
    /// Parse the raw filter map for `report_type`. Never fails.
    pub fn parse(report_type: ReportType, raw: &Map<String, Value>) -> Self {
        let supported = report_type.supported_filters();
        let mut filters = ReportFilters::default();

        for (key, value) in raw {
            let Some(filter_key) = FilterKey::from_key(key) else {
                debug!(report_type = %report_type, key = %key, "Ignoring unknown filter key");
                continue;
            };
            if !supported.contains(&filter_key) {
                debug!(
                    report_type = %report_type,
                    key = %key,
                    "Filter not supported by report type"
                );
                continue;
            }

            let applied = match filter_key {
                FilterKey::Status => assign_list(&mut filters.statuses, value),
                FilterKey::Category => assign_list(&mut filters.categories, value),
                FilterKey::Location => assign_list(&mut filters.locations, value),
                FilterKey::Site => assign_list(&mut filters.sites, value),
                FilterKey::Department => assign_list(&mut filters.departments, value),
                FilterKey::DateFrom => assign(&mut filters.date_from, parse_date(value)),
                FilterKey::DateTo => assign(&mut filters.date_to, parse_date(value)),
                FilterKey::MinCost => assign(&mut filters.min_cost, parse_decimal(value)),
                FilterKey::MaxCost => assign(&mut filters.max_cost, parse_decimal(value)),
                FilterKey::FullyDepreciated => {
                    assign(&mut filters.fully_depreciated, parse_bool(value))
                }
                FilterKey::GroupBy => assign(
                    &mut filters.group_by,
                    value.as_str().and_then(|s| s.parse::<Grouping>().ok()),
                ),
            };

            if !applied {
                debug!(
                    report_type = %report_type,
                    key = %key,
                    value = %value,
                    "Ignoring invalid filter value"
                );
            }
        }

        filters
    }

    /// Effective grouping for `report_type`.
    pub fn grouping(&self, report_type: ReportType) -> Grouping {
        self.group_by.unwrap_or(match report_type {
            ReportType::Assets => Grouping::Summary,
            other => Grouping::By(other.natural_dimension()),
        })
    }

    /// Whether `item` passes every filter.
    pub fn matches(&self, item: &ReportItem) -> bool {
        if !list_matches(&self.statuses, item.status.as_deref())
            || !list_matches(&self.categories, item.category.as_deref())
            || !list_matches(&self.locations, item.location.as_deref())
            || !list_matches(&self.sites, item.site.as_deref())
            || !list_matches(&self.departments, item.department.as_deref())
        {
            return false;
        }

        if self.date_from.is_some() || self.date_to.is_some() {
            let Some(date) = item.date else {
                return false;
            };
            if self.date_from.is_some_and(|from| date < from)
                || self.date_to.is_some_and(|to| date > to)
            {
                return false;
            }
        }

        if self.min_cost.is_some() || self.max_cost.is_some() {
            let Some(cost) = item.cost else {
                return false;
            };
            if self.min_cost.is_some_and(|min| cost < min)
                || self.max_cost.is_some_and(|max| cost > max)
            {
                return false;
            }
        }

        if let Some(flag) = self.fully_depreciated {
            if item.fully_depreciated != flag {
                return false;
            }
        }

        true
    }

    /// Human-readable list of the filters in effect.
    pub fn describe(&self) -> Vec<AppliedFilter> {
        let mut out = Vec::new();
        let mut push = |name: &str, value: String| {
            out.push(AppliedFilter {
                name: name.to_string(),
                value,
            })
        };

        for (name, list) in [
            ("Status", &self.statuses),
            ("Category", &self.categories),
            ("Location", &self.locations),
            ("Site", &self.sites),
            ("Department", &self.departments),
        ] {
            if !list.is_empty() {
                push(name, list.join(", "));
            }
        }
        match (self.date_from, self.date_to) {
            (Some(from), Some(to)) => push("Date", format!("{} to {}", from, to)),
            (Some(from), None) => push("Date", format!("from {}", from)),
            (None, Some(to)) => push("Date", format!("until {}", to)),
            (None, None) => {}
        }
        match (self.min_cost, self.max_cost) {
            (Some(min), Some(max)) => push("Cost", format!("{} to {}", min, max)),
            (Some(min), None) => push("Cost", format!(">= {}", min)),
            (None, Some(max)) => push("Cost", format!("<= {}", max)),
            (None, None) => {}
        }
        if let Some(flag) = self.fully_depreciated {
            push(
                "Fully depreciated",
                if flag { "Yes" } else { "No" }.to_string(),
            );
        }

        out
    }
}

fn assign<T>(slot: &mut Option<T>, parsed: Option<T>) -> bool {
    match parsed {
        Some(v) => {
            *slot = Some(v);
            true
        }
        None => false,
    }
}

fn assign_list(slot: &mut Vec<String>, value: &Value) -> bool {
    match parse_list(value) {
        Some(list) => {
            *slot = list;
            true
        }
        None => false,
    }
}

/// A single string or an array of strings; "all" and blanks mean no filter.
fn parse_list(value: &Value) -> Option<Vec<String>> {
    let keep = |s: &str| {
        let s = s.trim();
        (!s.is_empty() && !s.eq_ignore_ascii_case("all")).then(|| s.to_string())
    };
    match value {
        Value::String(s) => Some(keep(s).into_iter().collect()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str())
                .filter_map(keep)
                .collect(),
        ),
        Value::Null => Some(Vec::new()),
        _ => None,
    }
}

fn parse_date(value: &Value) -> Option<NaiveDate> {
    let s = value.as_str()?.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

fn parse_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => {
            let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
            if cleaned.is_empty() {
                None
            } else {
                Decimal::from_str(&cleaned).ok()
            }
        }
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        _ => None,
    }
}

fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn list_matches(allowed: &[String], actual: Option<&str>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match actual {
        Some(actual) => allowed.iter().any(|a| a.eq_ignore_ascii_case(actual.trim())),
        None => false,
    }
}
