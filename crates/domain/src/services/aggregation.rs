//! Report aggregation.
//!
//! Turns the raw item set for a report into a `ReportDocument`: filters are
//! applied, items grouped along the report's dimension, and totals and
//! percentages computed once so every renderer prints the same numbers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::models::{
    Dimension, Grouping, ReportDocument, ReportFilters, ReportItem, ReportTotals, ReportType,
    SummaryGroup, SummarySection,
};

/// Options controlling the itemized part of a document.
#[derive(Debug, Clone, Copy)]
pub struct ItemizedOptions {
    pub include_list: bool,
    pub max_rows: usize,
}

/// Build the document for one run.
pub fn build_document(
    report_type: ReportType,
    filters: &ReportFilters,
    mut items: Vec<ReportItem>,
    itemized: ItemizedOptions,
    generated_at: DateTime<Utc>,
) -> ReportDocument {
    items.retain(|item| filters.matches(item));

    let totals = totals(&items);
    let sections = match filters.grouping(report_type) {
        Grouping::By(dimension) => vec![section_for(&items, dimension)],
        Grouping::Summary => vec![
            section_for(&items, Dimension::Status),
            section_for(&items, Dimension::Category),
            SummarySection {
                title: "By Category / Status".to_string(),
                groups: group_by(&items, |item| {
                    format!(
                        "{} / {}",
                        item.dimension_value(Dimension::Category),
                        item.dimension_value(Dimension::Status)
                    )
                }),
            },
        ],
    };

    let (items, omitted_items) = if itemized.include_list {
        let omitted = items.len().saturating_sub(itemized.max_rows);
        items.truncate(itemized.max_rows);
        (Some(items), omitted)
    } else {
        (None, 0)
    };

    ReportDocument {
        report_type,
        title: format!("{} Report", report_type.title()),
        generated_at,
        filters: filters.describe(),
        totals,
        sections,
        items,
        omitted_items,
    }
}

fn section_for(items: &[ReportItem], dimension: Dimension) -> SummarySection {
    SummarySection {
        title: format!("By {}", dimension.label()),
        groups: group_by(items, |item| item.dimension_value(dimension).to_string()),
    }
}

/// Group items by key, ordered by count (descending) then key.
fn group_by<F>(items: &[ReportItem], key_of: F) -> Vec<SummaryGroup>
where
    F: Fn(&ReportItem) -> String,
{
    let mut buckets: HashMap<String, (u64, Decimal)> = HashMap::new();
    for item in items {
        let entry = buckets.entry(key_of(item)).or_insert((0, Decimal::ZERO));
        entry.0 += 1;
        entry.1 += item.effective_value();
    }

    let total = items.len() as u64;
    let mut groups: Vec<SummaryGroup> = buckets
        .into_iter()
        .map(|(key, (count, total_value))| SummaryGroup {
            key,
            count,
            total_value,
            percentage: percentage(count, total),
        })
        .collect();

    groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    groups
}

/// Share of `total`, rounded to two decimals.
pub fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 * 10_000.0 / total as f64).round() / 100.0
}

fn totals(items: &[ReportItem]) -> ReportTotals {
    let total_items = items.len() as u64;
    let total_value: Decimal = items.iter().map(ReportItem::effective_value).sum();
    let total_cost: Decimal = items.iter().filter_map(|i| i.cost).sum();
    let average_value = if total_items == 0 {
        Decimal::ZERO
    } else {
        (total_value / Decimal::from(total_items)).round_dp(2)
    };

    ReportTotals {
        total_items,
        total_value,
        total_cost,
        average_value,
    }
}
