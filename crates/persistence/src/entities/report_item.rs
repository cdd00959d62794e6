//! Report item entity (read-only row of the report_items source).

use chrono::NaiveDate;
use domain::models::ReportItem;
use rust_decimal::Decimal;
use sqlx::FromRow;

/// Database row mapping for the report_items table.
#[derive(Debug, Clone, FromRow)]
pub struct ReportItemEntity {
    pub id: String,
    pub reference: String,
    pub name: String,
    pub status: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub site: Option<String>,
    pub department: Option<String>,
    pub assignee: Option<String>,
    pub cost: Option<Decimal>,
    pub value: Option<Decimal>,
    pub item_date: Option<NaiveDate>,
    pub fully_depreciated: bool,
}

impl From<ReportItemEntity> for ReportItem {
    fn from(entity: ReportItemEntity) -> Self {
        Self {
            id: entity.id,
            reference: entity.reference,
            name: entity.name,
            status: entity.status,
            category: entity.category,
            location: entity.location,
            site: entity.site,
            department: entity.department,
            assignee: entity.assignee,
            cost: entity.cost,
            value: entity.value,
            date: entity.item_date,
            fully_depreciated: entity.fully_depreciated,
        }
    }
}
