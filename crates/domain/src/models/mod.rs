//! Domain models for report scheduling.

pub mod report;
pub mod report_filter;
pub mod report_schedule;
pub mod run_record;

pub use report::{
    AppliedFilter, Dimension, ReportDocument, ReportItem, ReportTotals, SummaryGroup,
    SummarySection,
};
pub use report_filter::{FilterKey, Grouping, ReportFilters};
pub use report_schedule::{
    CreateReportScheduleRequest, Frequency, ListReportSchedulesQuery,
    ListReportSchedulesResponse, ReportFormat, ReportSchedule, ReportScheduleResponse,
    ReportType, TestSendRequest, UpdateReportScheduleRequest,
};
pub use run_record::{FailureStage, ListRunsResponse, RunKind, RunOutcome, RunRecord};
