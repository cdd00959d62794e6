//! Report generation, rendering, delivery and dispatch.

pub mod dispatcher;
pub mod email;
pub mod render;
pub mod report_generation;

pub use dispatcher::{DispatchError, Dispatcher, DispatcherSettings, TickSummary};
pub use email::{build_mailer, EmailError, Mailer, RecordingMailer};
pub use report_generation::{ReportGenerationError, ReportGenerator};
