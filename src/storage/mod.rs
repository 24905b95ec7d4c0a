mod report;

pub use report::{format_timestamp, ReportError, ReportWriter};
