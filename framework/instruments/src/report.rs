mod in_memory_reporter;

use crate::{CheckRow, OperationRecord};

pub use in_memory_reporter::InMemoryReporter;

pub trait ReportCollector {
    fn add_operation(&mut self, operation_record: &OperationRecord);

    /// Called once at the end of the run with the final state of every check.
    fn finalize(&self, checks: &[CheckRow]);
}
