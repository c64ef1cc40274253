mod operations_table;

use crate::report::in_memory_reporter::operations_table::{CheckTableRow, OperationRow};
use crate::report::ReportCollector;
use crate::{CheckRow, OperationRecord};
use std::collections::BTreeMap;
use tabled::settings::Style;
use tabled::Table;

/// A very basic reporter that is useful while developing scenarios. It keeps all of the operations
/// in memory and prints a summary of the operations and checks at the end of the run.
#[derive(Default)]
pub struct InMemoryReporter {
    operation_records: Vec<OperationRecord>,
}

impl InMemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn operation_rows(&self) -> Vec<OperationRow> {
        self.operation_records
            .iter()
            .fold(BTreeMap::new(), |mut acc, record| {
                acc.entry((
                    record.operation_id.clone(),
                    record.scenario.clone().unwrap_or_default(),
                ))
                .or_insert_with(Vec::new)
                .push(record);
                acc
            })
            .into_iter()
            .map(|((operation_id, scenario), operations)| {
                let total_operations = operations.len();
                let mut durations_micro = operations
                    .iter()
                    .map(|record| record.duration().as_micros())
                    .collect::<Vec<_>>();
                durations_micro.sort_unstable();
                let total_duration_micro = durations_micro.iter().sum::<u128>();

                OperationRow {
                    operation_id,
                    scenario,
                    avg_time_ms: (total_duration_micro as f64 / total_operations as f64) / 1000.0,
                    min_time_ms: durations_micro.first().copied().unwrap_or_default() as f64
                        / 1000.0,
                    max_time_ms: durations_micro.last().copied().unwrap_or_default() as f64
                        / 1000.0,
                    p95_time_ms: percentile(&durations_micro, 95) as f64 / 1000.0,
                    total_operations,
                    failed_operations: operations.iter().filter(|op| op.is_error).count(),
                }
            })
            .collect()
    }

    fn print_summary_of_operations(&self) {
        if self.operation_records.is_empty() {
            return;
        }

        println!("\nSummary of operations");
        let mut table = Table::new(self.operation_rows());
        table.with(Style::modern());

        println!("{table}");
    }

    fn print_summary_of_checks(checks: &[CheckRow]) {
        if checks.is_empty() {
            return;
        }

        println!("\nSummary of checks");
        let mut table = Table::new(Self::check_rows(checks));
        table.with(Style::modern());

        println!("{table}");
    }

    fn check_rows(checks: &[CheckRow]) -> Vec<CheckTableRow> {
        checks
            .iter()
            .map(|check| CheckTableRow {
                scenario: check.scenario.clone(),
                check: check.name.clone(),
                passes: check.passes,
                fails: check.fails,
                pass_rate: check.pass_rate(),
            })
            .collect()
    }
}

/// Nearest rank percentile of sorted values.
fn percentile(sorted: &[u128], p: usize) -> u128 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (p * sorted.len()).div_ceil(100).max(1);
    sorted[rank - 1]
}

impl ReportCollector for InMemoryReporter {
    fn add_operation(&mut self, operation_record: &OperationRecord) {
        self.operation_records.push(operation_record.clone());
    }

    fn finalize(&self, checks: &[CheckRow]) {
        self.print_summary_of_operations();
        Self::print_summary_of_checks(checks);
    }
}
