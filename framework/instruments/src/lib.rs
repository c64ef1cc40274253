mod checks;
mod report;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub use checks::{CheckKey, CheckRecorder, CheckRow, Predicate};
pub use report::{InMemoryReporter, ReportCollector};

/// A single timed operation, such as one HTTP request.
///
/// Create the record just before starting the operation and call [OperationRecord::finish] once
/// the outcome is known, then hand it to [Reporter::add_operation].
#[derive(Debug, Clone)]
pub struct OperationRecord {
    pub operation_id: String,
    pub scenario: Option<String>,
    started: Instant,
    pub elapsed: Option<Duration>,
    pub is_error: bool,
}

impl OperationRecord {
    pub fn new(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            scenario: None,
            started: Instant::now(),
            elapsed: None,
            is_error: false,
        }
    }

    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    pub fn finish(mut self, is_error: bool) -> Self {
        self.elapsed = Some(self.started.elapsed());
        self.is_error = is_error;
        self
    }

    /// The time the operation took, or the time since it started if it has not finished yet.
    pub fn duration(&self) -> Duration {
        self.elapsed.unwrap_or_else(|| self.started.elapsed())
    }
}

/// Request counters for one scenario.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OperationTotals {
    pub count: u64,
    pub errors: u64,
}

impl OperationTotals {
    pub fn error_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.errors as f64 / self.count as f64
        }
    }
}

#[derive(Default)]
pub struct ReportConfig {
    in_memory: bool,
}

impl ReportConfig {
    /// Print tables of operations and checks when the run is finalized.
    pub fn enable_in_memory(mut self) -> Self {
        self.in_memory = true;
        self
    }

    pub fn init(self) -> Reporter {
        let mut collectors: Vec<Mutex<Box<dyn ReportCollector + Send>>> = Vec::new();
        if self.in_memory {
            collectors.push(Mutex::new(Box::new(InMemoryReporter::new())));
        }

        Reporter {
            collectors,
            totals: Mutex::new(HashMap::new()),
            checks: CheckRecorder::default(),
        }
    }
}

/// Process wide sink for operations and checks.
///
/// Totals and check counters are always kept so that the run summary can be built, regardless of
/// which collectors are enabled.
pub struct Reporter {
    collectors: Vec<Mutex<Box<dyn ReportCollector + Send>>>,
    totals: Mutex<HashMap<String, OperationTotals>>,
    checks: CheckRecorder,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("collectors", &self.collectors.len())
            .field("checks", &self.checks)
            .finish()
    }
}

impl Reporter {
    pub fn add_operation(&self, operation_record: &OperationRecord) {
        {
            let mut totals = self.totals.lock();
            let entry = totals
                .entry(operation_record.scenario.clone().unwrap_or_default())
                .or_default();
            entry.count += 1;
            if operation_record.is_error {
                entry.errors += 1;
            }
        }

        for collector in &self.collectors {
            collector.lock().add_operation(operation_record);
        }
    }

    pub fn checks(&self) -> &CheckRecorder {
        &self.checks
    }

    /// Request totals for a single scenario.
    pub fn operation_totals(&self, scenario: &str) -> OperationTotals {
        self.totals
            .lock()
            .get(scenario)
            .copied()
            .unwrap_or_default()
    }

    /// Request totals across all scenarios.
    pub fn total_operations(&self) -> OperationTotals {
        self.totals
            .lock()
            .values()
            .fold(OperationTotals::default(), |acc, t| OperationTotals {
                count: acc.count + t.count,
                errors: acc.errors + t.errors,
            })
    }

    pub fn finalize(&self) {
        let checks = self.checks.snapshot();
        for collector in &self.collectors {
            collector.lock().finalize(&checks);
        }
    }
}
