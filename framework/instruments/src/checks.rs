use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A named boolean assertion against a response.
pub type Predicate<'a, R> = (&'a str, &'a dyn Fn(&R) -> bool);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CheckKey {
    pub scenario: String,
    pub name: String,
}

#[derive(Debug, Default)]
struct CheckCounter {
    passes: AtomicU64,
    fails: AtomicU64,
}

impl CheckCounter {
    fn record(&self, passed: bool) {
        if passed {
            self.passes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.fails.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Aggregated pass and fail counts for one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRow {
    pub scenario: String,
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

impl CheckRow {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }

    /// Fraction of evaluations that passed, `0.0` if the check never ran.
    pub fn pass_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.passes as f64 / total as f64,
        }
    }
}

/// Tallies check outcomes by scenario and check name.
///
/// Counters are created on first use and then only ever incremented atomically, so any number of
/// VUs can record concurrently.
#[derive(Debug, Default)]
pub struct CheckRecorder {
    counters: RwLock<HashMap<CheckKey, Arc<CheckCounter>>>,
}

impl CheckRecorder {
    /// Evaluate each predicate against the response, in order, and count the outcome.
    ///
    /// A predicate that panics counts as a failed check. Returns true if every predicate passed.
    pub fn record<R>(
        &self,
        scenario: &str,
        response: &R,
        predicates: &[Predicate<'_, R>],
    ) -> bool {
        let mut all_passed = true;
        for (name, predicate) in predicates {
            let passed = match panic::catch_unwind(AssertUnwindSafe(|| predicate(response))) {
                Ok(passed) => passed,
                Err(_) => {
                    log::warn!(
                        "Check [{name}] in scenario [{scenario}] panicked, counting it as failed"
                    );
                    false
                }
            };

            self.counter(scenario, name).record(passed);
            all_passed &= passed;
        }

        all_passed
    }

    fn counter(&self, scenario: &str, name: &str) -> Arc<CheckCounter> {
        let key = CheckKey {
            scenario: scenario.to_string(),
            name: name.to_string(),
        };

        if let Some(counter) = self.counters.read().get(&key) {
            return counter.clone();
        }

        self.counters.write().entry(key).or_default().clone()
    }

    /// Point in time view of every check, sorted by scenario and then name.
    pub fn snapshot(&self) -> Vec<CheckRow> {
        let mut rows = self
            .counters
            .read()
            .iter()
            .map(|(key, counter)| CheckRow {
                scenario: key.scenario.clone(),
                name: key.name.clone(),
                passes: counter.passes.load(Ordering::Relaxed),
                fails: counter.fails.load(Ordering::Relaxed),
            })
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| (&a.scenario, &a.name).cmp(&(&b.scenario, &b.name)));
        rows
    }

    pub fn get(&self, scenario: &str, name: &str) -> Option<CheckRow> {
        self.snapshot()
            .into_iter()
            .find(|row| row.scenario == scenario && row.name == name)
    }
}
