use gauntlet_instruments::Reporter;
use gauntlet_summary_model::{CheckSummary, RunSummary, ScenarioSummary};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::scenario::ScenarioOutcome;

pub(crate) fn scenario_summary(
    outcome: &ScenarioOutcome,
    reporter: &Reporter,
) -> ScenarioSummary {
    let totals = reporter.operation_totals(&outcome.config.name);
    let checks = reporter
        .checks()
        .snapshot()
        .into_iter()
        .filter(|row| row.scenario == outcome.config.name)
        .map(|row| {
            (
                row.name,
                CheckSummary {
                    passes: row.passes,
                    fails: row.fails,
                },
            )
        })
        .collect();

    ScenarioSummary {
        executor: outcome.config.executor.name().to_string(),
        exec: outcome.config.exec.clone(),
        vus: outcome.config.executor.vus(),
        planned_duration_ms: outcome.config.executor.duration().as_millis() as u64,
        elapsed_ms: outcome.elapsed.as_millis() as u64,
        vus_started: outcome.vus_started,
        peak_vus: outcome.peak_vus,
        vu_end_count: outcome.vu_end_count,
        iterations: outcome.iterations,
        failed_iterations: outcome.failed_iterations,
        interrupted_iterations: outcome.interrupted_iterations,
        http_reqs: totals.count,
        http_req_failed: totals.errors,
        checks,
    }
}

#[derive(Tabled)]
struct ScenarioRow {
    scenario: String,
    executor: String,
    vus: usize,
    iterations: u64,
    failed: u64,
    interrupted: u64,
    http_reqs: u64,
    #[tabled(display = "percent")]
    http_req_failed: f64,
    #[tabled(display = "seconds")]
    elapsed_ms: u64,
}

fn percent(n: &f64) -> String {
    format!("{:.2}%", n * 100.0)
}

fn seconds(ms: &u64) -> String {
    format!("{:.1}s", *ms as f64 / 1000.0)
}

pub(crate) fn print_summary_of_scenarios<'a>(
    scenarios: impl IntoIterator<Item = (&'a String, &'a ScenarioSummary)>,
) {
    let rows = scenarios
        .into_iter()
        .map(|(name, s)| ScenarioRow {
            scenario: name.clone(),
            executor: s.executor.clone(),
            vus: s.vus,
            iterations: s.iterations,
            failed: s.failed_iterations,
            interrupted: s.interrupted_iterations,
            http_reqs: s.http_reqs,
            http_req_failed: s.http_req_failed_rate(),
            elapsed_ms: s.elapsed_ms,
        })
        .collect::<Vec<_>>();

    if rows.is_empty() {
        return;
    }

    println!("\nSummary of scenarios");
    let mut table = Table::new(rows);
    table.with(Style::modern());

    println!("{table}");
}

/// Totals across every scenario, printed after the per scenario table.
#[derive(Debug, PartialEq, Tabled)]
struct TotalsRow {
    checks_passed: u64,
    checks_failed: u64,
    #[tabled(display = "percent")]
    checks_pass_rate: f64,
    http_reqs: u64,
    http_req_failed: u64,
    #[tabled(display = "percent")]
    http_req_failed_rate: f64,
}

fn run_totals(summary: &RunSummary) -> TotalsRow {
    let checks = summary.total_checks();
    let http_reqs = summary.total_http_reqs();
    let http_req_failed = summary.total_http_req_failed();

    TotalsRow {
        checks_passed: checks.passes,
        checks_failed: checks.fails,
        checks_pass_rate: checks.pass_rate(),
        http_reqs,
        http_req_failed,
        http_req_failed_rate: if http_reqs == 0 {
            0.0
        } else {
            http_req_failed as f64 / http_reqs as f64
        },
    }
}

pub(crate) fn print_run_totals(summary: &RunSummary) {
    if summary.scenarios.is_empty() {
        return;
    }

    println!("\nTotals");
    let mut table = Table::new([run_totals(summary)]);
    table.with(Style::modern());

    println!("{table}");
}
