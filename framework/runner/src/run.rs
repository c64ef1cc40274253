use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use gauntlet_core::prelude::ShutdownHandle;
use gauntlet_instruments::ReportConfig;
use gauntlet_summary_model::{append_run_summary, RunSummary};

use crate::cli::ReporterOpt;
use crate::init::init_logging;
use crate::monitor::start_monitor;
use crate::progress::start_progress;
use crate::scenario::run_scenario;
use crate::summary::{print_run_totals, print_summary_of_scenarios, scenario_summary};
use crate::{
    context::{RunnerContext, UserValuesConstraint},
    definition::TestDefinitionBuilder,
    executor::Executor,
    shutdown::start_shutdown_listener,
};

/// Run every configured scenario concurrently and return the summary once they have all stopped.
///
/// Configuration errors are returned before any VU is started. Errors inside VU iterations are
/// counted in the summary and never fail the run.
///
/// This owns its own Tokio runtime, so it must not be called from within an async context.
pub fn run<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: TestDefinitionBuilder<RV, V>,
) -> anyhow::Result<RunSummary> {
    init_logging();

    let definition = definition.build()?;

    log::info!(
        "Running test: {} against {} (run id {}, seed {})",
        definition.name,
        definition.base_url,
        definition.run_id,
        definition.seed
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime)?;
    let executor = Arc::new(Executor::new(runtime, shutdown_handle.clone()));
    let reporter = Arc::new(match definition.reporter {
        ReporterOpt::InMemory => ReportConfig::default().enable_in_memory().init(),
        ReporterOpt::Noop => ReportConfig::default().init(),
    });
    let mut runner_context = RunnerContext::new(
        executor,
        reporter.clone(),
        shutdown_handle.clone(),
        definition.base_url.clone(),
    );

    if let Some(setup_fn) = &definition.setup_fn {
        setup_fn(&mut runner_context)?;
    }

    let mut summary = RunSummary::new(
        definition.run_id.clone(),
        definition.name.clone(),
        chrono::Utc::now().timestamp(),
        definition.seed,
        env!("CARGO_PKG_VERSION").to_string(),
    );
    summary.add_env("BASE_URL".to_string(), definition.base_url.clone());
    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        summary.add_env("RUST_LOG".to_string(), rust_log);
    }

    // Background threads only need to live as long as the scenarios
    let run_finished = ShutdownHandle::new();

    if !definition.no_progress {
        // Show the user how long is left, not counting any graceful stop
        let planned_runtime = definition
            .scenarios
            .iter()
            .map(|s| s.start_time + s.executor.duration())
            .max()
            .unwrap_or(Duration::ZERO);
        start_progress(planned_runtime, reporter.clone(), run_finished.new_listener());
    }

    let runner_context = Arc::new(runner_context);

    // Ready to start spawning VUs so start the resource monitor to report high usage by VUs
    // which might lead to a misleading outcome.
    let total_vus = definition.scenarios.iter().map(|s| s.executor.vus()).sum();
    start_monitor(total_vus, run_finished.new_listener());

    let mut handles = Vec::with_capacity(definition.scenarios.len());
    for scenario in definition.scenarios.iter().cloned() {
        let scenario_context = runner_context.clone();
        let hooks = definition.vu_hooks.clone();
        let seed = definition.seed;
        let name = scenario.name.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("scenario-{name}"))
            .spawn(move || run_scenario::<RV, V>(scenario, scenario_context, hooks, seed));
        match spawned {
            Ok(handle) => handles.push((name, handle)),
            Err(e) => {
                log::error!("Failed to start scenario {name}: {e:?}");
                shutdown_handle.shutdown();
            }
        }
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for (name, handle) in handles {
        match handle.join() {
            Ok(Ok(outcome)) => outcomes.push(outcome),
            Ok(Err(e)) => log::error!("Scenario {name} failed: {e:?}"),
            Err(e) => log::error!("Scenario {name} panicked: {e:?}"),
        }
    }

    run_finished.shutdown();

    if let Some(teardown_fn) = definition.teardown_fn {
        // Don't crash the runner if the teardown fails. We still want the reporting and runner
        // shutdown to happen cleanly. The hook is documented as 'best effort'
        if let Err(e) = teardown_fn(runner_context.clone()) {
            log::error!("Teardown failed: {:?}", e);
        }
    }

    for outcome in &outcomes {
        summary.add_scenario(
            outcome.config.name.clone(),
            scenario_summary(outcome, &reporter),
        );
    }

    let summary = summary.with_fingerprint();

    reporter.finalize();
    if definition.reporter == ReporterOpt::InMemory {
        print_summary_of_scenarios(&summary.scenarios);
        print_run_totals(&summary);
    }

    if let Some(path) = definition.summary_path {
        append_run_summary(summary.clone(), path).context("Failed to write run summary")?;
    }

    Ok(summary)
}
