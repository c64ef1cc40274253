use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use gauntlet_core::prelude::{ShutdownHandle, VuBailError};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::ScenarioConfig;
use crate::context::{RunnerContext, UserValuesConstraint, VuContext};
use crate::definition::{ExecFn, VuHooks};
use crate::shutdown::{DelegatedShutdownListener, ShutdownSignalError};

/// How long VUs get to notice a cancellation before they are abandoned.
const ABANDON_GRACE: Duration = Duration::from_secs(1);
const FINISHED_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What happened while a scenario ran.
#[derive(Debug, Clone)]
pub(crate) struct ScenarioOutcome {
    pub config: ScenarioConfig,
    pub elapsed: Duration,
    pub vus_started: usize,
    pub peak_vus: usize,
    pub vu_end_count: usize,
    pub iterations: u64,
    pub failed_iterations: u64,
    pub interrupted_iterations: u64,
}

#[derive(Debug, Default)]
struct ScenarioStats {
    active_vus: AtomicUsize,
    peak_vus: AtomicUsize,
    vus_started: AtomicUsize,
    vu_end_count: AtomicUsize,
    iterations: AtomicU64,
    failed_iterations: AtomicU64,
    interrupted_iterations: AtomicU64,
}

impl ScenarioStats {
    fn vu_started(&self) {
        self.vus_started.fetch_add(1, Ordering::Relaxed);
        let active = self.active_vus.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_vus.fetch_max(active, Ordering::AcqRel);
    }

    fn vu_stopped(&self) {
        self.active_vus.fetch_sub(1, Ordering::AcqRel);
    }

    fn into_outcome(self, config: ScenarioConfig, elapsed: Duration) -> ScenarioOutcome {
        ScenarioOutcome {
            config,
            elapsed,
            vus_started: self.vus_started.into_inner(),
            peak_vus: self.peak_vus.into_inner(),
            vu_end_count: self.vu_end_count.into_inner(),
            iterations: self.iterations.into_inner(),
            failed_iterations: self.failed_iterations.into_inner(),
            interrupted_iterations: self.interrupted_iterations.into_inner(),
        }
    }
}

/// Run one scenario to completion, blocking the calling thread.
///
/// Waits for the scenario's start time, spawns one thread per VU and lets them iterate until the
/// duration or iteration budget is used up. When the duration expires VUs finish their current
/// iteration. Once the graceful stop has also run out, in-flight work is cancelled. VUs that are
/// blocked outside of the VU context and do not return shortly after are abandoned, and their
/// iterations counted as interrupted.
pub(crate) fn run_scenario<RV: UserValuesConstraint, V: UserValuesConstraint>(
    config: ScenarioConfig,
    runner_context: Arc<RunnerContext<RV>>,
    hooks: VuHooks<RV, V>,
    seed: u64,
) -> anyhow::Result<ScenarioOutcome> {
    let stats = Arc::new(ScenarioStats::default());
    let run_shutdown = runner_context.shutdown_handle().clone();
    let executor = runner_context.executor().clone();

    if !config.start_time.is_zero() {
        let start_time = config.start_time;
        log::debug!("Scenario {} starts in {:?}", config.name, start_time);
        if executor
            .execute_in_place(async move {
                tokio::time::sleep(start_time).await;
                Ok(())
            })
            .is_err()
        {
            log::info!("Run stopped before scenario {} started", config.name);
            return Ok(unwrap_stats(stats).into_outcome(config, Duration::ZERO));
        }
    }

    let exec = hooks
        .exec
        .get(&config.exec)
        .cloned()
        .with_context(|| format!("No entry function named [{}]", config.exec))?;

    log::info!(
        "Starting scenario {} with executor {}: {} VUs running [{}]",
        config.name,
        config.executor.name(),
        config.executor.vus(),
        config.exec
    );

    // Stop starting new iterations
    let stop_handle = ShutdownHandle::new();
    // Cancel iterations which are still in flight
    let abort_handle = ShutdownHandle::new();
    // All VUs have exited so the timer has nothing left to do
    let done_handle = ShutdownHandle::new();

    executor.spawn(scenario_timer(
        config.name.clone(),
        config.executor.duration(),
        config.graceful_stop,
        run_shutdown.new_listener(),
        done_handle.new_listener(),
        stop_handle.clone(),
        abort_handle.clone(),
    ));

    let started = Instant::now();
    let scenario_offset = scenario_seed_offset(&config.name);

    let (finished_tx, finished_rx) = mpsc::channel();
    let mut handles = Vec::with_capacity(config.executor.vus());
    for vu_index in 0..config.executor.vus() {
        let context = VuContext::<RV, V>::new(
            config.name.clone(),
            vu_index,
            runner_context.clone(),
            abort_handle.new_listener(),
            StdRng::seed_from_u64(
                seed.wrapping_add(scenario_offset)
                    .wrapping_add(vu_index as u64),
            ),
        );
        let vu = Vu {
            context,
            exec: exec.clone(),
            hooks: hooks.clone(),
            stop_listener: stop_handle.new_listener(),
            iterations_per_vu: config.executor.iterations_per_vu(),
            stats: stats.clone(),
        };
        let finished = FinishedGuard(finished_tx.clone());

        let spawned = std::thread::Builder::new()
            .name(vu.context.vu_id().to_string())
            .spawn(move || {
                let _finished = finished;
                vu.run();
            });
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                // Let the VUs which did start wind down before reporting the failure
                stop_handle.shutdown();
                abort_handle.shutdown();
                drop(finished_tx);
                // The closure which failed to spawn dropped its guard
                let _ = finished_rx.try_recv();
                wait_for_vus(&config.name, handles, &finished_rx, &abort_handle);
                done_handle.shutdown();
                return Err(e).context(format!(
                    "Failed to spawn VU thread for scenario {}",
                    config.name
                ));
            }
        }
    }
    drop(finished_tx);

    let abandoned = wait_for_vus(&config.name, handles, &finished_rx, &abort_handle);
    done_handle.shutdown();
    if abandoned > 0 {
        stats
            .interrupted_iterations
            .fetch_add(abandoned as u64, Ordering::AcqRel);
    }

    let elapsed = started.elapsed();
    log::info!("Scenario {} finished after {:?}", config.name, elapsed);

    Ok(unwrap_stats(stats).into_outcome(config, elapsed))
}

/// Sends on drop so that a VU is reported as finished even if its thread unwinds.
struct FinishedGuard(mpsc::Sender<()>);

impl Drop for FinishedGuard {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

/// Join the VU threads, giving up on any that have not returned [ABANDON_GRACE] after the abort
/// signal. Returns the number of VUs that were abandoned.
///
/// Abandoned threads are detached and keep running until whatever blocks them returns.
fn wait_for_vus(
    scenario: &str,
    handles: Vec<std::thread::JoinHandle<()>>,
    finished: &mpsc::Receiver<()>,
    abort_handle: &ShutdownHandle,
) -> usize {
    let mut running = handles.len();
    let mut abandon_at: Option<Instant> = None;
    while running > 0 {
        match finished.recv_timeout(FINISHED_POLL_INTERVAL) {
            Ok(()) => running -= 1,
            Err(RecvTimeoutError::Disconnected) => {
                running = 0;
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        if abort_handle.is_shutdown() {
            let deadline = *abandon_at.get_or_insert_with(|| Instant::now() + ABANDON_GRACE);
            if running > 0 && Instant::now() >= deadline {
                log::warn!(
                    "Abandoning {} VUs of scenario {} which did not stop after being cancelled",
                    running,
                    scenario
                );
                break;
            }
        }
    }

    for handle in handles {
        // Threads that are still running are detached by dropping their handle
        if running > 0 && !handle.is_finished() {
            continue;
        }
        if let Err(e) = handle.join() {
            log::error!("VU thread for scenario {} panicked: {:?}", scenario, e);
        }
    }

    running
}

fn unwrap_stats(stats: Arc<ScenarioStats>) -> ScenarioStats {
    // Abandoned VUs still hold a reference, so copy the counters out when that happens
    Arc::try_unwrap(stats).unwrap_or_else(|stats| ScenarioStats {
        active_vus: AtomicUsize::new(stats.active_vus.load(Ordering::Acquire)),
        peak_vus: AtomicUsize::new(stats.peak_vus.load(Ordering::Acquire)),
        vus_started: AtomicUsize::new(stats.vus_started.load(Ordering::Acquire)),
        vu_end_count: AtomicUsize::new(stats.vu_end_count.load(Ordering::Acquire)),
        iterations: AtomicU64::new(stats.iterations.load(Ordering::Acquire)),
        failed_iterations: AtomicU64::new(stats.failed_iterations.load(Ordering::Acquire)),
        interrupted_iterations: AtomicU64::new(
            stats.interrupted_iterations.load(Ordering::Acquire),
        ),
    })
}

/// Drives the stop and abort signals for a scenario.
async fn scenario_timer(
    scenario: String,
    duration: Duration,
    graceful_stop: Duration,
    mut run_shutdown: DelegatedShutdownListener,
    mut done: DelegatedShutdownListener,
    stop_handle: ShutdownHandle,
    abort_handle: ShutdownHandle,
) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {
            log::debug!("Duration of scenario {} has elapsed, stopping VUs", scenario);
        }
        _ = run_shutdown.wait_for_shutdown() => {
            stop_handle.shutdown();
            abort_handle.shutdown();
            return;
        }
        _ = done.wait_for_shutdown() => return,
    }

    stop_handle.shutdown();

    tokio::select! {
        _ = tokio::time::sleep(graceful_stop) => {
            log::info!(
                "Graceful stop of scenario {} expired, cancelling remaining iterations",
                scenario
            );
            abort_handle.shutdown();
        }
        _ = run_shutdown.wait_for_shutdown() => abort_handle.shutdown(),
        _ = done.wait_for_shutdown() => {}
    }
}

/// Spreads the seeds of different scenarios apart so that VU 0 of two scenarios does not share a
/// random sequence.
fn scenario_seed_offset(name: &str) -> u64 {
    // FNV-1a
    name.bytes().fold(0xcbf29ce484222325, |hash, b| {
        (hash ^ b as u64).wrapping_mul(0x100000001b3)
    })
}

struct Vu<RV: UserValuesConstraint, V: UserValuesConstraint> {
    context: VuContext<RV, V>,
    exec: ExecFn<RV, V>,
    hooks: VuHooks<RV, V>,
    stop_listener: DelegatedShutdownListener,
    iterations_per_vu: Option<u64>,
    stats: Arc<ScenarioStats>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> Vu<RV, V> {
    fn run(mut self) {
        self.stats.vu_started();

        let completed = self.setup() && self.iterate();

        if let Some(teardown_vu_fn) = self.hooks.teardown_vu_fn {
            if let Err(e) = teardown_vu_fn(&mut self.context) {
                log::error!("VU teardown failed for {}: {:?}", self.context.vu_id(), e);
            }
        }

        if completed {
            self.stats.vu_end_count.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.vu_stopped();
    }

    fn setup(&mut self) -> bool {
        let Some(setup_vu_fn) = self.hooks.setup_vu_fn else {
            return true;
        };

        match setup_vu_fn(&mut self.context) {
            Ok(()) => true,
            Err(e) => {
                log::error!("VU setup failed for {}: {:?}", self.context.vu_id(), e);
                false
            }
        }
    }

    /// Returns false if the VU bailed.
    fn iterate(&mut self) -> bool {
        loop {
            // The run level check avoids racing the timer task which forwards a forced stop
            if self.stop_listener.should_shutdown()
                || self.context.runner_context().shutdown_handle().is_shutdown()
            {
                log::debug!("Stopping {}", self.context.vu_id());
                return true;
            }

            if let Some(budget) = self.iterations_per_vu {
                if self.context.iteration() >= budget {
                    log::debug!("{} completed its {} iterations", self.context.vu_id(), budget);
                    return true;
                }
            }

            let exec = &self.exec;
            let context = &mut self.context;
            let result = panic::catch_unwind(AssertUnwindSafe(|| exec(context)));
            self.context.next_iteration();

            match result {
                Ok(Ok(())) => {
                    self.stats.iterations.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(e)) if e.is::<ShutdownSignalError>() => {
                    self.stats.interrupted_iterations.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(e)) if e.is::<VuBailError>() => {
                    log::warn!("{} is bailing: {}", self.context.vu_id(), e);
                    self.stats.iterations.fetch_add(1, Ordering::Relaxed);
                    self.stats.failed_iterations.fetch_add(1, Ordering::Relaxed);
                    return false;
                }
                Ok(Err(e)) => {
                    log::error!("Iteration failed for {}: {:?}", self.context.vu_id(), e);
                    self.stats.iterations.fetch_add(1, Ordering::Relaxed);
                    self.stats.failed_iterations.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    log::error!("Iteration panicked for {}", self.context.vu_id());
                    self.stats.iterations.fetch_add(1, Ordering::Relaxed);
                    self.stats.failed_iterations.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}
