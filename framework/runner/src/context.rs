use std::future::Future;
use std::time::Duration;
use std::{fmt::Debug, sync::Arc};

use gauntlet_core::prelude::{DelegatedShutdownListener, ShutdownHandle};
use gauntlet_instruments::{Predicate, Reporter};
use rand::rngs::StdRng;

use crate::executor::Executor;

pub trait UserValuesConstraint: Default + Debug + Send + Sync + 'static {}

/// Values for tests which do not need to keep any state of their own.
#[derive(Default, Debug)]
pub struct NoValues;

impl UserValuesConstraint for NoValues {}

/// State shared by every VU of every scenario in a run.
#[derive(Debug)]
pub struct RunnerContext<RV: UserValuesConstraint> {
    executor: Arc<Executor>,
    reporter: Arc<Reporter>,
    shutdown_handle: ShutdownHandle,
    base_url: String,
    value: RV,
}

impl<RV: UserValuesConstraint> RunnerContext<RV> {
    pub(crate) fn new(
        executor: Arc<Executor>,
        reporter: Arc<Reporter>,
        shutdown_handle: ShutdownHandle,
        base_url: String,
    ) -> Self {
        Self {
            executor,
            reporter,
            shutdown_handle,
            base_url,
            value: Default::default(),
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn reporter(&self) -> Arc<Reporter> {
        self.reporter.clone()
    }

    /// The base URL of the service under test.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stop every scenario. VUs finish or abandon their current iteration and the run moves on to
    /// teardown and reporting.
    pub fn force_stop_scenario(&self) {
        self.shutdown_handle.shutdown();
    }

    pub(crate) fn shutdown_handle(&self) -> &ShutdownHandle {
        &self.shutdown_handle
    }

    pub fn get_mut(&mut self) -> &mut RV {
        &mut self.value
    }

    pub fn get(&self) -> &RV {
        &self.value
    }
}

/// The execution context of a single virtual user.
pub struct VuContext<RV: UserValuesConstraint, V: UserValuesConstraint> {
    vu_id: String,
    vu_index: usize,
    scenario_name: String,
    iteration: u64,
    runner_context: Arc<RunnerContext<RV>>,
    shutdown_listener: DelegatedShutdownListener,
    rng: StdRng,
    value: V,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> VuContext<RV, V> {
    pub(crate) fn new(
        scenario_name: String,
        vu_index: usize,
        runner_context: Arc<RunnerContext<RV>>,
        shutdown_listener: DelegatedShutdownListener,
        rng: StdRng,
    ) -> Self {
        Self {
            vu_id: format!("{scenario_name}-vu-{vu_index}"),
            vu_index,
            scenario_name,
            iteration: 0,
            runner_context,
            shutdown_listener,
            rng,
            value: Default::default(),
        }
    }

    /// A unique identifier for this VU within the run, such as `smoke-vu-3`.
    pub fn vu_id(&self) -> &str {
        &self.vu_id
    }

    /// The index of this VU within its scenario, starting from 0.
    pub fn vu_index(&self) -> usize {
        self.vu_index
    }

    pub fn scenario_name(&self) -> &str {
        &self.scenario_name
    }

    /// The number of iterations this VU has started before the current one.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub(crate) fn next_iteration(&mut self) {
        self.iteration += 1;
    }

    pub fn runner_context(&self) -> &Arc<RunnerContext<RV>> {
        &self.runner_context
    }

    /// Listener which fires when in-flight work for this VU must be abandoned.
    pub fn shutdown_listener(&mut self) -> &mut DelegatedShutdownListener {
        &mut self.shutdown_listener
    }

    /// The random source for this VU. It is seeded from the run seed, so a run with a fixed seed
    /// makes the same choices.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn get_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn get(&self) -> &V {
        &self.value
    }

    /// Run async code in place, blocking this VU until it completes.
    ///
    /// The future is cancelled if the scenario's graceful stop runs out, or if the run is shut
    /// down. In that case a [gauntlet_core::prelude::ShutdownSignalError] is returned, which the
    /// runner counts as an interrupted iteration.
    pub fn execute<T>(&self, fut: impl Future<Output = anyhow::Result<T>>) -> anyhow::Result<T> {
        self.runner_context
            .executor()
            .execute_in_place_until(self.shutdown_listener.clone(), fut)
    }

    /// Pause this VU, for example to pace iterations. The pause is cut short by a shutdown.
    pub fn sleep(&self, duration: Duration) -> anyhow::Result<()> {
        self.execute(async move {
            tokio::time::sleep(duration).await;
            Ok(())
        })
    }

    /// Evaluate named predicates against a response and record the outcomes under this VU's
    /// scenario. Returns true if every predicate passed.
    pub fn check<R>(&self, response: &R, predicates: &[Predicate<'_, R>]) -> bool {
        self.runner_context
            .reporter
            .checks()
            .record(&self.scenario_name, response, predicates)
    }
}
