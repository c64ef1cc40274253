use std::future::Future;

use gauntlet_core::prelude::{DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError};

/// Bridges the blocking VU threads onto the shared Tokio runtime.
///
/// Every VU runs on its own OS thread and blocks on this runtime whenever it does async work, so
/// a single runtime serves every request in the run.
#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
    run_shutdown: ShutdownHandle,
}

impl Executor {
    pub(crate) fn new(runtime: tokio::runtime::Runtime, run_shutdown: ShutdownHandle) -> Self {
        Self {
            runtime,
            run_shutdown,
        }
    }

    /// Block the calling thread on `fut`, giving up with a [ShutdownSignalError] if the run is
    /// stopped first.
    ///
    /// Use this from setup and teardown hooks. Entry functions should use
    /// [crate::prelude::VuContext::execute] which also honours the scenario's graceful stop.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        self.execute_in_place_until(self.run_shutdown.new_listener(), fut)
    }

    /// Block the calling thread on `fut` until it completes or `cancel` fires.
    ///
    /// The future is dropped at its next await point when cancelled, so futures which never yield
    /// can hold up a scenario past its graceful stop.
    pub fn execute_in_place_until<T>(
        &self,
        mut cancel: DelegatedShutdownListener,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        if cancel.should_shutdown() {
            return Err(ShutdownSignalError::default().into());
        }

        self.runtime.block_on(async move {
            tokio::select! {
                result = fut => result,
                _ = cancel.wait_for_shutdown() => Err(ShutdownSignalError::default().into()),
            }
        })
    }

    /// Run `fut` in the background, for example a timer.
    ///
    /// Nothing waits for spawned futures, and they are dropped along with the runtime at the end of
    /// the run.
    pub fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        self.runtime.spawn(fut);
    }
}
