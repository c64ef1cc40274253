mod common;
mod context;
mod runner_context;

pub mod prelude {
    /// Common operations for HTTP scenarios.
    ///
    /// This is a good place to start if you are getting started writing scenarios.
    pub use crate::common::*;

    pub use crate::context::HttpVuContext;
    pub use crate::runner_context::HttpRunnerContext;

    /// Re-export of the `gauntlet_runner` prelude.
    ///
    /// This is for convenience so that you can depend on a single crate for the runner in your
    /// scenarios.
    pub use gauntlet_runner::prelude::*;

    /// Re-export of the instrumented client for convenience.
    pub use http_client_instrumented::prelude::*;
}
