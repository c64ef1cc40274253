mod cli;
mod config;
mod context;
mod definition;
mod executor;
mod init;
mod monitor;
mod progress;
mod run;
mod scenario;
mod shutdown;
mod summary;
mod types;

pub mod prelude {
    pub use crate::cli::{GauntletScenarioCli, ReporterOpt};
    pub use crate::config::{
        ConfigError, ExecutorConfig, Options, ScenarioConfig, ScenarioOptions, CONSTANT_VUS,
        DEFAULT_BASE_URL, PER_VU_ITERATIONS,
    };
    pub use crate::context::{NoValues, RunnerContext, UserValuesConstraint, VuContext};
    pub use crate::definition::{HookResult, TestDefinitionBuilder};
    pub use crate::executor::Executor;
    pub use crate::init::init;
    pub use crate::run::run;
    pub use crate::types::GauntletResult;

    pub use gauntlet_core::prelude::{ShutdownSignalError, VuBailError};
    pub use gauntlet_instruments::{Predicate, Reporter};
    pub use gauntlet_summary_model::{CheckSummary, RunSummary, ScenarioSummary};
}
