use crate::cli::GauntletScenarioCli;
use clap::Parser;

/// Initialise the CLI and logging for the Gauntlet runner.
///
/// Logging defaults to `info` and can be changed with `RUST_LOG`.
pub fn init() -> GauntletScenarioCli {
    init_logging();

    GauntletScenarioCli::parse()
}

pub(crate) fn init_logging() {
    // Ignore the error, logging may already have been set up by an earlier run in this process
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
