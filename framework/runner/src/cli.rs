use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(about, long_about = None)]
pub struct GauntletScenarioCli {
    /// Base URL of the service to test, for example `http://localhost:8000`.
    ///
    /// Overrides the base URL from the options and the config file.
    #[clap(short, long)]
    pub base_url: Option<String>,

    /// Path to a TOML file with the scenario options. Replaces the options defined by the test.
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Only run the named scenarios. Can be given multiple times, for example
    /// `--scenario smoke --scenario purchase`.
    ///
    /// Naming a scenario which is not configured is an error.
    #[clap(short, long)]
    pub scenario: Vec<String>,

    /// Seed for the random source of each VU. Use the same seed to get reproducible choices.
    ///
    /// When not set, a random seed is chosen and reported in the run summary.
    #[clap(long)]
    pub seed: Option<u64>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by
    /// anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// How to report operations and checks at the end of the run.
    #[clap(long, value_enum, default_value_t = ReporterOpt::InMemory)]
    pub reporter: ReporterOpt,

    /// Append the run summary as a JSON line to this file.
    #[clap(long)]
    pub summary_path: Option<PathBuf>,

    /// Identifier for this run. A random id is generated if not set.
    #[clap(long)]
    pub run_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReporterOpt {
    /// Print tables of operations, checks and scenarios at the end of the run
    InMemory,
    /// Keep counters for the run summary but print nothing
    Noop,
}
