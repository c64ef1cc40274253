//! Scenario options and their validation.
//!
//! [Options] is the raw, serde friendly shape that a test declares in code or that is loaded from a
//! TOML file. It is validated into a list of [ScenarioConfig] before any VU is started, so that a
//! typo in an executor name or a duration is reported up front rather than part way through a run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_EXEC: &str = "default";
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(10 * 60);

pub const CONSTANT_VUS: &str = "constant-vus";
pub const PER_VU_ITERATIONS: &str = "per-vu-iterations";

#[derive(derive_more::Error, derive_more::Display, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[display("No scenarios are configured")]
    NoScenarios,
    #[display("Scenario [{scenario}] uses unknown executor [{executor}]")]
    UnknownExecutor { scenario: String, executor: String },
    #[display("Scenario [{scenario}] has an invalid {field} [{value}]: {reason}")]
    InvalidDuration {
        scenario: String,
        field: &'static str,
        value: String,
        reason: String,
    },
    #[display("Scenario [{scenario}] is missing required option [{field}]")]
    MissingOption {
        scenario: String,
        field: &'static str,
    },
    #[display("Scenario [{scenario}] must have at least one {field}")]
    ZeroValue {
        scenario: String,
        field: &'static str,
    },
    #[display("Scenario [{scenario}] runs entry function [{exec}] which is not registered")]
    UnknownExec { scenario: String, exec: String },
    #[display("Scenario [{scenario}] was selected but is not configured")]
    UnknownScenario { scenario: String },
}

/// Options for a whole test run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Options {
    /// Base URL of the service to test.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub scenarios: BTreeMap<String, ScenarioOptions>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_scenario(mut self, name: impl Into<String>, scenario: ScenarioOptions) -> Self {
        self.scenarios.insert(name.into(), scenario);
        self
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read options file {}: {e}", path.display())
        })?;
        Self::from_toml_str(&content)
    }

    /// Validate every scenario, sorted by name.
    pub fn validate(&self) -> Result<Vec<ScenarioConfig>, ConfigError> {
        if self.scenarios.is_empty() {
            return Err(ConfigError::NoScenarios);
        }

        self.scenarios
            .iter()
            .map(|(name, scenario)| scenario.validate(name))
            .collect()
    }
}

/// Options for one scenario, named the way k6 names them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScenarioOptions {
    pub executor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vus: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graceful_stop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<String>,
}

impl ScenarioOptions {
    /// Run `vus` VUs in a loop for `duration`.
    pub fn constant_vus(vus: usize, duration: &str) -> Self {
        Self {
            executor: CONSTANT_VUS.to_string(),
            vus: Some(vus),
            duration: Some(duration.to_string()),
            ..Default::default()
        }
    }

    /// Run `iterations` iterations on each of `vus` VUs.
    pub fn per_vu_iterations(vus: usize, iterations: u64) -> Self {
        Self {
            executor: PER_VU_ITERATIONS.to_string(),
            vus: Some(vus),
            iterations: Some(iterations),
            ..Default::default()
        }
    }

    pub fn with_max_duration(mut self, max_duration: &str) -> Self {
        self.max_duration = Some(max_duration.to_string());
        self
    }

    pub fn with_graceful_stop(mut self, graceful_stop: &str) -> Self {
        self.graceful_stop = Some(graceful_stop.to_string());
        self
    }

    pub fn with_start_time(mut self, start_time: &str) -> Self {
        self.start_time = Some(start_time.to_string());
        self
    }

    pub fn with_exec(mut self, exec: &str) -> Self {
        self.exec = Some(exec.to_string());
        self
    }

    pub fn validate(&self, name: &str) -> Result<ScenarioConfig, ConfigError> {
        let vus = self.vus.unwrap_or(1);
        if vus == 0 {
            return Err(ConfigError::ZeroValue {
                scenario: name.to_string(),
                field: "VU",
            });
        }

        let executor = match self.executor.as_str() {
            CONSTANT_VUS => {
                let duration = self.duration.as_deref().ok_or_else(|| ConfigError::MissingOption {
                    scenario: name.to_string(),
                    field: "duration",
                })?;
                let duration = parse_duration(name, "duration", duration)?;
                if duration.is_zero() {
                    return Err(ConfigError::InvalidDuration {
                        scenario: name.to_string(),
                        field: "duration",
                        value: self.duration.clone().unwrap_or_default(),
                        reason: "must be greater than zero".to_string(),
                    });
                }

                ExecutorConfig::ConstantVus { vus, duration }
            }
            PER_VU_ITERATIONS => {
                let iterations = self.iterations.ok_or_else(|| ConfigError::MissingOption {
                    scenario: name.to_string(),
                    field: "iterations",
                })?;
                if iterations == 0 {
                    return Err(ConfigError::ZeroValue {
                        scenario: name.to_string(),
                        field: "iteration",
                    });
                }
                let max_duration = self
                    .max_duration
                    .as_deref()
                    .map(|d| parse_duration(name, "maxDuration", d))
                    .transpose()?
                    .unwrap_or(DEFAULT_MAX_DURATION);

                ExecutorConfig::PerVuIterations {
                    vus,
                    iterations,
                    max_duration,
                }
            }
            other => {
                return Err(ConfigError::UnknownExecutor {
                    scenario: name.to_string(),
                    executor: other.to_string(),
                })
            }
        };

        let graceful_stop = self
            .graceful_stop
            .as_deref()
            .map(|d| parse_duration(name, "gracefulStop", d))
            .transpose()?
            .unwrap_or(DEFAULT_GRACEFUL_STOP);
        let start_time = self
            .start_time
            .as_deref()
            .map(|d| parse_duration(name, "startTime", d))
            .transpose()?
            .unwrap_or_default();

        Ok(ScenarioConfig {
            name: name.to_string(),
            executor,
            graceful_stop,
            start_time,
            exec: self.exec.clone().unwrap_or_else(|| DEFAULT_EXEC.to_string()),
        })
    }
}

/// A validated scenario. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioConfig {
    pub name: String,
    pub executor: ExecutorConfig,
    pub graceful_stop: Duration,
    pub start_time: Duration,
    pub exec: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorConfig {
    ConstantVus {
        vus: usize,
        duration: Duration,
    },
    PerVuIterations {
        vus: usize,
        iterations: u64,
        max_duration: Duration,
    },
}

impl ExecutorConfig {
    pub fn name(&self) -> &'static str {
        match self {
            ExecutorConfig::ConstantVus { .. } => CONSTANT_VUS,
            ExecutorConfig::PerVuIterations { .. } => PER_VU_ITERATIONS,
        }
    }

    pub fn vus(&self) -> usize {
        match self {
            ExecutorConfig::ConstantVus { vus, .. } => *vus,
            ExecutorConfig::PerVuIterations { vus, .. } => *vus,
        }
    }

    /// How long VUs may keep starting new iterations.
    pub fn duration(&self) -> Duration {
        match self {
            ExecutorConfig::ConstantVus { duration, .. } => *duration,
            ExecutorConfig::PerVuIterations { max_duration, .. } => *max_duration,
        }
    }

    /// The iteration budget for each VU, if the executor has one.
    pub fn iterations_per_vu(&self) -> Option<u64> {
        match self {
            ExecutorConfig::ConstantVus { .. } => None,
            ExecutorConfig::PerVuIterations { iterations, .. } => Some(*iterations),
        }
    }
}

fn parse_duration(
    scenario: &str,
    field: &'static str,
    value: &str,
) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|e| ConfigError::InvalidDuration {
        scenario: scenario.to_string(),
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
