use std::collections::HashMap;
use std::sync::Arc;

use crate::cli::{GauntletScenarioCli, ReporterOpt};
use crate::config::{ConfigError, Options, ScenarioConfig, DEFAULT_BASE_URL, DEFAULT_EXEC};
use crate::context::{RunnerContext, UserValuesConstraint, VuContext};

pub type HookResult = anyhow::Result<()>;

pub type GlobalHookMut<RV> = fn(&mut RunnerContext<RV>) -> HookResult;
pub type GlobalHook<RV> = fn(Arc<RunnerContext<RV>>) -> HookResult;
pub type VuHookMut<RV, V> = fn(&mut VuContext<RV, V>) -> HookResult;

/// An entry function that a VU runs once per iteration.
pub type ExecFn<RV, V> = Arc<dyn Fn(&mut VuContext<RV, V>) -> HookResult + Send + Sync>;

/// The builder for a test definition.
///
/// This must be used at the start of a test to define the scenarios that you want to run and the
/// entry functions that they run.
pub struct TestDefinitionBuilder<RV: UserValuesConstraint, V: UserValuesConstraint> {
    /// The name of the test, which should be unique within the test suite.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    cli: GauntletScenarioCli,
    /// Scenario options declared by the test. Replaced by the `--config` file if one is given.
    options: Options,
    /// Global setup hook for this test. It will be run once, before any VUs are started.
    setup_fn: Option<GlobalHookMut<RV>>,
    /// Setup hook for a VU, which will be run once for each VU as it starts.
    ///
    /// If it fails then that VU does not run any iterations.
    setup_vu_fn: Option<VuHookMut<RV, V>>,
    /// The registry of entry functions, keyed by the name that scenarios refer to with `exec`.
    exec: HashMap<String, ExecFn<RV, V>>,
    /// Teardown hook for a VU, which will be run once for each VU after its last iteration.
    teardown_vu_fn: Option<VuHookMut<RV, V>>,
    /// Global teardown hook. It runs once after every VU has stopped, on a best effort basis.
    teardown_fn: Option<GlobalHook<RV>>,
}

pub(crate) struct TestDefinition<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub name: String,
    pub base_url: String,
    pub scenarios: Vec<ScenarioConfig>,
    pub seed: u64,
    pub run_id: String,
    pub no_progress: bool,
    pub reporter: ReporterOpt,
    pub summary_path: Option<std::path::PathBuf>,
    pub setup_fn: Option<GlobalHookMut<RV>>,
    pub teardown_fn: Option<GlobalHook<RV>>,
    pub vu_hooks: VuHooks<RV, V>,
}

/// The hooks a scenario needs to run its VUs.
pub(crate) struct VuHooks<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub setup_vu_fn: Option<VuHookMut<RV, V>>,
    pub exec: HashMap<String, ExecFn<RV, V>>,
    pub teardown_vu_fn: Option<VuHookMut<RV, V>>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> Clone for VuHooks<RV, V> {
    fn clone(&self) -> Self {
        Self {
            setup_vu_fn: self.setup_vu_fn,
            exec: self.exec.clone(),
            teardown_vu_fn: self.teardown_vu_fn,
        }
    }
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> TestDefinitionBuilder<RV, V> {
    /// Initialise a new test definition from the test name and command line arguments.
    /// See the [TestDefinitionBuilder::name] for more information about the name.
    pub fn new(name: &str, cli: GauntletScenarioCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            options: Options::default(),
            setup_fn: None,
            setup_vu_fn: None,
            exec: HashMap::new(),
            teardown_vu_fn: None,
            teardown_fn: None,
        }
    }

    /// Set the scenario options [TestDefinitionBuilder::options] for this test.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Set the global setup hook [TestDefinitionBuilder::setup_fn] for this test.
    pub fn use_setup(mut self, setup_fn: GlobalHookMut<RV>) -> Self {
        self.setup_fn = Some(setup_fn);
        self
    }

    /// Set the VU setup hook [TestDefinitionBuilder::setup_vu_fn] for this test.
    pub fn use_vu_setup(mut self, setup_vu_fn: VuHookMut<RV, V>) -> Self {
        self.setup_vu_fn = Some(setup_vu_fn);
        self
    }

    /// Register the entry function that scenarios run when they do not name one with `exec`.
    pub fn use_default_exec(
        self,
        exec: impl Fn(&mut VuContext<RV, V>) -> HookResult + Send + Sync + 'static,
    ) -> Self {
        self.use_named_exec(DEFAULT_EXEC, exec)
    }

    /// Register a named entry function [TestDefinitionBuilder::exec] that scenarios can select
    /// with `exec`.
    pub fn use_named_exec(
        mut self,
        name: &str,
        exec: impl Fn(&mut VuContext<RV, V>) -> HookResult + Send + Sync + 'static,
    ) -> Self {
        let previous = self.exec.insert(name.to_string(), Arc::new(exec));

        if previous.is_some() {
            panic!("Entry function [{}] is already defined", name);
        }

        self
    }

    /// Set the VU teardown hook [TestDefinitionBuilder::teardown_vu_fn] for this test.
    pub fn use_vu_teardown(mut self, teardown_vu_fn: VuHookMut<RV, V>) -> Self {
        self.teardown_vu_fn = Some(teardown_vu_fn);
        self
    }

    /// Set the global teardown hook [TestDefinitionBuilder::teardown_fn] for this test.
    pub fn use_teardown(mut self, teardown_fn: GlobalHook<RV>) -> Self {
        self.teardown_fn = Some(teardown_fn);
        self
    }

    /// Resolve and validate the configuration. Nothing is started if this fails.
    pub(crate) fn build(self) -> anyhow::Result<TestDefinition<RV, V>> {
        let options = match &self.cli.config {
            Some(path) => Options::from_toml_file(path)?,
            None => self.options,
        };

        let base_url = self
            .cli
            .base_url
            .clone()
            .or(options.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let mut scenarios = options.validate()?;

        if !self.cli.scenario.is_empty() {
            if let Some(missing) = self
                .cli
                .scenario
                .iter()
                .find(|name| !scenarios.iter().any(|s| &s.name == *name))
            {
                return Err(ConfigError::UnknownScenario {
                    scenario: missing.clone(),
                }
                .into());
            }

            scenarios.retain(|s| self.cli.scenario.contains(&s.name));
        }

        if let Some(scenario) = scenarios.iter().find(|s| !self.exec.contains_key(&s.exec)) {
            return Err(ConfigError::UnknownExec {
                scenario: scenario.name.clone(),
                exec: scenario.exec.clone(),
            }
            .into());
        }

        Ok(TestDefinition {
            name: self.name,
            base_url,
            scenarios,
            seed: self.cli.seed.unwrap_or_else(rand::random),
            run_id: self.cli.run_id.unwrap_or_else(|| nanoid::nanoid!()),
            no_progress: self.cli.no_progress,
            reporter: self.cli.reporter,
            summary_path: self.cli.summary_path,
            setup_fn: self.setup_fn,
            teardown_fn: self.teardown_fn,
            vu_hooks: VuHooks {
                setup_vu_fn: self.setup_vu_fn,
                exec: self.exec,
                teardown_vu_fn: self.teardown_vu_fn,
            },
        })
    }
}
