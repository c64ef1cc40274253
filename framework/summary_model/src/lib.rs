use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, Read, Write};
use std::path::PathBuf;

/// Summary of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner. Unique for each run.
    pub run_id: String,
    /// The name of the test that was run
    pub test_name: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The seed that every VU random source was derived from
    pub seed: u64,
    /// Per scenario results, keyed by scenario name
    pub scenarios: BTreeMap<String, ScenarioSummary>,
    /// Environment variables set for the run
    ///
    /// This won't capture all environment variables. Just the ones that the runner is aware of or
    /// that are included by the test itself.
    pub env: HashMap<String, String>,
    /// The version of Gauntlet that was used for this run
    pub gauntlet_version: String,
    /// Identifies the configuration of the run, see [RunSummary::compute_fingerprint]
    ///
    /// Runs with the same fingerprint can be compared with each other.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// Results for one scenario of a run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScenarioSummary {
    /// The executor strategy, such as `constant-vus`
    pub executor: String,
    /// The entry function the VUs ran
    pub exec: String,
    /// The number of VUs configured
    pub vus: usize,
    /// The configured duration in milliseconds, or the maximum duration for iteration based
    /// executors
    pub planned_duration_ms: u64,
    /// How long the scenario actually ran for, including the graceful stop, in milliseconds
    pub elapsed_ms: u64,
    /// The number of VUs that were started
    pub vus_started: usize,
    /// The highest number of VUs that were running at the same time
    pub peak_vus: usize,
    /// The number of VUs that were still running when the scenario was stopped
    ///
    /// VUs that bail, or whose setup fails, exit early and are not counted here.
    pub vu_end_count: usize,
    /// Iterations that ran to completion, successful or not
    pub iterations: u64,
    /// Iterations that returned an error or panicked
    pub failed_iterations: u64,
    /// Iterations that were cancelled because the graceful stop ran out
    pub interrupted_iterations: u64,
    /// The number of requests made by this scenario
    pub http_reqs: u64,
    /// The number of requests that failed at the transport level or returned an unexpected status
    pub http_req_failed: u64,
    /// Check results keyed by check name
    pub checks: BTreeMap<String, CheckSummary>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckSummary {
    pub passes: u64,
    pub fails: u64,
}

impl CheckSummary {
    pub fn pass_rate(&self) -> f64 {
        match self.passes + self.fails {
            0 => 0.0,
            total => self.passes as f64 / total as f64,
        }
    }
}

impl ScenarioSummary {
    pub fn http_req_failed_rate(&self) -> f64 {
        if self.http_reqs == 0 {
            0.0
        } else {
            self.http_req_failed as f64 / self.http_reqs as f64
        }
    }
}

impl RunSummary {
    /// Create a new run summary
    pub fn new(
        run_id: String,
        test_name: String,
        started_at: i64,
        seed: u64,
        gauntlet_version: String,
    ) -> Self {
        Self {
            run_id,
            test_name,
            started_at,
            seed,
            scenarios: BTreeMap::new(),
            env: HashMap::with_capacity(0),
            gauntlet_version,
            fingerprint: None,
        }
    }

    pub fn add_scenario(&mut self, name: String, summary: ScenarioSummary) {
        self.scenarios.insert(name, summary);
    }

    /// Add an environment variable
    pub fn add_env(&mut self, key: String, value: String) {
        self.env.insert(key, value);
    }

    /// Look up a check result for a scenario
    pub fn check(&self, scenario: &str, name: &str) -> Option<CheckSummary> {
        self.scenarios
            .get(scenario)
            .and_then(|s| s.checks.get(name))
            .copied()
    }

    /// Check totals across every scenario
    pub fn total_checks(&self) -> CheckSummary {
        self.scenarios
            .values()
            .flat_map(|s| s.checks.values())
            .fold(CheckSummary::default(), |acc, c| CheckSummary {
                passes: acc.passes + c.passes,
                fails: acc.fails + c.fails,
            })
    }

    /// Total requests across every scenario
    pub fn total_http_reqs(&self) -> u64 {
        self.scenarios.values().map(|s| s.http_reqs).sum()
    }

    /// Compute a fingerprint for this run summary
    ///
    /// The fingerprint is intended to uniquely identify the configuration used to run the test.
    /// It uses the
    ///     - Test name
    ///     - Scenario configuration (executor, entry function, VUs and planned duration)
    ///     - Selected environment variables
    ///     - Gauntlet version
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn compute_fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.test_name.as_bytes());
        // BTreeMap iteration is already ordered by scenario name
        self.scenarios.iter().for_each(|(name, s)| {
            Digest::update(&mut hasher, name.as_bytes());
            Digest::update(&mut hasher, s.executor.as_bytes());
            Digest::update(&mut hasher, s.exec.as_bytes());
            Digest::update(&mut hasher, s.vus.to_le_bytes());
            Digest::update(&mut hasher, s.planned_duration_ms.to_le_bytes());
        });
        self.env
            .iter()
            .sorted_by_key(|(k, _)| k.to_owned())
            .for_each(|(k, v)| {
                Digest::update(&mut hasher, k.as_bytes());
                Digest::update(&mut hasher, v.as_bytes());
            });
        Digest::update(&mut hasher, self.gauntlet_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }

    /// Store the fingerprint of the current configuration on the summary
    pub fn with_fingerprint(mut self) -> Self {
        self.fingerprint = Some(self.compute_fingerprint());
        self
    }

    /// Request failure totals across every scenario
    pub fn total_http_req_failed(&self) -> u64 {
        self.scenarios.values().map(|s| s.http_req_failed).sum()
    }
}

/// Append the run summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_summary(run_summary: RunSummary, path: PathBuf) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_summary(run_summary, &mut file)?;
    file.write_all("\n".as_bytes())?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, &run_summary)?;
    Ok(())
}

/// Load a run summary from a reader
pub fn load_run_summary<R: Read>(reader: R) -> anyhow::Result<RunSummary> {
    let reader = std::io::BufReader::new(reader);
    let run_summary: RunSummary = serde_json::from_reader(reader)?;
    Ok(run_summary)
}

/// Load run summaries from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_summary].
pub fn load_summary_runs(path: PathBuf) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        runs.push(load_run_summary(line.as_bytes())?);
    }
    Ok(runs)
}
