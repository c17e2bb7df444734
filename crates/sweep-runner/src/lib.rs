use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use sweep_core::{
    candidate_tasks, ensure_dir, list_finished, reconcile, sha256_bytes, sha256_file, BenchConfig,
    Benchmark, Method, SweepDims, TaskKey, Variant, BASE_VARIANT,
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct SweepSpec {
    pub experiment: ExperimentMeta,
    pub results_dir: PathBuf,
    pub harness: HarnessSpec,
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,
    #[serde(default)]
    pub fuel: FuelSpec,
    #[serde(default)]
    pub trial: TrialSpec,
    #[serde(default)]
    pub replace: ReplaceLevel,
    pub suites: Vec<SuiteSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentMeta {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HarnessSpec {
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FuelSpec {
    #[serde(default = "default_fuel_sizes")]
    pub sizes: Vec<u32>,
    #[serde(default = "default_fuel_env_var")]
    pub env_var: String,
}

impl Default for FuelSpec {
    fn default() -> Self {
        Self {
            sizes: default_fuel_sizes(),
            env_var: default_fuel_env_var(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TrialSpec {
    #[serde(default = "default_trials")]
    pub trials: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for TrialSpec {
    fn default() -> Self {
        Self {
            trials: default_trials(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplaceLevel {
    #[default]
    Skip,
    Replace,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuiteSpec {
    pub bench: String,
    #[serde(default)]
    pub config: Option<PathBuf>,
}

fn default_methods() -> Vec<String> {
    vec!["TypeBasedFuzzer".to_string()]
}

fn default_fuel_sizes() -> Vec<u32> {
    vec![7, 100, 1000, 10000]
}

fn default_fuel_env_var() -> String {
    "PICKNEXTFUEL".to_string()
}

fn default_trials() -> u32 {
    10
}

fn default_timeout_seconds() -> u64 {
    60
}

pub fn load_spec(path: &Path) -> Result<(SweepSpec, PathBuf)> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let spec: SweepSpec = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    validate_spec(&spec)?;
    let spec_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
    Ok((spec, spec_dir))
}

fn validate_spec(spec: &SweepSpec) -> Result<()> {
    let mut problems = Vec::new();
    if spec.experiment.id.is_empty() {
        problems.push("experiment.id is empty");
    }
    if spec.results_dir.as_os_str().is_empty() {
        problems.push("results_dir is empty");
    }
    if spec.harness.command.is_empty() {
        problems.push("harness.command is empty");
    }
    if spec.methods.is_empty() {
        problems.push("methods is empty");
    }
    if spec.fuel.sizes.is_empty() {
        problems.push("fuel.sizes is empty");
    }
    if spec.fuel.env_var.is_empty() {
        problems.push("fuel.env_var is empty");
    }
    if spec.trial.trials == 0 {
        problems.push("trial.trials must be > 0");
    }
    if spec.trial.timeout_seconds == 0 {
        problems.push("trial.timeout_seconds must be > 0");
    }
    if spec.suites.is_empty() {
        problems.push("suites is empty");
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "invalid sweep spec:\n{}",
            problems
                .iter()
                .map(|p| format!("  - {}", p))
                .collect::<Vec<_>>()
                .join("\n")
        ))
    }
}

/// One bounded trial as handed to the external tool. `property` carries the
/// harness-side `test_` prefix; `file` is the exact result-file name whose
/// presence marks the task complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialConfig {
    pub bench: String,
    pub method: String,
    pub property: String,
    pub label: String,
    pub trials: u32,
    pub timeout_seconds: u64,
    pub fuel: Option<u32>,
    pub file: String,
}

pub trait TrialRunner {
    fn run_trial(&self, cfg: &TrialConfig) -> Result<()>;
}

pub trait Benchtool {
    fn all_benches(&self) -> Result<Vec<Benchmark>>;
    fn all_variants(&self, bench: &str) -> Result<Vec<Variant>>;
    fn all_properties(&self, bench: &str) -> Result<Vec<String>>;
    fn all_methods(&self, bench: &str) -> Result<Vec<Method>>;
    fn preprocess(&self, bench: &str) -> Result<()>;
    fn apply_variant<'a>(&'a self, bench: &str, variant: &str)
        -> Result<Box<dyn TrialRunner + 'a>>;
}

/// External benchtool driven over argv. Enumeration subcommands answer
/// with JSON on stdout; `apply-variant` mutates the tool's working copy
/// and scopes subsequent `run-trial` calls to that variant.
pub struct ProcessBenchtool {
    command: Vec<String>,
    results_dir: PathBuf,
    fuel_env_var: String,
}

impl ProcessBenchtool {
    pub fn new(command: Vec<String>, results_dir: PathBuf, fuel_env_var: String) -> Result<Self> {
        if command.is_empty() {
            return Err(anyhow!("benchtool command is empty"));
        }
        Ok(Self {
            command,
            results_dir,
            fuel_env_var,
        })
    }

    pub fn from_spec(spec: &SweepSpec, spec_dir: &Path) -> Result<Self> {
        Self::new(
            spec.harness.command.clone(),
            spec_dir.join(&spec.results_dir),
            spec.fuel.env_var.clone(),
        )
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..]);
        cmd.stderr(Stdio::inherit());
        cmd
    }

    fn capture_json(&self, args: &[&str]) -> Result<Value> {
        let mut cmd = self.base_command();
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        let output = cmd
            .output()
            .with_context(|| format!("failed to spawn {}", self.command[0]))?;
        if !output.status.success() {
            return Err(anyhow!(
                "benchtool {} exited with {}",
                args.join(" "),
                output.status
            ));
        }
        // Build chatter may precede the payload; the JSON is the last line.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| anyhow!("benchtool {} produced no output", args.join(" ")))?;
        serde_json::from_str(line.trim())
            .with_context(|| format!("benchtool {} produced invalid JSON", args.join(" ")))
    }

    fn run_ok(&self, args: &[&str]) -> Result<()> {
        let mut cmd = self.base_command();
        cmd.args(args);
        let status = cmd
            .status()
            .with_context(|| format!("failed to spawn {}", self.command[0]))?;
        if !status.success() {
            return Err(anyhow!(
                "benchtool {} exited with {}",
                args.join(" "),
                status
            ));
        }
        Ok(())
    }

    fn listing<T: serde::de::DeserializeOwned>(&self, args: &[&str]) -> Result<Vec<T>> {
        let value = self.capture_json(args)?;
        serde_json::from_value(value)
            .with_context(|| format!("unexpected benchtool {} payload", args.join(" ")))
    }
}

impl Benchtool for ProcessBenchtool {
    fn all_benches(&self) -> Result<Vec<Benchmark>> {
        self.listing(&["list-benches"])
    }

    fn all_variants(&self, bench: &str) -> Result<Vec<Variant>> {
        self.listing(&["list-variants", bench])
    }

    fn all_properties(&self, bench: &str) -> Result<Vec<String>> {
        self.listing(&["list-properties", bench])
    }

    fn all_methods(&self, bench: &str) -> Result<Vec<Method>> {
        self.listing(&["list-methods", bench])
    }

    fn preprocess(&self, bench: &str) -> Result<()> {
        self.run_ok(&["preprocess", bench])
    }

    fn apply_variant<'a>(
        &'a self,
        bench: &str,
        variant: &str,
    ) -> Result<Box<dyn TrialRunner + 'a>> {
        self.run_ok(&["apply-variant", bench, variant])?;
        Ok(Box::new(ProcessTrialRunner {
            tool: self,
            variant: variant.to_string(),
        }))
    }
}

struct ProcessTrialRunner<'a> {
    tool: &'a ProcessBenchtool,
    variant: String,
}

impl TrialRunner for ProcessTrialRunner<'_> {
    fn run_trial(&self, cfg: &TrialConfig) -> Result<()> {
        let out_path = self.tool.results_dir.join(&cfg.file);
        let mut cmd = self.tool.base_command();
        cmd.arg("run-trial");
        cmd.args(["--bench", cfg.bench.as_str()]);
        cmd.args(["--variant", self.variant.as_str()]);
        cmd.args(["--method", cfg.method.as_str()]);
        cmd.args(["--property", cfg.property.as_str()]);
        cmd.args(["--label", cfg.label.as_str()]);
        cmd.arg("--trials").arg(cfg.trials.to_string());
        cmd.arg("--timeout").arg(cfg.timeout_seconds.to_string());
        cmd.arg("--out").arg(&out_path);
        // The fuel budget travels on the child environment only; nothing
        // process-global is mutated.
        if let Some(fuel) = cfg.fuel {
            cmd.env(&self.tool.fuel_env_var, fuel.to_string());
        }
        let status = cmd
            .status()
            .with_context(|| format!("failed to spawn trial {}", cfg.file))?;
        if !status.success() {
            return Err(anyhow!("trial {} exited with {}", cfg.file, status));
        }
        if !out_path.exists() {
            warn!(
                file = %cfg.file,
                "trial exited cleanly but wrote no result; it will be retried next run"
            );
        }
        Ok(())
    }
}

fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(
        ".{}.tmp.{}.{}",
        name,
        std::process::id(),
        Utc::now().timestamp_micros()
    ));
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn atomic_write_json(path: &Path, value: &Value) -> Result<()> {
    atomic_write_bytes(path, &serde_json::to_vec_pretty(value)?)
}

fn harness_digest(command: &[String], spec_dir: &Path) -> String {
    if let Some(first) = command.first() {
        let path = Path::new(first);
        let host = if path.is_relative() {
            spec_dir.join(path)
        } else {
            path.to_path_buf()
        };
        if host.is_file() {
            if let Ok(digest) = sha256_file(&host) {
                return digest;
            }
        }
    }
    sha256_bytes(command.join(" ").as_bytes())
}

struct RunGuard {
    path: PathBuf,
    run_id: String,
    exp_id: String,
    harness_digest: String,
    done: bool,
}

impl RunGuard {
    fn begin(results_dir: &Path, exp_id: &str, harness_digest: &str) -> Result<Self> {
        let run_id = format!("run_{}", Utc::now().format("%Y%m%d_%H%M%S"));
        let guard = Self {
            path: results_dir.join(".runs").join(format!("{}.json", run_id)),
            run_id,
            exp_id: exp_id.to_string(),
            harness_digest: harness_digest.to_string(),
            done: false,
        };
        guard.write("running", 0, 0)?;
        Ok(guard)
    }

    fn write(&self, status: &str, dispatched: usize, skipped: usize) -> Result<()> {
        atomic_write_json(
            &self.path,
            &json!({
                "schema_version": "sweep_run_v1",
                "run_id": self.run_id,
                "experiment": self.exp_id,
                "status": status,
                "harness_digest": self.harness_digest,
                "dispatched": dispatched,
                "skipped": skipped,
                "updated_at": Utc::now().to_rfc3339(),
            }),
        )
    }

    fn complete(&mut self, dispatched: usize, skipped: usize) -> Result<()> {
        self.write("completed", dispatched, skipped)?;
        self.done = true;
        Ok(())
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.write("aborted", 0, 0);
        }
    }
}

struct SuitePlan {
    variants: Vec<Variant>,
    properties: Vec<String>,
    methods: Vec<String>,
    cfg: Option<BenchConfig>,
    candidates: BTreeSet<TaskKey>,
}

fn plan_suite(
    spec: &SweepSpec,
    spec_dir: &Path,
    tool: &dyn Benchtool,
    suite: &SuiteSpec,
) -> Result<SuitePlan> {
    let variants = tool.all_variants(&suite.bench)?;
    let properties = tool.all_properties(&suite.bench)?;
    let methods: Vec<String> = tool
        .all_methods(&suite.bench)?
        .into_iter()
        .map(|m| m.name)
        .filter(|name| spec.methods.contains(name))
        .collect();
    let cfg = match &suite.config {
        Some(rel) => Some(BenchConfig::load(&spec_dir.join(rel))?),
        None => None,
    };
    let candidates = candidate_tasks(
        &SweepDims {
            bench: &suite.bench,
            variants: &variants,
            properties: &properties,
            methods: &methods,
            fuel_sizes: &spec.fuel.sizes,
        },
        cfg.as_ref(),
    );
    Ok(SuitePlan {
        variants,
        properties,
        methods,
        cfg,
        candidates,
    })
}

fn finished_for(spec: &SweepSpec, results_dir: &Path) -> Result<BTreeSet<String>> {
    match spec.replace {
        ReplaceLevel::Replace => Ok(BTreeSet::new()),
        ReplaceLevel::Skip => Ok(list_finished(results_dir)?),
    }
}

#[derive(Debug)]
pub struct SweepReport {
    pub run_id: String,
    pub dispatched: usize,
    pub skipped: usize,
}

/// The combinatorial sweep: per suite, enumerate candidates, subtract
/// finished result files, apply each remaining variant once, and run the
/// property x method x fuel grid against it. Strictly sequential.
pub fn run_sweep(spec: &SweepSpec, spec_dir: &Path, tool: &dyn Benchtool) -> Result<SweepReport> {
    let results_dir = spec_dir.join(&spec.results_dir);
    ensure_dir(&results_dir)?;
    let digest = harness_digest(&spec.harness.command, spec_dir);
    let mut guard = RunGuard::begin(&results_dir, &spec.experiment.id, &digest)?;

    let mut dispatched = 0usize;
    let mut skipped = 0usize;
    for suite in &spec.suites {
        let (d, s) = run_suite(spec, spec_dir, tool, &results_dir, suite)?;
        dispatched += d;
        skipped += s;
    }

    guard.complete(dispatched, skipped)?;
    Ok(SweepReport {
        run_id: guard.run_id.clone(),
        dispatched,
        skipped,
    })
}

fn run_suite(
    spec: &SweepSpec,
    spec_dir: &Path,
    tool: &dyn Benchtool,
    results_dir: &Path,
    suite: &SuiteSpec,
) -> Result<(usize, usize)> {
    tool.preprocess(&suite.bench)?;
    let plan = plan_suite(spec, spec_dir, tool, suite)?;
    let finished = finished_for(spec, results_dir)?;
    let reconciled = reconcile(&plan.candidates, &finished);
    info!(
        bench = %suite.bench,
        candidates = plan.candidates.len(),
        remaining = reconciled.remaining.len(),
        "reconciled suite against results directory"
    );

    let skipped = plan.candidates.len() - reconciled.remaining.len();
    let mut dispatched = 0usize;

    for variant in &plan.variants {
        if variant.is_base() {
            continue;
        }
        if let Some(cfg) = plan.cfg.as_ref() {
            if !cfg.knows_variant(&variant.name) {
                continue;
            }
        }
        if !reconciled
            .remaining_variants
            .iter()
            .any(|v| v == &variant.name)
        {
            debug!(variant = %variant.name, "variant already complete");
            continue;
        }
        let runner = tool.apply_variant(&suite.bench, &variant.name)?;
        for property in &plan.properties {
            if let Some(cfg) = plan.cfg.as_ref() {
                if !cfg.allows(&variant.name, property) {
                    continue;
                }
            }
            info!(variant = %variant.name, property = %property, "running");
            for method in &plan.methods {
                for &fuel in &spec.fuel.sizes {
                    let key = TaskKey {
                        bench: suite.bench.clone(),
                        method: method.clone(),
                        variant: variant.name.clone(),
                        property: property.clone(),
                        fuel: Some(fuel),
                    };
                    if !reconciled.remaining.contains(&key) {
                        debug!(file = %key.result_file_name(), "result already present");
                        continue;
                    }
                    info!(variant = %variant.name, property = %property, fuel, "running trial");
                    let trial = TrialConfig {
                        bench: suite.bench.clone(),
                        method: method.clone(),
                        property: format!("test_{}", property),
                        label: format!("{}{}", method, fuel),
                        trials: spec.trial.trials,
                        timeout_seconds: spec.trial.timeout_seconds,
                        fuel: Some(fuel),
                        file: key.result_file_name(),
                    };
                    runner.run_trial(&trial)?;
                    dispatched += 1;
                }
            }
        }
    }

    Ok((dispatched, skipped))
}

#[derive(Debug)]
pub struct SuiteSummary {
    pub bench: String,
    pub candidates: usize,
    pub finished: usize,
    pub remaining: usize,
    pub remaining_variants: Vec<String>,
}

#[derive(Debug)]
pub struct SweepSummary {
    pub exp_id: String,
    pub results_dir: PathBuf,
    pub harness_command: Vec<String>,
    pub methods: Vec<String>,
    pub fuel_sizes: Vec<u32>,
    pub suites: Vec<SuiteSummary>,
    pub total_candidates: usize,
    pub total_remaining: usize,
}

pub fn describe_sweep(
    spec: &SweepSpec,
    spec_dir: &Path,
    tool: &dyn Benchtool,
) -> Result<SweepSummary> {
    let results_dir = spec_dir.join(&spec.results_dir);
    let finished = if results_dir.exists() {
        finished_for(spec, &results_dir)?
    } else {
        BTreeSet::new()
    };

    let mut suites = Vec::new();
    let mut total_candidates = 0usize;
    let mut total_remaining = 0usize;
    for suite in &spec.suites {
        let plan = plan_suite(spec, spec_dir, tool, suite)?;
        let reconciled = reconcile(&plan.candidates, &finished);
        total_candidates += plan.candidates.len();
        total_remaining += reconciled.remaining.len();
        suites.push(SuiteSummary {
            bench: suite.bench.clone(),
            candidates: plan.candidates.len(),
            finished: plan.candidates.len() - reconciled.remaining.len(),
            remaining: reconciled.remaining.len(),
            remaining_variants: reconciled.remaining_variants,
        });
    }

    Ok(SweepSummary {
        exp_id: spec.experiment.id.clone(),
        results_dir,
        harness_command: spec.harness.command.clone(),
        methods: spec.methods.clone(),
        fuel_sizes: spec.fuel.sizes.clone(),
        suites,
        total_candidates,
        total_remaining,
    })
}

pub fn remaining_tasks(
    spec: &SweepSpec,
    spec_dir: &Path,
    tool: &dyn Benchtool,
) -> Result<Vec<TaskKey>> {
    let results_dir = spec_dir.join(&spec.results_dir);
    let finished = if results_dir.exists() {
        finished_for(spec, &results_dir)?
    } else {
        BTreeSet::new()
    };
    let mut out = Vec::new();
    for suite in &spec.suites {
        let plan = plan_suite(spec, spec_dir, tool, suite)?;
        out.extend(reconcile(&plan.candidates, &finished).remaining);
    }
    Ok(out)
}

/// The three decision points the correctness-sampling experiment exposes;
/// enumeration and dispatch stay with `Experiment`.
pub trait ExperimentPolicy {
    fn skip(&self, bench: &str, variant: &str, method: &str, property: &str) -> bool;
    fn trials(&self, bench: &str, method: &str) -> u32;
    fn timeout_seconds(&self) -> u64;
}

pub struct CorrectnessSampling {
    configs: BTreeMap<String, BenchConfig>,
}

impl CorrectnessSampling {
    pub fn new(configs: BTreeMap<String, BenchConfig>) -> Self {
        Self { configs }
    }

    pub fn from_spec(spec: &SweepSpec, spec_dir: &Path) -> Result<Self> {
        let mut configs = BTreeMap::new();
        for suite in &spec.suites {
            if let Some(rel) = &suite.config {
                configs.insert(suite.bench.clone(), BenchConfig::load(&spec_dir.join(rel))?);
            }
        }
        Ok(Self::new(configs))
    }
}

impl ExperimentPolicy for CorrectnessSampling {
    fn skip(&self, bench: &str, variant: &str, method: &str, property: &str) -> bool {
        if method == "Size" {
            return true;
        }
        // The unmutated control is always sampled.
        if variant == BASE_VARIANT {
            return false;
        }
        if method != "Correct" {
            return true;
        }
        match self.configs.get(bench) {
            Some(cfg) => !cfg.allows(variant, property),
            None => false,
        }
    }

    fn trials(&self, _bench: &str, _method: &str) -> u32 {
        1
    }

    fn timeout_seconds(&self) -> u64 {
        5
    }
}

#[derive(Debug)]
pub struct ExperimentReport {
    pub dispatched: usize,
    pub skipped: usize,
}

pub struct Experiment<'a> {
    tool: &'a dyn Benchtool,
    policy: &'a dyn ExperimentPolicy,
    results_dir: PathBuf,
    replace: ReplaceLevel,
}

impl<'a> Experiment<'a> {
    pub fn new(
        tool: &'a dyn Benchtool,
        policy: &'a dyn ExperimentPolicy,
        results_dir: PathBuf,
        replace: ReplaceLevel,
    ) -> Self {
        Self {
            tool,
            policy,
            results_dir,
            replace,
        }
    }

    pub fn run(&self) -> Result<ExperimentReport> {
        ensure_dir(&self.results_dir)?;
        let mut dispatched = 0usize;
        let mut skipped = 0usize;
        for bench in self.tool.all_benches()? {
            self.tool.preprocess(&bench.name)?;
            let variants = self.tool.all_variants(&bench.name)?;
            let properties = self.tool.all_properties(&bench.name)?;
            let methods = self.tool.all_methods(&bench.name)?;
            let finished = match self.replace {
                ReplaceLevel::Replace => BTreeSet::new(),
                ReplaceLevel::Skip => list_finished(&self.results_dir)?,
            };
            for variant in &variants {
                let mut pending: Vec<(&Method, &String, TaskKey)> = Vec::new();
                for method in &methods {
                    for property in &properties {
                        if self
                            .policy
                            .skip(&bench.name, &variant.name, &method.name, property)
                        {
                            continue;
                        }
                        let key = TaskKey {
                            bench: bench.name.clone(),
                            method: method.name.clone(),
                            variant: variant.name.clone(),
                            property: property.clone(),
                            fuel: None,
                        };
                        if finished.contains(&key.result_file_name()) {
                            skipped += 1;
                            continue;
                        }
                        pending.push((method, property, key));
                    }
                }
                if pending.is_empty() {
                    continue;
                }
                let runner = self.tool.apply_variant(&bench.name, &variant.name)?;
                for (method, property, key) in pending {
                    info!(
                        bench = %bench.name,
                        variant = %variant.name,
                        method = %method.name,
                        property = %property,
                        "running trial"
                    );
                    let trial = TrialConfig {
                        bench: bench.name.clone(),
                        method: method.name.clone(),
                        property: format!("test_{}", property),
                        label: method.name.clone(),
                        trials: self.policy.trials(&bench.name, &method.name),
                        timeout_seconds: self.policy.timeout_seconds(),
                        fuel: None,
                        file: key.result_file_name(),
                    };
                    runner.run_trial(&trial)?;
                    dispatched += 1;
                }
            }
        }
        Ok(ExperimentReport {
            dispatched,
            skipped,
        })
    }
}
