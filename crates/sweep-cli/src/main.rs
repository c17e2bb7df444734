use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use sweep_runner::{
    describe_sweep, load_spec, remaining_tasks, run_sweep, CorrectnessSampling, Experiment,
    ProcessBenchtool, SweepSummary,
};

#[derive(Parser)]
#[command(name = "sweep", version = "0.1.0", about = "Mutation fuzzing sweep driver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Run {
        spec: PathBuf,
        #[arg(long)]
        json: bool,
    },
    Sample {
        spec: PathBuf,
        #[arg(long)]
        json: bool,
    },
    Describe {
        spec: PathBuf,
        #[arg(long)]
        json: bool,
    },
    Status {
        spec: PathBuf,
        #[arg(long)]
        json: bool,
    },
    Init {
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();
    let json_mode = command_json_mode(&cli.command);
    match run_command(cli.command) {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", err.to_string()));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Run { spec, json } => {
            let (spec, spec_dir) = load_spec(&spec)?;
            let tool = ProcessBenchtool::from_spec(&spec, &spec_dir)?;
            let summary = describe_sweep(&spec, &spec_dir, &tool)?;
            let report = run_sweep(&spec, &spec_dir, &tool)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "run",
                    "summary": summary_to_json(&summary),
                    "run_id": report.run_id,
                    "dispatched": report.dispatched,
                    "skipped": report.skipped,
                })));
            }
            print_summary(&summary);
            println!("run_id: {}", report.run_id);
            println!("dispatched: {}", report.dispatched);
            println!("skipped: {}", report.skipped);
        }
        Commands::Sample { spec, json } => {
            let (spec, spec_dir) = load_spec(&spec)?;
            let tool = ProcessBenchtool::from_spec(&spec, &spec_dir)?;
            let policy = CorrectnessSampling::from_spec(&spec, &spec_dir)?;
            let experiment = Experiment::new(
                &tool,
                &policy,
                spec_dir.join(&spec.results_dir),
                spec.replace,
            );
            let report = experiment.run()?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "sample",
                    "dispatched": report.dispatched,
                    "skipped": report.skipped,
                })));
            }
            println!("dispatched: {}", report.dispatched);
            println!("skipped: {}", report.skipped);
        }
        Commands::Describe { spec, json } => {
            let (spec, spec_dir) = load_spec(&spec)?;
            let tool = ProcessBenchtool::from_spec(&spec, &spec_dir)?;
            let summary = describe_sweep(&spec, &spec_dir, &tool)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "describe",
                    "summary": summary_to_json(&summary),
                })));
            }
            print_summary(&summary);
        }
        Commands::Status { spec, json } => {
            let (spec, spec_dir) = load_spec(&spec)?;
            let tool = ProcessBenchtool::from_spec(&spec, &spec_dir)?;
            let remaining = remaining_tasks(&spec, &spec_dir, &tool)?;
            let names: Vec<String> = remaining.iter().map(|t| t.result_file_name()).collect();
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "status",
                    "remaining": names,
                    "count": names.len(),
                })));
            }
            for name in &names {
                println!("{}", name);
            }
            println!("remaining: {}", names.len());
        }
        Commands::Init { force } => {
            let path = std::env::current_dir()?.join("sweep.yaml");
            if !force && path.exists() {
                return Err(anyhow::anyhow!(format!(
                    "init file already exists (use --force): {}",
                    path.display()
                )));
            }
            let template = "\
experiment:
  id: ''                        # REQUIRED
results_dir: ''                 # REQUIRED: where result files accumulate
harness:
  command: []                   # REQUIRED: e.g. [benchtool]
methods: [TypeBasedFuzzer]
fuel:
  sizes: [7, 100, 1000, 10000]
  env_var: PICKNEXTFUEL
trial:
  trials: 10
  timeout_seconds: 60
replace: skip                   # skip | replace
suites: []                      # REQUIRED: e.g. [{bench: RedBlack, config: RedBlack_exp_cfg.json}]
";
            std::fs::write(&path, template)?;
            println!("wrote: {}", path.display());
            println!("next: edit sweep.yaml \u{2014} fill in all fields marked REQUIRED");
            println!("next: sweep describe sweep.yaml");
        }
    }
    Ok(None)
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\"}}}}"
        ),
    }
}

fn json_error(code: &str, message: String) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Run { json, .. }
        | Commands::Sample { json, .. }
        | Commands::Describe { json, .. }
        | Commands::Status { json, .. } => *json,
        Commands::Init { .. } => false,
    }
}

fn summary_to_json(summary: &SweepSummary) -> Value {
    json!({
        "experiment": summary.exp_id,
        "results_dir": summary.results_dir.display().to_string(),
        "harness": summary.harness_command,
        "methods": summary.methods,
        "fuel_sizes": summary.fuel_sizes,
        "suites": summary.suites.iter().map(|s| json!({
            "bench": s.bench,
            "candidates": s.candidates,
            "finished": s.finished,
            "remaining": s.remaining,
            "remaining_variants": s.remaining_variants,
        })).collect::<Vec<_>>(),
        "total_candidates": summary.total_candidates,
        "total_remaining": summary.total_remaining,
    })
}

fn print_summary(summary: &SweepSummary) {
    println!("experiment: {}", summary.exp_id);
    println!("results_dir: {}", summary.results_dir.display());
    println!("harness: {:?}", summary.harness_command);
    println!("methods: {}", summary.methods.join(","));
    println!(
        "fuel_sizes: {}",
        summary
            .fuel_sizes
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(",")
    );
    for suite in &summary.suites {
        println!(
            "suite: {} candidates={} finished={} remaining={}",
            suite.bench, suite.candidates, suite.finished, suite.remaining
        );
        if !suite.remaining_variants.is_empty() {
            println!(
                "  remaining_variants: {}",
                suite.remaining_variants.join(",")
            );
        }
    }
    println!("total_candidates: {}", summary.total_candidates);
    println!("total_remaining: {}", summary.total_remaining);
}
