use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use turnbench_core::{
	catalog, export, generate_html_report, Bench, EvaluationResult, Evaluator, FileScenarioSource, RunConfig,
	Scenario, ScenarioSource,
};
use turnbench_store::Store;

#[derive(Debug, Parser)]
#[command(name = "turnbench", about = "Run multi-turn consistency scenarios against language models")]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
	/// List the built-in scenarios
	List,
	/// Run the scenarios of a run config against its adapter
	Run(RunArgs),
	/// Evaluate a saved transcript against a scenario
	Score(ScoreArgs),
}

#[derive(Debug, Clone, Parser)]
struct RunArgs {
	/// YAML run config: { adapter, scenarios, concurrency?, output? }
	#[arg(long)]
	config: PathBuf,

	/// Scenarios in flight (overrides the config)
	#[arg(long)]
	concurrency: Option<usize>,

	/// Directory for per-scenario JSON results and the batch summary
	#[arg(long)]
	json_out: Option<PathBuf>,

	/// Write an HTML report to this file
	#[arg(long)]
	html_out: Option<PathBuf>,

	/// Persist results to this SQLite database
	#[arg(long)]
	db: Option<PathBuf>,
}

#[derive(Debug, Clone, Parser)]
struct ScoreArgs {
	/// Built-in scenario name, or a YAML/JSON scenario file
	#[arg(long)]
	scenario: String,

	/// Transcript JSON as written by a run
	#[arg(long)]
	transcript: PathBuf,

	/// Write the evaluation result as JSON to this file
	#[arg(long)]
	json_out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
		)
		.with_writer(std::io::stderr)
		.init();

	let cli = Cli::parse();
	match cli.command {
		Commands::List => list(),
		Commands::Run(args) => run(args).await?,
		Commands::Score(args) => score(args).await?,
	}
	Ok(())
}

fn list() {
	for scenario in catalog::all_builtin() {
		println!("{:<26} {}", scenario.name(), scenario.description());
	}
}

async fn run(args: RunArgs) -> Result<()> {
	let mut config = RunConfig::load(&args.config).await?;
	if let Some(n) = args.concurrency {
		config.concurrency = n;
	}
	if args.json_out.is_some() {
		config.output.json_dir = args.json_out;
	}
	if args.html_out.is_some() {
		config.output.html = args.html_out;
	}
	if args.db.is_some() {
		config.output.database = args.db;
	}

	let adapter = config.build_adapter()?;
	let model_name = adapter.model_name().to_string();
	let scenarios = config.load_scenarios().await?;

	let bench = Bench::builder()
		.adapter(adapter)
		.scenarios(scenarios)
		.evaluator(Arc::new(Evaluator::new()))
		.concurrency(config.concurrency)
		.build()?;
	let report = bench.run().await;
	println!("{}", report.summary_table());

	let results: Vec<EvaluationResult> = report.results().cloned().collect();

	if let Some(dir) = &config.output.json_dir {
		let summary = export::save_batch_results(&results, dir, "turnbench").await?;
		export::save_batch_transcripts(report.runs.iter().map(|run| &run.transcript), dir, "turnbench_transcript")
			.await?;
		info!(path = %summary.display(), "wrote JSON results");
	}

	if let Some(path) = &config.output.html {
		tokio::fs::write(path, generate_html_report(&results))
			.await
			.with_context(|| format!("Failed to write {:?}", path))?;
		info!(path = %path.display(), "wrote HTML report");
	}

	if let Some(path) = &config.output.database {
		let store = Store::open(path)?;
		let run_id = store.create_run(Some(json!({
			"model_name": model_name,
			"config": args.config.display().to_string(),
			"failures": report.failures.len(),
		})))?;
		for result in &results {
			store.save_evaluation(run_id, result)?;
		}
		info!(run_id, path = %path.display(), "stored results");
	}

	if !report.all_passed() {
		anyhow::bail!(
			"{} of {} scenarios did not pass",
			report.failures.len() + results.iter().filter(|r| !r.overall_passed()).count(),
			report.runs.len() + report.failures.len()
		);
	}
	Ok(())
}

async fn resolve_scenario(spec: &str, transcript_scenario: Option<&str>) -> Result<Scenario> {
	if let Some(scenario) = catalog::builtin(spec) {
		return Ok(scenario);
	}
	if !Path::new(spec).exists() {
		anyhow::bail!("{spec:?} is neither a built-in scenario nor a file");
	}

	let mut scenarios = FileScenarioSource::new(spec).load().await?;
	if scenarios.len() == 1 {
		return Ok(scenarios.remove(0));
	}
	let wanted = transcript_scenario
		.ok_or_else(|| anyhow::anyhow!("{spec} defines several scenarios and the transcript names none"))?;
	scenarios
		.into_iter()
		.find(|s| s.name() == wanted)
		.ok_or_else(|| anyhow::anyhow!("scenario {wanted:?} not found in {spec}"))
}

async fn score(args: ScoreArgs) -> Result<()> {
	let transcript = export::load_transcript(&args.transcript).await?;
	let named = transcript.metadata.get("scenario_name").and_then(|v| v.as_str());
	let scenario = resolve_scenario(&args.scenario, named).await?;

	let result = Evaluator::new()
		.evaluate(&transcript, &scenario)
		.with_context(|| format!("Failed to evaluate {:?}", args.transcript))?;
	println!("{}", result.summary_table());

	if let Some(path) = &args.json_out {
		export::save_evaluation_result(&result, path).await?;
	}

	if !result.overall_passed() {
		anyhow::bail!("scenario {} did not pass", result.scenario_name());
	}
	Ok(())
}
