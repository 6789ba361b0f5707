use clap::Parser;
use rendersim::config::{apply_cli_overrides, load_config_file, merge_config, validate_config, AppConfig};
use rendersim::hw::load_hw_config;
use rendersim::ir::json::load_graph_file;
use rendersim::mapping::{FallbackTable, MappingEngine};
use rendersim::ppa::PPAEstimator;
use rendersim::schedule::OperatorLevelScheduler;
use rendersim::util::log::init_log;
use std::path::PathBuf;
use std::process::ExitCode;

/// RenderSim - design-space exploration for neural rendering accelerators
#[derive(Parser, Debug)]
#[command(name = "rendersim")]
#[command(version = "0.1.0")]
#[command(about = "Map, schedule and estimate PPA for a neural rendering operator graph", long_about = None)]
struct Args {
  /// Run configuration file (TOML)
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Operator graph IR (JSON)
  #[arg(short, long, value_name = "FILE")]
  graph: Option<String>,

  /// Hardware unit catalogue (JSON)
  #[arg(long, value_name = "FILE")]
  hw_config: Option<String>,

  /// Reference hardware tree (Ramulator build, HLS projects)
  #[arg(long, value_name = "DIR")]
  hardware_dir: Option<String>,

  /// DRAM preset: accelerator name, high_bandwidth, low_latency or power_efficient
  #[arg(long, value_name = "PRESET")]
  dram_preset: Option<String>,

  /// Quiet mode (warnings and errors only)
  #[arg(short, long)]
  quiet: bool,
}

fn run(args: &Args) -> rendersim::Result<()> {
  let mut config = AppConfig::default();
  if let Some(path) = &args.config {
    config = merge_config(config, load_config_file(path)?);
  }
  apply_cli_overrides(
    &mut config,
    args.quiet,
    args.graph.as_deref(),
    args.hw_config.as_deref(),
    args.hardware_dir.as_deref(),
    args.dram_preset.as_deref(),
  );
  validate_config(&config)?;

  let graph = load_graph_file(PathBuf::from(&config.run.graph).as_path())?;
  let hw = load_hw_config(PathBuf::from(&config.run.hw_config).as_path())?;

  let mut engine = MappingEngine::new(FallbackTable::builtin());
  let mapped = engine.map(&graph, &hw)?;

  let scheduler = OperatorLevelScheduler::default();
  let scheduled = scheduler.schedule(&mapped)?;

  let dram = config.ramulator_config(&hw.accelerator_name);
  let mut estimator = PPAEstimator::new(PathBuf::from(&config.run.hardware_dir), dram);
  estimator.set_clock_period_ns(config.run.clock_period_ns);
  let metrics = estimator.estimate(&scheduled, &hw)?;

  println!("{}", estimator.report(&metrics));
  println!(
    "Schedule: {} operators, {} cycles, {:.2}x speedup ({} optimized)",
    scheduled.stats.total_operators,
    scheduled.total_cycles(),
    scheduled.stats.total_speedup,
    scheduled.stats.optimized_operators
  );
  Ok(())
}

fn main() -> ExitCode {
  let args = Args::parse();
  init_log(args.quiet);

  match run(&args) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      eprintln!("rendersim: {}", e);
      ExitCode::FAILURE
    }
  }
}
