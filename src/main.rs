// GEMMSCALE v0.1.0 -- GEMM SCALING STUDY HARNESS
// STRONG AND WEAK SCALING SWEEPS OF AN EXTERNAL PARALLEL GEMM KERNEL
//
// THE KERNEL DOES THE WORK. THIS BINARY PLANS THE SWEEP, LAUNCHES ONE PINNED
// RUN PER CORE COUNT, DERIVES SPEEDUP / EFFICIENCY AND WRITES ONE CHART PER MODE.

mod cli;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gemmscale::chart::PlottersRenderer;
use gemmscale::config::{ModeSelection, StudyConfig, DEFAULT_KERNEL, DEFAULT_TIMEOUT_SECS};
use gemmscale::plan::{DEFAULT_STRONG_SIZE, DEFAULT_UNIT_WORK};
use gemmscale::report::print_report;
use gemmscale::study::ScalingStudy;
use gemmscale::topology::{resolve_max_cores, DEFAULT_HELPER};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "gemmscale")]
#[command(about = "GEMMSCALE -- STRONG/WEAK SCALING STUDY FOR A PARALLEL GEMM KERNEL")]
struct Cli {
    #[command(flatten)]
    opts: StudyOpts,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    // VERIFY KERNEL, CORE HELPER AND OUTPUT DIRECTORY WITHOUT RUNNING A SWEEP
    Check,
    // PRINT THE SWEEP PLAN (ONE COMMAND LINE PER POINT) WITHOUT RUNNING IT
    Plan,
}

#[derive(Args)]
struct StudyOpts {
    // WHICH STUDY TO RUN. BOTH = STRONG THEN WEAK
    #[arg(long, global = true, value_enum, default_value_t = ModeSelection::Both)]
    mode: ModeSelection,

    // GEMM KERNEL EXECUTABLE
    #[arg(long, global = true, default_value = DEFAULT_KERNEL)]
    kernel: PathBuf,

    // OPTIONAL WRAPPER PROGRAM, E.G. numactl (KERNEL + DIMS ARE APPENDED)
    #[arg(long, global = true)]
    launcher: Option<String>,

    // ARGUMENT FOR THE LAUNCHER (REPEATABLE)
    #[arg(long = "launcher-arg", global = true, allow_hyphen_values = true)]
    launcher_arg: Vec<String>,

    // CORE-COUNT HELPER: PRINTS ONE POSITIVE INTEGER
    #[arg(long, global = true, default_value = DEFAULT_HELPER)]
    cpus_helper: PathBuf,

    // MAXIMUM CORE COUNT (SKIPS THE HELPER)
    #[arg(long, global = true)]
    cores: Option<u32>,

    // STRONG SCALING: FIXED CUBE SIDE (WHOLE NUMBER, NEVER ROUNDED)
    #[arg(long, global = true, default_value_t = DEFAULT_STRONG_SIZE)]
    size: f64,

    // WEAK SCALING: FLOP-LIKE WORK PER CORE (SIDE = CBRT(UNIT_WORK * CORES))
    #[arg(long, global = true, default_value_t = DEFAULT_UNIT_WORK)]
    unit_work: f64,

    // PER-RUN WALL-CLOCK LIMIT IN SECONDS (0 = NONE)
    #[arg(long, global = true, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    // DIRECTORY FOR strong_scaling.png / weak_scaling.png
    #[arg(long, global = true, default_value = ".")]
    out_dir: PathBuf,

    // FAIL WHEN THE KERNEL REPORTS A DIFFERENT CORE COUNT THAN REQUESTED
    #[arg(long, global = true)]
    strict_cores: bool,

    // DEBUG-LEVEL LOGGING (RUST_LOG OVERRIDES)
    #[arg(long, global = true)]
    verbose: bool,
}

impl StudyOpts {
    fn to_config(&self) -> StudyConfig {
        StudyConfig {
            modes: self.mode,
            kernel: self.kernel.clone(),
            launcher: self.launcher.clone(),
            launcher_args: self.launcher_arg.clone(),
            cpus_helper: self.cpus_helper.clone(),
            cores: self.cores,
            strong_size: self.size,
            unit_work: self.unit_work,
            timeout: StudyConfig::timeout_from_secs(self.timeout_secs),
            out_dir: self.out_dir.clone(),
            strict_cores: self.strict_cores,
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.opts.verbose);

    ctrlc::set_handler(move || {
        SHUTDOWN.store(true, Ordering::Relaxed);
    })?;

    let config = cli.opts.to_config();
    config.validate().context("invalid study configuration")?;
    match cli.command {
        Some(Command::Check) => cli::check::run_check(&config),
        Some(Command::Plan) => cli::plan::run_plan(&config),
        None => run_study(&config),
    }
}

fn run_study(config: &StudyConfig) -> Result<()> {
    let max_cores = resolve_max_cores(config.cores, &config.core_probe())
        .context("could not determine the core count")?;

    std::fs::create_dir_all(&config.out_dir)
        .with_context(|| format!("cannot create output directory {}", config.out_dir.display()))?;

    println!("GEMMSCALE v0.1.0");
    println!("KERNEL:          {}", config.kernel.display());
    if let Some(launcher) = &config.launcher {
        println!("LAUNCHER:        {} {}", launcher, config.launcher_args.join(" "));
    }
    println!("MAX CORES:       {}", max_cores);
    println!("STRONG SIZE:     {}", config.strong_size);
    println!("UNIT WORK:       {}", config.unit_work);
    println!(
        "TIMEOUT:         {}",
        config
            .timeout
            .map_or_else(|| "none".to_string(), |t| format!("{}s", t.as_secs()))
    );
    println!("OUTPUT:          {}", config.out_dir.display());
    println!();

    let runner = config.runner().with_shutdown(&SHUTDOWN);
    let renderer = PlottersRenderer::default();
    let study = ScalingStudy::from_config(config, max_cores, &runner, &renderer)?
        .with_shutdown(&SHUTDOWN);

    for mode in config.modes.modes() {
        let outcome = study
            .run(mode)
            .with_context(|| format!("{} scaling study aborted", mode.label().to_lowercase()))?;
        print_report(&outcome);
        println!();
    }

    println!("GEMMSCALE OUT.");
    Ok(())
}
