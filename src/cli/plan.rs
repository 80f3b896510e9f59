// SWEEP PLAN PRINTER -- SHOWS EXACTLY WHAT A STUDY WOULD LAUNCH, WITHOUT LAUNCHING IT

use anyhow::{Context, Result};

use gemmscale::config::StudyConfig;
use gemmscale::topology::resolve_max_cores;

pub fn run_plan(config: &StudyConfig) -> Result<()> {
    let max_cores = resolve_max_cores(config.cores, &config.core_probe())
        .context("could not determine the core count")?;
    let planner = config.planner()?;
    let runner = config.runner();

    println!("MAX CORES:       {}", max_cores);
    for mode in config.modes.modes() {
        let plan = planner.plan(mode, max_cores);
        println!();
        println!("{} SCALING ({} POINTS)", mode.label(), plan.len());
        println!("{:>5} {:>14}  {}", "CORES", "WORK/1E9", "COMMAND");
        for entry in &plan {
            println!(
                "{:>5} {:>14.3}  {}",
                entry.concurrency,
                entry.shape.flops() / 1e9,
                runner.command_line(&entry.shape, entry.concurrency)
            );
        }
    }
    Ok(())
}
