// GEMMSCALE SCALING STUDY
// SWEEP -> MEASURE -> DERIVE -> PLOT, SHARED BY BOTH MODES
//
// STRICTLY SEQUENTIAL: ONE BLOCKING KERNEL RUN PER PLAN ENTRY, INCREASING CORE COUNT.
// ANY FAILURE ABORTS THE SWEEP BEFORE A CHART IS WRITTEN.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::chart::{ChartRenderer, ChartSpec};
use crate::config::StudyConfig;
use crate::error::{Result, StudyError};
use crate::metrics::{derive, DerivedSeries, Sample, ScalingSeries};
use crate::plan::{ScalingMode, SweepPlanner};
use crate::runner::Measure;

#[derive(Clone, Debug)]
pub struct StudyOutcome {
    pub mode: ScalingMode,
    pub series: ScalingSeries,
    pub derived: DerivedSeries,
    pub chart: PathBuf,
}

pub struct ScalingStudy<'a> {
    max_cores: u32,
    planner: SweepPlanner,
    out_dir: PathBuf,
    strict_cores: bool,
    runner: &'a dyn Measure,
    renderer: &'a dyn ChartRenderer,
    shutdown: Option<&'static AtomicBool>,
}

impl<'a> ScalingStudy<'a> {
    pub fn new(max_cores: u32, runner: &'a dyn Measure, renderer: &'a dyn ChartRenderer) -> Self {
        Self {
            max_cores,
            planner: SweepPlanner::default(),
            out_dir: PathBuf::from("."),
            strict_cores: false,
            runner,
            renderer,
            shutdown: None,
        }
    }

    pub fn from_config(
        config: &StudyConfig,
        max_cores: u32,
        runner: &'a dyn Measure,
        renderer: &'a dyn ChartRenderer,
    ) -> Result<Self> {
        Ok(Self::new(max_cores, runner, renderer)
            .with_planner(config.planner()?)
            .with_out_dir(config.out_dir.clone())
            .strict_cores(config.strict_cores))
    }

    pub fn with_planner(mut self, planner: SweepPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = out_dir.into();
        self
    }

    pub fn strict_cores(mut self, strict: bool) -> Self {
        self.strict_cores = strict;
        self
    }

    pub fn with_shutdown(mut self, flag: &'static AtomicBool) -> Self {
        self.shutdown = Some(flag);
        self
    }

    pub fn run_strong_scaling(&self) -> Result<StudyOutcome> {
        self.run(ScalingMode::Strong)
    }

    pub fn run_weak_scaling(&self) -> Result<StudyOutcome> {
        self.run(ScalingMode::Weak)
    }

    pub fn run(&self, mode: ScalingMode) -> Result<StudyOutcome> {
        let plan = self.planner.plan(mode, self.max_cores);
        info!("{} SCALING: {} POINTS (1..={} CORES)", mode.label(), plan.len(), self.max_cores);

        let mut series = ScalingSeries::new();
        for entry in &plan {
            if self.shutdown.is_some_and(|s| s.load(Ordering::Relaxed)) {
                return Err(StudyError::Interrupted);
            }

            let result = self.runner.run(&entry.shape, entry.concurrency)?;
            self.check_cores(entry.concurrency, result.cores)?;
            info!(
                "  {:>3} CORES (REPORTED {:>3}): ELAPSED {}",
                entry.concurrency, result.cores, result.elapsed
            );

            series.push(Sample {
                requested: entry.concurrency,
                reported: result.cores,
                elapsed: result.elapsed,
            });
        }

        let derived = derive(&series)?;
        let spec = ChartSpec::for_mode(mode, &derived, &self.out_dir);
        self.renderer.render(&spec)?;
        info!("{} SCALING CHART SAVED TO {}", mode.label(), spec.path.display());

        Ok(StudyOutcome {
            mode,
            series,
            derived,
            chart: spec.path,
        })
    }

    // THE X AXIS USES THE REPORTED COUNT. DIVERGENCE IS LOGGED, OR FATAL WHEN STRICT.
    fn check_cores(&self, requested: u32, reported: u32) -> Result<()> {
        if requested == reported {
            return Ok(());
        }
        if self.strict_cores {
            return Err(StudyError::CoreMismatch { requested, reported });
        }
        warn!("KERNEL REPORTED {} CORES, {} REQUESTED", reported, requested);
        Ok(())
    }
}
