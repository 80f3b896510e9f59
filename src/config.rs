// GEMMSCALE STUDY CONFIGURATION
// PROCESS-WIDE SETTINGS. DEFAULTS REPRODUCE THE REFERENCE STUDY WITH NO FLAGS.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, StudyError};
use crate::plan::{ScalingMode, SweepPlanner, DEFAULT_STRONG_SIZE, DEFAULT_UNIT_WORK};
use crate::runner::KernelRunner;
use crate::topology::{CoreProbe, DEFAULT_HELPER};

pub const DEFAULT_KERNEL: &str = "build/src/top.matrix_product";
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

#[derive(Clone, Copy, PartialEq, Eq, Debug, clap::ValueEnum)]
pub enum ModeSelection {
    Strong,
    Weak,
    Both,
}

impl ModeSelection {
    // STRONG ALWAYS RUNS FIRST
    pub fn modes(self) -> Vec<ScalingMode> {
        match self {
            Self::Strong => vec![ScalingMode::Strong],
            Self::Weak => vec![ScalingMode::Weak],
            Self::Both => ScalingMode::ALL.to_vec(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StudyConfig {
    pub modes: ModeSelection,
    pub kernel: PathBuf,
    pub launcher: Option<String>,
    pub launcher_args: Vec<String>,
    pub cpus_helper: PathBuf,
    pub cores: Option<u32>,
    pub strong_size: f64,
    pub unit_work: f64,
    pub timeout: Option<Duration>,
    pub out_dir: PathBuf,
    pub strict_cores: bool,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            modes: ModeSelection::Both,
            kernel: PathBuf::from(DEFAULT_KERNEL),
            launcher: None,
            launcher_args: Vec::new(),
            cpus_helper: PathBuf::from(DEFAULT_HELPER),
            cores: None,
            strong_size: DEFAULT_STRONG_SIZE,
            unit_work: DEFAULT_UNIT_WORK,
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            out_dir: PathBuf::from("."),
            strict_cores: false,
        }
    }
}

impl StudyConfig {
    // 0 DISABLES THE PER-RUN TIMEOUT
    pub fn timeout_from_secs(secs: u64) -> Option<Duration> {
        (secs > 0).then(|| Duration::from_secs(secs))
    }

    pub fn planner(&self) -> Result<SweepPlanner> {
        SweepPlanner::new(self.strong_size, self.unit_work)
    }

    // CHEAP CHECKS THAT NEED NO KERNEL OR HELPER. RUN BEFORE ANY SUBCOMMAND.
    pub fn validate(&self) -> Result<()> {
        self.planner().map(|_| ())
    }

    pub fn core_probe(&self) -> CoreProbe {
        CoreProbe::new(self.cpus_helper.as_os_str())
    }

    pub fn runner(&self) -> KernelRunner {
        let runner = KernelRunner::new(&self.kernel).with_timeout(self.timeout);
        match &self.launcher {
            Some(program) => runner.with_launcher(program, self.launcher_args.clone()),
            None => runner,
        }
    }
}
