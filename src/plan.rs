// GEMMSCALE SWEEP PLANNER
// PURE-RUST MODULE: NO PROCESS OR FILESYSTEM ACCESS
// SHARED BETWEEN THE STUDY LOOP, THE `plan` SUBCOMMAND AND THE TESTS

use crate::error::{Result, StudyError};

// REFERENCE STUDY CONSTANTS

pub const DEFAULT_STRONG_SIZE: f64 = 1000.0;          // 1000x1000x1000 GEMM
pub const DEFAULT_UNIT_WORK: f64 = 1_000_000_000.0;   // ~1e9 MULTIPLY-ADDS PER CORE

// LARGEST SIDE THAT STILL PRINTS EXACTLY AS AN INTEGER
const MAX_STRONG_SIZE: f64 = 9_007_199_254_740_992.0; // 2^53
// unit_work * cores MUST STAY FINITE FOR EVERY u32 CORE COUNT
const MAX_UNIT_WORK: f64 = f64::MAX / u32::MAX as f64;

// SCALING MODE

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ScalingMode {
    Strong,
    Weak,
}

impl ScalingMode {
    pub const ALL: [ScalingMode; 2] = [ScalingMode::Strong, ScalingMode::Weak];

    pub fn label(self) -> &'static str {
        match self {
            Self::Strong => "STRONG",
            Self::Weak => "WEAK",
        }
    }

    // OUTPUT FILE STEM: strong_scaling.png / weak_scaling.png
    pub fn file_stem(self) -> &'static str {
        match self {
            Self::Strong => "strong_scaling",
            Self::Weak => "weak_scaling",
        }
    }

    // STRONG SHAPES ARE WHOLE NUMBERS, WEAK SHAPES ARE CUBE ROOTS
    pub fn dim_format(self) -> DimFormat {
        match self {
            Self::Strong => DimFormat::Integral,
            Self::Weak => DimFormat::Real,
        }
    }
}

// PROBLEM SHAPE

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DimFormat {
    Integral,
    Real,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ProblemShape {
    pub m: f64,
    pub n: f64,
    pub k: f64,
    pub format: DimFormat,
}

impl ProblemShape {
    pub fn cube(side: f64, format: DimFormat) -> Self {
        Self { m: side, n: side, k: side, format }
    }

    // KERNEL POSITIONAL ARGUMENTS <m> <n> <k>
    pub fn to_args(&self) -> [String; 3] {
        [self.m, self.n, self.k].map(|d| format_dim(d, self.format))
    }

    pub fn flops(&self) -> f64 {
        self.m * self.n * self.k
    }
}

// INTEGRAL: "1000". REAL: SHORTEST ROUND-TRIP REPR WITH A FRACTION ("1259.9210498948732", "2000.0").
fn format_dim(d: f64, format: DimFormat) -> String {
    match format {
        DimFormat::Integral => format!("{}", d.round() as u64),
        DimFormat::Real => format!("{:?}", d),
    }
}

// PLAN

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct PlanEntry {
    pub concurrency: u32,
    pub shape: ProblemShape,
}

// BUILT ONLY THROUGH new() OR default(), SO EVERY PLANNED SIDE IS A POSITIVE FINITE REAL
#[derive(Clone, Copy, Debug)]
pub struct SweepPlanner {
    strong_size: f64,
    unit_work: f64,
}

impl Default for SweepPlanner {
    fn default() -> Self {
        Self {
            strong_size: DEFAULT_STRONG_SIZE,
            unit_work: DEFAULT_UNIT_WORK,
        }
    }
}

impl SweepPlanner {
    // STRONG SIZE: WHOLE NUMBER >= 1 (NEVER ROUNDED). UNIT WORK: FINITE AND > 0.
    pub fn new(strong_size: f64, unit_work: f64) -> Result<Self> {
        let invalid = |what, value, reason| StudyError::InvalidProblemSize { what, value, reason };
        if !strong_size.is_finite() || strong_size < 1.0 {
            return Err(invalid("strong size", strong_size, "must be a finite number >= 1"));
        }
        if strong_size.fract() != 0.0 || strong_size > MAX_STRONG_SIZE {
            return Err(invalid("strong size", strong_size, "must be a whole number below 2^53"));
        }
        if !unit_work.is_finite() || unit_work <= 0.0 {
            return Err(invalid("unit work", unit_work, "must be a finite number > 0"));
        }
        if unit_work > MAX_UNIT_WORK {
            return Err(invalid("unit work", unit_work, "too large to scale by the core count"));
        }
        Ok(Self { strong_size, unit_work })
    }

    pub fn strong_size(&self) -> f64 {
        self.strong_size
    }

    pub fn unit_work(&self) -> f64 {
        self.unit_work
    }

    // ONE ENTRY PER CORE COUNT IN 1..=max_cores, INCREASING. EMPTY IF max_cores == 0.
    pub fn plan(&self, mode: ScalingMode, max_cores: u32) -> Vec<PlanEntry> {
        (1..=max_cores)
            .map(|c| PlanEntry {
                concurrency: c,
                shape: self.shape_for(mode, c),
            })
            .collect()
    }

    pub fn shape_for(&self, mode: ScalingMode, concurrency: u32) -> ProblemShape {
        match mode {
            ScalingMode::Strong => ProblemShape::cube(self.strong_size, mode.dim_format()),
            ScalingMode::Weak => {
                ProblemShape::cube(weak_side(self.unit_work, concurrency), mode.dim_format())
            }
        }
    }
}

// EDGE OF A CUBE HOLDING unit_work * c OPERATIONS. NOT ROUNDED.
pub fn weak_side(unit_work: f64, concurrency: u32) -> f64 {
    (unit_work * concurrency as f64).cbrt()
}
