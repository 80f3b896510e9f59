// GEMMSCALE CHART OUTPUT
// ONE PNG PER SCALING MODE: MEASURED CURVE + DASHED IDEAL REFERENCE,
// LOG2 X AXIS (CORES), LINEAR Y AXIS FROM 0, GRID, LEGEND, TITLE.

use std::path::{Path, PathBuf};

use plotters::prelude::*;
use tracing::warn;

use crate::error::{Result, StudyError};
use crate::metrics::DerivedSeries;
use crate::plan::ScalingMode;

pub const DEFAULT_SIZE: (u32, u32) = (1024, 768);

const IDENTITY_STEP: f64 = 0.1;
const REFERENCE_GREY: RGBColor = RGBColor(128, 128, 128);

// ---------------------------------------------------------------------------
// REFERENCE CURVES
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ReferenceCurve {
    // IDEAL SPEEDUP: y = x
    Identity,
    // IDEAL EFFICIENCY: y = c
    Constant(f64),
}

impl ReferenceCurve {
    pub fn for_mode(mode: ScalingMode) -> Self {
        match mode {
            ScalingMode::Strong => Self::Identity,
            ScalingMode::Weak => Self::Constant(1.0),
        }
    }

    // SAMPLED OVER [1, max_x]. ENDPOINT ALWAYS INCLUDED.
    pub fn points(&self, max_x: f64) -> Vec<(f64, f64)> {
        let max_x = max_x.max(1.0);
        match *self {
            Self::Identity => {
                let steps = ((max_x - 1.0) / IDENTITY_STEP).floor() as usize;
                let mut pts: Vec<(f64, f64)> = (0..=steps)
                    .map(|i| 1.0 + i as f64 * IDENTITY_STEP)
                    .map(|x| (x, x))
                    .collect();
                if pts.last().map_or(true, |&(x, _)| max_x - x > 1e-9) {
                    pts.push((max_x, max_x));
                }
                pts
            }
            Self::Constant(y) => vec![(1.0, y), (max_x, y)],
        }
    }
}

// ---------------------------------------------------------------------------
// CHART SPEC
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct ChartSpec {
    pub path: PathBuf,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series_label: String,
    pub reference_label: String,
    pub points: Vec<(f64, f64)>,
    pub reference: Vec<(f64, f64)>,
}

impl ChartSpec {
    pub fn for_mode(mode: ScalingMode, derived: &DerivedSeries, out_dir: &Path) -> Self {
        let (title, metric, ideal) = match mode {
            ScalingMode::Strong => ("GEMM strong scaling", "Speedup", "Ideal speedup"),
            ScalingMode::Weak => ("GEMM weak scaling", "Efficiency", "Ideal efficiency"),
        };
        let max_x = derived.max_cores() as f64;
        Self {
            path: out_dir.join(format!("{}.png", mode.file_stem())),
            title: title.to_string(),
            x_label: "Number of cores".to_string(),
            y_label: metric.to_string(),
            series_label: metric.to_string(),
            reference_label: ideal.to_string(),
            points: derived.xy(),
            reference: ReferenceCurve::for_mode(mode).points(max_x),
        }
    }

    // AXIS EXTENTS: X IN [1, MAX(2, max_x)] FOR A NON-DEGENERATE LOG AXIS, Y IN [0, 1.1 * MAX]
    pub fn bounds(&self) -> (f64, f64) {
        let all = self.points.iter().chain(self.reference.iter());
        let x_max = all.clone().map(|p| p.0).fold(2.0, f64::max);
        let y_max = all.map(|p| p.1).filter(|y| y.is_finite()).fold(1.0, f64::max);
        (x_max, y_max * 1.1)
    }
}

// ---------------------------------------------------------------------------
// RENDERERS
// ---------------------------------------------------------------------------

pub trait ChartRenderer {
    fn render(&self, spec: &ChartSpec) -> Result<()>;
}

// TEXT NEEDS SYSTEM FONTS. WITHOUT THEM THE CHART IS REDRAWN BARE (CURVES ONLY)
// SO A SWEEP ON A HEADLESS NODE STILL LEAVES A PNG BEHIND.
pub struct PlottersRenderer {
    size: (u32, u32),
    text: bool,
}

impl Default for PlottersRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE)
    }
}

impl PlottersRenderer {
    pub fn new(size: (u32, u32)) -> Self {
        Self { size, text: true }
    }

    // CURVES ONLY: NO CAPTION, AXIS LABELS OR LEGEND
    pub fn without_text(mut self) -> Self {
        self.text = false;
        self
    }

    fn draw(&self, spec: &ChartSpec, text: bool) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let (x_max, y_max) = spec.bounds();

        let root = BitMapBackend::new(&spec.path, self.size).into_drawing_area();
        root.fill(&WHITE)?;

        let mut builder = ChartBuilder::on(&root);
        builder.margin(20);
        if text {
            builder
                .caption(&spec.title, ("sans-serif", 28))
                .x_label_area_size(45)
                .y_label_area_size(55);
        }
        let mut chart =
            builder.build_cartesian_2d((1.0..x_max).log_scale().base(2.0), 0.0..y_max)?;

        if text {
            chart
                .configure_mesh()
                .x_desc(spec.x_label.as_str())
                .y_desc(spec.y_label.as_str())
                .x_label_formatter(&|x| format!("{}", x.round() as u64))
                .bold_line_style(&BLACK.mix(0.2))
                .light_line_style(&BLACK.mix(0.06))
                .draw()?;
        }

        chart
            .draw_series(LineSeries::new(spec.points.iter().copied(), BLUE.stroke_width(2)))?
            .label(spec.series_label.as_str())
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE.stroke_width(2)));

        chart
            .draw_series(DashedLineSeries::new(
                spec.reference.iter().copied(),
                8,
                6,
                REFERENCE_GREY.stroke_width(2),
            ))?
            .label(spec.reference_label.as_str())
            .legend(|(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], REFERENCE_GREY.stroke_width(2))
            });

        if text {
            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::UpperLeft)
                .background_style(&WHITE.mix(0.8))
                .border_style(&BLACK)
                .draw()?;
        }

        root.present()?;
        Ok(())
    }
}

impl ChartRenderer for PlottersRenderer {
    fn render(&self, spec: &ChartSpec) -> Result<()> {
        let drawn = match self.draw(spec, self.text) {
            Err(e) if self.text => {
                warn!("CHART TEXT UNAVAILABLE ({}), WRITING {} WITHOUT LABELS", e, spec.path.display());
                self.draw(spec, false)
            }
            other => other,
        };
        drawn.map_err(|e| StudyError::Chart {
            path: spec.path.clone(),
            reason: e.to_string(),
        })
    }
}
