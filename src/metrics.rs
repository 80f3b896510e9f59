// GEMMSCALE METRIC DERIVATION
// RAW TIMINGS -> SPEEDUP/EFFICIENCY, NORMALIZED AGAINST THE FIRST (1-CORE) SAMPLE.
// THE IDEAL CURVE IS NOT DERIVED HERE; IT IS A PURE FUNCTION OF CORE COUNT (chart.rs).

use crate::error::{Result, StudyError};

// ONE SWEEP POINT. `reported` IS WHAT THE KERNEL ECHOED BACK AND DRIVES THE X AXIS.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Sample {
    pub requested: u32,
    pub reported: u32,
    pub elapsed: f64,
}

#[derive(Clone, Debug, Default)]
pub struct ScalingSeries {
    samples: Vec<Sample>,
}

impl ScalingSeries {
    pub fn new() -> Self {
        Self::default()
    }

    // (CORES, ELAPSED) PAIRS WHERE REQUESTED == REPORTED
    pub fn from_pairs(pairs: &[(u32, f64)]) -> Self {
        Self {
            samples: pairs
                .iter()
                .map(|&(cores, elapsed)| Sample {
                    requested: cores,
                    reported: cores,
                    elapsed,
                })
                .collect(),
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn baseline(&self) -> Option<&Sample> {
        self.samples.first()
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct DerivedPoint {
    pub cores: u32,
    pub metric: f64,
    pub efficiency: f64,
}

#[derive(Clone, Debug, Default)]
pub struct DerivedSeries {
    pub points: Vec<DerivedPoint>,
}

impl DerivedSeries {
    pub fn metrics(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.metric).collect()
    }

    // PLOTTABLE (X, Y)
    pub fn xy(&self) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .map(|p| (p.cores as f64, p.metric))
            .collect()
    }

    pub fn max_cores(&self) -> u32 {
        self.points.iter().map(|p| p.cores).max().unwrap_or(1)
    }
}

// metric = baseline_time / elapsed_time FOR EVERY SAMPLE.
// EVERY TIMING IS VALIDATED BEFORE ANY DIVISION: ZERO, NEGATIVE, NAN AND INF ARE REJECTED.
pub fn derive(series: &ScalingSeries) -> Result<DerivedSeries> {
    let baseline = series.baseline().ok_or(StudyError::EmptySeries)?;

    for (index, s) in series.samples().iter().enumerate() {
        if !(s.elapsed > 0.0 && s.elapsed.is_finite()) {
            return Err(StudyError::InvalidMeasurement {
                index,
                concurrency: s.reported,
                elapsed: s.elapsed,
            });
        }
    }

    let base = baseline.elapsed;
    let points = series
        .samples()
        .iter()
        .map(|s| {
            let metric = base / s.elapsed;
            DerivedPoint {
                cores: s.reported,
                metric,
                efficiency: metric / s.reported.max(1) as f64,
            }
        })
        .collect();

    Ok(DerivedSeries { points })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halving_time_doubles_speedup() {
        let series = ScalingSeries::from_pairs(&[(1, 10.0), (2, 5.0), (4, 2.5)]);
        let derived = derive(&series).unwrap();
        assert_eq!(derived.metrics(), vec![1.0, 2.0, 4.0]);
        assert!(derived.points.iter().all(|p| p.efficiency == 1.0));
    }

    #[test]
    fn baseline_is_exactly_one() {
        let series = ScalingSeries::from_pairs(&[(1, 3.7), (2, 2.1), (3, 1.9)]);
        let derived = derive(&series).unwrap();
        assert_eq!(derived.points[0].metric, 1.0);
    }

    #[test]
    fn empty_series_rejected() {
        let err = derive(&ScalingSeries::new()).unwrap_err();
        assert!(matches!(err, StudyError::EmptySeries));
    }

    #[test]
    fn zero_time_rejected() {
        let err = derive(&ScalingSeries::from_pairs(&[(1, 0.0)])).unwrap_err();
        assert!(matches!(err, StudyError::InvalidMeasurement { index: 0, .. }));
    }

    #[test]
    fn negative_and_nan_rejected_anywhere() {
        let err = derive(&ScalingSeries::from_pairs(&[(1, 4.0), (2, -1.0)])).unwrap_err();
        assert!(matches!(
            err,
            StudyError::InvalidMeasurement { index: 1, concurrency: 2, .. }
        ));

        let err = derive(&ScalingSeries::from_pairs(&[(1, 4.0), (2, 2.0), (3, f64::NAN)]))
            .unwrap_err();
        assert!(matches!(err, StudyError::InvalidMeasurement { index: 2, .. }));
    }

    #[test]
    fn x_axis_uses_reported_cores() {
        let mut series = ScalingSeries::new();
        series.push(Sample { requested: 1, reported: 1, elapsed: 8.0 });
        series.push(Sample { requested: 2, reported: 3, elapsed: 4.0 });
        let derived = derive(&series).unwrap();
        assert_eq!(derived.xy(), vec![(1.0, 1.0), (3.0, 2.0)]);
        assert_eq!(derived.max_cores(), 3);
        assert!((derived.points[1].efficiency - 2.0 / 3.0).abs() < 1e-12);
    }
}
