// GEMMSCALE SWEEP REPORT
// FIXED-WIDTH TABLE OF RAW AND DERIVED SERIES, PRINTED AFTER EACH MODE.
// STDOUT ONLY. NOTHING IS PERSISTED.

use crate::plan::ScalingMode;
use crate::study::StudyOutcome;

pub fn report_lines(outcome: &StudyOutcome) -> Vec<String> {
    let sep = "=".repeat(60);
    let metric = match outcome.mode {
        ScalingMode::Strong => "SPEEDUP",
        ScalingMode::Weak => "EFFICIENCY",
    };

    let mut lines = Vec::new();
    lines.push(sep.clone());
    lines.push(format!("GEMM {} SCALING", outcome.mode.label()));
    lines.push(sep.clone());
    lines.push(format!(
        "{:>9} {:>9} {:>14} {:>11} {:>11}",
        "REQUESTED", "REPORTED", "ELAPSED", metric, "PER-CORE"
    ));
    lines.push(format!(
        "{} {} {} {} {}",
        "-".repeat(9),
        "-".repeat(9),
        "-".repeat(14),
        "-".repeat(11),
        "-".repeat(11),
    ));

    for (s, d) in outcome.series.samples().iter().zip(outcome.derived.points.iter()) {
        let flag = if s.requested != s.reported { "  *" } else { "" };
        lines.push(format!(
            "{:>9} {:>9} {:>14.6} {:>11.3} {:>11.3}{}",
            s.requested, s.reported, s.elapsed, d.metric, d.efficiency, flag,
        ));
    }

    let diverged = outcome
        .series
        .samples()
        .iter()
        .filter(|s| s.requested != s.reported)
        .count();
    if diverged > 0 {
        lines.push(format!("(* {} POINT(S) REPORTED A DIFFERENT CORE COUNT)", diverged));
    }

    if let Some(last) = outcome.derived.points.last() {
        lines.push(format!(
            "PEAK CORES: {}  FINAL {}: {:.3}  FINAL PER-CORE: {:.3}",
            last.cores, metric, last.metric, last.efficiency
        ));
    }
    lines.push(format!("CHART: {}", outcome.chart.display()));
    lines.push(sep);
    lines
}

pub fn print_report(outcome: &StudyOutcome) {
    for line in report_lines(outcome) {
        println!("{}", line);
    }
}
