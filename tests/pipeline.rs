// GEMMSCALE END-TO-END PIPELINE TESTS
// REAL PROCESS LAUNCHES AGAINST STUB KERNELS WRITTEN AS SHELL SCRIPTS
//
// STUBS RUN THROUGH THE `sh` LAUNCHER, SO THEY NEED NO EXEC BIT.
// CHARTS GO TO A RECORDING RENDERER: NO FONTS, NO PNG.

use std::cell::RefCell;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use gemmscale::chart::{ChartRenderer, ChartSpec};
use gemmscale::plan::{DimFormat, ProblemShape, ScalingMode, SweepPlanner};
use gemmscale::runner::{KernelEnv, KernelRunner, Measure};
use gemmscale::study::ScalingStudy;
use gemmscale::topology::{resolve_max_cores, CoreProbe};
use gemmscale::{Result, StudyError};
use tempfile::TempDir;

// ELAPSED = 100 / OMP_NUM_THREADS, REPORTED CORES = OMP_NUM_THREADS
const PERFECT_KERNEL: &str = r#"
c="$OMP_NUM_THREADS"
t=$(awk -v c="$c" 'BEGIN { printf "%.6f", 100 / c }')
printf '%s\t%s\t%s\t%s\t%s\t%s\t%s\n' "$1" "$2" "$3" "$c" "$t" 0.0 0
"#;

#[derive(Default)]
struct Recorder {
    specs: RefCell<Vec<ChartSpec>>,
}

impl ChartRenderer for Recorder {
    fn render(&self, spec: &ChartSpec) -> Result<()> {
        self.specs.borrow_mut().push(spec.clone());
        Ok(())
    }
}

fn stub(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    path
}

fn sh_runner(script: &Path) -> KernelRunner {
    KernelRunner::new(script)
        .with_launcher("sh", Vec::new())
        .with_timeout(Some(Duration::from_secs(30)))
}

fn cube(side: f64) -> ProblemShape {
    ProblemShape::cube(side, DimFormat::Integral)
}

// === SINGLE RUNS ===

#[test]
fn perfect_kernel_single_run() {
    let dir = TempDir::new().unwrap();
    let runner = sh_runner(&stub(&dir, "gemm.sh", PERFECT_KERNEL));
    let r = runner.run(&cube(1000.0), 4).unwrap();
    assert_eq!(r.cores, 4);
    assert!((r.elapsed - 25.0).abs() < 1e-9);
}

#[test]
fn affinity_env_reaches_kernel() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("env.log");
    let body = format!(
        "echo \"$OMP_PROC_BIND $OMP_PLACES $OMP_NUM_THREADS\" > '{}'\n{}",
        log.display(),
        PERFECT_KERNEL
    );
    let runner = sh_runner(&stub(&dir, "gemm.sh", &body));
    runner.run(&cube(100.0), 3).unwrap();
    assert_eq!(std::fs::read_to_string(&log).unwrap().trim(), "true cores 3");
}

#[test]
fn inherited_overrides_are_replaced() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("env.log");
    let body = format!(
        "echo \"$OMP_PLACES $OMP_NUM_THREADS $GEMMSCALE_MARKER\" > '{}'\n{}",
        log.display(),
        PERFECT_KERNEL
    );
    let env = KernelEnv::from_vars(std::env::vars_os().chain([
        (OsString::from("OMP_PLACES"), OsString::from("threads")),
        (OsString::from("OMP_NUM_THREADS"), OsString::from("64")),
        (OsString::from("GEMMSCALE_MARKER"), OsString::from("kept")),
    ]));
    let runner = sh_runner(&stub(&dir, "gemm.sh", &body)).with_env(env);
    runner.run(&cube(100.0), 2).unwrap();
    assert_eq!(std::fs::read_to_string(&log).unwrap().trim(), "cores 2 kept");
}

#[test]
fn warnings_before_result_line_are_skipped() {
    let dir = TempDir::new().unwrap();
    let body = format!("echo 'OMP: Info #276: omp_set_nested deprecated'\n{}", PERFECT_KERNEL);
    let runner = sh_runner(&stub(&dir, "gemm.sh", &body));
    let r = runner.run(&cube(1000.0), 2).unwrap();
    assert_eq!(r.cores, 2);
}

#[test]
fn malformed_output_is_rejected() {
    let dir = TempDir::new().unwrap();
    let runner = sh_runner(&stub(&dir, "gemm.sh", r"printf 'a\tb\n'"));
    let err = runner.run(&cube(1000.0), 1).unwrap_err();
    assert!(matches!(err, StudyError::MalformedOutput { .. }), "{}", err);
}

#[test]
fn nonzero_exit_is_execution_error() {
    let dir = TempDir::new().unwrap();
    let runner = sh_runner(&stub(&dir, "gemm.sh", "echo 'out of memory' >&2\nexit 3"));
    let err = runner.run(&cube(1000.0), 1).unwrap_err();
    match err {
        StudyError::KernelExecution { reason, .. } => {
            assert!(reason.contains("out of memory"), "{}", reason);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn missing_kernel_is_execution_error() {
    let runner = KernelRunner::new("/nonexistent/gemmscale-kernel");
    let err = runner.run(&cube(10.0), 1).unwrap_err();
    assert!(matches!(err, StudyError::KernelExecution { .. }));
}

#[test]
fn hung_kernel_times_out() {
    let dir = TempDir::new().unwrap();
    let runner = sh_runner(&stub(&dir, "gemm.sh", "sleep 20"))
        .with_timeout(Some(Duration::from_millis(300)));
    let start = Instant::now();
    let err = runner.run(&cube(1000.0), 2).unwrap_err();
    assert!(matches!(err, StudyError::KernelTimeout { concurrency: 2, .. }), "{}", err);
    // THE WHOLE GROUP IS KILLED, SO THE STDOUT PIPE CLOSES PROMPTLY
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[test]
fn backgrounded_helper_is_killed_with_the_run() {
    // THE LEADER EXITS AT ONCE BUT A CHILD KEEPS THE STDOUT PIPE OPEN
    let dir = TempDir::new().unwrap();
    let body = format!("sleep 20 &\n{}", PERFECT_KERNEL);
    let runner = sh_runner(&stub(&dir, "gemm.sh", &body))
        .with_timeout(Some(Duration::from_millis(300)));
    let start = Instant::now();
    let r = runner.run(&cube(1000.0), 1).unwrap();
    assert_eq!(r.cores, 1);
    assert!(start.elapsed() < Duration::from_secs(10), "took {:?}", start.elapsed());
}

#[test]
fn huge_timeout_means_no_deadline() {
    let dir = TempDir::new().unwrap();
    let runner = sh_runner(&stub(&dir, "gemm.sh", PERFECT_KERNEL))
        .with_timeout(Some(Duration::from_secs(u64::MAX)));
    let r = runner.run(&cube(1000.0), 2).unwrap();
    assert_eq!(r.cores, 2);
}

#[test]
fn shutdown_flag_interrupts_running_kernel() {
    static STOP: AtomicBool = AtomicBool::new(true);
    let dir = TempDir::new().unwrap();
    let runner = sh_runner(&stub(&dir, "gemm.sh", "sleep 20")).with_shutdown(&STOP);
    let start = Instant::now();
    let err = runner.run(&cube(1000.0), 1).unwrap_err();
    assert!(matches!(err, StudyError::Interrupted));
    assert!(start.elapsed() < Duration::from_secs(10));
}

// === CORE DISCOVERY ===

#[test]
fn core_helper_bounds_sweep() {
    let probe = CoreProbe::new("sh").arg("-c").arg("echo 6");
    assert_eq!(resolve_max_cores(None, &probe).unwrap(), 6);
    assert_eq!(resolve_max_cores(Some(2), &probe).unwrap(), 2);
}

#[test]
fn bad_core_helper_is_discovery_error() {
    for script in ["echo zero", "echo 0", "exit 1"] {
        let probe = CoreProbe::new("sh").arg("-c").arg(script);
        let err = resolve_max_cores(None, &probe).unwrap_err();
        assert!(matches!(err, StudyError::CoreDiscovery { .. }), "{}", script);
    }
    let missing = CoreProbe::new("/nonexistent/getcpus");
    assert!(resolve_max_cores(None, &missing).is_err());
}

// === FULL STUDIES ===

#[test]
fn strong_study_with_perfect_kernel() {
    let dir = TempDir::new().unwrap();
    let runner = sh_runner(&stub(&dir, "gemm.sh", PERFECT_KERNEL));
    let charts = Recorder::default();
    let outcome = ScalingStudy::new(8, &runner, &charts)
        .with_out_dir(dir.path())
        .run_strong_scaling()
        .unwrap();

    assert_eq!(outcome.series.len(), 8);
    for p in &outcome.derived.points {
        assert!((p.metric - p.cores as f64).abs() < 1e-4, "{:?}", p);
    }
    let specs = charts.specs.borrow();
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].path, dir.path().join("strong_scaling.png"));
    assert_eq!(specs[0].reference.last(), Some(&(8.0, 8.0)));
}

#[test]
fn weak_study_passes_cube_root_sizes() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("args.log");
    let body = format!(
        "echo \"$OMP_NUM_THREADS $1 $2 $3\" >> '{}'\nc=\"$OMP_NUM_THREADS\"\nprintf '%s\\t%s\\t%s\\t%s\\t%s\\n' \"$1\" \"$2\" \"$3\" \"$c\" 10",
        log.display()
    );
    let runner = sh_runner(&stub(&dir, "gemm.sh", &body));
    let charts = Recorder::default();
    let outcome = ScalingStudy::new(4, &runner, &charts).run_weak_scaling().unwrap();

    // CONSTANT ELAPSED UNDER WEAK SCALING = PERFECT EFFICIENCY
    assert_eq!(outcome.derived.metrics(), vec![1.0; 4]);

    let planner = SweepPlanner::default();
    let logged = std::fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = logged.lines().collect();
    assert_eq!(lines.len(), 4);
    for (c, line) in (1..=4u32).zip(lines) {
        let args = planner.shape_for(ScalingMode::Weak, c).to_args();
        assert_eq!(line, format!("{} {} {} {}", c, args[0], args[1], args[2]));
    }
}

#[test]
fn failing_point_aborts_study_without_chart() {
    let dir = TempDir::new().unwrap();
    let body = format!("[ \"$OMP_NUM_THREADS\" -ge 3 ] && exit 9\n{}", PERFECT_KERNEL);
    let runner = sh_runner(&stub(&dir, "gemm.sh", &body));
    let charts = Recorder::default();
    let err = ScalingStudy::new(5, &runner, &charts).run_strong_scaling().unwrap_err();
    assert!(matches!(err, StudyError::KernelExecution { .. }), "{}", err);
    assert!(charts.specs.borrow().is_empty());
}

#[test]
fn capped_kernel_strict_mode_fails() {
    let dir = TempDir::new().unwrap();
    let body = PERFECT_KERNEL.replace("c=\"$OMP_NUM_THREADS\"", "c=$(( OMP_NUM_THREADS > 2 ? 2 : OMP_NUM_THREADS ))");
    let runner = sh_runner(&stub(&dir, "gemm.sh", &body));
    let charts = Recorder::default();

    let lenient = ScalingStudy::new(3, &runner, &charts).run_strong_scaling().unwrap();
    assert_eq!(lenient.series.samples()[2].reported, 2);

    let err = ScalingStudy::new(3, &runner, &charts)
        .strict_cores(true)
        .run_strong_scaling()
        .unwrap_err();
    assert!(matches!(err, StudyError::CoreMismatch { requested: 3, reported: 2 }));
}
