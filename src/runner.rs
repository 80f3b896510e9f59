// GEMMSCALE PROCESS RUNNER
// LAUNCHES THE GEMM KERNEL ONCE PER SWEEP POINT AND PARSES ITS RESULT LINE
//
// INVOCATION:  [launcher [launcher-args..]] <kernel> <m> <n> <k>
// ENVIRONMENT: IMMUTABLE SNAPSHOT = BASE ENV + OMP_PROC_BIND/OMP_PLACES/OMP_NUM_THREADS
// OUTPUT:      ONE TAB-SEPARATED LINE, FIELD 3 = CORES USED, FIELD 4 = ELAPSED
//
// THE HARNESS NEVER MUTATES ITS OWN ENVIRONMENT. EVERY CHILD GETS env_clear() + THE SNAPSHOT.

use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Result, StudyError};
use crate::plan::ProblemShape;

// AFFINITY + THREAD COUNT, MATERIALIZED BEFORE THE CHILD STARTS
pub const ENV_PROC_BIND: &str = "OMP_PROC_BIND";
pub const ENV_PLACES: &str = "OMP_PLACES";
pub const ENV_NUM_THREADS: &str = "OMP_NUM_THREADS";

// KERNEL OUTPUT CONTRACT: M N K CORES ELAPSED [SECS CHECKSUM ..]
const MIN_FIELDS: usize = 5;
const CORES_FIELD: usize = 3;
const ELAPSED_FIELD: usize = 4;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const TERM_GRACE: Duration = Duration::from_millis(500);
const STDERR_TAIL_LINES: usize = 5;

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct RunResult {
    pub cores: u32,
    pub elapsed: f64,
}

// ONE MEASUREMENT. THE STUDY ONLY SEES THIS SEAM, SO TESTS CAN SUBSTITUTE A FAKE.
pub trait Measure {
    fn run(&self, shape: &ProblemShape, concurrency: u32) -> Result<RunResult>;
}

// ---------------------------------------------------------------------------
// ENVIRONMENT SNAPSHOT
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct KernelEnv {
    base: Vec<(OsString, OsString)>,
}

impl KernelEnv {
    // CAPTURED ONCE WHEN THE RUNNER IS BUILT
    pub fn capture() -> Self {
        Self::from_vars(std::env::vars_os())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        Self {
            base: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    // BASE MINUS ANY INHERITED OVERRIDE KEYS, THEN ALL THREE OVERRIDES
    pub fn snapshot(&self, concurrency: u32) -> Vec<(OsString, OsString)> {
        let overrides = [
            (ENV_PROC_BIND, "true".to_string()),
            (ENV_PLACES, "cores".to_string()),
            (ENV_NUM_THREADS, concurrency.to_string()),
        ];
        let mut vars: Vec<(OsString, OsString)> = self
            .base
            .iter()
            .filter(|(k, _)| !overrides.iter().any(|(o, _)| k.as_os_str() == OsStr::new(o)))
            .cloned()
            .collect();
        vars.extend(
            overrides
                .into_iter()
                .map(|(k, v)| (OsString::from(k), OsString::from(v))),
        );
        vars
    }
}

// ---------------------------------------------------------------------------
// PROCESS GUARD
// ---------------------------------------------------------------------------

// KERNEL RUNS IN ITS OWN PROCESS GROUP. THE WHOLE GROUP IS SIGNALLED ON EVERY
// EXIT PATH SO OPENMP HELPERS AND BACKGROUNDED GRANDCHILDREN CANNOT OUTLIVE THE
// RUN OR HOLD THE OUTPUT PIPES OPEN.
struct ProcGuard {
    child: Child,
    pgid: i32,
    reaped: bool,
    stopped: bool,
}

impl ProcGuard {
    fn new(child: Child) -> Self {
        let pgid = child.id() as i32;
        Self {
            child,
            pgid,
            reaped: false,
            stopped: false,
        }
    }

    fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        let status = self.child.try_wait()?;
        if status.is_some() {
            self.reaped = true;
        }
        Ok(status)
    }

    // LEADER: SIGTERM, GRACE, SIGKILL. STRAGGLERS: SIGKILL EVEN IF THE LEADER IS GONE.
    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        if !self.reaped && !matches!(self.try_wait(), Ok(Some(_))) {
            unsafe { libc::killpg(self.pgid, libc::SIGTERM); }
            let deadline = Instant::now() + TERM_GRACE;
            loop {
                match self.try_wait() {
                    Ok(Some(_)) => break,
                    Ok(None) if Instant::now() >= deadline => break,
                    Ok(None) => std::thread::sleep(POLL_INTERVAL),
                    Err(_) => break,
                }
            }
        }

        // ESRCH WHEN THE GROUP IS ALREADY EMPTY
        unsafe { libc::killpg(self.pgid, libc::SIGKILL); }
        if !self.reaped {
            let _ = self.child.wait();
            self.reaped = true;
        }
    }
}

impl Drop for ProcGuard {
    fn drop(&mut self) {
        self.stop();
    }
}

// DRAIN A PIPE ON A HELPER THREAD SO A CHATTY CHILD CANNOT BLOCK ON A FULL PIPE
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut p) = pipe {
            let _ = p.read_to_end(&mut buf);
        }
        buf
    })
}

fn stderr_tail(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}

// ---------------------------------------------------------------------------
// KERNEL RUNNER
// ---------------------------------------------------------------------------

pub struct KernelRunner {
    kernel: PathBuf,
    launcher: Option<(OsString, Vec<String>)>,
    env: KernelEnv,
    timeout: Option<Duration>,
    shutdown: Option<&'static AtomicBool>,
}

impl KernelRunner {
    pub fn new(kernel: impl Into<PathBuf>) -> Self {
        Self {
            kernel: kernel.into(),
            launcher: None,
            env: KernelEnv::capture(),
            timeout: None,
            shutdown: None,
        }
    }

    pub fn with_launcher(mut self, program: impl Into<OsString>, args: Vec<String>) -> Self {
        self.launcher = Some((program.into(), args));
        self
    }

    pub fn with_env(mut self, env: KernelEnv) -> Self {
        self.env = env;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_shutdown(mut self, flag: &'static AtomicBool) -> Self {
        self.shutdown = Some(flag);
        self
    }

    // FULLY MATERIALIZED COMMAND FOR ONE SWEEP POINT. NOTHING IS INHERITED IMPLICITLY.
    pub fn command(&self, shape: &ProblemShape, concurrency: u32) -> Command {
        let mut cmd = match &self.launcher {
            Some((program, args)) => {
                let mut c = Command::new(program);
                c.args(args).arg(&self.kernel);
                c
            }
            None => Command::new(&self.kernel),
        };
        cmd.args(shape.to_args())
            .env_clear()
            .envs(self.env.snapshot(concurrency))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        cmd
    }

    // HUMAN-READABLE FORM: OMP_NUM_THREADS=<c> [launcher..] <kernel> <m> <n> <k>
    pub fn command_line(&self, shape: &ProblemShape, concurrency: u32) -> String {
        let cmd = self.command(shape, concurrency);
        let mut parts = vec![
            format!("{}={}", ENV_NUM_THREADS, concurrency),
            cmd.get_program().to_string_lossy().into_owned(),
        ];
        parts.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }

    fn exec_error(&self, reason: String) -> StudyError {
        StudyError::KernelExecution {
            kernel: self.kernel.clone(),
            reason,
        }
    }

    fn interrupted(&self) -> bool {
        self.shutdown.is_some_and(|s| s.load(Ordering::Relaxed))
    }

    // BLOCK UNTIL EXIT, DEADLINE OR SHUTDOWN. A DEADLINE PAST THE END OF TIME IS NO DEADLINE.
    fn wait(&self, guard: &mut ProcGuard, concurrency: u32) -> Result<ExitStatus> {
        let deadline = self.timeout.and_then(|t| Instant::now().checked_add(t));
        loop {
            match guard.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {}
                Err(e) => return Err(self.exec_error(format!("wait failed: {}", e))),
            }
            if self.interrupted() {
                return Err(StudyError::Interrupted);
            }
            if let (Some(deadline), Some(timeout)) = (deadline, self.timeout) {
                if Instant::now() >= deadline {
                    return Err(StudyError::KernelTimeout { concurrency, timeout });
                }
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Measure for KernelRunner {
    fn run(&self, shape: &ProblemShape, concurrency: u32) -> Result<RunResult> {
        debug!("EXEC {}", self.command_line(shape, concurrency));
        let mut cmd = self.command(shape, concurrency);

        let mut child = cmd
            .spawn()
            .map_err(|e| self.exec_error(format!("failed to start: {}", e)))?;
        let out_reader = drain(child.stdout.take());
        let err_reader = drain(child.stderr.take());
        let mut guard = ProcGuard::new(child);

        let waited = self.wait(&mut guard, concurrency);
        guard.stop();
        let stdout = out_reader.join().unwrap_or_default();
        let stderr = err_reader.join().unwrap_or_default();
        let status = waited?;

        if !status.success() {
            return Err(self.exec_error(format!(
                "exited with {}; stderr: {}",
                status,
                stderr_tail(&stderr)
            )));
        }

        parse_output(&String::from_utf8_lossy(&stdout))
    }
}

// ---------------------------------------------------------------------------
// OUTPUT PARSING
// ---------------------------------------------------------------------------

// THE LAST NON-EMPTY LINE IS THE RESULT. OPENMP RUNTIMES MAY WARN ON STDOUT FIRST.
pub fn parse_output(stdout: &str) -> Result<RunResult> {
    let lines: Vec<&str> = stdout
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.len() > 1 {
        debug!("KERNEL PRINTED {} LINES, USING THE LAST", lines.len());
    }
    parse_line(lines.last().copied().unwrap_or(""))
}

pub fn parse_line(line: &str) -> Result<RunResult> {
    let malformed = |reason: String| StudyError::MalformedOutput {
        line: line.to_string(),
        reason,
    };

    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < MIN_FIELDS {
        return Err(malformed(format!(
            "expected at least {} tab-separated fields, got {}",
            MIN_FIELDS,
            fields.len()
        )));
    }

    let cores: u32 = fields[CORES_FIELD]
        .trim()
        .parse()
        .map_err(|_| malformed(format!("field {} is not an integer core count", CORES_FIELD)))?;
    if cores == 0 {
        return Err(malformed("kernel reported zero cores".to_string()));
    }

    let elapsed: f64 = fields[ELAPSED_FIELD]
        .trim()
        .parse()
        .map_err(|_| malformed(format!("field {} is not a number", ELAPSED_FIELD)))?;

    Ok(RunResult { cores, elapsed })
}
