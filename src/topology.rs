// GEMMSCALE CORE DISCOVERY
// RUNS THE EXTERNAL CORE-COUNT HELPER ONCE PER STUDY. THE RESULT BOUNDS THE SWEEP: [1, N].

use std::ffi::OsString;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{Result, StudyError};

pub const DEFAULT_HELPER: &str = "./getcpus";

#[derive(Clone, Debug)]
pub struct CoreProbe {
    program: OsString,
    args: Vec<OsString>,
}

impl CoreProbe {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn describe(&self) -> String {
        let mut parts = vec![self.program.to_string_lossy().into_owned()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }

    fn failure(&self, reason: impl Into<String>) -> StudyError {
        StudyError::CoreDiscovery {
            helper: self.describe(),
            reason: reason.into(),
        }
    }

    pub fn discover(&self) -> Result<u32> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| self.failure(format!("failed to run: {}", e)))?;
        if !output.status.success() {
            return Err(self.failure(format!("exited with {}", output.status)));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("CORE HELPER PRINTED {:?}", stdout.trim());
        parse_core_count(&stdout).map_err(|reason| self.failure(reason))
    }
}

pub fn parse_core_count(raw: &str) -> std::result::Result<u32, String> {
    let trimmed = raw.trim();
    let n: u32 = trimmed
        .parse()
        .map_err(|_| format!("expected a core count, got {:?}", trimmed))?;
    if n == 0 {
        return Err("helper reported zero cores".to_string());
    }
    Ok(n)
}

// --cores OVERRIDE SKIPS THE HELPER ENTIRELY
pub fn resolve_max_cores(override_cores: Option<u32>, probe: &CoreProbe) -> Result<u32> {
    match override_cores {
        Some(0) => Err(probe.failure("--cores must be at least 1")),
        Some(n) => Ok(n),
        None => probe.discover(),
    }
}
