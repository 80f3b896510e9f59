// PRE-FLIGHT CHECK -- VERIFIES EVERYTHING A SWEEP NEEDS BEFORE SPENDING CORE-HOURS ON IT
// KERNEL EXECUTABLE, OPTIONAL LAUNCHER, CORE HELPER, WRITABLE OUTPUT DIRECTORY

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;

use anyhow::{bail, Result};

use gemmscale::config::StudyConfig;
use gemmscale::topology::resolve_max_cores;

const WRITE_PROBE: &str = ".gemmscale-write-probe";

fn check_tool(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn check_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

fn check_writable(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(WRITE_PROBE);
    let ok = std::fs::write(&probe, b"").is_ok();
    let _ = std::fs::remove_file(&probe);
    ok
}

pub fn run_check(config: &StudyConfig) -> Result<()> {
    println!("GEMMSCALE DEPENDENCY CHECK");
    println!();

    let mut ok = true;

    let kernel = config.kernel.display().to_string();
    if check_executable(&config.kernel) {
        println!("  {:<24}OK", kernel);
    } else {
        println!("  {:<24}MISSING (not an executable file)", kernel);
        ok = false;
    }

    if let Some(launcher) = &config.launcher {
        if check_tool(launcher) || check_executable(Path::new(launcher)) {
            println!("  {:<24}OK", launcher);
        } else {
            println!("  {:<24}MISSING", launcher);
            ok = false;
        }
    }

    let probe = config.core_probe();
    match resolve_max_cores(config.cores, &probe) {
        Ok(n) if config.cores.is_some() => println!("  {:<24}SKIPPED (--cores {})", probe.describe(), n),
        Ok(n) => println!("  {:<24}OK ({} cores)", probe.describe(), n),
        Err(e) => {
            println!("  {:<24}FAILED", probe.describe());
            println!("    {}", e);
            ok = false;
        }
    }

    let out = config.out_dir.display().to_string();
    if check_writable(&config.out_dir) {
        println!("  {:<24}WRITABLE", out);
    } else {
        println!("  {:<24}NOT WRITABLE", out);
        ok = false;
    }
    println!();

    if ok {
        println!("ALL CHECKS PASSED");
        Ok(())
    } else {
        bail!("SOME CHECKS FAILED")
    }
}
