#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_clm") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "clm.exe" } else { "clm" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve clm binary path for integration test"),
    }
}

/// Run `clm` with `home` as HOME so no real config or Chia install leaks in.
/// Activity logging is off unless `extra_env` turns it back on.
pub fn run_cli_case(
    case_name: &str,
    home: &Path,
    args: &[&str],
    extra_env: &[(&str, &str)],
) -> CmdResult {
    let root = std::env::temp_dir().join("clm-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut command = Command::new(&bin_path);
    command
        .args(args)
        .env("HOME", home)
        .env("CLM_LOGGING_ENABLED", "false")
        .env_remove("CLM_LOG_FILE")
        .env_remove("CLM_OUTPUT_FORMAT")
        .env("RUST_BACKTRACE", "1");
    for (key, value) in extra_env {
        command.env(key, value);
    }
    let output = command.output().expect("execute clm command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// A harvester farming-cycle line as written by `chia.harvester.harvester`.
pub fn proof_line(second: u32, time_secs: f64, proofs: u64) -> String {
    format!(
        "2024-05-01T12:00:{second:02}.000 harvester chia.harvester.harvester: INFO     \
         2 plots were eligible for farming 0badc0ffee... Found {proofs} proofs. \
         Time: {time_secs:.5} s. Total 88 plots\n"
    )
}

pub const POOL_INFO_LINE: &str = "2024-05-01T11:59:00.000 farmer farmer_server: INFO     \
    GET /pool_info response: {'description': 'Farm together (@togetherpool)', \
    'fee': 0.01, 'name': 'Together Pool', 'protocol_version': 1}\n";

pub const NOISE_LINE: &str =
    "2024-05-01T11:59:30.000 full_node chia.full_node.full_node: INFO     Added block 12\n";
