//! Shared helpers for the sandbox-backed integration tests.

#![allow(dead_code)]

use std::process::Command;
use std::time::Duration;

use agon_common::{GradingRequest, RunnerMode, Testcase};
use themis::config::SandboxConfig;
use themis::grading::Grader;
use themis::sandbox::PythonSandbox;
use themis::sandbox::denylist::default_denylist;

pub const TWO_SECONDS: Duration = Duration::from_secs(2);

/// Whether a `python3` interpreter is on `PATH`. Tests return early when it
/// is not.
pub fn python_available() -> bool {
    let found = Command::new("python3")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false);
    if !found {
        eprintln!("python3 not found, skipping sandbox test");
    }
    found
}

pub fn grader(timeout: Duration) -> Grader<PythonSandbox> {
    let config = SandboxConfig {
        timeout,
        ..SandboxConfig::default()
    };
    Grader::new(PythonSandbox::new(config), default_denylist())
}

pub fn template(class_name: &str, method_name: &str) -> String {
    format!("CLASS_NAME = '{class_name}'\nMETHOD_NAME = '{method_name}'")
}

pub fn request(
    admin_template: &str,
    candidate_code: &str,
    testcases: Vec<Testcase>,
    run_all_on_failure: bool,
) -> GradingRequest {
    GradingRequest {
        admin_template: admin_template.to_string(),
        candidate_code: candidate_code.to_string(),
        testcases,
        run_all_on_failure,
        runner_mode: RunnerMode::Plain,
    }
}
