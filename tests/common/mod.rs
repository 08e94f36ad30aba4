//! Shared test utilities for CLI integration tests.

use assert_cmd::Command;
use tempfile::TempDir;

/// Isolated test environment with its own data directory.
pub struct TestEnv {
    pub data_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            data_dir: TempDir::new().expect("create temp data dir"),
        }
    }

    /// A `cox` command pointed at this environment's data directory.
    pub fn cox(&self) -> Command {
        let mut cmd = Command::cargo_bin("cox").expect("cox binary");
        cmd.env("COX_DATA_DIR", self.data_dir.path());
        cmd
    }

    /// Run a command expecting success and parse its stdout as JSON.
    pub fn cox_json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.cox().args(args).output().expect("run cox");
        assert!(
            output.status.success(),
            "cox {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("JSON output")
    }
}
