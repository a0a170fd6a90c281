#![allow(dead_code)]

use assert_cmd::Command;
use chrono::{Duration, Utc};
use std::path::PathBuf;
use tempfile::TempDir;

/// Test harness for running CLI commands with temporary databases
pub struct CliTestHarness {
    temp_dir: TempDir,
    db_path: PathBuf,
}

impl CliTestHarness {
    /// Create a new test harness with a temporary database
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");

        Self { temp_dir, db_path }
    }

    /// Get a Command instance configured for testing
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("cadence").expect("Failed to find cadence binary");

        cmd.env("CADENCE_DATABASE_PATH", &self.db_path)
            .env("CADENCE_CONFIG", self.temp_dir.path().join("cadence.toml"))
            .env("CADENCE_DEFAULT_TIMEZONE", "UTC")
            .env("RUST_LOG", "warn");

        cmd
    }

    /// Helper to run a command and assert success
    pub fn run_success(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().success()
    }

    /// Helper to run a command and assert failure
    pub fn run_failure(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().failure()
    }

    /// Runs a command expected to print JSON and parses its stdout
    pub fn run_json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.command().args(args).output().expect("Failed to run cadence");
        assert!(
            output.status.success(),
            "command failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("stdout is JSON")
    }
}

/// Common test fixtures
pub struct TestFixtures;

impl TestFixtures {
    pub const ORGANIZATION: &'static str = "0190a7c4-9a4e-7cc1-8f2b-5f3c2d1e0a01";

    /// Tomorrow at 09:00 UTC, so seeded instances always fall inside the hot window
    pub fn tomorrow_morning() -> String {
        (Utc::now() + Duration::days(1))
            .format("%Y-%m-%d 09:00")
            .to_string()
    }

    pub fn tomorrow() -> String {
        (Utc::now() + Duration::days(1)).format("%Y-%m-%d").to_string()
    }

    /// Weekly standup with three occurrences
    pub fn weekly_series_args(start: &str) -> Vec<String> {
        vec![
            "series".into(),
            "create".into(),
            Self::ORGANIZATION.into(),
            "Standup".into(),
            "--start".into(),
            start.into(),
            "--duration".into(),
            "15".into(),
            "--rrule".into(),
            "FREQ=WEEKLY;COUNT=3".into(),
            "--timezone".into(),
            "UTC".into(),
        ]
    }
}

/// Utility functions for test assertions
pub mod assertions {
    use predicates::prelude::*;

    pub fn has_instance_table_headers() -> impl Predicate<str> {
        predicate::str::contains("ID")
            .and(predicate::str::contains("Name"))
            .and(predicate::str::contains("Start"))
    }

    pub fn has_error() -> impl Predicate<str> {
        predicate::str::contains("Error").or(predicate::str::contains("error"))
    }
}
