//! Common test utilities for stickyconf integration tests.
//!
//! Provides `TestEnv` for isolated environments that never touch the real
//! `~/.config/stickyconf/` or `~/.local/share/stickyconf/` directories.

#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
pub use tempfile::TempDir;

/// Default block markers, as written into the target.
pub const START: &str = "# >>> stickyconf managed block >>>";
pub const END: &str = "# <<< stickyconf managed block <<<";

/// A test environment with its own target, override source and data directory.
///
/// The `stickyconf()` method returns a `Command` that points
/// `STICKYCONF_CONFIG` and `STICKYCONF_DATA_DIR` into the temp directory
/// per-invocation, making tests parallel-safe.
pub struct TestEnv {
    pub dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn target_path(&self) -> PathBuf {
        self.path().join("service.conf")
    }

    pub fn overrides_path(&self) -> PathBuf {
        self.path().join("overrides.conf")
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join("config").join("config.kdl")
    }

    pub fn data_path(&self) -> PathBuf {
        self.path().join("data")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.data_path().join("backups")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_path().join("stickyconf.log")
    }

    pub fn write_target(&self, content: &str) {
        fs::write(self.target_path(), content).unwrap();
    }

    pub fn write_overrides(&self, content: &str) {
        fs::write(self.overrides_path(), content).unwrap();
    }

    pub fn read_target(&self) -> String {
        fs::read_to_string(self.target_path()).unwrap()
    }

    pub fn write_config(&self, content: &str) {
        let path = self.config_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Number of snapshot files in the backup directory.
    pub fn backup_count(&self) -> usize {
        match fs::read_dir(self.backup_dir()) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    /// The stickyconf binary, isolated from the user's environment.
    ///
    /// Diagnostics are switched off so stderr carries only the command's
    /// own error output.
    pub fn stickyconf(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_stickyconf"));
        cmd.current_dir(self.path());
        cmd.env("STICKYCONF_CONFIG", self.config_path());
        cmd.env("STICKYCONF_DATA_DIR", self.data_path());
        cmd.env_remove("STICKYCONF_TARGET");
        cmd.env_remove("STICKYCONF_OVERRIDES");
        cmd.env_remove("STICKYCONF_SERVICE");
        cmd.env("STICKYCONF_LOG", "off");
        cmd
    }

    /// The stickyconf binary with `--target` and `--overrides` set.
    pub fn stickyconf_with_files(&self) -> Command {
        let mut cmd = self.stickyconf();
        cmd.arg("--target").arg(self.target_path());
        cmd.arg("--overrides").arg(self.overrides_path());
        cmd
    }

    /// Run `once` and parse its JSON output.
    pub fn once_json(&self) -> serde_json::Value {
        let output = self
            .stickyconf_with_files()
            .arg("once")
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "once failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// The block wrapping `payload` with the default markers.
pub fn block(payload: &str) -> String {
    format!("{}\n{}\n{}", START, payload, END)
}
