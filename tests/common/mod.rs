//! Common test utilities and helpers
//!
//! Shared fixtures for the integration tests: a temporary project with a
//! config file, catalog partitions and a ledger, plus a way to run the
//! compiled binary against it.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Temporary uupforge project
pub struct TestProject {
    pub dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Project with `uupforge.toml` and the `w11-24h2` partition in place
    pub fn with_fixtures() -> Self {
        let project = Self::new();
        project.create_file("uupforge.toml", SAMPLE_CONFIG);
        project.create_file("catalog/w11-24h2.json", SAMPLE_PARTITION);
        project
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Run the binary inside the project with user directories sandboxed
    pub fn run(&self, args: &[&str]) -> Output {
        run_in(self.dir.path(), args)
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

pub fn run_in(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_uupforge"))
        .current_dir(dir)
        .args(args)
        .env("UUPFORGE_CONFIG_DIR", dir.join(".config"))
        .env("UUPFORGE_DATA_DIR", dir.join(".data"))
        .env("UUPFORGE_CACHE_DIR", dir.join(".cache"))
        .env_remove("UUPFORGE_CONFIG")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute uupforge")
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Config with two valid rules and relative paths
pub const SAMPLE_CONFIG: &str = r#"
[service]
base_url = "http://127.0.0.1:9"

[paths]
catalog_dir = "catalog"
ledger = "build_state.json"
output_dir = "output"
work_dir = "work"

[[rule]]
name = "Win11_24H2_x64_Latest"
category = "w11-24h2"
title_pattern = "^Windows 11, version 24H2"
arch = "x64"
language = "zh-cn"
editions = ["PROFESSIONAL", "CORE"]
virtual_editions = ["Enterprise"]
download_method = 3
options = ["updates", "cleanup"]

[[rule]]
name = "Win11_24H2_arm64"
category = "w11-24h2"
title_pattern = "^Windows 11"
arch = "arm64"
language = "en-us"
editions = ["PROFESSIONAL"]
download_method = 2
"#;

/// Partition with two x64 builds, `B` being the newer
pub const SAMPLE_PARTITION: &str = r#"{
  "category": "w11-24h2",
  "url": "https://uupdump.net/known.php?q=category:w11-24h2",
  "name": "Windows 11 24H2",
  "pages": 1,
  "versions": [
    {
      "title": "Windows 11, version 24H2 (Build A)",
      "href": "https://uupdump.net/selectlang.php?id=A",
      "id": "A",
      "arch": "x64",
      "addedAt": "2025-01-01 00:00:00 UTC"
    },
    {
      "title": "Windows 11, version 24H2 (Build B)",
      "href": "https://uupdump.net/selectlang.php?id=B",
      "id": "B",
      "arch": "x64",
      "addedAt": "2025-02-01 00:00:00 UTC"
    }
  ]
}
"#;
