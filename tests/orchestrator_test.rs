//! Integration tests for the run loop
//!
//! Drives the orchestrator through the library API with in-memory
//! collaborators: selection, ledger skips, rule validation, missing
//! virtual editions, idempotence and ledger monotonicity. One scenario runs
//! the real script packager against a fake monitor to check the packaging
//! timeout.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

use uupforge::core::catalog::{CatalogEntry, CatalogPartition, CatalogSource};
use uupforge::core::ledger::{FileLedgerStore, LedgerEntry, LedgerMap, LedgerStore, MemoryLedgerStore};
use uupforge::core::matcher::select_build;
use uupforge::core::orchestrator::{Artifact, Orchestrator, Packager, PackagingRequest};
use uupforge::core::prober::{FormChoice, ProbeTransport};
use uupforge::core::rule::{
    validate_rules, ConfiguredRule, RawDownloadMethod, RawVirtualEditions, RuleSpec, SelectionRule,
};
use uupforge::core::summary::RuleStatus;
use uupforge::error::{CatalogError, PackagingError, ProbeError, RuleError};

struct MapCatalog(HashMap<String, CatalogPartition>);

impl CatalogSource for MapCatalog {
    fn load(&self, category: &str) -> Result<CatalogPartition, CatalogError> {
        self.0.get(category).cloned().ok_or_else(|| CatalogError::NotFound {
            category: category.to_string(),
        })
    }
}

/// Offers zh-cn and en-us, two base editions and a configurable set of
/// virtual editions
struct FakeTransport {
    virtual_editions: Vec<&'static str>,
    calls: AtomicUsize,
}

impl FakeTransport {
    fn new(virtual_editions: Vec<&'static str>) -> Self {
        Self {
            virtual_editions,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ProbeTransport for FakeTransport {
    async fn languages(&self, _build_id: &str) -> Result<Vec<FormChoice>, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            FormChoice::new("Chinese (Simplified)", "zh-cn"),
            FormChoice::new("English (United States)", "en-us"),
        ])
    }

    async fn editions(&self, _build_id: &str, _language: &str) -> Result<Vec<FormChoice>, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            FormChoice::new("Windows Home", "CORE"),
            FormChoice::new("Windows Pro", "PROFESSIONAL"),
        ])
    }

    async fn virtual_editions(&self, _: &str, _: &str, _: &str) -> Result<Vec<FormChoice>, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .virtual_editions
            .iter()
            .map(|v| FormChoice::new(*v, *v))
            .collect())
    }
}

/// Records every request; fails when `fail` is set
#[derive(Default)]
struct RecordingPackager {
    requests: Mutex<Vec<PackagingRequest>>,
    fail: bool,
}

impl RecordingPackager {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Packager for RecordingPackager {
    async fn package(&self, request: &PackagingRequest) -> Result<Artifact, PackagingError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(PackagingError::Failed {
                reason: "dism exited with 0x800f081f".to_string(),
            });
        }
        let name = format!("{}_{}.ISO", request.build.id, request.params.language.to_uppercase());
        Ok(Artifact {
            path: PathBuf::from("/out").join(&name),
            name,
        })
    }
}

fn entry(id: &str, added_at: &str) -> CatalogEntry {
    CatalogEntry {
        title: format!("Windows 11, version 24H2 (Build {id})"),
        href: format!("https://uupdump.net/selectlang.php?id={id}"),
        id: id.to_string(),
        arch: Some("x64".to_string()),
        added_at: Some(added_at.to_string()),
    }
}

fn catalog(entries: Vec<CatalogEntry>) -> MapCatalog {
    let mut partition = CatalogPartition::new(
        "w11-24h2",
        "https://uupdump.net/known.php?q=category:w11-24h2",
        "Windows 11 24H2",
    );
    partition.versions = entries;
    MapCatalog(HashMap::from([("w11-24h2".to_string(), partition)]))
}

fn scenario_catalog() -> MapCatalog {
    catalog(vec![
        entry("A", "2025-01-01 00:00:00 UTC"),
        entry("B", "2025-02-01 00:00:00 UTC"),
    ])
}

fn rule_spec(name: &str) -> RuleSpec {
    RuleSpec {
        name: name.to_string(),
        category: "w11-24h2".to_string(),
        title_pattern: "^Windows 11, version 24H2".to_string(),
        arch: "x64".to_string(),
        language: "zh-cn".to_string(),
        editions: vec!["PROFESSIONAL".to_string(), "CORE".to_string()],
        virtual_editions: RawVirtualEditions::default(),
        download_method: Some(RawDownloadMethod::Number(2)),
        options: vec!["updates".to_string()],
    }
}

fn ledger_with(rule: &str, build_id: &str) -> MemoryLedgerStore {
    let at = Utc.with_ymd_and_hms(2025, 2, 2, 0, 0, 0).unwrap();
    MemoryLedgerStore::with_entries(LedgerMap::from([(rule.to_string(), LedgerEntry::success(build_id, at))]))
}

const TIMEOUT: Duration = Duration::from_secs(60);

#[test]
fn test_scenario_a_latest_build_wins() {
    let catalog = scenario_catalog();
    let rule = SelectionRule::try_from(&rule_spec("R")).unwrap();
    let partition = catalog.load("w11-24h2").unwrap();

    let selected = select_build(&rule, &partition).unwrap();
    assert_eq!(selected.id, "B");
}

#[tokio::test]
async fn test_scenario_b_up_to_date_skips_packaging() {
    let catalog = scenario_catalog();
    let transport = FakeTransport::new(Vec::new());
    let packager = RecordingPackager::default();
    let ledger = ledger_with("R", "B");
    let orchestrator = Orchestrator::new(&catalog, &transport, &packager, &ledger, TIMEOUT);

    let summary = orchestrator.run(&validate_rules(&[rule_spec("R")])).await;

    assert_eq!(summary.rules[0].status, RuleStatus::SkippedUpToDate);
    assert_eq!(summary.rules[0].build_id.as_deref(), Some("B"));
    assert_eq!(packager.calls(), 0);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_scenario_c_virtual_editions_need_method_3() {
    let mut spec = rule_spec("R");
    spec.virtual_editions = RawVirtualEditions::List(vec!["Enterprise".to_string()]);
    spec.download_method = Some(RawDownloadMethod::Text("2".to_string()));

    let rules = validate_rules(&[spec]);
    assert!(matches!(
        &rules[0],
        ConfiguredRule::Invalid {
            error: RuleError::VirtualEditionsRequireMethod3 { method: 2, .. },
            ..
        }
    ));

    let catalog = scenario_catalog();
    let transport = FakeTransport::new(vec!["Enterprise"]);
    let packager = RecordingPackager::default();
    let ledger = MemoryLedgerStore::new();
    let orchestrator = Orchestrator::new(&catalog, &transport, &packager, &ledger, TIMEOUT);

    let summary = orchestrator.run(&rules).await;

    assert_eq!(summary.rules[0].status, RuleStatus::Failed);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    assert_eq!(packager.calls(), 0);
    assert!(ledger.entries().unwrap().is_empty());
}

#[tokio::test]
async fn test_scenario_d_missing_virtual_editions_still_packages() {
    let mut spec = rule_spec("R");
    spec.virtual_editions = RawVirtualEditions::List(vec!["Enterprise".to_string(), "Education".to_string()]);
    spec.download_method = Some(RawDownloadMethod::Number(3));

    let catalog = scenario_catalog();
    let transport = FakeTransport::new(Vec::new());
    let packager = RecordingPackager::default();
    let ledger = MemoryLedgerStore::new();
    let orchestrator = Orchestrator::new(&catalog, &transport, &packager, &ledger, TIMEOUT);

    let summary = orchestrator.run(&validate_rules(&[spec])).await;

    assert_eq!(summary.rules[0].status, RuleStatus::Succeeded);
    let requests = packager.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].params.virtual_editions.is_empty());
    assert_eq!(requests[0].params.compound_edition, "professional;core");
    assert_eq!(ledger.get("R").unwrap().unwrap().last_build_id, "B");
}

#[tokio::test]
async fn test_new_build_replaces_ledger_entry() {
    let catalog = scenario_catalog();
    let transport = FakeTransport::new(Vec::new());
    let packager = RecordingPackager::default();
    let ledger = ledger_with("R", "A");
    let orchestrator = Orchestrator::new(&catalog, &transport, &packager, &ledger, TIMEOUT);

    let summary = orchestrator.run(&validate_rules(&[rule_spec("R")])).await;

    assert_eq!(summary.rules[0].status, RuleStatus::Succeeded);
    assert_eq!(summary.rules[0].artifact.as_deref(), Some("B_ZH-CN.ISO"));
    assert_eq!(ledger.get("R").unwrap().unwrap().last_build_id, "B");
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let ledger_path = dir.path().join("build_state.json");
    let catalog = scenario_catalog();
    let transport = FakeTransport::new(Vec::new());
    let packager = RecordingPackager::default();
    let ledger = FileLedgerStore::new(&ledger_path);
    let orchestrator = Orchestrator::new(&catalog, &transport, &packager, &ledger, TIMEOUT);
    let rules = validate_rules(&[rule_spec("R"), rule_spec("S")]);

    let first = orchestrator.run(&rules).await;
    assert_eq!(first.count(RuleStatus::Succeeded), 2);
    assert_eq!(packager.calls(), 2);
    let before = std::fs::read(&ledger_path).unwrap();

    let second = orchestrator.run(&rules).await;
    assert_eq!(second.count(RuleStatus::SkippedUpToDate), 2);
    assert_eq!(packager.calls(), 2);
    assert_eq!(std::fs::read(&ledger_path).unwrap(), before);
}

#[tokio::test]
async fn test_failures_never_touch_the_ledger() {
    let catalog = scenario_catalog();
    let transport = FakeTransport::new(Vec::new());
    let packager = RecordingPackager::failing();
    let ledger = ledger_with("R", "A");
    let before = ledger.entries().unwrap();
    let orchestrator = Orchestrator::new(&catalog, &transport, &packager, &ledger, TIMEOUT);

    let summary = orchestrator.run(&validate_rules(&[rule_spec("R"), rule_spec("S")])).await;

    assert_eq!(summary.count(RuleStatus::Failed), 2);
    assert!(summary.rules[0].reason.as_deref().unwrap().contains("0x800f081f"));
    assert_eq!(ledger.entries().unwrap(), before);
}

#[tokio::test]
async fn test_probe_failure_is_rule_fatal_only() {
    let catalog = scenario_catalog();
    let transport = FakeTransport::new(Vec::new());
    let packager = RecordingPackager::default();
    let ledger = MemoryLedgerStore::new();
    let orchestrator = Orchestrator::new(&catalog, &transport, &packager, &ledger, TIMEOUT);
    let mut unknown_language = rule_spec("R");
    unknown_language.language = "xx-xx".to_string();

    let summary = orchestrator
        .run(&validate_rules(&[unknown_language, rule_spec("S")]))
        .await;

    assert_eq!(summary.rules[0].status, RuleStatus::Failed);
    assert_eq!(summary.rules[1].status, RuleStatus::Succeeded);
    assert!(ledger.get("R").unwrap().is_none());
    assert_eq!(packager.calls(), 1);
}

#[tokio::test]
async fn test_no_match_is_soft_skip() {
    let catalog = scenario_catalog();
    let transport = FakeTransport::new(Vec::new());
    let packager = RecordingPackager::default();
    let ledger = MemoryLedgerStore::new();
    let orchestrator = Orchestrator::new(&catalog, &transport, &packager, &ledger, TIMEOUT);
    let mut arm = rule_spec("R");
    arm.arch = "arm64".to_string();

    let summary = orchestrator.run(&validate_rules(&[arm])).await;

    assert_eq!(summary.rules[0].status, RuleStatus::SkippedNoMatch);
    assert!(!summary.has_failures());
    assert_eq!(packager.calls(), 0);
}

/// Conversion bundle holding a single script
#[cfg(unix)]
fn bundle() -> Vec<u8> {
    use std::io::Write;

    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buf);
        writer
            .start_file("convert.cmd", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"@echo off\r\npause\r\n").unwrap();
        writer.finish().unwrap();
    }
    buf.into_inner()
}

#[cfg(unix)]
#[test]
fn test_publishing_a_large_image_is_bounded_by_timeout() {
    use std::os::unix::fs::PermissionsExt;
    use std::time::Instant;
    use uupforge::infra::packager::{ScriptPackager, ScriptRunner};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (summary, elapsed, ledger) = runtime.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bundle()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        // Reports a 1 GiB sparse image; hashing it outlasts the timeout
        let shell = dir.path().join("fake-shell");
        std::fs::write(
            &shell,
            "#!/bin/sh\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = \"-WorkingDirectory\" ]; then wd=\"$2\"; fi\n  shift\ndone\ndd if=/dev/zero of=\"$wd/big.iso\" bs=1 count=0 seek=1073741824 2>/dev/null\nprintf 'SUCCESS:big.iso' > \"$wd/uup_monitor_status.txt\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&shell, std::fs::Permissions::from_mode(0o755)).unwrap();
        let monitor = dir.path().join("monitor.ps1");
        std::fs::write(&monitor, "").unwrap();

        let packager = ScriptPackager::new(
            reqwest::Client::new(),
            server.uri(),
            dir.path().join("work"),
            dir.path().join("out"),
            ScriptRunner::Monitor {
                shell: shell.display().to_string(),
                script: monitor,
            },
            1,
        );
        let catalog = scenario_catalog();
        let transport = FakeTransport::new(Vec::new());
        let ledger = MemoryLedgerStore::new();
        let orchestrator = Orchestrator::new(&catalog, &transport, &packager, &ledger, Duration::from_millis(100));

        let started = Instant::now();
        let summary = orchestrator.run(&validate_rules(&[rule_spec("R")])).await;
        (summary, started.elapsed(), ledger.entries().unwrap())
    });
    // The abandoned hash may still be running on a blocking thread
    runtime.shutdown_background();

    assert_eq!(summary.rules[0].status, RuleStatus::Failed);
    assert!(summary.rules[0].reason.as_deref().unwrap().contains("timed out"));
    assert!(elapsed < Duration::from_secs(10), "run took {elapsed:?}");
    assert!(ledger.is_empty());
}
