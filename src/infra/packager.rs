//! Conversion bundle packaging
//!
//! Submits the resolved form to `get.php`, unpacks the returned bundle,
//! patches its conversion script for unattended use, runs it and moves the
//! resulting image to the output directory with a checksum and metadata.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;
use tokio::io::AsyncWriteExt;
use walkdir::WalkDir;

use crate::config::{defaults, urls};
use crate::core::orchestrator::{Artifact, Packager, PackagingRequest};
use crate::error::PackagingError;
use crate::infra::filesystem;

/// How the conversion script is started
#[derive(Debug, Clone)]
pub enum ScriptRunner {
    /// `<shell> -ExecutionPolicy Bypass -File <monitor> ...`; the monitor
    /// reports through `uup_monitor_status.txt`
    Monitor { shell: String, script: PathBuf },
    /// `cmd.exe /c <script>`; the newest `.iso` is taken on exit code 0
    Direct,
}

/// Packager driving the UUP dump conversion scripts
#[derive(Debug, Clone)]
pub struct ScriptPackager {
    client: reqwest::Client,
    base_url: String,
    work_dir: PathBuf,
    output_dir: PathBuf,
    runner: ScriptRunner,
    timeout_secs: u64,
}

/// Sidecar metadata written next to each image
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    pub rule: String,
    pub build_id: String,
    pub build_title: String,
    pub language: String,
    pub editions: Vec<String>,
    pub virtual_editions: Vec<String>,
    pub file_name: String,
    pub size: u64,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
    pub detail_url: String,
    pub download_url: String,
}

impl ScriptPackager {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        work_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        runner: ScriptRunner,
        timeout_secs: u64,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            work_dir: work_dir.into(),
            output_dir: output_dir.into(),
            runner,
            timeout_secs,
        }
    }

    fn get_url(&self, request: &PackagingRequest) -> Result<url::Url, PackagingError> {
        let raw = format!("{}/{}", self.base_url, urls::GET_PAGE);
        url::Url::parse_with_params(&raw, request.params.query_pairs()).map_err(|e| PackagingError::Transport {
            url: raw.clone(),
            error: e.to_string(),
        })
    }

    /// POST the form and stream the bundle to `<work_dir>/<id>.zip`
    pub async fn download_bundle(&self, request: &PackagingRequest) -> Result<PathBuf, PackagingError> {
        let url = self.get_url(request)?;
        let transport = |error: String| PackagingError::Transport {
            url: url.to_string(),
            error,
        };
        let dest = self.work_dir.join(format!("{}.zip", request.params.build_id));
        let io = |e: std::io::Error| PackagingError::Io {
            path: dest.clone(),
            error: e.to_string(),
        };

        tracing::info!("Requesting conversion bundle from {url}");
        let response = self
            .client
            .post(url.clone())
            .form(&request.params.form_fields())
            .send()
            .await
            .map_err(|e| transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(transport(format!("HTTP {}", response.status())));
        }

        tokio::fs::create_dir_all(&self.work_dir).await.map_err(io)?;
        let mut file = tokio::fs::File::create(&dest).await.map_err(io)?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transport(e.to_string()))?;
            file.write_all(&chunk).await.map_err(io)?;
        }
        file.flush().await.map_err(io)?;

        tracing::debug!("Bundle saved to {}", dest.display());
        Ok(dest)
    }

    async fn run_script(&self, script: &Path, dir: &Path) -> Result<String, PackagingError> {
        match &self.runner {
            ScriptRunner::Monitor { shell, script: monitor } => {
                if !monitor.is_file() {
                    return Err(PackagingError::Spawn {
                        program: monitor.display().to_string(),
                        error: "monitor script not found".to_string(),
                    });
                }
                let program = which::which(shell).map_err(|e| PackagingError::Spawn {
                    program: shell.clone(),
                    error: e.to_string(),
                })?;

                let mut command = tokio::process::Command::new(&program);
                command
                    .arg("-ExecutionPolicy")
                    .arg("Bypass")
                    .arg("-File")
                    .arg(monitor)
                    .arg("-ScriptPath")
                    .arg(script)
                    .arg("-WorkingDirectory")
                    .arg(dir)
                    .arg("-Timeout")
                    .arg(monitor_timeout(self.timeout_secs).to_string());
                let code = spawn_and_wait(command, shell, dir).await?;
                tracing::debug!("Monitor exited with {code:?}");

                let status_path = dir.join(defaults::MONITOR_STATUS_FILE);
                let status = tokio::fs::read_to_string(&status_path)
                    .await
                    .map_err(|_| PackagingError::Failed {
                        reason: "no monitor status file (script may have crashed)".to_string(),
                    })?;
                parse_monitor_status(&status)
            }
            ScriptRunner::Direct => {
                let mut command = tokio::process::Command::new("cmd.exe");
                command.arg("/c").arg(script);
                let code = spawn_and_wait(command, "cmd.exe", dir).await?;
                if code != Some(0) {
                    return Err(PackagingError::Failed {
                        reason: format!("conversion script exited with {code:?}"),
                    });
                }
                let dir = dir.to_path_buf();
                blocking("image lookup", move || {
                    newest_image(&dir).ok_or_else(|| PackagingError::ArtifactMissing {
                        name: "*.iso".to_string(),
                    })
                })
                .await
            }
        }
    }
}

impl ImageMetadata {
    fn new(request: &PackagingRequest, file_name: &str, download_url: String) -> Self {
        Self {
            rule: request.rule.clone(),
            build_id: request.build.id.clone(),
            build_title: request.build.title.clone(),
            language: request.params.language.clone(),
            editions: request.params.editions.clone(),
            virtual_editions: request.params.virtual_editions.clone(),
            file_name: file_name.to_string(),
            size: 0,
            sha256: String::new(),
            created_at: Utc::now(),
            detail_url: request.build.href.clone(),
            download_url,
        }
    }
}

#[async_trait]
impl Packager for ScriptPackager {
    async fn package(&self, request: &PackagingRequest) -> Result<Artifact, PackagingError> {
        let zip = self.download_bundle(request).await?;

        let dir = self.work_dir.join(format!("{}_extract", request.params.build_id));
        let work = dir.clone();
        let script = blocking("extraction", move || {
            extract_bundle(&zip, &work)?;
            prepare_script(&work)
        })
        .await?;
        tracing::info!("Running {}", script.display());

        let iso_name = self.run_script(&script, &dir).await?;

        let metadata = ImageMetadata::new(request, &iso_name, self.get_url(request)?.to_string());
        let output_dir = self.output_dir.clone();
        blocking("publishing", move || publish(&dir, &output_dir, metadata)).await
    }
}

/// Run file work off the async workers so the packaging timeout stays live
async fn blocking<T, F>(task: &str, work: F) -> Result<T, PackagingError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PackagingError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PackagingError::Failed {
            reason: format!("{task} task failed: {e}"),
        })?
}

/// `-Timeout` handed to the monitor, short of the packaging timeout so the
/// monitor stops its own process tree first
pub fn monitor_timeout(timeout_secs: u64) -> u64 {
    timeout_secs
        .saturating_sub(defaults::MONITOR_GRACE_SECS.min(timeout_secs / 4).max(1))
        .max(1)
}

async fn spawn_and_wait(
    mut command: tokio::process::Command,
    program: &str,
    dir: &Path,
) -> Result<Option<i32>, PackagingError> {
    let mut child = command
        .current_dir(dir)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PackagingError::Spawn {
            program: program.to_string(),
            error: e.to_string(),
        })?;
    // Declared after `child` so the tree goes down before the direct kill
    let mut guard = TreeGuard(child.id());
    let status = child.wait().await.map_err(|e| PackagingError::Spawn {
        program: program.to_string(),
        error: e.to_string(),
    })?;
    guard.disarm();
    Ok(status.code())
}

/// Kills the child's whole process tree if dropped before the child exits.
///
/// `kill_on_drop` only reaches the direct child; the conversion script,
/// aria2c and DISM run as its descendants.
struct TreeGuard(Option<u32>);

impl TreeGuard {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for TreeGuard {
    fn drop(&mut self) {
        if let Some(pid) = self.0.take() {
            kill_tree(pid);
        }
    }
}

#[cfg(windows)]
fn kill_tree(pid: u32) {
    tracing::warn!("Stopping process tree {pid}");
    let result = std::process::Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status();
    if let Err(e) = result {
        tracing::warn!("taskkill failed for {pid}: {e}");
    }
}

#[cfg(not(windows))]
fn kill_tree(pid: u32) {
    tracing::warn!("Stopping process {pid}");
}

/// Locate the conversion script and patch it in place
fn prepare_script(dir: &Path) -> Result<PathBuf, PackagingError> {
    let script = find_script(dir)?;
    let content = std::fs::read(&script).map_err(|e| PackagingError::Io {
        path: script.clone(),
        error: e.to_string(),
    })?;
    let content = String::from_utf8(content).map_err(|e| PackagingError::Bundle {
        path: script.clone(),
        error: e.to_string(),
    })?;
    filesystem::write_file(&script, &patch_script(&content)).map_err(|e| PackagingError::Io {
        path: script.clone(),
        error: e.to_string(),
    })?;
    Ok(script)
}

/// Move the image out of `source_dir` and write its checksum and metadata
/// sidecars
fn publish(source_dir: &Path, output_dir: &Path, mut metadata: ImageMetadata) -> Result<Artifact, PackagingError> {
    let iso_name = metadata.file_name.clone();
    let source = source_dir.join(&iso_name);
    if !source.is_file() {
        return Err(PackagingError::ArtifactMissing { name: iso_name });
    }
    let dest = output_dir.join(&iso_name);
    if dest.exists() {
        std::fs::remove_file(&dest).map_err(|e| PackagingError::Io {
            path: dest.clone(),
            error: e.to_string(),
        })?;
    }
    filesystem::move_file(&source, &dest).map_err(|e| PackagingError::Io {
        path: dest.clone(),
        error: e.to_string(),
    })?;

    let (sha256, size) = sha256_file(&dest)?;
    let sidecar = |suffix: &str| output_dir.join(format!("{iso_name}{suffix}"));
    let write = |path: PathBuf, content: String| {
        filesystem::write_file(&path, &content).map_err(|e| PackagingError::Io {
            path: path.clone(),
            error: e.to_string(),
        })
    };
    write(sidecar(".sha256.txt"), format!("{sha256}\n"))?;

    metadata.size = size;
    metadata.sha256 = sha256;
    metadata.created_at = Utc::now();
    let json = serde_json::to_string_pretty(&metadata).map_err(|e| PackagingError::Io {
        path: sidecar(".json"),
        error: e.to_string(),
    })?;
    write(sidecar(".json"), json)?;

    Ok(Artifact {
        name: iso_name,
        path: dest,
    })
}

/// Unpack a bundle into `dir`, emptied first.
///
/// Entries whose path would leave `dir` are rejected.
pub fn extract_bundle(zip_path: &Path, dir: &Path) -> Result<(), PackagingError> {
    let bundle_err = |error: String| PackagingError::Bundle {
        path: zip_path.to_path_buf(),
        error,
    };
    let file = std::fs::File::open(zip_path).map_err(|e| bundle_err(e.to_string()))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| bundle_err(e.to_string()))?;

    filesystem::recreate_dir(dir).map_err(|e| PackagingError::Io {
        path: dir.to_path_buf(),
        error: e.to_string(),
    })?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| bundle_err(e.to_string()))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(bundle_err(format!("entry '{}' escapes the extraction directory", entry.name())));
        };
        let target = dir.join(relative);
        let io = |e: std::io::Error| PackagingError::Io {
            path: target.clone(),
            error: e.to_string(),
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&target).map_err(io)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        let mut out = std::fs::File::create(&target).map_err(io)?;
        std::io::copy(&mut entry, &mut out).map_err(io)?;
    }
    Ok(())
}

/// Conversion script in the bundle root: a `.cmd` or `.bat`, preferring
/// names containing `uup` or `convert`
pub fn find_script(dir: &Path) -> Result<PathBuf, PackagingError> {
    let mut scripts: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("cmd") || e.eq_ignore_ascii_case("bat"))
        })
        .collect();
    scripts.sort();

    let preferred = scripts.iter().position(|p| {
        let name = p
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        name.contains("uup") || name.contains("convert")
    });
    match preferred {
        Some(i) => Ok(scripts.swap_remove(i)),
        None => scripts.into_iter().next().ok_or_else(|| PackagingError::ScriptNotFound {
            dir: dir.to_path_buf(),
        }),
    }
}

static PAUSE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^([ \t]*)(@?pause\b)").expect("pause pattern is valid"));

static ARIA2_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)(aria2c\.exe"?)"#).expect("aria2c pattern is valid"));

/// Make a conversion script run unattended.
///
/// `pause` lines are commented out and `aria2c.exe` calls get retry
/// arguments. Applying the patch twice changes nothing.
pub fn patch_script(content: &str) -> String {
    let content = PAUSE_LINE.replace_all(content, "${1}:: ${2}");
    content
        .split_inclusive('\n')
        .map(|line| {
            if line.contains("--retry-wait") {
                line.to_string()
            } else {
                ARIA2_CALL
                    .replace_all(line, format!("${{1}} {}", defaults::ARIA2_RETRY_ARGS).as_str())
                    .into_owned()
            }
        })
        .collect()
}

/// Image name from the monitor status file (`SUCCESS:<name>`)
pub fn parse_monitor_status(status: &str) -> Result<String, PackagingError> {
    let status = status.trim();
    let Some(name) = status.strip_prefix("SUCCESS:") else {
        return Err(PackagingError::Failed {
            reason: if status.is_empty() {
                "empty monitor status".to_string()
            } else {
                status.to_string()
            },
        });
    };

    let name = name.trim();
    let plain = Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name);
    if name.is_empty() || !plain {
        return Err(PackagingError::Failed {
            reason: format!("monitor reported an unusable image name '{name}'"),
        });
    }
    Ok(name.to_string())
}

/// Most recently modified `.iso` directly under `dir`
fn newest_image(dir: &Path) -> Option<String> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| {
            e.file_type().is_file()
                && e.path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("iso"))
        })
        .max_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()).unwrap_or(SystemTime::UNIX_EPOCH))
        .map(|e| e.file_name().to_string_lossy().into_owned())
}

/// Lower-case hex SHA-256 and size of a file
pub fn sha256_file(path: &Path) -> Result<(String, u64), PackagingError> {
    let io = |e: std::io::Error| PackagingError::Io {
        path: path.to_path_buf(),
        error: e.to_string(),
    };
    let mut file = std::fs::File::open(path).map_err(io)?;
    let mut hasher = Sha256::new();
    let size = std::io::copy(&mut file, &mut hasher).map_err(io)?;
    Ok((hex::encode(hasher.finalize()), size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::CatalogEntry;
    use crate::core::prober::ResolvedParameters;
    use crate::core::rule::{ConversionOption, DownloadMethod};
    use crate::test_utils::generators::script_line;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            for (name, content) in files {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    fn request() -> PackagingRequest {
        PackagingRequest {
            rule: "Win11_24H2_x64_Latest".to_string(),
            build: CatalogEntry {
                title: "Windows 11, version 24H2 (26100.1)".to_string(),
                href: "https://uupdump.net/selectlang.php?id=B".to_string(),
                id: "B".to_string(),
                arch: Some("x64".to_string()),
                added_at: None,
            },
            params: ResolvedParameters {
                build_id: "B".to_string(),
                language: "zh-cn".to_string(),
                editions: vec!["PROFESSIONAL".to_string(), "CORE".to_string()],
                compound_edition: "professional;core".to_string(),
                download_method: DownloadMethod::ConvertWithVirtualEditions,
                options: vec![ConversionOption::Updates, ConversionOption::Esd],
                virtual_editions: vec!["Enterprise".to_string()],
            },
        }
    }

    #[test]
    fn test_patch_script() {
        let script = "@echo off\r\npause\r\n  @PAUSE\r\necho pause here\r\n\"%~dp0bin\\aria2c.exe\" -x16 -i list.txt\r\n";
        let patched = patch_script(script);

        assert!(patched.contains("\r\n:: pause\r\n"));
        assert!(patched.contains("  :: @PAUSE\r\n"));
        assert!(patched.contains("echo pause here"));
        assert!(patched.contains("aria2c.exe\" --retry-wait=5 --max-tries=5 -x16"));
    }

    #[test]
    fn test_patch_script_idempotent() {
        let script = "pause\naria2c.exe -i list.txt\n";
        let once = patch_script(script);
        assert_eq!(patch_script(&once), once);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_patch_script_idempotent(lines in prop::collection::vec(script_line(), 0..12)) {
            let once = patch_script(&lines.join("\n"));
            prop_assert_eq!(patch_script(&once), once.clone());
            prop_assert_eq!(once.matches("--retry-wait").count(), lines.iter().filter(|l| l.contains("aria2c.exe")).count());
        }
    }

    #[test]
    fn test_parse_monitor_status() {
        assert_eq!(parse_monitor_status("SUCCESS:26100.1_X64.ISO\r\n").unwrap(), "26100.1_X64.ISO");
        assert!(matches!(
            parse_monitor_status("FAILED: dism error 0x800f081f"),
            Err(PackagingError::Failed { reason }) if reason.contains("dism")
        ));
        assert!(parse_monitor_status("SUCCESS:").is_err());
        assert!(parse_monitor_status("SUCCESS:../evil.iso").is_err());
    }

    #[test]
    fn test_monitor_timeout_leaves_grace() {
        assert_eq!(monitor_timeout(7200), 7140);
        assert_eq!(monitor_timeout(60), 45);
        assert_eq!(monitor_timeout(4), 3);
        assert_eq!(monitor_timeout(1), 1);
        assert_eq!(monitor_timeout(0), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_monitor_stops_before_packaging_timeout(total in 2u64..1_000_000) {
            let limit = monitor_timeout(total);
            prop_assert!(limit >= 1);
            prop_assert!(limit < total);
        }
    }

    #[test]
    fn test_find_script_prefers_converter() {
        let dir = TempDir::new().unwrap();
        for name in ["aaa.cmd", "uup_download_windows.cmd", "readme.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let script = find_script(dir.path()).unwrap();
        assert_eq!(script.file_name().unwrap(), "uup_download_windows.cmd");
    }

    #[test]
    fn test_find_script_missing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("readme.txt"), "").unwrap();
        assert!(matches!(find_script(dir.path()), Err(PackagingError::ScriptNotFound { .. })));
    }

    #[test]
    fn test_extract_bundle() {
        let dir = TempDir::new().unwrap();
        let zip = dir.path().join("B.zip");
        std::fs::write(&zip, zip_bytes(&[("uup_download_windows.cmd", "pause"), ("files/aria2c.exe", "bin")])).unwrap();
        let target = dir.path().join("B_extract");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("stale.iso"), "old").unwrap();

        extract_bundle(&zip, &target).unwrap();

        assert!(target.join("uup_download_windows.cmd").is_file());
        assert!(target.join("files/aria2c.exe").is_file());
        assert!(!target.join("stale.iso").exists());
    }

    #[test]
    fn test_extract_rejects_escaping_entries() {
        let dir = TempDir::new().unwrap();
        let zip = dir.path().join("B.zip");
        std::fs::write(&zip, zip_bytes(&[("../evil.cmd", "x")])).unwrap();

        let err = extract_bundle(&zip, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, PackagingError::Bundle { .. }));
        assert!(!dir.path().join("evil.cmd").exists());
    }

    #[test]
    fn test_extract_rejects_non_zip() {
        let dir = TempDir::new().unwrap();
        let zip = dir.path().join("B.zip");
        std::fs::write(&zip, "<html>Error</html>").unwrap();
        assert!(matches!(
            extract_bundle(&zip, &dir.path().join("out")),
            Err(PackagingError::Bundle { .. })
        ));
    }

    #[test]
    fn test_sha256_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.iso");
        std::fs::write(&file, "hello").unwrap();

        let (hash, size) = sha256_file(&file).unwrap();
        assert_eq!(size, 5);
        assert_eq!(hash, "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824");
    }

    #[tokio::test]
    async fn test_download_bundle_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/get.php"))
            .and(query_param("id", "B"))
            .and(query_param("pack", "zh-cn"))
            .and(query_param("edition", "professional;core"))
            .and(body_string_contains("autodl=3"))
            .and(body_string_contains("updates=1"))
            .and(body_string_contains("virtualEditions%5B%5D=Enterprise"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(zip_bytes(&[("convert.cmd", "pause")])))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let packager = ScriptPackager::new(
            reqwest::Client::new(),
            server.uri(),
            dir.path().join("work"),
            dir.path().join("out"),
            ScriptRunner::Direct,
            60,
        );

        let zip = packager.download_bundle(&request()).await.unwrap();
        assert_eq!(zip, dir.path().join("work/B.zip"));
        assert!(std::fs::metadata(&zip).unwrap().len() > 0);
    }

    #[tokio::test]
    async fn test_download_bundle_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let packager = ScriptPackager::new(
            reqwest::Client::new(),
            server.uri(),
            dir.path(),
            dir.path(),
            ScriptRunner::Direct,
            60,
        );
        assert!(matches!(
            packager.download_bundle(&request()).await,
            Err(PackagingError::Transport { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_package_with_monitor() {
        use std::os::unix::fs::PermissionsExt;

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/get.php"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(zip_bytes(&[(
                "uup_download_windows.cmd",
                "@echo off\npause\n",
            )])))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        // Stand-in for the monitor shell: writes an image and a status file
        let shell = dir.path().join("fake-shell");
        std::fs::write(
            &shell,
            "#!/bin/sh\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = \"-WorkingDirectory\" ]; then wd=\"$2\"; fi\n  if [ \"$1\" = \"-Timeout\" ]; then limit=\"$2\"; fi\n  shift\ndone\nprintf \"$limit\" > \"$wd/timeout.txt\"\nprintf image > \"$wd/26100.1_PRO_X64.ISO\"\nprintf 'SUCCESS:26100.1_PRO_X64.ISO' > \"$wd/uup_monitor_status.txt\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&shell, std::fs::Permissions::from_mode(0o755)).unwrap();
        let monitor = dir.path().join("monitor-uup-script.ps1");
        std::fs::write(&monitor, "").unwrap();

        let out = dir.path().join("out");
        let packager = ScriptPackager::new(
            reqwest::Client::new(),
            server.uri(),
            dir.path().join("work"),
            &out,
            ScriptRunner::Monitor {
                shell: shell.display().to_string(),
                script: monitor,
            },
            60,
        );

        let artifact = packager.package(&request()).await.unwrap();

        assert_eq!(artifact.name, "26100.1_PRO_X64.ISO");
        assert_eq!(artifact.path, out.join("26100.1_PRO_X64.ISO"));
        assert_eq!(std::fs::read_to_string(&artifact.path).unwrap(), "image");
        let sha = std::fs::read_to_string(out.join("26100.1_PRO_X64.ISO.sha256.txt")).unwrap();
        assert_eq!(sha.trim().len(), 64);
        let meta: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join("26100.1_PRO_X64.ISO.json")).unwrap()).unwrap();
        assert_eq!(meta["buildId"], "B");
        assert_eq!(meta["virtualEditions"][0], "Enterprise");

        let script = std::fs::read_to_string(dir.path().join("work/B_extract/uup_download_windows.cmd")).unwrap();
        assert!(script.contains(":: pause"));
        let limit = std::fs::read_to_string(dir.path().join("work/B_extract/timeout.txt")).unwrap();
        assert_eq!(limit, "45");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_package_without_status_file_fails() {
        use std::os::unix::fs::PermissionsExt;

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(zip_bytes(&[("convert.cmd", "")])))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let shell = dir.path().join("crashing-shell");
        std::fs::write(&shell, "#!/bin/sh\nexit 1\n").unwrap();
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
            60,
        );

        let err = packager.package(&request()).await.unwrap_err();
        assert!(matches!(err, PackagingError::Failed { reason } if reason.contains("status file")));
    }
}
