//! Docker-backed execution sandbox.
//!
//! A [`Sandbox`] wraps one container providing an isolated filesystem and
//! Python/R runtime. All file transfer rides on tar archives through the
//! Docker Engine API - the only transport that works portably in both
//! directions. Executed code is staged under `/code/`, run with the
//! workspace as its working directory, and any new non-tabular files in
//! the workspace are pulled to the host as artifacts.
//!
//! Lifecycle: `created → running → stopped`; a stopped handle is terminal.
//! The sandbox is optional at the agent level - construction failure
//! degrades agents to a local workspace with no execution capability.
//!
//! Peak memory is observed by a sampler task polling container stats
//! roughly every 100 ms while the interpreter runs; the container runtime
//! does not report per-process peaks.

use crate::error::{Result, SandboxError};
use crate::result::CodeExecutionResult;
use crate::table::UploadPayload;
use crate::truncate::truncate_middle_tokens;
use bollard::container::{
    Config, DownloadFromContainerOptions, KillContainerOptions, RemoveContainerOptions,
    StatsOptions, UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::Docker;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Default sandbox image; must be built/pulled in advance.
pub const DEFAULT_IMAGE: &str = "bioweave-sandbox-py:latest";

/// Workspace directory inside the container.
pub const DEFAULT_WORKDIR: &str = "/workdir";

/// Default middle-truncation cap for raw execution output, in approximate
/// tokens. The code-execution *tool* applies its own, much smaller cap.
pub const DEFAULT_RAW_OUTPUT_CAP: usize = 100_000;

/// Memory sampler period.
const STATS_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// File extensions treated as tabular data, excluded from artifact pulls.
const TABULAR_EXTENSIONS: &[&str] = &["csv", "tsv", "txt"];

/// Interpreter selection for [`Sandbox::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    /// CPython (`python` on PATH)
    Python,
    /// R (`Rscript` on PATH)
    R,
}

impl Language {
    fn extension(&self) -> &'static str {
        match self {
            Self::Python => "py",
            Self::R => "r",
        }
    }

    fn interpreter(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::R => "Rscript",
        }
    }
}

impl std::str::FromStr for Language {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "python" => Ok(Self::Python),
            "r" => Ok(Self::R),
            other => Err(SandboxError::InvalidInput(format!(
                "unknown language '{}' (use python or r)",
                other
            ))),
        }
    }
}

/// Handle to a running sandbox container.
pub struct Sandbox {
    docker: Docker,
    container_id: String,
    workdir: String,
    raw_output_cap: usize,
    /// Uploaded dataset paths a workspace clear must not delete
    preserve: Mutex<Vec<String>>,
    /// Host paths accumulated for cleanup on stop
    artifact_paths: Mutex<Vec<PathBuf>>,
    stopped: AtomicBool,
}

impl Sandbox {
    /// Start a fresh container from `image`.
    pub async fn start(image: &str) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        let created = docker
            .create_container::<String, String>(
                None,
                Config {
                    image: Some(image.to_string()),
                    tty: Some(true),
                    ..Default::default()
                },
            )
            .await?;
        docker
            .start_container::<String>(&created.id, None)
            .await?;

        let sandbox = Self::from_parts(docker, created.id);
        let workdir = sandbox.workdir.clone();
        sandbox.exec_ok(vec!["mkdir", "-p", &workdir]).await?;
        tracing::info!(container_id = %sandbox.container_id, "Sandbox started");
        Ok(sandbox)
    }

    /// Re-attach to an existing container. Idempotent: the container is
    /// inspected, not restarted.
    pub async fn attach(container_id: &str) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        docker.inspect_container(container_id, None).await?;
        let sandbox = Self::from_parts(docker, container_id.to_string());
        let workdir = sandbox.workdir.clone();
        sandbox.exec_ok(vec!["mkdir", "-p", &workdir]).await?;
        tracing::info!(container_id = %sandbox.container_id, "Sandbox attached");
        Ok(sandbox)
    }

    fn from_parts(docker: Docker, container_id: String) -> Self {
        Self {
            docker,
            container_id,
            workdir: DEFAULT_WORKDIR.to_string(),
            raw_output_cap: DEFAULT_RAW_OUTPUT_CAP,
            preserve: Mutex::new(Vec::new()),
            artifact_paths: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Override the raw output truncation cap.
    pub fn with_raw_output_cap(mut self, cap: usize) -> Self {
        self.raw_output_cap = cap;
        self
    }

    /// The container id.
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// The workspace path inside the container.
    pub fn workdir(&self) -> &str {
        &self.workdir
    }

    /// Paths registered as preserved uploads.
    pub fn preserved_files(&self) -> Vec<String> {
        self.preserve.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            Err(SandboxError::Stopped)
        } else {
            Ok(())
        }
    }

    fn pack_tar(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, content.as_slice())
                .map_err(|e| SandboxError::Archive(e.to_string()))?;
        }
        builder
            .into_inner()
            .map_err(|e| SandboxError::Archive(e.to_string()))
    }

    async fn push_archive(&self, target_dir: &str, tar_bytes: Vec<u8>) -> Result<()> {
        self.docker
            .upload_to_container(
                &self.container_id,
                Some(UploadToContainerOptions {
                    path: target_dir.to_string(),
                    ..Default::default()
                }),
                tar_bytes.into(),
            )
            .await?;
        Ok(())
    }

    async fn pull_archive(&self, container_path: &str, output_dir: &Path) -> Result<()> {
        let mut stream = self.docker.download_from_container(
            &self.container_id,
            Some(DownloadFromContainerOptions {
                path: container_path.to_string(),
            }),
        );
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        let mut archive = tar::Archive::new(bytes.as_slice());
        archive
            .unpack(output_dir)
            .map_err(|e| SandboxError::Archive(e.to_string()))?;
        Ok(())
    }

    async fn exec_capture(&self, cmd: Vec<String>, workdir: Option<&str>) -> Result<(i64, String)> {
        let exec = self
            .docker
            .create_exec(
                &self.container_id,
                CreateExecOptions {
                    cmd: Some(cmd),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir: workdir.map(|w| w.to_string()),
                    ..Default::default()
                },
            )
            .await?;

        let mut output = String::new();
        if let StartExecResults::Attached { output: mut logs, .. } =
            self.docker.start_exec(&exec.id, None).await?
        {
            while let Some(chunk) = logs.next().await {
                let chunk = chunk?;
                output.push_str(&String::from_utf8_lossy(&chunk.into_bytes()));
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        Ok((inspect.exit_code.unwrap_or(-1), output))
    }

    async fn exec_ok(&self, cmd: Vec<&str>) -> Result<()> {
        let cmd = cmd.into_iter().map(|s| s.to_string()).collect();
        self.exec_capture(cmd, None).await?;
        Ok(())
    }

    /// Upload data to `target_path` inside the container.
    ///
    /// Tables serialize by the target extension; bytes and text are
    /// written verbatim. The payload is packed into an in-memory tar
    /// stream and pushed at the target directory.
    pub async fn upload(&self, payload: UploadPayload, target_path: &str) -> Result<()> {
        self.ensure_running()?;
        let file_name = target_path
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                SandboxError::InvalidInput(format!("target path '{}' has no file name", target_path))
            })?
            .to_string();
        let target_dir = match target_path.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(idx) => target_path[..idx].to_string(),
        };

        let content = payload.into_bytes(target_path)?;
        let tar_bytes = Self::pack_tar(&[(file_name, content)])?;
        self.exec_ok(vec!["mkdir", "-p", &target_dir]).await?;
        self.push_archive(&target_dir, tar_bytes).await?;
        Ok(())
    }

    /// Upload local tables in bulk, recording each target as preserved so
    /// later workspace clears keep the datasets.
    pub async fn upload_tables(&self, pairs: &[(PathBuf, String)]) -> Result<()> {
        self.ensure_running()?;
        for (local_path, target_path) in pairs {
            let content = std::fs::read(local_path)?;
            self.upload(UploadPayload::Bytes(content), target_path)
                .await?;
            if let Ok(mut preserve) = self.preserve.lock() {
                preserve.push(target_path.clone());
            }
            tracing::debug!(target = %target_path, "Uploaded table");
        }
        Ok(())
    }

    /// Execute code in the container and collect output, artifacts, and
    /// resource metrics.
    ///
    /// Non-zero exit codes are reported in the result, not raised. The
    /// sandbox enforces no timeout of its own; callers that need one wrap
    /// this call.
    pub async fn execute(&self, language: Language, code: &str) -> Result<CodeExecutionResult> {
        self.ensure_running()?;
        let execution_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        let script_name = format!("{}.{}", execution_id, language.extension());
        let script_path = format!("/code/{}", script_name);

        // Stage the code under /code.
        self.exec_ok(vec!["mkdir", "-p", "/code"]).await?;
        let tar_bytes = Self::pack_tar(&[(script_name, code.as_bytes().to_vec())])?;
        self.push_archive("/code", tar_bytes).await?;

        // Sampler records the max container memory while the code runs.
        let peak_bytes = Arc::new(AtomicU64::new(0));
        let sampler = {
            let docker = self.docker.clone();
            let container_id = self.container_id.clone();
            let peak_bytes = peak_bytes.clone();
            tokio::spawn(async move {
                loop {
                    let mut stats = docker.stats(
                        &container_id,
                        Some(StatsOptions {
                            stream: false,
                            one_shot: false,
                        }),
                    );
                    if let Some(Ok(sample)) = stats.next().await {
                        if let Some(usage) = sample.memory_stats.usage {
                            peak_bytes.fetch_max(usage, Ordering::SeqCst);
                        }
                    }
                    tokio::time::sleep(STATS_SAMPLE_INTERVAL).await;
                }
            })
        };

        let started = Instant::now();
        let run = self
            .exec_capture(
                vec![language.interpreter().to_string(), script_path],
                Some(&self.workdir),
            )
            .await;
        let running_time_s = started.elapsed().as_secs_f64();
        sampler.abort();

        let (exit_code, raw_output) = run?;
        let console_output = truncate_middle_tokens(&raw_output, self.raw_output_cap);
        let peak_memory_mb = peak_bytes.load(Ordering::SeqCst) as f64 / (1024.0 * 1024.0);

        let artifacts = self.collect_artifacts(&execution_id).await?;
        tracing::debug!(
            exit_code,
            running_time_s,
            peak_memory_mb,
            artifact_count = artifacts.len(),
            "Execution finished"
        );

        Ok(CodeExecutionResult {
            code: code.to_string(),
            console_output,
            running_time_s,
            peak_memory_mb,
            exit_code,
            artifact_paths: artifacts
                .iter()
                .map(|p| p.to_string_lossy().to_string())
                .collect(),
        })
    }

    /// Pull non-tabular workspace files to `/tmp/<exec_id>/` on the host.
    async fn collect_artifacts(&self, execution_id: &str) -> Result<Vec<PathBuf>> {
        let (_, listing) = self
            .exec_capture(
                vec!["ls".to_string(), self.workdir.clone()],
                None,
            )
            .await?;

        let host_dir = std::env::temp_dir().join(execution_id);
        let mut artifacts = Vec::new();
        let mut host_dir_created = false;

        for file in listing.split('\n').map(str::trim).filter(|f| !f.is_empty()) {
            let extension = file.rsplit('.').next().unwrap_or("").to_lowercase();
            if TABULAR_EXTENSIONS.contains(&extension.as_str()) {
                continue;
            }
            if !host_dir_created {
                std::fs::create_dir_all(&host_dir)?;
                if let Ok(mut tracked) = self.artifact_paths.lock() {
                    tracked.push(host_dir.clone());
                }
                host_dir_created = true;
            }
            let container_path = format!("{}/{}", self.workdir, file);
            if let Err(e) = self.pull_archive(&container_path, &host_dir).await {
                tracing::warn!(file, error = %e, "Failed to pull artifact");
                continue;
            }
            let host_path = host_dir.join(file);
            if let Ok(mut tracked) = self.artifact_paths.lock() {
                tracked.push(host_path.clone());
            }
            artifacts.push(host_path);
        }
        Ok(artifacts)
    }

    /// Download every file currently in the workspace to `output_dir`.
    pub async fn download_artifacts(&self, output_dir: &Path) -> Result<Vec<PathBuf>> {
        self.ensure_running()?;
        std::fs::create_dir_all(output_dir)?;

        let (_, listing) = self
            .exec_capture(vec!["ls".to_string(), self.workdir.clone()], None)
            .await?;

        let mut downloaded = Vec::new();
        for file in listing.split('\n').map(str::trim).filter(|f| !f.is_empty()) {
            let container_path = format!("{}/{}", self.workdir, file);
            match self.pull_archive(&container_path, output_dir).await {
                Ok(()) => downloaded.push(output_dir.join(file)),
                Err(e) => tracing::warn!(file, error = %e, "Failed to download file"),
            }
        }
        Ok(downloaded)
    }

    /// Install a companion module into the container's site-packages via a
    /// `.pth` entry so executed code can import it.
    pub async fn install_companion_module(
        &self,
        module: &str,
        files: &[(String, Vec<u8>)],
    ) -> Result<()> {
        self.ensure_running()?;

        let module_root = format!("/opt/{}", module);
        let entries: Vec<(String, Vec<u8>)> = files
            .iter()
            .map(|(rel, content)| (format!("{}/{}", module, rel), content.clone()))
            .collect();
        let tar_bytes = Self::pack_tar(&entries)?;
        self.exec_ok(vec!["mkdir", "-p", &module_root]).await?;
        self.push_archive(&module_root, tar_bytes).await?;

        let (code, site_packages) = self
            .exec_capture(
                vec![
                    "python".to_string(),
                    "-c".to_string(),
                    "import site; print(site.getsitepackages()[0])".to_string(),
                ],
                None,
            )
            .await?;
        if code != 0 {
            return Err(SandboxError::InvalidInput(format!(
                "could not locate site-packages: {}",
                site_packages.trim()
            )));
        }
        let site_packages = site_packages.trim().to_string();
        let pth_name = format!("{}.pth", module);
        let pth_tar = Self::pack_tar(&[(pth_name, format!("{}\n", module_root).into_bytes())])?;
        self.push_archive(&site_packages, pth_tar).await?;
        tracing::info!(module, site_packages = %site_packages, "Companion module installed");
        Ok(())
    }

    /// Remove the staged-code directory.
    pub async fn clear_code(&self) -> Result<()> {
        self.ensure_running()?;
        self.exec_ok(vec!["rm", "-rf", "/code"]).await
    }

    /// Delete everything in the workspace except the preserve set.
    pub async fn clear_workspace(&self) -> Result<()> {
        self.ensure_running()?;
        self.clear_code().await?;

        let preserved = self.preserved_files();
        let command = if preserved.is_empty() {
            format!("rm -rf {}/*", self.workdir)
        } else {
            let excludes: Vec<String> = preserved
                .iter()
                .map(|p| format!("! -path \"{}\"", p))
                .collect();
            format!(
                "find {} -type f {} -delete",
                self.workdir,
                excludes.join(" ")
            )
        };
        self.exec_capture(
            vec!["sh".to_string(), "-c".to_string(), command],
            None,
        )
        .await?;
        Ok(())
    }

    /// Force-kill and remove the container; best-effort deletion of all
    /// host artifact paths accumulated so far. The handle is terminal
    /// afterwards.
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let tracked: Vec<PathBuf> = self
            .artifact_paths
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default();
        for path in tracked {
            let removed = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else if path.is_file() {
                std::fs::remove_file(&path)
            } else {
                Ok(())
            };
            if let Err(e) = removed {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove artifact");
            }
        }

        if let Err(e) = self
            .docker
            .kill_container(&self.container_id, None::<KillContainerOptions<String>>)
            .await
        {
            tracing::warn!(error = %e, "Failed to kill container");
        }
        if let Err(e) = self
            .docker
            .remove_container(
                &self.container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to remove container");
        }
        tracing::info!(container_id = %self.container_id, "Sandbox stopped");
        Ok(())
    }

    /// Whether the handle is still usable.
    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parsing() {
        assert_eq!("python".parse::<Language>().unwrap(), Language::Python);
        assert_eq!("R".parse::<Language>().unwrap(), Language::R);
        assert!("julia".parse::<Language>().is_err());
    }

    #[test]
    fn test_language_interpreters() {
        assert_eq!(Language::Python.interpreter(), "python");
        assert_eq!(Language::R.interpreter(), "Rscript");
        assert_eq!(Language::R.extension(), "r");
    }

    #[test]
    fn test_pack_tar_roundtrip() {
        let tar_bytes =
            Sandbox::pack_tar(&[("data.csv".to_string(), b"a,b\n1,2\n".to_vec())]).unwrap();
        let mut archive = tar::Archive::new(tar_bytes.as_slice());
        let mut entries = archive.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();
        assert_eq!(entry.path().unwrap().to_string_lossy(), "data.csv");
        let mut content = Vec::new();
        std::io::Read::read_to_end(&mut entry, &mut content).unwrap();
        assert_eq!(content, b"a,b\n1,2\n");
    }
}
