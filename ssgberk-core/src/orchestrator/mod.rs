// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Container lifecycle: build, run, watch, probe and stop.
//!
//! Failures of a single test are logged (to tracing and to the test's log
//! file) and reported as `false`/`None`; nothing here aborts the batch.

pub mod engine;
pub mod watch;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::catalog::TestDescriptor;
use crate::config::{HarnessConfig, NetworkMode};
use crate::error::{diagnostic, OrchestratorError, OrchestratorResult};
use crate::types::TestName;

pub use engine::{BuildRequest, ContainerEngine, DockerCli, RunRequest, Ulimit};
pub use watch::{BuildEvent, LineBuffer, LogWatcher};

use watch::{is_step_line, spawn_combined};

/// Container name of the test under benchmark on a shared network.
pub const SERVER_CONTAINER: &str = "ssgberk-server";

/// Dockerfile of the load-generation utility image.
pub const UTILITY_DOCKERFILE: &str = "hyperfine.dockerfile";

/// Outcome of a readiness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady,
}

impl Readiness {
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

/// A running test container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub container_id: String,
    pub image: String,
    pub test: TestName,
}

/// Orchestrator knobs derived from the harness configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub namespace: String,
    pub network: NetworkMode,
    pub server_host: String,
    pub build_timeout: Duration,
    pub stop_grace: Duration,
    pub utility_root: PathBuf,
}

impl OrchestratorSettings {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            namespace: config.image_namespace.clone(),
            network: config.network.clone(),
            server_host: config.server_host.clone(),
            build_timeout: config.build_timeout,
            stop_grace: config.stop_grace,
            utility_root: config.utility_root(),
        }
    }
}

/// Drives the server engine (tests) and the client engine (load generation).
pub struct ContainerOrchestrator {
    server: Arc<dyn ContainerEngine>,
    client: Arc<dyn ContainerEngine>,
    settings: OrchestratorSettings,
    /// Log watchers keyed by container id.
    watchers: Mutex<HashMap<String, LogWatcher>>,
}

impl ContainerOrchestrator {
    pub fn new(
        server: Arc<dyn ContainerEngine>,
        client: Arc<dyn ContainerEngine>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            server,
            client,
            settings,
            watchers: Mutex::new(HashMap::new()),
        }
    }

    /// Orchestrator using the `docker` CLI against the configured engines.
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(
            Arc::new(DockerCli::new(config.server_engine_host())),
            Arc::new(DockerCli::new(config.client_engine_host())),
            OrchestratorSettings::from_config(config),
        )
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Image tag of a test.
    pub fn image_tag(&self, name: &TestName) -> String {
        format!(
            "{}/ssgberk.test.{}",
            self.settings.namespace,
            name.as_str().to_lowercase()
        )
    }

    /// Repository of the reserved baseline image, never removed or killed.
    pub fn baseline_repository(&self) -> String {
        format!("{}/ssgberk", self.settings.namespace)
    }

    pub fn utility_image(&self) -> String {
        format!("{}/ssgberk.hyperfine", self.settings.namespace)
    }

    /// Whether `image` (`repository[:tag]`) is a harness image other than the baseline.
    pub fn is_disposable(&self, image: &str) -> bool {
        let repository = match image.rsplit_once(':') {
            Some((repo, tag)) if !tag.contains('/') => repo,
            _ => image,
        };
        repository.starts_with(&format!("{}/", self.settings.namespace))
            && repository != self.baseline_repository()
    }

    /// URL of `path` on the test server as seen from the utility container.
    pub fn server_url(&self, port: u16, path: &str) -> String {
        let host = match self.settings.network {
            NetworkMode::Shared { .. } => SERVER_CONTAINER,
            NetworkMode::Host => self.settings.server_host.as_str(),
        };
        format!("http://{}:{}{}", host, port, path)
    }

    // =========================================================================
    // Build
    // =========================================================================

    /// Build the image of `test`, streaming output to `<log_dir>/<test>.log`.
    ///
    /// Returns `false` on any failure; the diagnostic is written to the log.
    pub async fn build_image(&self, test: &TestDescriptor, log_dir: Option<&Path>) -> bool {
        let request = BuildRequest {
            context: test.directory.clone(),
            dockerfile: test.dockerfile(),
            tag: self.image_tag(&test.name),
        };
        let log_path = log_dir.map(|dir| dir.join(format!("{}.log", test.name.as_str().to_lowercase())));

        self.build(self.server.as_ref(), &request, log_path.as_deref(), test.name.as_str())
            .await
    }

    /// Build the load-generation utility image on the client engine.
    pub async fn build_utility_image(&self) -> bool {
        let request = BuildRequest {
            context: self.settings.utility_root.clone(),
            dockerfile: UTILITY_DOCKERFILE.to_string(),
            tag: self.utility_image(),
        };
        self.build(self.client.as_ref(), &request, None, "hyperfine").await
    }

    async fn build(
        &self,
        engine: &dyn ContainerEngine,
        request: &BuildRequest,
        log_path: Option<&Path>,
        label: &str,
    ) -> bool {
        let mut log = match log_path {
            Some(path) => match File::create(path).await {
                Ok(file) => Some(file),
                Err(e) => {
                    tracing::warn!(test = %label, error = %e, "Cannot create build log");
                    None
                }
            },
            None => None,
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.settings.build_timeout,
            stream_build(engine, request, &mut log, label),
        )
        .await
        .unwrap_or_else(|_| {
            Err(OrchestratorError::BuildTimeout {
                tag: request.tag.clone(),
                secs: self.settings.build_timeout.as_secs(),
            })
        });

        match outcome {
            Ok(()) => {
                tracing::info!(
                    test = %label,
                    image = %request.tag,
                    elapsed_secs = started.elapsed().as_secs(),
                    "Image built"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    test = %label,
                    image = %request.tag,
                    elapsed_secs = started.elapsed().as_secs(),
                    error = %e,
                    "Docker build failed; terminating"
                );
                write_log(
                    &mut log,
                    &format!("Docker build failed; terminating\n{}", diagnostic(&e)),
                )
                .await;
                false
            }
        }
    }

    // =========================================================================
    // Run
    // =========================================================================

    /// Launch parameters of the container for `test`.
    pub fn run_request_for(&self, test: &TestDescriptor) -> RunRequest {
        let mut request = RunRequest {
            image: self.image_tag(&test.name),
            network: Some(self.settings.network.engine_network().to_string()),
            ulimits: vec![Ulimit::new("nofile", 200_000), Ulimit::new("rtprio", 99)],
            sysctls: vec![("net.core.somaxconn".to_string(), "65535".to_string())],
            privileged: true,
            init: true,
            detach: true,
            remove: true,
            ..Default::default()
        };

        match self.settings.network {
            NetworkMode::Shared { .. } => {
                request.name = Some(SERVER_CONTAINER.to_string());
            }
            NetworkMode::Host => {
                let server = self.settings.server_host.clone();
                match nix::unistd::gethostname() {
                    Ok(hostname) => request
                        .extra_hosts
                        .push((hostname.to_string_lossy().into_owned(), server.clone())),
                    Err(e) => tracing::warn!(error = %e, "Cannot read local hostname"),
                }
                request
                    .extra_hosts
                    .push((SERVER_CONTAINER.to_string(), server));
            }
        }

        request
    }

    /// Start the container of `test` and stream its output to `<log_dir>/<test>.log`.
    ///
    /// Returns `None` if the container could not be started.
    pub async fn run_container(&self, test: &TestDescriptor, log_dir: &Path) -> Option<ContainerHandle> {
        let log_path = log_dir.join(format!("{}.log", test.name.as_str().to_lowercase()));

        match self.launch(test, &log_path).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                let image = self.image_tag(&test.name);
                tracing::error!(test = %test.name, image = %image, error = %e, "Container launch failed");
                append_log(
                    &log_path,
                    &format!("Running docker container: {} failed\n{}", image, diagnostic(&e)),
                )
                .await;
                None
            }
        }
    }

    async fn launch(&self, test: &TestDescriptor, log_path: &Path) -> OrchestratorResult<ContainerHandle> {
        let request = self.run_request_for(test);
        let stdout = command_output(self.server.run(&request), "run").await?;

        let container_id = stdout.trim().to_string();
        if container_id.is_empty() {
            return Err(OrchestratorError::MissingContainerId {
                image: request.image,
            });
        }

        let watcher =
            LogWatcher::spawn(self.server.logs(&container_id), log_path, test.name.as_str()).await?;
        self.watchers
            .lock()
            .await
            .insert(container_id.clone(), watcher);

        tracing::info!(test = %test.name, container = %container_id, "Container started");
        Ok(ContainerHandle {
            container_id,
            image: request.image,
            test: test.name.clone(),
        })
    }

    /// Whether the server engine still knows `container_id`.
    pub async fn container_exists(&self, container_id: &str) -> bool {
        command_output(self.server.inspect(container_id), "inspect")
            .await
            .is_ok()
    }

    // =========================================================================
    // Utility container
    // =========================================================================

    fn utility_request(&self, command: Vec<String>) -> RunRequest {
        RunRequest {
            image: self.utility_image(),
            network: Some(self.settings.network.engine_network().to_string()),
            remove: true,
            command,
            ..Default::default()
        }
    }

    /// One HTTP request to `url` from a disposable utility container.
    pub async fn probe(&self, url: &str) -> Readiness {
        let request = self.utility_request(vec![
            "curl".to_string(),
            "--fail".to_string(),
            "--max-time".to_string(),
            "5".to_string(),
            url.to_string(),
        ]);

        match command_output(self.client.run(&request), "probe").await {
            Ok(_) => Readiness::Ready,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Probe failed");
                Readiness::NotReady
            }
        }
    }

    /// Utility container request running `/bin/bash /<script>` with `variables`
    /// in its environment and stderr folded into stdout.
    pub fn benchmark_request(&self, script: &str, variables: &BTreeMap<String, String>) -> RunRequest {
        let mut request = self.utility_request(vec![
            "/bin/bash".to_string(),
            "-c".to_string(),
            format!("/bin/bash /{} 2>&1", script),
        ]);
        request.ulimits = vec![Ulimit::new("nofile", 65_535)];
        request.sysctls = vec![("net.core.somaxconn".to_string(), "65535".to_string())];
        request.environment = variables.clone();
        request
    }

    /// Run `/bin/bash /<script>` in the utility image and capture its output.
    ///
    /// Returns once the output stream has closed, with the number of lines
    /// written to `output`. A non-zero exit is logged but still returns the
    /// captured output.
    pub async fn run_benchmark_script(
        &self,
        script: &str,
        variables: &BTreeMap<String, String>,
        output: &Path,
    ) -> OrchestratorResult<u64> {
        let request = self.benchmark_request(script, variables);

        let mut file = File::create(output)
            .await
            .map_err(|e| OrchestratorError::Io {
                context: "creating raw results file",
                source: e,
            })?;

        let (mut child, mut lines) = spawn_combined(self.client.run(&request), "benchmark script")?;

        let mut written = 0u64;
        while let Some(line) = lines.recv().await {
            file.write_all(format!("{}\n", line).as_bytes())
                .await
                .map_err(|e| OrchestratorError::Io {
                    context: "writing raw results",
                    source: e,
                })?;
            written += 1;
        }
        file.flush().await.map_err(|e| OrchestratorError::Io {
            context: "flushing raw results",
            source: e,
        })?;

        let status = child.wait().await.map_err(|e| OrchestratorError::Io {
            context: "waiting for benchmark script",
            source: e,
        })?;
        if !status.success() {
            tracing::warn!(script = %script, status = %status, "Benchmark script exited with failure");
        }

        Ok(written)
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Stop one container, or every harness container when `handle` is `None`.
    pub async fn stop(&self, handle: Option<&ContainerHandle>) {
        let Some(handle) = handle else {
            self.stop_all().await;
            return;
        };

        self.kill(self.server.as_ref(), &handle.container_id).await;
        tokio::time::sleep(self.settings.stop_grace).await;

        let watcher = self.watchers.lock().await.remove(&handle.container_id);
        if let Some(watcher) = watcher {
            watcher.shutdown().await;
        }
    }

    /// Kill every running harness container except the baseline, then drain
    /// all log watchers.
    pub async fn stop_all(&self) {
        let mut killed = 0usize;
        for engine in self.engines() {
            let containers = match command_output(engine.running_containers(), "ps").await {
                Ok(stdout) => parse_listing(&stdout),
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot list running containers");
                    continue;
                }
            };

            for (id, image) in containers {
                if self.is_disposable(&image) {
                    self.kill(engine, &id).await;
                    killed += 1;
                }
            }
        }

        if killed > 0 {
            tokio::time::sleep(self.settings.stop_grace).await;
        }

        let watchers: Vec<LogWatcher> = self
            .watchers
            .lock()
            .await
            .drain()
            .map(|(_, watcher)| watcher)
            .collect();
        for watcher in watchers {
            watcher.shutdown().await;
        }

        tracing::info!(killed, "Stopped harness containers");
    }

    /// Prune dangling images and remove every harness image but the baseline.
    ///
    /// Returns the number of images removed.
    pub async fn clean_images(&self) -> usize {
        self.prune().await;

        let images = match command_output(self.server.images(), "images").await {
            Ok(stdout) => parse_listing(&stdout),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot list images");
                Vec::new()
            }
        };

        let mut removed = 0;
        for (id, image) in images {
            if !self.is_disposable(&image) {
                continue;
            }
            match command_output(self.server.remove_image(&id), "rmi").await {
                Ok(_) => {
                    tracing::debug!(image = %image, "Removed image");
                    removed += 1;
                }
                Err(e) => tracing::warn!(image = %image, error = %e, "Cannot remove image"),
            }
        }

        self.prune().await;
        tracing::info!(removed, "Cleaned harness images");
        removed
    }

    async fn prune(&self) {
        if let Err(e) = command_output(self.server.prune_images(), "image prune").await {
            tracing::warn!(error = %e, "Image prune failed");
        }
    }

    async fn kill(&self, engine: &dyn ContainerEngine, container_id: &str) {
        match command_output(engine.kill(container_id), "kill").await {
            Ok(_) => tracing::debug!(container = %container_id, "Container killed"),
            Err(e) => tracing::debug!(container = %container_id, error = %e, "Container already stopped"),
        }
    }

    fn engines(&self) -> Vec<&dyn ContainerEngine> {
        match self.settings.network {
            NetworkMode::Shared { .. } => vec![self.server.as_ref()],
            NetworkMode::Host => vec![self.server.as_ref(), self.client.as_ref()],
        }
    }
}

/// Run `command` to completion and return its stdout.
async fn command_output(mut command: Command, name: &'static str) -> OrchestratorResult<String> {
    let output = command
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .map_err(|e| OrchestratorError::Spawn {
            what: name,
            source: e,
        })?;

    if !output.status.success() {
        return Err(OrchestratorError::CommandFailed {
            command: name,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Stream one build, logging each completed output line.
async fn stream_build(
    engine: &dyn ContainerEngine,
    request: &BuildRequest,
    log: &mut Option<File>,
    label: &str,
) -> OrchestratorResult<()> {
    let (mut child, mut lines) = spawn_combined(engine.build(request), "image build")?;
    let mut buffer = LineBuffer::new();
    let mut failure = None;

    while let Some(raw) = lines.recv().await {
        match BuildEvent::parse(&raw) {
            BuildEvent::Output(text) => {
                for line in buffer.push(&text) {
                    log_build_line(log, label, &line).await;
                }
            }
            BuildEvent::Error(message) => {
                failure = Some(message);
                break;
            }
        }
    }
    if let Some(rest) = buffer.finish() {
        log_build_line(log, label, &rest).await;
    }

    if let Some(message) = failure {
        let _ = child.start_kill();
        return Err(OrchestratorError::BuildFailed {
            tag: request.tag.clone(),
            message,
        });
    }

    let status = child.wait().await.map_err(|e| OrchestratorError::Io {
        context: "waiting for image build",
        source: e,
    })?;
    if !status.success() {
        return Err(OrchestratorError::BuildFailed {
            tag: request.tag.clone(),
            message: format!("build exited with {}", status),
        });
    }

    Ok(())
}

async fn log_build_line(log: &mut Option<File>, label: &str, line: &str) {
    if is_step_line(line) {
        tracing::info!(test = %label, "{}", line);
        write_log(log, &format!("\n{}", line)).await;
    } else {
        tracing::debug!(test = %label, "{}", line);
        write_log(log, line).await;
    }
}

async fn write_log(log: &mut Option<File>, text: &str) {
    if let Some(file) = log {
        if let Err(e) = file.write_all(format!("{}\n", text).as_bytes()).await {
            tracing::warn!(error = %e, "Failed to write log");
        }
    }
}

async fn append_log(path: &Path, text: &str) {
    let file = OpenOptions::new().create(true).append(true).open(path).await;
    match file {
        Ok(file) => write_log(&mut Some(file), text).await,
        Err(e) => tracing::warn!(log = %path.display(), error = %e, "Cannot open log"),
    }
}

/// Split `<id> <name>` listing lines.
fn parse_listing(stdout: &str) -> Vec<(String, String)> {
    stdout
        .lines()
        .filter_map(|line| line.trim().split_once(' '))
        .map(|(id, name)| (id.to_string(), name.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MeasurementRegistry;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    /// Engine whose commands are canned shell scripts.
    #[derive(Default)]
    struct ScriptedEngine {
        calls: StdMutex<Vec<String>>,
        build: String,
        run: String,
        running: String,
        images: String,
    }

    impl ScriptedEngine {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ContainerEngine for ScriptedEngine {
        fn build(&self, request: &BuildRequest) -> Command {
            self.record(format!("build {} {}", request.tag, request.dockerfile));
            sh(&self.build)
        }

        fn run(&self, request: &RunRequest) -> Command {
            self.record(format!("run {} {}", request.image, request.command.join(" ")));
            sh(&self.run)
        }

        fn logs(&self, container_id: &str) -> Command {
            self.record(format!("logs {}", container_id));
            sh("echo serving on 4000")
        }

        fn kill(&self, container_id: &str) -> Command {
            self.record(format!("kill {}", container_id));
            sh("echo 'No such container' 1>&2; exit 1")
        }

        fn inspect(&self, container_id: &str) -> Command {
            sh(if container_id == "known" { "true" } else { "exit 1" })
        }

        fn running_containers(&self) -> Command {
            sh(&format!("printf '{}'", self.running))
        }

        fn images(&self) -> Command {
            sh(&format!("printf '{}'", self.images))
        }

        fn remove_image(&self, image_id: &str) -> Command {
            self.record(format!("rmi {}", image_id));
            sh("true")
        }

        fn prune_images(&self) -> Command {
            self.record("prune".to_string());
            sh("true")
        }
    }

    fn settings(network: NetworkMode) -> OrchestratorSettings {
        OrchestratorSettings {
            namespace: "ns".to_string(),
            network,
            server_host: "10.0.0.5".to_string(),
            build_timeout: Duration::from_secs(10),
            stop_grace: Duration::ZERO,
            utility_root: PathBuf::from("/srv/toolset/hyperfine"),
        }
    }

    fn shared() -> NetworkMode {
        NetworkMode::Shared {
            network: "ssgberk".to_string(),
        }
    }

    fn orchestrator(engine: Arc<ScriptedEngine>, network: NetworkMode) -> ContainerOrchestrator {
        ContainerOrchestrator::new(engine.clone(), engine, settings(network))
    }

    fn descriptor(dir: &Path) -> TestDescriptor {
        let attributes = json!({"language": "ruby", "generator": "jekyll"})
            .as_object()
            .cloned()
            .unwrap();
        let measurements = MeasurementRegistry::standard().supported(&attributes);
        TestDescriptor::new(TestName::new("Jekyll").unwrap(), dir, measurements, attributes)
    }

    #[test]
    fn test_image_names() {
        let orch = orchestrator(Arc::new(ScriptedEngine::default()), shared());
        let test = descriptor(Path::new("/srv/ruby/jekyll"));
        assert_eq!(orch.image_tag(&test.name), "ns/ssgberk.test.jekyll");
        assert_eq!(orch.utility_image(), "ns/ssgberk.hyperfine");

        assert!(orch.is_disposable("ns/ssgberk.test.jekyll:latest"));
        assert!(orch.is_disposable("ns/ssgberk.hyperfine"));
        assert!(!orch.is_disposable("ns/ssgberk:latest"));
        assert!(!orch.is_disposable("ns/ssgberk"));
        assert!(!orch.is_disposable("postgres:15"));
        assert!(!orch.is_disposable("<none>:<none>"));
    }

    #[test]
    fn test_run_request_network_wiring() {
        let test = descriptor(Path::new("/srv/ruby/jekyll"));

        let orch = orchestrator(Arc::new(ScriptedEngine::default()), shared());
        let request = orch.run_request_for(&test);
        assert_eq!(request.name.as_deref(), Some(SERVER_CONTAINER));
        assert_eq!(request.network.as_deref(), Some("ssgberk"));
        assert!(request.extra_hosts.is_empty());
        assert!(request.privileged && request.init && request.detach && request.remove);
        assert!(request.ulimits.contains(&Ulimit::new("nofile", 200_000)));
        assert!(request.ulimits.contains(&Ulimit::new("rtprio", 99)));

        let orch = orchestrator(Arc::new(ScriptedEngine::default()), NetworkMode::Host);
        let request = orch.run_request_for(&test);
        assert!(request.name.is_none());
        assert_eq!(request.network.as_deref(), Some("host"));
        assert!(request
            .extra_hosts
            .contains(&(SERVER_CONTAINER.to_string(), "10.0.0.5".to_string())));
        assert_eq!(
            orch.server_url(4000, "/content"),
            "http://10.0.0.5:4000/content"
        );
    }

    #[tokio::test]
    async fn test_build_success_writes_log() {
        let temp = TempDir::new().unwrap();
        let engine = Arc::new(ScriptedEngine {
            build: "echo 'Step 1/2 : FROM ruby'; echo ' ---> 1a2b'; echo 'Successfully built 1a2b'"
                .to_string(),
            ..Default::default()
        });
        let orch = orchestrator(engine.clone(), shared());
        let test = descriptor(temp.path());

        assert!(orch.build_image(&test, Some(temp.path())).await);
        assert_eq!(
            engine.calls(),
            vec!["build ns/ssgberk.test.jekyll Jekyll.dockerfile"]
        );

        let log = std::fs::read_to_string(temp.path().join("jekyll.log")).unwrap();
        assert!(log.contains("Step 1/2 : FROM ruby"));
        assert!(log.contains("Successfully built 1a2b"));
    }

    #[tokio::test]
    async fn test_build_error_detail_fails() {
        let temp = TempDir::new().unwrap();
        let engine = Arc::new(ScriptedEngine {
            build: r#"printf '%s\n' '{"stream":"Step 1/1 : RUN false\n"}' '{"errorDetail":{"message":"returned a non-zero code: 1"}}'"#
                .to_string(),
            ..Default::default()
        });
        let orch = orchestrator(engine, shared());
        let test = descriptor(temp.path());

        assert!(!orch.build_image(&test, Some(temp.path())).await);
        let log = std::fs::read_to_string(temp.path().join("jekyll.log")).unwrap();
        assert!(log.contains("Step 1/1 : RUN false"));
        assert!(log.contains("Docker build failed; terminating"));
        assert!(log.contains("returned a non-zero code: 1"));
    }

    #[tokio::test]
    async fn test_build_exit_status_and_timeout() {
        let temp = TempDir::new().unwrap();
        let test = descriptor(temp.path());

        let engine = Arc::new(ScriptedEngine {
            build: "echo partial; exit 3".to_string(),
            ..Default::default()
        });
        assert!(!orchestrator(engine, shared()).build_image(&test, None).await);

        let engine = Arc::new(ScriptedEngine {
            build: "sleep 5".to_string(),
            ..Default::default()
        });
        let mut orch = orchestrator(engine, shared());
        orch.settings.build_timeout = Duration::from_millis(100);
        assert!(!orch.build_image(&test, Some(temp.path())).await);
        let log = std::fs::read_to_string(temp.path().join("jekyll.log")).unwrap();
        assert!(log.contains("exceeded"));
    }

    #[tokio::test]
    async fn test_run_container_and_stop() {
        let temp = TempDir::new().unwrap();
        let engine = Arc::new(ScriptedEngine {
            run: "echo c0ffee".to_string(),
            ..Default::default()
        });
        let orch = orchestrator(engine.clone(), shared());
        let test = descriptor(temp.path());

        let handle = orch.run_container(&test, temp.path()).await.unwrap();
        assert_eq!(handle.container_id, "c0ffee");
        assert_eq!(handle.image, "ns/ssgberk.test.jekyll");

        // Let the log follower drain before stopping.
        for _ in 0..500 {
            if orch.watchers.lock().await.values().all(LogWatcher::is_finished) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // Stopping an already-exited container is not an error.
        orch.stop(Some(&handle)).await;
        assert!(engine.calls().contains(&"kill c0ffee".to_string()));
        assert!(orch.watchers.lock().await.is_empty());

        let log = std::fs::read_to_string(temp.path().join("jekyll.log")).unwrap();
        assert!(log.contains("serving on 4000"));
    }

    #[tokio::test]
    async fn test_run_container_failure_logs_diagnostic() {
        let temp = TempDir::new().unwrap();
        let engine = Arc::new(ScriptedEngine {
            run: "echo 'port is already allocated' 1>&2; exit 125".to_string(),
            ..Default::default()
        });
        let orch = orchestrator(engine, shared());
        let test = descriptor(temp.path());

        assert!(orch.run_container(&test, temp.path()).await.is_none());
        let log = std::fs::read_to_string(temp.path().join("jekyll.log")).unwrap();
        assert!(log.contains("Running docker container: ns/ssgberk.test.jekyll failed"));
        assert!(log.contains("port is already allocated"));
    }

    #[tokio::test]
    async fn test_probe() {
        let engine = Arc::new(ScriptedEngine {
            run: "exit 0".to_string(),
            ..Default::default()
        });
        let orch = orchestrator(engine.clone(), shared());
        assert!(orch.probe("http://ssgberk-server:4000/").await.is_ready());
        assert_eq!(
            engine.calls(),
            vec!["run ns/ssgberk.hyperfine curl --fail --max-time 5 http://ssgberk-server:4000/"]
        );

        let engine = Arc::new(ScriptedEngine {
            run: "exit 22".to_string(),
            ..Default::default()
        });
        let orch = orchestrator(engine, shared());
        assert_eq!(orch.probe("http://ssgberk-server:4000/").await, Readiness::NotReady);
    }

    #[tokio::test]
    async fn test_benchmark_script_captures_output() {
        let temp = TempDir::new().unwrap();
        let engine = Arc::new(ScriptedEngine {
            run: "echo STARTTIME 100; echo 'build log' 1>&2; echo ENDTIME 200".to_string(),
            ..Default::default()
        });
        let orch = orchestrator(engine.clone(), shared());
        let raw = temp.path().join("raw.txt");

        let mut vars = BTreeMap::new();
        vars.insert("name".to_string(), "jekyll".to_string());
        let written = orch.run_benchmark_script("build.sh", &vars, &raw).await.unwrap();

        assert_eq!(written, 3);
        let content = std::fs::read_to_string(&raw).unwrap();
        assert!(content.contains("STARTTIME 100\n"));
        assert!(content.contains("ENDTIME 200\n"));
        assert_eq!(
            engine.calls(),
            vec!["run ns/ssgberk.hyperfine /bin/bash -c /bin/bash /build.sh 2>&1"]
        );
    }

    #[test]
    fn test_benchmark_request_limits() {
        let orch = orchestrator(Arc::new(ScriptedEngine::default()), shared());
        let mut vars = BTreeMap::new();
        vars.insert("duration".to_string(), "30".to_string());

        let request = orch.benchmark_request("query.sh", &vars);
        assert_eq!(request.image, "ns/ssgberk.hyperfine");
        assert_eq!(request.command, vec!["/bin/bash", "-c", "/bin/bash /query.sh 2>&1"]);
        assert_eq!(request.ulimits, vec![Ulimit::new("nofile", 65_535)]);
        assert_eq!(
            request.sysctls,
            vec![("net.core.somaxconn".to_string(), "65535".to_string())]
        );
        assert_eq!(request.environment, vars);
        assert!(request.remove);
    }

    #[tokio::test]
    async fn test_benchmark_output_keeps_window_order() {
        let temp = TempDir::new().unwrap();
        let engine = Arc::new(ScriptedEngine {
            run: "for i in $(seq 1 200); do echo \"Concurrency: $i\"; \
                  echo \"STARTTIME $i\" 1>&2; \
                  echo \"  Latency   1.00ms  0.20ms  4.00ms  90.00%\"; \
                  echo \"ENDTIME $i\" 1>&2; done"
                .to_string(),
            ..Default::default()
        });
        let orch = orchestrator(engine, shared());
        let raw = temp.path().join("raw.txt");

        let written = orch
            .run_benchmark_script("build.sh", &BTreeMap::new(), &raw)
            .await
            .unwrap();
        assert_eq!(written, 800);

        let content = std::fs::read_to_string(&raw).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        for (i, window) in lines.chunks(4).enumerate() {
            let n = i + 1;
            assert_eq!(window[0], format!("Concurrency: {}", n));
            assert_eq!(window[1], format!("STARTTIME {}", n));
            assert_eq!(window[3], format!("ENDTIME {}", n));
        }

        let parsed = crate::results::parse::RawLogParser::parse(std::io::BufReader::new(
            std::fs::File::open(&raw).unwrap(),
        ));
        assert_eq!(parsed.records.len(), 200);
        assert_eq!(parsed.windows.len(), 200);
    }

    #[tokio::test]
    async fn test_stop_all_spares_baseline_and_foreign() {
        let engine = Arc::new(ScriptedEngine {
            running: "c1 ns/ssgberk.test.jekyll\\nc2 ns/ssgberk\\nc3 postgres:15\\n".to_string(),
            ..Default::default()
        });
        let orch = orchestrator(engine.clone(), shared());

        orch.stop(None).await;
        assert_eq!(engine.calls(), vec!["kill c1"]);
    }

    #[tokio::test]
    async fn test_clean_images() {
        let engine = Arc::new(ScriptedEngine {
            images: "i1 ns/ssgberk.test.jekyll:latest\\ni2 ns/ssgberk:latest\\ni3 <none>:<none>\\n"
                .to_string(),
            ..Default::default()
        });
        let orch = orchestrator(engine.clone(), shared());

        assert_eq!(orch.clean_images().await, 1);
        assert_eq!(engine.calls(), vec!["prune", "rmi i1", "prune"]);
    }

    #[tokio::test]
    async fn test_container_exists() {
        let orch = orchestrator(Arc::new(ScriptedEngine::default()), shared());
        assert!(orch.container_exists("known").await);
        assert!(!orch.container_exists("gone").await);
    }
}
