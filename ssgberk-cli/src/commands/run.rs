// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `ssgberk run` command - Benchmark every selected test.
//!
//! Tests run one at a time: build, start, wait until reachable, run each
//! measurement while sampling host stats, parse, report, stop.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};

use ssgberk_core::catalog::generator_directories;
use ssgberk_core::{
    ConfigLoader, ContainerOrchestrator, HarnessConfig, MeasurementRegistry, ResultsStore,
    SsgResult, TestCatalog, TestDescriptor, VerifyResult,
};

/// How long a started container gets to answer its first request.
const READY_TIMEOUT: Duration = Duration::from_secs(60);

const READY_POLL: Duration = Duration::from_secs(1);

/// Run directory name format.
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Test selection and mode flags of `ssgberk run`.
pub struct RunOptions {
    pub test: Vec<String>,
    pub exclude: Vec<String>,
    pub test_dir: Vec<String>,
    pub test_lang: Vec<String>,
    pub measurement_type: Option<String>,
    pub parse: Option<String>,
}

pub async fn execute(config_path: &str, options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(config = %config_path, "Starting benchmark run");

    // Load and validate configuration - fail fast on invalid config
    let mut config = ConfigLoader::load_file(config_path)?;
    if let Some(measurement_type) = options.measurement_type {
        config.measurement_type = Some(measurement_type).filter(|t| t != "all");
    }

    let registry = MeasurementRegistry::standard().select(config.measurement_type.as_deref())?;
    let catalog = TestCatalog::new(config.lang_root(), Arc::new(registry.clone()))
        .with_languages(options.test_lang)
        .with_directories(options.test_dir);
    let tests = catalog.gather(&options.test, &options.exclude)?;

    tracing::info!(tests = tests.len(), "Tests gathered");
    if tests.is_empty() {
        println!("No tests to run.");
        return Ok(());
    }

    if let Some(timestamp) = options.parse {
        return reparse(&config, &timestamp, &tests).await;
    }

    let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
    let mut store = ResultsStore::create(&config, &timestamp, &tests, &registry).await?;
    let orchestrator = ContainerOrchestrator::from_config(&config);

    if !orchestrator.build_utility_image().await {
        return Err("Unable to build the load generation image".into());
    }

    let interrupted = tokio::select! {
        _ = run_tests(&config, &orchestrator, &mut store, &tests) => false,
        _ = tokio::signal::ctrl_c() => true,
    };

    if interrupted {
        tracing::warn!("Interrupted; stopping all containers");
        orchestrator.stop_all().await;
    }

    store.parse(&generator_directories(&tests)).await;
    println!("{}", store.finalize());
    Ok(())
}

/// Re-parse the raw logs of an earlier run into its results.json.
async fn reparse(
    config: &HarnessConfig,
    timestamp: &str,
    tests: &[TestDescriptor],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = ResultsStore::open(config, timestamp)?;
    let mut parsed = 0;
    for test in tests {
        parsed += store.parse_all(test);
    }
    tracing::info!(timestamp = %timestamp, measurements = parsed, "Re-parsed results");

    store.parse(&generator_directories(tests)).await;
    println!("{}", store.finalize());
    Ok(())
}

async fn run_tests(
    config: &HarnessConfig,
    orchestrator: &ContainerOrchestrator,
    store: &mut ResultsStore,
    tests: &[TestDescriptor],
) {
    for test in tests {
        let started = Instant::now();
        let outcome =
            tokio::time::timeout(config.run_test_timeout, run_test(config, orchestrator, store, test)).await;

        match outcome {
            Ok(Ok(())) => {
                tracing::info!(test = %test.name, elapsed_secs = started.elapsed().as_secs(), "Test finished");
            }
            Ok(Err(e)) => {
                tracing::error!(test = %test.name, error = %e, "Test failed");
                store.report_status(test.name.as_str(), &format!("ERROR: {}", e));
                orchestrator.stop(None).await;
            }
            Err(_) => {
                tracing::error!(
                    test = %test.name,
                    limit_secs = config.run_test_timeout.as_secs(),
                    "Test exceeded its time limit"
                );
                store.report_status(test.name.as_str(), "ERROR: Test timed out");
                orchestrator.stop(None).await;
            }
        }
    }
}

async fn run_test(
    config: &HarnessConfig,
    orchestrator: &ContainerOrchestrator,
    store: &mut ResultsStore,
    test: &TestDescriptor,
) -> SsgResult<()> {
    let name = test.name.to_string();
    let log_root = store.directory().join(&name);
    let build_logs = log_root.join("build");
    let run_logs = log_root.join("run");
    for dir in [&build_logs, &run_logs] {
        std::fs::create_dir_all(dir).map_err(|e| ssgberk_core::SsgError::Io {
            context: "creating test log directory",
            source: e,
        })?;
    }

    if !orchestrator.build_image(test, Some(&build_logs)).await {
        store.report_status(&name, "ERROR: Problem building the test image");
        return Ok(());
    }

    let Some(handle) = orchestrator.run_container(test, &run_logs).await else {
        store.report_status(&name, "ERROR: Problem starting the test container");
        return Ok(());
    };

    let verification = match test.port() {
        Some(port) => {
            let url = orchestrator.server_url(port, "/");
            if wait_until_ready(orchestrator, &url).await {
                VerifyResult::Pass
            } else {
                tracing::warn!(test = %name, url = %url, "Test server never became ready");
                VerifyResult::Fail
            }
        }
        None => VerifyResult::Pass,
    };

    for spec in &test.measurements {
        let type_name = spec.type_name();
        store.report_verification(&name, type_name, verification);
        if verification == VerifyResult::Fail {
            store.report_measurement(&name, type_name, Vec::new());
            continue;
        }

        let raw = store.raw_file(&name, type_name)?;
        let stats = store.stats_file(&name, type_name)?;

        let mut variables = spec.script_variables(&name);
        variables.insert("server_host".to_string(), config.server_host.clone());
        variables.insert("duration".to_string(), config.duration.to_string());

        tracing::info!(test = %name, measurement = %type_name, "Benchmarking");
        let sampler = HostSampler::start(&stats);
        if let Err(e) = orchestrator
            .run_benchmark_script(spec.script(), &variables, &raw)
            .await
        {
            tracing::error!(test = %name, measurement = %type_name, error = %e, "Benchmark script failed");
        }
        if let Some(sampler) = sampler {
            sampler.stop().await;
        }

        let records = store.parse_measurement(&name, type_name);
        store.report_measurement(&name, type_name, records);
    }

    orchestrator.stop(Some(&handle)).await;
    store.report_status(&name, "Completed benchmarking");
    Ok(())
}

async fn wait_until_ready(orchestrator: &ContainerOrchestrator, url: &str) -> bool {
    let deadline = Instant::now() + READY_TIMEOUT;
    while Instant::now() < deadline {
        if orchestrator.probe(url).await.is_ready() {
            return true;
        }
        tokio::time::sleep(READY_POLL).await;
    }
    false
}

/// `dstat` writing host samples to a stats file for one measurement.
struct HostSampler {
    child: Child,
}

impl HostSampler {
    fn start(output: &Path) -> Option<Self> {
        let spawned = Command::new("dstat")
            .args([
                "-Tafilmprs",
                "--aio",
                "--fs",
                "--ipc",
                "--lock",
                "--raw",
                "--socket",
                "--tcp",
                "--udp",
                "--unix",
                "--vm",
                "--noupdate",
                "--output",
            ])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        match spawned {
            Ok(child) => Some(Self { child }),
            Err(e) => {
                tracing::warn!(error = %e, "Unable to start dstat; no host samples recorded");
                None
            }
        }
    }

    async fn stop(mut self) {
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
    }
}
