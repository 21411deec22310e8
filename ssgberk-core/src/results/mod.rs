// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Results store: owns the run's `results.json` and the per-test files.
//!
//! Layout under `<results_root>/<timestamp>/`:
//!
//! ```text
//! results.json
//! <test>/<type>/raw.txt          benchmark script output
//! <test>/<type>/stats.txt        dstat samples
//! <test>/<type>/stats.txt.json   samples cut to each measured window
//! ```
//!
//! Every mutation rewrites `results.json` through a temp file and a rename.
//! Write failures are logged and never abort the run.

pub mod document;
pub mod parse;
pub mod stats;
pub mod tools;

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::catalog::TestDescriptor;
use crate::config::{HarnessConfig, ToolCommands};
use crate::error::{ResultsError, ResultsResult};
use crate::registry::MeasurementRegistry;
use crate::types::VerifyResult;

pub use document::{GitInfo, MeasurementRecord, RawData, ResultsDocument};
pub use parse::{ParsedLog, RawLogParser};
pub use stats::{Epoch, StatsRow, StatsWindow};

/// Aggregate document file name.
pub const RESULTS_FILE: &str = "results.json";
/// Benchmark script output file name.
pub const RAW_FILE: &str = "raw.txt";
/// Host samples file name.
pub const STATS_FILE: &str = "stats.txt";

/// Format the run's display name; an invalid pattern is used verbatim.
fn run_name(pattern: &str) -> String {
    let mut name = String::new();
    if write!(name, "{}", chrono::Local::now().format(pattern)).is_err() {
        return pattern.to_string();
    }
    name
}

pub struct ResultsStore {
    directory: PathBuf,
    file: PathBuf,
    document: ResultsDocument,
    tools: ToolCommands,
    commit_workers: usize,
}

impl ResultsStore {
    /// Start a new run under `<results_root>/<timestamp>` and write the
    /// initial document.
    pub async fn create(
        config: &HarnessConfig,
        timestamp: &str,
        tests: &[TestDescriptor],
        registry: &MeasurementRegistry,
    ) -> ResultsResult<Self> {
        let directory = config.results_root().join(timestamp);
        std::fs::create_dir_all(&directory).map_err(|e| ResultsError::Io {
            context: "creating results directory",
            source: e,
        })?;

        let mut document = ResultsDocument::new(registry.names());
        document.name = run_name(&config.results_name);
        document.environment_description = config.results_environment.clone();
        document.git = GitInfo::probe(&config.root).await;
        document.generators = tests.iter().map(|t| t.name.to_string()).collect();
        document.duration = config.duration;

        let store = Self {
            file: directory.join(RESULTS_FILE),
            directory,
            document,
            tools: config.tools.clone(),
            commit_workers: config.commit_workers,
        };
        store.persist();

        tracing::info!(
            directory = %store.directory.display(),
            uuid = %store.document.uuid,
            "Results store created"
        );
        Ok(store)
    }

    /// Reopen an earlier run's `results.json`.
    pub fn open(config: &HarnessConfig, timestamp: &str) -> ResultsResult<Self> {
        let directory = config.results_root().join(timestamp);
        let file = directory.join(RESULTS_FILE);
        let document = read_document(&file)?;

        Ok(Self {
            directory,
            file,
            document,
            tools: config.tools.clone(),
            commit_workers: config.commit_workers,
        })
    }

    /// Replace the in-memory document with the one on disk.
    pub fn load(&mut self) -> ResultsResult<()> {
        self.document = read_document(&self.file)?;
        Ok(())
    }

    pub fn document(&self) -> &ResultsDocument {
        &self.document
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    // =========================================================================
    // Paths
    // =========================================================================

    fn measurement_dir(&self, test: &str, type_name: &str) -> PathBuf {
        self.directory.join(test).join(type_name)
    }

    fn ensure_measurement_dir(&self, test: &str, type_name: &str) -> ResultsResult<PathBuf> {
        let dir = self.measurement_dir(test, type_name);
        std::fs::create_dir_all(&dir).map_err(|e| ResultsError::Io {
            context: "creating measurement directory",
            source: e,
        })?;
        Ok(dir)
    }

    /// `raw.txt` of one measurement, creating its directory.
    pub fn raw_file(&self, test: &str, type_name: &str) -> ResultsResult<PathBuf> {
        Ok(self.ensure_measurement_dir(test, type_name)?.join(RAW_FILE))
    }

    /// `stats.txt` of one measurement, creating its directory.
    pub fn stats_file(&self, test: &str, type_name: &str) -> ResultsResult<PathBuf> {
        Ok(self.ensure_measurement_dir(test, type_name)?.join(STATS_FILE))
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    /// Record the latest status message of a test.
    pub fn report_status(&mut self, test: &str, message: &str) {
        self.document
            .completed
            .insert(test.to_string(), message.to_string());
        self.persist();
    }

    pub fn report_verification(&mut self, test: &str, type_name: &str, result: VerifyResult) {
        self.document.record_verification(test, type_name, result);
        self.persist();
    }

    /// Store the records of one measurement; empty records mark it failed.
    pub fn report_measurement(&mut self, test: &str, type_name: &str, records: Vec<MeasurementRecord>) {
        let count = records.len();
        self.document.record_measurement(test, type_name, records);
        self.persist();

        if count == 0 {
            tracing::warn!(test = %test, measurement = %type_name, "No results recorded");
        } else {
            tracing::info!(test = %test, measurement = %type_name, records = count, "Results recorded");
        }
    }

    // =========================================================================
    // Parsing
    // =========================================================================

    /// Parse `raw.txt` of one measurement and write the matching host samples
    /// to `stats.txt.json`.
    ///
    /// A missing or unreadable log yields no records.
    pub fn parse_measurement(&self, test: &str, type_name: &str) -> Vec<MeasurementRecord> {
        let dir = self.measurement_dir(test, type_name);
        let raw = dir.join(RAW_FILE);

        let parsed = match File::open(&raw) {
            Ok(file) => RawLogParser::parse(BufReader::new(file)),
            Err(e) => {
                tracing::debug!(file = %raw.display(), error = %e, "No raw log");
                return Vec::new();
            }
        };

        let mut windows = Vec::with_capacity(parsed.windows.len());
        for &(start, end) in &parsed.windows {
            match self.stats_window(test, type_name, start, end, 1) {
                Ok(window) => windows.push(window),
                Err(e) => tracing::warn!(test = %test, measurement = %type_name, error = %e, "Unable to read host samples"),
            }
        }

        let stats_json = dir.join(format!("{}.json", STATS_FILE));
        let written = serde_json::to_string_pretty(&windows)
            .map_err(ResultsError::from)
            .and_then(|json| {
                std::fs::write(&stats_json, json).map_err(|e| ResultsError::Io {
                    context: "writing stats json",
                    source: e,
                })
            });
        if let Err(e) = written {
            tracing::warn!(file = %stats_json.display(), error = %e, "Unable to write stats json");
        }

        parsed.records
    }

    /// Host samples of one measurement within `[start, end]`, every
    /// `interval`-th sample.
    pub fn stats_window(
        &self,
        test: &str,
        type_name: &str,
        start: u64,
        end: u64,
        interval: usize,
    ) -> ResultsResult<StatsWindow> {
        let path = self.measurement_dir(test, type_name).join(STATS_FILE);
        stats::read_stats_window(&path, start as f64, end as f64, interval)
    }

    /// Parse and report every measurement of `test` that has a raw log.
    ///
    /// Returns the number of measurements reported.
    pub fn parse_all(&mut self, test: &TestDescriptor) -> usize {
        let name = test.name.to_string();
        let mut reported = 0;
        for type_name in test.measurement_names() {
            if !self.measurement_dir(&name, type_name).join(RAW_FILE).exists() {
                continue;
            }
            let records = self.parse_measurement(&name, type_name);
            self.report_measurement(&name, type_name, records);
            reported += 1;
        }
        reported
    }

    // =========================================================================
    // Tool passes
    // =========================================================================

    pub async fn count_sloc(&mut self, generators: &BTreeMap<String, PathBuf>) {
        self.document.raw_data.sloc_counts = tools::count_sloc(&self.tools.sloc, generators).await;
    }

    pub async fn count_commits(&mut self, generators: &BTreeMap<String, PathBuf>) {
        self.document.raw_data.commit_counts =
            tools::count_commits(&self.tools.commits, generators, self.commit_workers).await;
    }

    /// Run both counting passes and rewrite the document.
    pub async fn parse(&mut self, generators: &BTreeMap<String, PathBuf>) {
        self.count_commits(generators).await;
        self.count_sloc(generators).await;
        self.persist();
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Stamp completion time, write the document and return the summary.
    pub fn finalize(&mut self) -> String {
        self.document.completion_time = Some(chrono::Utc::now().timestamp_millis());
        self.persist();

        let mut summary = self.document.summary();
        summary.push_str(&format!("Results are saved in {}\n", self.directory.display()));
        summary
    }

    /// Rewrite `results.json`, logging any failure.
    pub fn persist(&self) {
        if let Err(e) = self.write() {
            tracing::error!(file = %self.file.display(), error = %e, "Error writing results.json");
        }
    }

    fn write(&self) -> ResultsResult<()> {
        let json = serde_json::to_string_pretty(&self.document)?;
        let tmp = self.file.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| ResultsError::Io {
            context: "writing results",
            source: e,
        })?;
        std::fs::rename(&tmp, &self.file).map_err(|e| ResultsError::Io {
            context: "replacing results",
            source: e,
        })
    }
}

fn read_document(path: &Path) -> ResultsResult<ResultsDocument> {
    let content = std::fs::read_to_string(path).map_err(|e| ResultsError::Io {
        context: "reading results",
        source: e,
    })?;
    Ok(serde_json::from_str(&content)?)
}
