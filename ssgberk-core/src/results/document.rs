// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! The `results.json` document.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::types::VerifyResult;

/// One measurement window parsed from a raw log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_avg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_stdev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_max: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
}

/// Per-test records for one measurement type.
pub type TypeRecords = BTreeMap<String, Vec<MeasurementRecord>>;

/// Raw measurement data plus per-generator tool counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawData {
    #[serde(rename = "slocCounts", default)]
    pub sloc_counts: BTreeMap<String, u64>,
    #[serde(rename = "commitCounts", default)]
    pub commit_counts: BTreeMap<String, u64>,
    /// Measurement type -> test -> records.
    #[serde(flatten)]
    pub measurements: BTreeMap<String, TypeRecords>,
}

/// VCS provenance of the harness checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitInfo {
    pub commit_id: String,
    pub repository_url: String,
    pub branch_name: String,
}

impl GitInfo {
    /// Read provenance from the repository at `root`; `None` if any query fails.
    pub async fn probe(root: &Path) -> Option<Self> {
        let commit_id = git(root, &["rev-parse", "HEAD"]).await?;
        let repository_url = git(root, &["config", "--get", "remote.origin.url"]).await?;
        let branch_name = git(root, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        Some(Self {
            commit_id,
            repository_url,
            branch_name,
        })
    }
}

async fn git(root: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Aggregate report of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsDocument {
    pub uuid: String,
    pub name: String,
    pub environment_description: String,
    pub git: Option<GitInfo>,
    /// Milliseconds since the epoch.
    pub start_time: i64,
    pub completion_time: Option<i64>,
    /// Test names in the run.
    pub generators: Vec<String>,
    pub duration: u64,
    pub raw_data: RawData,
    /// Test -> last status message.
    #[serde(default)]
    pub completed: BTreeMap<String, String>,
    /// Measurement type -> tests with records.
    #[serde(default)]
    pub succeeded: BTreeMap<String, Vec<String>>,
    /// Measurement type -> tests without records.
    #[serde(default)]
    pub failed: BTreeMap<String, Vec<String>>,
    /// Test -> measurement type -> verification result.
    #[serde(default)]
    pub verify: BTreeMap<String, BTreeMap<String, VerifyResult>>,
}

impl ResultsDocument {
    /// Empty document with a bucket per measurement type.
    pub fn new<I, S>(measurement_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut document = Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            name: String::new(),
            environment_description: String::new(),
            git: None,
            start_time: chrono::Utc::now().timestamp_millis(),
            completion_time: None,
            generators: Vec::new(),
            duration: 0,
            raw_data: RawData::default(),
            completed: BTreeMap::new(),
            succeeded: BTreeMap::new(),
            failed: BTreeMap::new(),
            verify: BTreeMap::new(),
        };
        for type_name in measurement_types {
            let type_name = type_name.into();
            document
                .raw_data
                .measurements
                .insert(type_name.clone(), BTreeMap::new());
            document.succeeded.insert(type_name.clone(), Vec::new());
            document.failed.insert(type_name, Vec::new());
        }
        document
    }

    /// Record the outcome of one measurement.
    ///
    /// Non-empty records mark the pair succeeded, otherwise failed. A test
    /// is never in both lists for the same type.
    pub fn record_measurement(&mut self, test: &str, type_name: &str, records: Vec<MeasurementRecord>) {
        let succeeded = !records.is_empty();
        let (add_to, remove_from) = if succeeded {
            (&mut self.succeeded, &mut self.failed)
        } else {
            (&mut self.failed, &mut self.succeeded)
        };

        if let Some(names) = remove_from.get_mut(type_name) {
            names.retain(|name| name != test);
        }
        let names = add_to.entry(type_name.to_string()).or_default();
        if !names.iter().any(|name| name == test) {
            names.push(test.to_string());
        }

        let by_test = self
            .raw_data
            .measurements
            .entry(type_name.to_string())
            .or_default();
        if succeeded {
            by_test.insert(test.to_string(), records);
        } else {
            by_test.remove(test);
        }
    }

    pub fn record_verification(&mut self, test: &str, type_name: &str, result: VerifyResult) {
        self.verify
            .entry(test.to_string())
            .or_default()
            .insert(type_name.to_string(), result);
    }

    /// Whether `test` is listed as succeeded for `type_name`.
    pub fn has_succeeded(&self, test: &str, type_name: &str) -> bool {
        self.succeeded
            .get(type_name)
            .is_some_and(|names| names.iter().any(|n| n == test))
    }

    pub fn has_failed(&self, test: &str, type_name: &str) -> bool {
        self.failed
            .get(type_name)
            .is_some_and(|names| names.iter().any(|n| n == test))
    }

    /// Verification summary, one block per test in run order.
    pub fn summary(&self) -> String {
        let mut out = String::from("Verification Summary\n");
        for test in &self.generators {
            out.push_str(&format!("| {}\n", test));
            match self.verify.get(test) {
                Some(results) if !results.is_empty() => {
                    for (type_name, result) in results {
                        out.push_str(&format!("|       {:<13} : {}\n", type_name, result));
                    }
                }
                _ => out.push_str("|      NO RESULTS (Did generator launch?)\n"),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(start: u64) -> MeasurementRecord {
        MeasurementRecord {
            start_time: Some(start),
            end_time: Some(start + 100),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_document_has_type_buckets() {
        let doc = ResultsDocument::new(["build"]);
        assert!(doc.succeeded["build"].is_empty());
        assert!(doc.failed["build"].is_empty());
        assert!(doc.raw_data.measurements["build"].is_empty());
        assert!(doc.completion_time.is_none());
        assert_eq!(doc.uuid.len(), 36);
    }

    #[test]
    fn test_record_measurement_is_exclusive_and_idempotent() {
        let mut doc = ResultsDocument::new(["build"]);

        doc.record_measurement("jekyll", "build", Vec::new());
        doc.record_measurement("jekyll", "build", Vec::new());
        assert_eq!(doc.failed["build"], vec!["jekyll"]);
        assert!(!doc.has_succeeded("jekyll", "build"));

        doc.record_measurement("jekyll", "build", vec![record(100)]);
        doc.record_measurement("jekyll", "build", vec![record(100)]);
        assert_eq!(doc.succeeded["build"], vec!["jekyll"]);
        assert!(!doc.has_failed("jekyll", "build"));
        assert_eq!(doc.raw_data.measurements["build"]["jekyll"].len(), 1);
    }

    #[test]
    fn test_serialized_field_names() {
        let mut doc = ResultsDocument::new(["build"]);
        doc.raw_data.sloc_counts.insert("jekyll".to_string(), 120);
        doc.record_measurement("jekyll", "build", vec![record(100)]);
        doc.record_verification("jekyll", "build", VerifyResult::Pass);

        let value = serde_json::to_value(&doc).unwrap();
        assert!(value.get("environmentDescription").is_some());
        assert!(value["git"].is_null());
        assert!(value["completionTime"].is_null());
        assert_eq!(value["rawData"]["slocCounts"]["jekyll"], 120);
        assert_eq!(value["rawData"]["build"]["jekyll"][0]["startTime"], 100);
        assert!(value["rawData"]["build"]["jekyll"][0].get("latencyAvg").is_none());
        assert_eq!(value["verify"]["jekyll"]["build"], "PASS");

        let back: ResultsDocument = serde_json::from_value(value).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_summary() {
        let mut doc = ResultsDocument::new(["build"]);
        doc.generators = vec!["hugo".to_string(), "jekyll".to_string()];
        doc.record_verification("jekyll", "build", VerifyResult::Warn);

        let summary = doc.summary();
        assert!(summary.contains("| hugo\n|      NO RESULTS (Did generator launch?)"));
        assert!(summary.contains("|       build         : WARN"));
    }
}
