// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Per-generator source statistics gathered with external tools.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{ResultsError, ResultsResult};

/// Placeholder replaced by the quoted generator directory.
pub const DIR_PLACEHOLDER: &str = "{dir}";

fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

/// Expand `template` for one generator directory.
pub fn render(template: &str, dir: &Path) -> String {
    template.replace(DIR_PLACEHOLDER, &shell_quote(dir))
}

/// Run a count template in `dir` and parse its output as an integer.
pub async fn run_count(template: &str, dir: &Path) -> ResultsResult<u64> {
    let command = render(template, dir);
    let tool_error = |reason: String| ResultsError::Tool {
        command: command.clone(),
        reason,
    };

    let output = Command::new("sh")
        .arg("-c")
        .arg(&command)
        .current_dir(dir)
        .output()
        .await
        .map_err(|e| tool_error(e.to_string()))?;

    if !output.status.success() {
        return Err(tool_error(format!(
            "exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .trim()
        .parse()
        .map_err(|e| tool_error(format!("unexpected output {:?}: {}", stdout.trim(), e)))
}

/// Significant lines of code per generator, counted one at a time.
pub async fn count_sloc(template: &str, generators: &BTreeMap<String, PathBuf>) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for (generator, dir) in generators {
        match run_count(template, dir).await {
            Ok(count) => {
                tracing::debug!(generator = %generator, sloc = count, "Counted lines of code");
                counts.insert(generator.clone(), count);
            }
            Err(e) => {
                tracing::warn!(generator = %generator, error = %e, "Unable to count lines of code")
            }
        }
    }
    counts
}

/// Commit counts per generator with at most `workers` tools running at once.
///
/// Each task writes only its own generator's key.
pub async fn count_commits(
    template: &str,
    generators: &BTreeMap<String, PathBuf>,
    workers: usize,
) -> BTreeMap<String, u64> {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let counts: Arc<DashMap<String, u64>> = Arc::new(DashMap::new());
    let mut tasks = JoinSet::new();

    for (generator, dir) in generators {
        let semaphore = semaphore.clone();
        let counts = counts.clone();
        let template = template.to_string();
        let generator = generator.clone();
        let dir = dir.clone();

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            match run_count(&template, &dir).await {
                Ok(count) => {
                    counts.insert(generator, count);
                }
                Err(e) => {
                    tracing::warn!(generator = %generator, error = %e, "Unable to count commits")
                }
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::warn!(error = %e, "Commit count task failed");
        }
    }

    counts
        .iter()
        .map(|entry| (entry.key().clone(), *entry.value()))
        .collect()
}
