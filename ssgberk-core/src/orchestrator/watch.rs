// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Process output streaming.
//!
//! Container and build output is read from stdout and stderr through one
//! shared pipe as a single ordered line stream. Log watchers copy such a stream to disk in a background task
//! that can be cancelled and awaited.

use std::os::fd::OwnedFd;
use std::path::Path;
use std::process::Stdio;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{OrchestratorError, OrchestratorResult};

lazy_static! {
    static ref STEP_LINE: Regex = Regex::new(r"^Step \d+/\d+").unwrap();
}

/// Whether a build output line announces a new build step.
pub fn is_step_line(line: &str) -> bool {
    STEP_LINE.is_match(line)
}

/// Spawn `command` with stdout and stderr sharing one pipe.
///
/// Both streams write into the same pipe, so the returned line stream keeps
/// the order in which the process wrote them. The receiver yields `None`
/// once every writer has closed. The process dies with its handle.
pub fn spawn_combined(
    mut command: Command,
    what: &'static str,
) -> OrchestratorResult<(Child, mpsc::UnboundedReceiver<String>)> {
    let spawn_error = |source| OrchestratorError::Spawn { what, source };

    let (reader, writer) = std::io::pipe().map_err(spawn_error)?;
    let stderr = writer.try_clone().map_err(spawn_error)?;
    command
        .stdin(Stdio::null())
        .stdout(writer)
        .stderr(stderr)
        .kill_on_drop(true);
    let child = command.spawn().map_err(spawn_error)?;
    // The command holds the parent's write ends; the stream ends only once they close.
    drop(command);

    let receiver = pipe::Receiver::from_owned_fd(OwnedFd::from(reader)).map_err(spawn_error)?;
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(receiver).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    Ok((child, rx))
}

/// Background task copying a process's output into a log file.
pub struct LogWatcher {
    label: String,
    cancel: watch::Sender<bool>,
    task: JoinHandle<u64>,
}

impl LogWatcher {
    /// Start `command` and append its merged output to `log_path`.
    ///
    /// The process is killed when the watcher is cancelled or the stream
    /// ends, whichever comes first.
    pub async fn spawn(
        command: Command,
        log_path: &Path,
        label: impl Into<String>,
    ) -> OrchestratorResult<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .await
            .map_err(|e| OrchestratorError::Io {
                context: "opening container log",
                source: e,
            })?;

        let (mut child, mut lines) = spawn_combined(command, "log follower")?;
        let (cancel, mut cancelled) = watch::channel(false);

        let label = label.into();
        let task_label = label.clone();
        let task = tokio::spawn(async move {
            let mut written = 0u64;
            loop {
                tokio::select! {
                    _ = cancelled.changed() => break,
                    line = lines.recv() => {
                        let Some(line) = line else { break };
                        if let Err(e) = file.write_all(format!("{}\n", line).as_bytes()).await {
                            tracing::warn!(container = %task_label, error = %e, "Failed to write log line");
                            break;
                        }
                        written += 1;
                    }
                }
            }

            let _ = child.start_kill();
            let _ = child.wait().await;
            let _ = file.flush().await;
            tracing::debug!(container = %task_label, lines = written, "Log watcher stopped");
            written
        });

        Ok(Self {
            label,
            cancel,
            task,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the task to stop without waiting for it.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Cancel the task and wait for it to flush. Returns lines written.
    pub async fn shutdown(self) -> u64 {
        self.cancel();
        self.join().await
    }

    /// Wait for the stream to end on its own. Returns lines written.
    pub async fn join(self) -> u64 {
        match self.task.await {
            Ok(written) => written,
            Err(e) => {
                tracing::warn!(container = %self.label, error = %e, "Log watcher task failed");
                0
            }
        }
    }
}

/// One unit of build output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// Output text, possibly several lines or a partial one.
    Output(String),
    /// Error reported by the engine; the build is aborted.
    Error(String),
}

impl BuildEvent {
    /// Interpret one line of build output.
    ///
    /// Engines that stream JSON send `{"stream": ..}` chunks and an
    /// `{"errorDetail": {"message": ..}}` object on failure; anything else
    /// is treated as a plain text line.
    pub fn parse(line: &str) -> Self {
        if let Ok(Value::Object(event)) = serde_json::from_str::<Value>(line) {
            if let Some(message) = event
                .get("errorDetail")
                .and_then(|d| d.get("message"))
                .and_then(Value::as_str)
            {
                return Self::Error(message.to_string());
            }
            if let Some(stream) = event.get("stream").and_then(Value::as_str) {
                return Self::Output(stream.to_string());
            }
        }
        Self::Output(format!("{}\n", line))
    }
}

/// Reassembles complete lines from arbitrarily split output chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.pending.push_str(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }

    /// Return the trailing partial line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}
