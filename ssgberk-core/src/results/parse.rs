// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Raw benchmark log parser.
//!
//! Output between a `Warmup`/`Primer` marker and the next window header
//! (`Concurrency:` or `Queries:`) is ignored. Every window after a header
//! yields at most one record.

use std::io::BufRead;

use lazy_static::lazy_static;
use regex::Regex;

use super::document::MeasurementRecord;

lazy_static! {
    static ref LATENCY_TOKEN: Regex = Regex::new(r"[0-9]+\.*[0-9]*[usm%]+").unwrap();
    static ref START_TIME: Regex = Regex::new(r"STARTTIME\s+(\d+)").unwrap();
    static ref END_TIME: Regex = Regex::new(r"ENDTIME\s+(\d+)").unwrap();
}

const WINDOW_HEADERS: &[&str] = &["Concurrency:", "Queries:"];

/// Records of one raw log and the time windows they cover.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLog {
    pub records: Vec<MeasurementRecord>,
    /// `(start, end)` of every window that reported both markers.
    pub windows: Vec<(u64, u64)>,
}

/// Line-at-a-time parser state.
#[derive(Debug)]
pub struct RawLogParser {
    warmup: bool,
    /// Index of the record the current window writes into.
    current: Option<usize>,
    parsed: ParsedLog,
}

impl Default for RawLogParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RawLogParser {
    /// Parsing starts in warmup; nothing is recorded before the first header.
    pub fn new() -> Self {
        Self {
            warmup: true,
            current: None,
            parsed: ParsedLog::default(),
        }
    }

    /// Parse a whole log. A read error discards everything parsed.
    pub fn parse<R: BufRead>(reader: R) -> ParsedLog {
        let mut parser = Self::new();
        for line in reader.lines() {
            match line {
                Ok(line) => parser.feed(&line),
                Err(e) => {
                    tracing::warn!(error = %e, "Unreadable raw log");
                    return ParsedLog::default();
                }
            }
        }
        parser.finish()
    }

    pub fn feed(&mut self, line: &str) {
        if line.contains("Warmup") || line.contains("Primer") {
            self.warmup = true;
            self.current = None;
            return;
        }

        let trimmed = line.trim_start();
        if WINDOW_HEADERS.iter().any(|h| trimmed.starts_with(h)) {
            self.warmup = false;
            self.current = None;
            return;
        }

        if self.warmup || trimmed.is_empty() {
            return;
        }

        let index = match self.current {
            Some(index) => index,
            None => {
                self.parsed.records.push(MeasurementRecord::default());
                let index = self.parsed.records.len() - 1;
                self.current = Some(index);
                index
            }
        };
        let record = &mut self.parsed.records[index];

        if line.contains("Latency") {
            let tokens: Vec<&str> = LATENCY_TOKEN.find_iter(line).map(|m| m.as_str()).collect();
            if tokens.len() == 4 {
                record.latency_avg = Some(tokens[0].to_string());
                record.latency_stdev = Some(tokens[1].to_string());
                record.latency_max = Some(tokens[2].to_string());
            }
        }

        if let Some(start) = capture_u64(&START_TIME, line) {
            record.start_time = Some(start);
        }

        if let Some(end) = capture_u64(&END_TIME, line) {
            record.end_time = Some(end);
            if let Some(start) = record.start_time {
                self.parsed.windows.push((start, end));
            }
        }
    }

    pub fn finish(self) -> ParsedLog {
        self.parsed
    }
}

fn capture_u64(pattern: &Regex, line: &str) -> Option<u64> {
    pattern
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
