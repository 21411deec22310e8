// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Host resource samples (`dstat` CSV output) cut to a time window.
//!
//! The file starts with a free-form preamble terminated by a blank line,
//! followed by a group header row, a sub-metric header row containing an
//! `epoch` column, and one row of floats per sample. Samples are assumed to
//! be in ascending epoch order.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Serialize, Serializer};

use crate::error::{ResultsError, ResultsResult};

/// Name of the sub-metric column holding the sample time.
pub const EPOCH_COLUMN: &str = "epoch";

/// Sample time in seconds; totally ordered so it can key a map.
#[derive(Debug, Clone, Copy)]
pub struct Epoch(pub f64);

impl PartialEq for Epoch {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Epoch {}

impl PartialOrd for Epoch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Epoch {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Always carries a fractional part, so `100.0` renders as `"100.0"`.
impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl Serialize for Epoch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Group -> metric -> value for one sample.
pub type StatsRow = BTreeMap<String, BTreeMap<String, f64>>;

/// Samples of one window keyed by epoch.
pub type StatsWindow = BTreeMap<Epoch, StatsRow>;

/// Read the samples of `path` within `[start, end]`, keeping every
/// `interval`-th one.
pub fn read_stats_window(path: &Path, start: f64, end: f64, interval: usize) -> ResultsResult<StatsWindow> {
    let file = File::open(path).map_err(|e| ResultsError::Io {
        context: "opening stats file",
        source: e,
    })?;

    parse_stats_window(BufReader::new(file), start, end, interval).map_err(|reason| {
        ResultsError::StatsFormat {
            path: path.to_path_buf(),
            reason,
        }
    })
}

/// Parse samples from `reader`; see [`read_stats_window`].
///
/// An `interval` of 0 is treated as 1. Rows whose epoch cannot be read are
/// skipped; scanning stops at the first epoch past `end`.
pub fn parse_stats_window<R: BufRead>(
    reader: R,
    start: f64,
    end: f64,
    interval: usize,
) -> Result<StatsWindow, String> {
    let interval = interval.max(1);
    let mut lines = reader.lines();

    let mut next_line = |what: &str| -> Result<String, String> {
        match lines.next() {
            Some(Ok(line)) => Ok(line),
            Some(Err(e)) => Err(format!("reading {}: {}", what, e)),
            None => Err(format!("missing {}", what)),
        }
    };

    while !next_line("blank line after preamble")?.trim().is_empty() {}

    let main_header = split_csv(&next_line("group header")?);
    let sub_header = split_csv(&next_line("metric header")?);
    let epoch_column = sub_header
        .iter()
        .position(|h| h == EPOCH_COLUMN)
        .ok_or_else(|| format!("no `{}` column in metric header", EPOCH_COLUMN))?;

    // Group names are only written above the first column of each group.
    let mut groups = Vec::with_capacity(sub_header.len());
    let mut group = String::new();
    for index in 0..sub_header.len() {
        if let Some(name) = main_header.get(index).filter(|n| !n.is_empty()) {
            group = name.clone();
        }
        groups.push(group.clone());
    }

    let mut window = StatsWindow::new();
    let mut qualifying = 0usize;

    for line in lines {
        let line = line.map_err(|e| format!("reading sample: {}", e))?;
        if line.trim().is_empty() {
            continue;
        }

        let row = split_csv(&line);
        let Some(time) = row.get(epoch_column).and_then(|v| v.trim().parse::<f64>().ok()) else {
            continue;
        };

        if time < start {
            continue;
        }
        if time > end {
            break;
        }

        qualifying += 1;
        if qualifying % interval != 0 {
            continue;
        }

        let mut sample = StatsRow::new();
        for name in groups.iter().filter(|g| !g.is_empty()) {
            sample.entry(name.clone()).or_default();
        }
        for (index, cell) in row.iter().enumerate() {
            let (Some(group), Some(metric)) = (groups.get(index), sub_header.get(index)) else {
                continue;
            };
            if group.is_empty() {
                continue;
            }
            if let Ok(value) = cell.trim().parse::<f64>() {
                sample
                    .entry(group.clone())
                    .or_default()
                    .insert(metric.clone(), value);
            }
        }

        window.insert(Epoch(time), sample);
    }

    Ok(window)
}

/// Split one CSV record, honoring double quotes.
fn split_csv(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.trim_end_matches(['\r', '\n']).chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            c => field.push(c),
        }
    }
    fields.push(field);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREAMBLE: &str = "\"Dstat 0.7.4 CSV output\"
\"Author:\",\"Dag Wieers <dag@wieers.com>\",,,,\"URL:\",\"http://dag.wieers.com/home-made/dstat/\"
\"Host:\",\"bench\",,,,\"User:\",\"root\"

\"epoch\",\"total cpu usage\",,,\"memory usage\",
\"epoch\",\"usr\",\"sys\",\"idl\",\"used\",\"free\"
";

    fn stats(rows: impl Iterator<Item = u64>) -> String {
        let mut out = PREAMBLE.to_string();
        for epoch in rows {
            out.push_str(&format!("{}.0,1.5,0.5,98.0,1024.0,4096.0\n", epoch));
        }
        out
    }

    #[test]
    fn test_split_csv() {
        assert_eq!(split_csv("\"a\",,\"b,c\",1.0"), vec!["a", "", "b,c", "1.0"]);
        assert_eq!(split_csv("\"say \"\"hi\"\"\""), vec!["say \"hi\""]);
    }

    #[test]
    fn test_groups_carry_forward() {
        let window = parse_stats_window(stats(100..=100).as_bytes(), 100.0, 100.0, 1).unwrap();
        let sample = &window[&Epoch(100.0)];
        assert_eq!(sample["epoch"]["epoch"], 100.0);
        assert_eq!(sample["total cpu usage"]["usr"], 1.5);
        assert_eq!(sample["total cpu usage"]["idl"], 98.0);
        assert_eq!(sample["memory usage"]["used"], 1024.0);
        assert_eq!(sample["memory usage"]["free"], 4096.0);
    }

    #[test]
    fn test_interval_decimation() {
        // Five samples before the window do not shift the decimation.
        let window = parse_stats_window(stats(95..=120).as_bytes(), 100.0, 109.0, 2).unwrap();
        let epochs: Vec<f64> = window.keys().map(|e| e.0).collect();
        assert_eq!(epochs, vec![101.0, 103.0, 105.0, 107.0, 109.0]);
    }

    #[test]
    fn test_window_bounds_inclusive() {
        let window = parse_stats_window(stats(1..=10).as_bytes(), 3.0, 5.0, 1).unwrap();
        let epochs: Vec<f64> = window.keys().map(|e| e.0).collect();
        assert_eq!(epochs, vec![3.0, 4.0, 5.0]);

        let window = parse_stats_window(stats(1..=10).as_bytes(), 0.0, 100.0, 0).unwrap();
        assert_eq!(window.len(), 10);
    }

    #[test]
    fn test_malformed_files() {
        assert!(parse_stats_window("no blank line".as_bytes(), 0.0, 1.0, 1).is_err());
        assert!(parse_stats_window("pre\n\n\"a\"\n\"b\"\n1.0\n".as_bytes(), 0.0, 1.0, 1).is_err());
    }

    #[test]
    fn test_serializes_epoch_keys() {
        let window = parse_stats_window(stats(100..=100).as_bytes(), 0.0, 1000.0, 1).unwrap();
        let json = serde_json::to_value(&window).unwrap();
        assert_eq!(json["100.0"]["memory usage"]["used"], 1024.0);
        assert_eq!(Epoch(1600000000.25).to_string(), "1600000000.25");
    }
}
