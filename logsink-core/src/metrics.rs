//! Debug metrics merged into the record set.
//!
//! The counters come from the host runtime on every call; nothing here reads
//! process-global state.

use std::time::SystemTime;

use serde::Serialize;

use crate::config::SinkConfig;
use crate::error::SinkResult;
use crate::format::encode_json;

/// Host-supplied counters for the current unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeCounters {
    /// When the unit of work started.
    pub begin_time: SystemTime,
    /// Memory in use at the start, in bytes.
    pub begin_memory: u64,
    /// Memory in use now, in bytes.
    pub current_memory: u64,
    /// Number of loaded code units.
    pub loaded_units: usize,
}

impl RuntimeCounters {
    pub fn new(begin_time: SystemTime) -> Self {
        Self {
            begin_time,
            begin_memory: 0,
            current_memory: 0,
            loaded_units: 0,
        }
    }
}

/// Rendered metric values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugMetrics {
    /// Elapsed seconds, e.g. `0.012500s`.
    pub runtime: String,
    /// Requests per second, e.g. `80.00req/s`.
    pub reqs: String,
    /// Memory delta, e.g. `12.50kb`.
    pub memory: String,
    /// Loaded code units.
    pub file: usize,
}

impl DebugMetrics {
    /// Computes the metrics at `now`.
    pub fn compute(counters: &RuntimeCounters, now: SystemTime) -> Self {
        let elapsed = match now.duration_since(counters.begin_time) {
            Ok(d) => d.as_secs_f64(),
            Err(e) => -e.duration().as_secs_f64(),
        };
        let reqs = if elapsed > 0.0 {
            number_format(1.0 / elapsed, 2)
        } else {
            "∞".to_string()
        };
        let memory_delta = (counters.current_memory as f64 - counters.begin_memory as f64) / 1024.0;

        Self {
            runtime: format!("{}s", number_format(elapsed, 6)),
            reqs: format!("{}req/s", reqs),
            memory: format!("{}kb", number_format(memory_delta, 2)),
            file: counters.loaded_units,
        }
    }

    /// Single plain-text header line.
    pub fn plain_line(&self) -> String {
        format!(
            "[RunTime:{}] [Throughput:{}] [Memory:{}] [Files:{}]",
            self.runtime, self.reqs, self.memory, self.file
        )
    }
}

/// Fixed-decimal rendering with `,` thousands separators.
pub fn number_format(value: f64, decimals: usize) -> String {
    let rendered = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match rendered.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (rendered.as_str(), None),
    };

    let mut grouped = String::with_capacity(rendered.len() + int_part.len() / 3 + 1);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if let Some(frac) = frac_part {
        grouped.push('.');
        grouped.push_str(frac);
    }

    let is_zero = rendered.chars().all(|c| c == '0' || c == '.');
    if value.is_sign_negative() && !is_zero {
        grouped.insert(0, '-');
    }
    grouped
}

/// Merges debug metrics into `records`.
///
/// Does nothing unless `enabled` (host in debug mode) and `append` are both
/// set. Plain output gets a leading header line, but only on the master file.
///
/// Structured output gets one leading JSON object `{runtime, reqs, memory,
/// file}` on every file, isolated ones included. The metric values are not
/// written as four separate bare lines, so every line of a JSON log decodes
/// as an object.
pub fn inject(
    records: &mut Vec<String>,
    enabled: bool,
    append: bool,
    isolated: bool,
    counters: &RuntimeCounters,
    config: &SinkConfig,
    now: SystemTime,
) -> SinkResult<()> {
    if !enabled || !append {
        return Ok(());
    }

    let metrics = DebugMetrics::compute(counters, now);
    if config.json {
        records.insert(0, encode_json(&metrics, &config.json_options)?);
    } else if !isolated {
        records.insert(0, metrics.plain_line());
    }
    Ok(())
}
