//! Slow SQL extraction from raw trace lines.
//!
//! SQL traces look like
//! `[ SQL ] SELECT * FROM users WHERE id = 1 [ RunTime:0.120000s ]`, and the
//! first trace of a request is usually the connection line
//! `[ DB ] CONNECT:[ UseTime:0.001000s ] mysql:host=127.0.0.1;dbname=shop`.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Schema introspection issued by the ORM, never interesting.
pub const SCHEMA_MARKER: &str = "SHOW FULL COLUMNS";

/// Connection setup line.
pub const CONNECT_MARKER: &str = "CONNECT:";

/// Runtime token embedded at the end of each trace line.
pub const RUNTIME_MARKER: &str = "RunTime:";

/// A statement at or above the slow threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowRecord {
    /// Connection label (DSN) the statement ran on.
    pub db: String,
    /// The raw trace line.
    pub sql: String,
    /// Measured runtime in milliseconds.
    pub runtime: f64,
}

/// Result of scanning one batch's SQL traces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlowQueryScan {
    pub records: Vec<SlowRecord>,
    /// Highest runtime among `records`, 0.0 when empty.
    pub max_runtime: f64,
}

impl SlowQueryScan {
    /// Whether anything is worth persisting.
    pub fn has_slow(&self) -> bool {
        self.max_runtime > 0.0
    }
}

fn runtime_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    // SAFETY: hardcoded pattern, covered by tests.
    REGEX.get_or_init(|| {
        Regex::new(r"^\s*([0-9]+(?:\.[0-9]+)?)\s*(ms|s)?").expect("Hardcoded regex pattern is valid")
    })
}

/// Schema introspection and connection lines carry no query timing.
pub fn is_noise(line: &str) -> bool {
    line.contains(SCHEMA_MARKER) || line.contains(CONNECT_MARKER)
}

/// Runtime in milliseconds from the last `RunTime:` token.
///
/// `s` or a bare number is read as seconds, `ms` as milliseconds. A missing or
/// malformed token yields 0.0.
pub fn parse_runtime_ms(line: &str) -> f64 {
    let Some(pos) = line.rfind(RUNTIME_MARKER) else {
        return 0.0;
    };
    let tail = &line[pos + RUNTIME_MARKER.len()..];

    let Some(caps) = runtime_regex().captures(tail) else {
        return 0.0;
    };
    let value: f64 = caps[1].parse().unwrap_or(0.0);
    match caps.get(2).map(|m| m.as_str()) {
        Some("ms") => value,
        _ => value * 1000.0,
    }
}

/// DSN carried by a connection line, or an empty string for any other line.
pub fn connection_label(line: &str) -> String {
    let Some(pos) = line.find(CONNECT_MARKER) else {
        return String::new();
    };
    let rest = line[pos + CONNECT_MARKER.len()..].trim_start();
    let rest = match rest.strip_prefix('[') {
        Some(bracketed) => bracketed.split_once(']').map(|(_, r)| r).unwrap_or(""),
        None => rest,
    };
    rest.trim().to_string()
}

/// Keeps the trace lines whose runtime meets `threshold_ms`.
///
/// Every record is labelled with the connection from the first line of the
/// batch's SQL traces.
pub fn extract_slow_records<S: AsRef<str>>(lines: &[S], threshold_ms: f64) -> SlowQueryScan {
    let db = lines
        .first()
        .map(|l| connection_label(l.as_ref()))
        .unwrap_or_default();

    let mut scan = SlowQueryScan::default();
    for line in lines.iter().map(AsRef::as_ref) {
        if is_noise(line) {
            continue;
        }
        let runtime = parse_runtime_ms(line);
        if runtime >= threshold_ms {
            if runtime > scan.max_runtime {
                scan.max_runtime = runtime;
            }
            scan.records.push(SlowRecord {
                db: db.clone(),
                sql: line.to_string(),
                runtime,
            });
        }
    }
    scan
}
