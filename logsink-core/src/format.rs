//! Record formatting: plain template lines or structured JSON objects.

use std::fmt::Write as _;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::batch::LogValue;
use crate::config::{JsonOptions, SinkConfig};
use crate::error::SinkResult;

/// One structured output line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonRecord {
    pub time: String,
    #[serde(rename = "type")]
    pub category: String,
    pub msg: String,
}

/// Renders `now` with the configured `time_format`.
pub fn format_timestamp(now: &DateTime<Local>, config: &SinkConfig) -> String {
    now.format(&config.time_format).to_string()
}

/// Fills `%s` slots in `template` from `args`, left to right.
///
/// `%%` is a literal percent sign. Slots beyond the supplied arguments render
/// empty; any other `%` sequence is copied through.
pub fn apply_template(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len() + args.iter().map(|a| a.len()).sum::<usize>());
    let mut args = args.iter();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('s') => {
                chars.next();
                out.push_str(args.next().copied().unwrap_or(""));
            }
            Some('%') => {
                chars.next();
                out.push('%');
            }
            _ => out.push('%'),
        }
    }

    out
}

/// Serializes `value` honoring the encoding flags.
pub fn encode_json<T: Serialize>(value: &T, options: &JsonOptions) -> SinkResult<String> {
    let mut json = if options.pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };

    // Outside string literals JSON contains neither '/' nor non-ASCII, so
    // rewriting the whole output only touches string contents.
    if !options.unescaped_slashes {
        json = json.replace('/', "\\/");
    }
    if !options.unescaped_unicode {
        json = escape_non_ascii(&json);
    }
    Ok(json)
}

fn escape_non_ascii(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut units = [0u16; 2];
    for c in s.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            for unit in c.encode_utf16(&mut units) {
                let _ = write!(out, "\\u{:04x}", unit);
            }
        }
    }
    out
}

/// Formats every message of one category, preserving order.
pub fn format_messages(
    category: &str,
    messages: &[LogValue],
    timestamp: &str,
    config: &SinkConfig,
) -> SinkResult<Vec<String>> {
    messages
        .iter()
        .map(|message| {
            let text = message.canonical_text();
            if config.json {
                let record = JsonRecord {
                    time: timestamp.to_string(),
                    category: category.to_string(),
                    msg: text,
                };
                encode_json(&record, &config.json_options)
            } else {
                Ok(apply_template(&config.format, &[timestamp, category, text.as_str()]))
            }
        })
        .collect()
}
