//! Splits a batch between the master file and per-category files.

use crate::batch::LogBatch;
use crate::config::SinkConfig;
use crate::error::SinkResult;
use crate::format::format_messages;

/// Formatted lines of one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedCategory {
    pub category: String,
    pub lines: Vec<String>,
}

/// A batch after routing, in batch order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutedBatch {
    /// Categories bound for the shared master file.
    pub master: Vec<RoutedCategory>,
    /// Categories bound for their own isolated files.
    pub isolated: Vec<RoutedCategory>,
}

impl RoutedBatch {
    /// All master lines, category after category.
    pub fn master_lines(&self) -> Vec<String> {
        self.master
            .iter()
            .flat_map(|c| c.lines.iter().cloned())
            .collect()
    }

    pub fn has_master(&self) -> bool {
        !self.master.is_empty()
    }
}

/// Formats each category and assigns it to the master or an isolated file.
pub fn route(batch: &LogBatch, config: &SinkConfig, timestamp: &str) -> SinkResult<RoutedBatch> {
    let mut routed = RoutedBatch::default();

    for (category, messages) in batch.iter() {
        let entry = RoutedCategory {
            category: category.to_string(),
            lines: format_messages(category, messages, timestamp, config)?,
        };
        if config.apart_level.is_isolated(category) {
            routed.isolated.push(entry);
        } else {
            routed.master.push(entry);
        }
    }

    Ok(routed)
}
