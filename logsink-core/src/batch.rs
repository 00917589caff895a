//! Per-request log batches.
//!
//! A batch maps category names to messages. Category order is insertion
//! order, and it decides the order of lines in the output files.

use serde_json::Value;

/// Category carrying SQL execution traces.
pub const SQL_CATEGORY: &str = "sql";

/// Category carrying error entries.
pub const ERROR_CATEGORY: &str = "error";

/// A single log message.
#[derive(Debug, Clone, PartialEq)]
pub enum LogValue {
    /// Plain text, written as-is.
    Text(String),
    /// Any other value; rendered through [`LogValue::canonical_text`].
    Structured(Value),
}

impl LogValue {
    /// Debug-readable text form of the message.
    ///
    /// Text is returned unchanged. Structured values are pretty-printed JSON,
    /// except bare strings which are returned without quotes.
    pub fn canonical_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(Value::String(s)) => s.clone(),
            Self::Structured(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }
}

impl From<&str> for LogValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for LogValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Value> for LogValue {
    fn from(v: Value) -> Self {
        Self::Structured(v)
    }
}

/// Ordered mapping of category name to messages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogBatch {
    entries: Vec<(String, Vec<LogValue>)>,
}

impl LogBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one message to `category`, creating the category on first use.
    pub fn push(&mut self, category: impl Into<String>, message: impl Into<LogValue>) {
        let category = category.into();
        let message = message.into();
        match self.entries.iter_mut().find(|(c, _)| *c == category) {
            Some((_, messages)) => messages.push(message),
            None => self.entries.push((category, vec![message])),
        }
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, category: impl Into<String>, message: impl Into<LogValue>) -> Self {
        self.push(category, message);
        self
    }

    /// Messages recorded under `category`.
    pub fn get(&self, category: &str) -> Option<&[LogValue]> {
        self.entries
            .iter()
            .find(|(c, _)| c == category)
            .map(|(_, m)| m.as_slice())
    }

    pub fn contains(&self, category: &str) -> bool {
        self.get(category).is_some()
    }

    /// Text form of every message under `category`, in order.
    pub fn texts(&self, category: &str) -> Vec<String> {
        self.get(category)
            .map(|msgs| msgs.iter().map(LogValue::canonical_text).collect())
            .unwrap_or_default()
    }

    /// Categories with their messages, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[LogValue])> {
        self.entries.iter().map(|(c, m)| (c.as_str(), m.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<C, M> FromIterator<(C, M)> for LogBatch
where
    C: Into<String>,
    M: Into<LogValue>,
{
    fn from_iter<I: IntoIterator<Item = (C, M)>>(iter: I) -> Self {
        let mut batch = Self::new();
        for (category, message) in iter {
            batch.push(category, message);
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_groups_by_category_in_first_seen_order() {
        let batch: LogBatch = vec![
            ("info", "boot"),
            ("sql", "SELECT 1"),
            ("info", "ready"),
        ]
        .into_iter()
        .collect();

        let order: Vec<&str> = batch.iter().map(|(c, _)| c).collect();
        assert_eq!(order, vec!["info", "sql"]);
        assert_eq!(batch.texts("info"), vec!["boot", "ready"]);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_canonical_text() {
        assert_eq!(LogValue::from("plain").canonical_text(), "plain");
        assert_eq!(LogValue::from(json!("quoted")).canonical_text(), "quoted");
        assert_eq!(LogValue::from(json!(42)).canonical_text(), "42");

        let text = LogValue::from(json!({"user": 7})).canonical_text();
        assert!(text.contains("\"user\": 7"));
        assert!(text.contains('\n'));
    }

    #[test]
    fn test_missing_category() {
        let batch = LogBatch::new().with("info", "x");
        assert!(batch.contains("info"));
        assert!(!batch.contains(SQL_CATEGORY));
        assert!(batch.texts(ERROR_CATEGORY).is_empty());
    }
}
