//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use logsink_core::prelude::*;
//! ```

// Sink entry point
pub use crate::sink::{LogSink, SaveReport};

// Inputs to `save`
pub use crate::batch::{LogBatch, LogValue};
pub use crate::metrics::RuntimeCounters;
pub use crate::persist::RequestContext;

// Configuration
pub use crate::config::{load_config, Isolation, KeyValueConfig, SingleFile, SinkConfig};

// Stores
pub use crate::persist::{MemoryStore, PersistOutcome, RecordStore};
#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteStore;

// Errors
pub use crate::error::{SinkError, SinkResult};
