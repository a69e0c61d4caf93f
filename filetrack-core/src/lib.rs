//! Core functionality for filetrack
//!
//! Keeps a backup of every tracked file and reports a structured diff whenever
//! a file's content changes. Files are selected by enabling paths and filtered
//! through cascading `.trackignore` rule files.
//!
//! ```no_run
//! use filetrack_core::{FileTracker, TrackerConfig, storage, store::JsonFilePersistence};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = TrackerConfig::for_root("/srv/docs");
//! let persistence = Arc::new(JsonFilePersistence::new(config.database_path()));
//! let tracker = FileTracker::new(config.clone(), storage::build(&config), persistence).await?;
//!
//! tracker.enable(&config.root).await?;
//! let mut changes = tracker.subscribe();
//! let _watch = tracker.watch()?;
//! while let Ok(change) = changes.recv().await {
//!     println!("{:?} changed", change.path);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod config;
pub mod monitor;
pub mod path;
pub mod retry;
pub mod rules;
pub mod storage;
pub mod store;
pub mod tracking;

pub use backup::{DiffEntry, DiffKind, DiffResult};
pub use config::{DiffView, TrackerConfig};
pub use monitor::{ChangeType, FileChange};
pub use rules::IgnoreEngine;
pub use tracking::{ContentChanged, FileTracker};
