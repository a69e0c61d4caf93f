//! Cascading ignore/include rules
//!
//! Rule files (`.trackignore` by default) may live in any directory below the
//! tracker root. Each one scopes its patterns to its own directory, and rules
//! are evaluated ancestor-first so a subdirectory can re-include or re-exclude
//! what a parent excluded. The last matching rule decides.

pub mod engine;
pub mod parser;

pub use engine::{IgnoreEngine, RuleSet};
pub use parser::{ParsedLine, parse_line};

use globset::GlobMatcher;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IgnoreError {
    #[error("Rule text is empty")]
    EmptyRules,

    #[error("Directory {0:?} is outside the tracker root")]
    OutsideRoot(PathBuf),

    #[error("Rule file {path:?}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

pub type Result<T> = std::result::Result<T, IgnoreError>;

/// Whether a matching rule excludes or re-includes a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Polarity {
    Exclude,
    Include,
}

/// One compiled pattern
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    pub polarity: Polarity,
    /// Effective glob, `/`-separated and relative to `scope_directory`
    pub glob_pattern: String,
    /// Directory of the rule file that defined this rule
    pub scope_directory: PathBuf,
    pub source: PathBuf,
    pub line: usize,
    pub(crate) matcher: GlobMatcher,
}

impl IgnoreRule {
    pub fn is_include(&self) -> bool {
        self.polarity == Polarity::Include
    }
}
