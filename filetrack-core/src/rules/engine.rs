//! Rule discovery, compilation and evaluation

use super::{IgnoreError, IgnoreRule, Polarity, Result, parse_line};
use crate::path::{has_hidden_name, is_hidden, is_within, normalize, relative_to, to_slash};
use crate::retry::{RetryPolicy, retry_with_backoff};
use globset::GlobBuilder;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

/// Immutable set of compiled rules in evaluation order
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<IgnoreRule>,
    files: Vec<PathBuf>,
}

impl RuleSet {
    pub fn rules(&self) -> &[IgnoreRule] {
        &self.rules
    }

    /// Rule files that contributed, ancestor-first
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Answers "is this path ignored?" against the rule files below a root.
///
/// Readers take a cheap clone of the current `Arc<RuleSet>`; reloads build a
/// new set and swap it in, so a reader never sees a half-built rule list.
pub struct IgnoreEngine {
    root: PathBuf,
    rule_file_name: String,
    case_insensitive: bool,
    retry: RetryPolicy,
    snapshot: RwLock<Arc<RuleSet>>,
    /// Serialises rule-file edits made through this engine
    write_lock: Mutex<()>,
}

impl IgnoreEngine {
    /// Create an engine with no rules loaded yet
    pub fn new(
        root: impl Into<PathBuf>,
        rule_file_name: impl Into<String>,
        case_insensitive: bool,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            root: normalize(&root.into()),
            rule_file_name: rule_file_name.into(),
            case_insensitive,
            retry,
            snapshot: RwLock::new(Arc::new(RuleSet::default())),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn rule_file_name(&self) -> &str {
        &self.rule_file_name
    }

    /// Current rule snapshot
    pub fn rules(&self) -> Arc<RuleSet> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Rule files found by the last load, ancestor-first
    pub fn rule_files(&self) -> Vec<PathBuf> {
        self.rules().files().to_vec()
    }

    /// Rediscover and recompile every rule file below the root, replacing the
    /// current snapshot. Returns the number of compiled rules.
    pub fn load(&self) -> usize {
        let set = Self::compile_scope(&self.root, &self.rule_file_name, self.case_insensitive);
        let count = set.len();
        info!("Loaded {} ignore rules from {} rule files", count, set.files.len());
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(set);
        count
    }

    /// Discover rule files under `scope` (pre-order, siblings by name) and
    /// compile them in that order.
    pub fn compile_scope(scope: &Path, rule_file_name: &str, case_insensitive: bool) -> RuleSet {
        let mut set = RuleSet::default();

        let walker = WalkDir::new(scope)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.file_type().is_dir() && (e.depth() == 0 || !has_hidden_name(e.path())));

        for entry in walker {
            let dir = match entry {
                Ok(entry) => entry.into_path(),
                Err(e) => {
                    debug!("Skipping unreadable directory during rule discovery: {}", e);
                    continue;
                }
            };

            let rule_file = dir.join(rule_file_name);
            if !rule_file.is_file() {
                continue;
            }

            let content = match std::fs::read_to_string(&rule_file) {
                Ok(content) => content,
                Err(e) => {
                    warn!("Treating unreadable rule file {:?} as empty: {}", rule_file, e);
                    continue;
                }
            };

            compile_file(&mut set.rules, &normalize(&dir), &rule_file, &content, case_insensitive);
            set.files.push(rule_file);
        }

        set
    }

    /// True if `path` is the rule file of some directory
    pub fn is_rule_file(&self, path: &Path) -> bool {
        path.file_name().map(|n| n.to_string_lossy() == self.rule_file_name.as_str()).unwrap_or(false)
    }

    /// True if the path is hidden or the last applicable rule excludes it
    pub fn is_ignored(&self, path: &Path) -> bool {
        let path = normalize(path);
        if is_hidden(&path, &self.root, self.case_insensitive) {
            trace!("Hidden path ignored: {:?}", path);
            return true;
        }

        let dir = path.parent().unwrap_or(&path);
        let rules = self.rules();
        let mut ignored = false;

        for rule in rules.rules() {
            if !is_within(dir, &rule.scope_directory, self.case_insensitive) {
                continue;
            }
            let Some(relative) = relative_to(&path, &rule.scope_directory, self.case_insensitive)
            else {
                continue;
            };
            let relative = to_slash(&relative);
            if relative.is_empty() {
                continue;
            }
            if rule.matcher.is_match(&relative) {
                ignored = rule.polarity == Polarity::Exclude;
            }
        }

        ignored
    }

    /// Append rule lines to the rule file in `directory` (the root when
    /// `None`) and recompile. Lines already present are skipped. Returns the
    /// number of lines written.
    pub async fn add_rules(&self, directory: Option<&Path>, text: &str) -> Result<usize> {
        let lines = requested_lines(text)?;
        let rule_file = self.rule_file_in(directory)?;

        let _guard = self.write_lock.lock().await;
        let existing = self.read_rule_file(&rule_file).await?;
        let present: Vec<&str> = existing.lines().map(str::trim).collect();

        let mut added: Vec<&str> = Vec::new();
        for line in lines {
            if !present.contains(&line) && !added.contains(&line) {
                added.push(line);
            }
        }
        if added.is_empty() {
            debug!("All requested rules already present in {:?}", rule_file);
            return Ok(0);
        }

        let mut content = existing.clone();
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        for line in &added {
            content.push_str(line);
            content.push('\n');
        }

        self.write_rule_file(&rule_file, content).await?;
        info!("Added {} rules to {:?}", added.len(), rule_file);
        self.load();
        Ok(added.len())
    }

    /// Remove rule lines from the rule file in `directory` and recompile.
    /// Returns the number of lines removed.
    pub async fn remove_rules(&self, directory: Option<&Path>, text: &str) -> Result<usize> {
        let lines = requested_lines(text)?;
        let rule_file = self.rule_file_in(directory)?;

        let _guard = self.write_lock.lock().await;
        let existing = self.read_rule_file(&rule_file).await?;

        let mut removed = 0;
        let mut content = String::with_capacity(existing.len());
        for line in existing.lines() {
            if lines.contains(&line.trim()) {
                removed += 1;
            } else {
                content.push_str(line);
                content.push('\n');
            }
        }

        if removed == 0 {
            return Ok(0);
        }

        self.write_rule_file(&rule_file, content).await?;
        info!("Removed {} rules from {:?}", removed, rule_file);
        self.load();
        Ok(removed)
    }

    fn rule_file_in(&self, directory: Option<&Path>) -> Result<PathBuf> {
        let dir = directory.map(normalize).unwrap_or_else(|| self.root.clone());
        if !is_within(&dir, &self.root, self.case_insensitive) {
            return Err(IgnoreError::OutsideRoot(dir));
        }
        Ok(dir.join(&self.rule_file_name))
    }

    async fn read_rule_file(&self, path: &Path) -> Result<String> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(source) => Err(IgnoreError::Io { path: path.to_path_buf(), source }),
        }
    }

    async fn write_rule_file(&self, path: &Path, content: String) -> Result<()> {
        retry_with_backoff(&self.retry, "rule file write", || {
            let content = content.clone();
            async move { tokio::fs::write(path, content).await }
        })
        .await
        .map_err(|source| IgnoreError::Io { path: path.to_path_buf(), source })
    }
}

fn requested_lines(text: &str) -> Result<Vec<&str>> {
    if text.trim().is_empty() {
        return Err(IgnoreError::EmptyRules);
    }
    Ok(text.lines().map(str::trim).filter(|l| !l.is_empty()).collect())
}

fn compile_file(
    rules: &mut Vec<IgnoreRule>,
    scope: &Path,
    source: &Path,
    content: &str,
    case_insensitive: bool,
) {
    for (index, raw) in content.lines().enumerate() {
        let Some(parsed) = parse_line(raw) else {
            continue;
        };

        for glob in parsed.globs {
            let compiled = GlobBuilder::new(&glob)
                .literal_separator(true)
                .backslash_escape(true)
                .case_insensitive(case_insensitive)
                .build();

            match compiled {
                Ok(compiled) => rules.push(IgnoreRule {
                    polarity: parsed.polarity,
                    glob_pattern: glob,
                    scope_directory: scope.to_path_buf(),
                    source: source.to_path_buf(),
                    line: index + 1,
                    matcher: compiled.compile_matcher(),
                }),
                Err(e) => {
                    warn!("Skipping malformed pattern {:?} at {:?}:{}: {}", raw, source, index + 1, e);
                }
            }
        }
    }
}
