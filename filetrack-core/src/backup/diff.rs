//! Diff strategies

use super::{DiffEntry, DiffKind, DiffResult, content_hash};
use crate::config::DiffView;
use similar::{Algorithm, DiffTag, TextDiff};

/// Compares a backup against current content
pub trait DiffStrategy: Send + Sync {
    fn diff(&self, original: &[u8], current: &[u8]) -> DiffResult;
}

/// Line diff over lossily decoded UTF-8
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDiffStrategy {
    view: DiffView,
}

impl TextDiffStrategy {
    pub fn new(view: DiffView) -> Self {
        Self { view }
    }
}

fn block(kind: DiffKind, original: Option<String>, modified: Option<String>, old: usize, new: usize) -> DiffEntry {
    DiffEntry {
        original_line: original.as_ref().map(|_| old + 1),
        modified_line: modified.as_ref().map(|_| new + 1),
        kind,
        original,
        modified,
    }
}

impl DiffStrategy for TextDiffStrategy {
    fn diff(&self, original: &[u8], current: &[u8]) -> DiffResult {
        let old = String::from_utf8_lossy(original);
        let new = String::from_utf8_lossy(current);

        let diff = TextDiff::configure().algorithm(Algorithm::Myers).diff_lines(&old, &new);
        let old_lines = diff.old_slices();
        let new_lines = diff.new_slices();
        let mut entries = Vec::new();

        for op in diff.ops() {
            let (tag, old_range, new_range) = op.as_tag_tuple();
            let old_text = old_lines[old_range.clone()].concat();
            let new_text = new_lines[new_range.clone()].concat();

            match tag {
                DiffTag::Equal => entries.push(block(
                    DiffKind::Unchanged,
                    Some(old_text),
                    Some(new_text),
                    old_range.start,
                    new_range.start,
                )),
                DiffTag::Delete => {
                    entries.push(block(DiffKind::Deleted, Some(old_text), None, old_range.start, 0))
                }
                DiffTag::Insert => {
                    entries.push(block(DiffKind::Inserted, None, Some(new_text), 0, new_range.start))
                }
                DiffTag::Replace => match self.view {
                    DiffView::Inline => {
                        entries.push(block(DiffKind::Deleted, Some(old_text), None, old_range.start, 0));
                        entries.push(block(DiffKind::Inserted, None, Some(new_text), 0, new_range.start));
                    }
                    DiffView::SideBySide => {
                        let paired = old_range.len().min(new_range.len());
                        for i in 0..paired {
                            let (o, n) = (old_range.start + i, new_range.start + i);
                            entries.push(block(
                                DiffKind::Modified,
                                Some(old_lines[o].to_string()),
                                Some(new_lines[n].to_string()),
                                o,
                                n,
                            ));
                        }
                        if old_range.len() > paired {
                            let start = old_range.start + paired;
                            let rest = old_lines[start..old_range.end].concat();
                            entries.push(block(DiffKind::Deleted, Some(rest), None, start, 0));
                        }
                        if new_range.len() > paired {
                            let start = new_range.start + paired;
                            let rest = new_lines[start..new_range.end].concat();
                            entries.push(block(DiffKind::Inserted, None, Some(rest), 0, start));
                        }
                    }
                },
            }
        }

        let is_changed = entries.iter().any(|e| e.kind != DiffKind::Unchanged);
        DiffResult { is_changed, is_initial: false, entries }
    }
}

/// Hash comparison only; binary content produces no entries
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryDiffStrategy;

impl DiffStrategy for BinaryDiffStrategy {
    fn diff(&self, original: &[u8], current: &[u8]) -> DiffResult {
        DiffResult {
            is_changed: content_hash(original) != content_hash(current),
            is_initial: false,
            entries: Vec::new(),
        }
    }
}
