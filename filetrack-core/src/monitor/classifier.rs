//! File type classification used to pick a diff strategy

use content_inspector::{ContentType, inspect};
use std::collections::HashSet;
use std::path::Path;

/// How a file's content should be compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Line-oriented text; diffed line by line
    Text,
    /// Anything else; compared by hash only
    Binary,
}

/// Number of leading bytes inspected when the extension is inconclusive
const SNIFF_LEN: usize = 8192;

/// Classifies files as text or binary based on extension and content
pub struct FileClassifier {
    text_extensions: HashSet<&'static str>,
    binary_extensions: HashSet<&'static str>,
    text_filenames: HashSet<&'static str>,
}

impl Default for FileClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl FileClassifier {
    /// Create a new file classifier with default patterns
    pub fn new() -> Self {
        let text_extensions = [
            // Documentation
            "txt", "md", "markdown", "rst", "adoc", "org", "tex", "csv", "tsv", "log",
            // Source code
            "rs", "py", "js", "ts", "jsx", "tsx", "go", "java", "kt", "c", "h", "cpp", "hpp",
            "cs", "rb", "php", "swift", "scala", "sh", "bash", "zsh", "ps1", "sql", "lua",
            // Markup and configuration
            "html", "htm", "css", "scss", "xml", "svg", "json", "yaml", "yml", "toml", "ini",
            "cfg", "conf", "properties", "env",
        ]
        .into_iter()
        .collect();

        let binary_extensions = [
            "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tiff", "pdf", "zip", "gz",
            "tgz", "xz", "zst", "7z", "rar", "tar", "exe", "dll", "so", "dylib", "o", "a",
            "class", "jar", "wasm", "mp3", "mp4", "mov", "avi", "wav", "flac", "ogg", "db",
            "sqlite", "bin", "docx", "xlsx", "pptx",
        ]
        .into_iter()
        .collect();

        let text_filenames = [
            "makefile", "dockerfile", "license", "readme", "changelog", "gemfile", "procfile",
        ]
        .into_iter()
        .collect();

        Self { text_extensions, binary_extensions, text_filenames }
    }

    /// Classify by name alone; `None` when the name says nothing either way
    pub fn classify_path(&self, path: &Path) -> Option<FileKind> {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_lowercase();
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();

        if self.text_extensions.contains(extension.as_str()) {
            return Some(FileKind::Text);
        }
        if self.binary_extensions.contains(extension.as_str()) {
            return Some(FileKind::Binary);
        }
        if extension.is_empty() && self.text_filenames.contains(file_name.as_str()) {
            return Some(FileKind::Text);
        }
        None
    }

    /// Classify a file using its name, falling back to sniffing `content`
    pub fn classify(&self, path: &Path, content: &[u8]) -> FileKind {
        if let Some(kind) = self.classify_path(path) {
            return kind;
        }

        let sample = &content[..content.len().min(SNIFF_LEN)];
        match inspect(sample) {
            ContentType::BINARY => FileKind::Binary,
            _ => FileKind::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_extension() {
        let classifier = FileClassifier::new();

        assert_eq!(classifier.classify(Path::new("notes.md"), b""), FileKind::Text);
        assert_eq!(classifier.classify(Path::new("main.RS"), b""), FileKind::Text);
        assert_eq!(classifier.classify(Path::new("photo.png"), b"plain"), FileKind::Binary);
    }

    #[test]
    fn test_classify_known_filenames() {
        let classifier = FileClassifier::new();

        assert_eq!(classifier.classify_path(Path::new("Makefile")), Some(FileKind::Text));
        assert_eq!(classifier.classify_path(Path::new("unknown")), None);
    }

    #[test]
    fn test_sniff_unknown_extension() {
        let classifier = FileClassifier::new();

        assert_eq!(classifier.classify(Path::new("data.dat"), b"hello\nworld\n"), FileKind::Text);
        assert_eq!(
            classifier.classify(Path::new("data.dat"), &[0x00, 0xff, 0x10, 0x00, 0x42]),
            FileKind::Binary
        );
    }
}
