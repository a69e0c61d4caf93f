//! Rule-file line parsing
//!
//! One line becomes zero, one or two glob patterns. See [`parse_line`].

use super::Polarity;

/// A pattern line after comment stripping and expansion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub polarity: Polarity,
    /// Effective globs, relative to the rule file's directory
    pub globs: Vec<String>,
}

/// Strip an inline comment. `\#` yields a literal `#`; other escapes are kept
/// for the glob compiler.
pub fn strip_comment(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('#') => out.push('#'),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            },
            '#' => break,
            other => out.push(other),
        }
    }

    out
}

/// Parse one rule-file line.
///
/// Returns `None` for blank and comment lines. A `!` prefix flips the polarity
/// to include, a trailing `/` expands into `name` plus `name/**`, a leading `/`
/// anchors the pattern to the rule file's directory, and a slash-free pattern
/// matches at any depth. A trailing `/**` does not count as a slash.
pub fn parse_line(raw: &str) -> Option<ParsedLine> {
    let stripped = strip_comment(raw);
    let line = stripped.trim();
    if line.is_empty() {
        return None;
    }

    let (polarity, body) = match line.strip_prefix('!') {
        Some(rest) => (Polarity::Include, rest),
        None => (Polarity::Exclude, line),
    };

    let body = normalise_separators(body);

    let is_directory = body.ends_with('/');
    let name = body.trim_end_matches('/');
    // A trailing `/**` does not anchor, so `name/` and `name` + `name/**` agree
    let (anchored, name) = match name.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (name.strip_suffix("/**").unwrap_or(name).contains('/'), name),
    };

    if name.is_empty() {
        return None;
    }

    let base = if anchored || name.starts_with("**") {
        name.to_string()
    } else {
        format!("**/{name}")
    };

    let globs = if is_directory { vec![base.clone(), format!("{base}/**")] } else { vec![base] };

    Some(ParsedLine { polarity, globs })
}

/// Turn `\` separators into `/` while keeping glob escapes such as `\*`
fn normalise_separators(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some(next) if is_escapable(next) => {
                out.push('\\');
                out.push(next);
                chars.next();
            }
            _ => out.push('/'),
        }
    }

    while out.contains("//") {
        out = out.replace("//", "/");
    }
    out
}

fn is_escapable(c: char) -> bool {
    matches!(c, '*' | '?' | '[' | ']' | '{' | '}' | '!' | '\\' | ' ')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_and_comment_lines() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("# a comment"), None);
        assert_eq!(parse_line("   # indented comment"), None);
    }

    #[test]
    fn test_inline_comment_stripped() {
        let parsed = parse_line("*.log   # build logs").unwrap();
        assert_eq!(parsed.polarity, Polarity::Exclude);
        assert_eq!(parsed.globs, vec!["**/*.log".to_string()]);
    }

    #[test]
    fn test_escaped_hash_is_literal() {
        assert_eq!(strip_comment(r"issue\#12.md # note"), "issue#12.md ");
        let parsed = parse_line(r"issue\#12.md").unwrap();
        assert_eq!(parsed.globs, vec!["**/issue#12.md".to_string()]);
    }

    #[test]
    fn test_include_prefix() {
        let parsed = parse_line("!*.txt").unwrap();
        assert_eq!(parsed.polarity, Polarity::Include);
        assert_eq!(parsed.globs, vec!["**/*.txt".to_string()]);
    }

    #[test]
    fn test_directory_rule_expands_to_two() {
        let parsed = parse_line("build/").unwrap();
        assert_eq!(parsed.globs, vec!["**/build".to_string(), "**/build/**".to_string()]);

        let parsed = parse_line("!vendor/").unwrap();
        assert_eq!(parsed.polarity, Polarity::Include);
        assert_eq!(parsed.globs.len(), 2);
    }

    #[test]
    fn test_anchored_patterns() {
        assert_eq!(parse_line("/target").unwrap().globs, vec!["target".to_string()]);
        assert_eq!(parse_line("logs/*.txt").unwrap().globs, vec!["logs/*.txt".to_string()]);
        assert_eq!(parse_line("a/logs/**").unwrap().globs, vec!["a/logs/**".to_string()]);
        assert_eq!(parse_line("**/tmp").unwrap().globs, vec!["**/tmp".to_string()]);
    }

    #[test]
    fn test_directory_rule_matches_split_form() {
        let expanded = parse_line("cache/").unwrap().globs;
        let mut split = parse_line("cache").unwrap().globs;
        split.extend(parse_line("cache/**").unwrap().globs);
        assert_eq!(expanded, split);
        assert_eq!(split, vec!["**/cache".to_string(), "**/cache/**".to_string()]);
    }

    #[test]
    fn test_escaped_bang_is_literal() {
        let parsed = parse_line(r"\!important.txt").unwrap();
        assert_eq!(parsed.polarity, Polarity::Exclude);
        assert_eq!(parsed.globs, vec![r"**/\!important.txt".to_string()]);
    }

    #[test]
    fn test_windows_separators_normalised() {
        assert_eq!(parse_line(r"docs\drafts").unwrap().globs, vec!["docs/drafts".to_string()]);
    }

    #[test]
    fn test_escaped_glob_chars_survive() {
        assert_eq!(parse_line(r"\*.md").unwrap().globs, vec![r"**/\*.md".to_string()]);
    }

    #[test]
    fn test_lone_slash_is_skipped() {
        assert_eq!(parse_line("/"), None);
        assert_eq!(parse_line("!/"), None);
    }
}
