//! Ignore-pattern matching
//!
//! Patterns are shell globs matched against a resource's name (not its
//! path). A folder's ignore file holds one pattern per line and is only ever
//! appended to.

use glob::Pattern;
use tracing::warn;

/// Names ignored in every folder
pub const DEFAULT_IGNORES: &[&str] = &[
    "RCS", "SCCS", "CVS", "CVS.adm", "RCSLOG", "cvslog.*", "tags", "TAGS", ".make.state",
    ".nse_depinfo", "*~", "#*", ".#*", ",*", "_$*", "*$", "*.old", "*.bak", "*.BAK", "*.orig",
    "*.rej", ".del-*", "*.a", "*.olb", "*.o", "*.obj", "*.so", "*.exe", "*.Z", "*.elc", "*.ln",
    "core",
];

/// Compiled set of ignore globs
#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    patterns: Vec<Pattern>,
}

impl IgnoreMatcher {
    /// Compile `patterns`; invalid globs are logged and skipped
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .filter_map(|p| {
                let p = p.as_ref().trim();
                if p.is_empty() {
                    return None;
                }
                match Pattern::new(p) {
                    Ok(pattern) => Some(pattern),
                    Err(e) => {
                        warn!(pattern = %p, error = %e, "Skipping invalid ignore pattern");
                        None
                    }
                }
            })
            .collect();
        Self { patterns }
    }

    /// Built-in defaults followed by `extra`
    pub fn with_defaults<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut all: Vec<String> = DEFAULT_IGNORES.iter().map(|p| p.to_string()).collect();
        all.extend(extra.into_iter().map(|p| p.as_ref().to_string()));
        Self::new(all)
    }

    /// Whether `name` matches any pattern
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Parse the content of an ignore file: one pattern per line
#[must_use]
pub fn parse_ignore_file(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Render patterns as ignore-file content
#[must_use]
pub fn render_ignore_file(patterns: &[String]) -> String {
    let mut content = patterns.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_name_globs() {
        let matcher = IgnoreMatcher::new(["*.log", "build"]);
        assert!(matcher.matches("debug.log"));
        assert!(matcher.matches("build"));
        assert!(!matcher.matches("builder"));
        assert_eq!(matcher.len(), 2);
    }

    #[test]
    fn test_defaults_cover_editor_backups() {
        let matcher = IgnoreMatcher::with_defaults(Vec::<String>::new());
        assert!(matcher.matches("main.c~"));
        assert!(matcher.matches(".#main.c.1.4"));
        assert!(matcher.matches("CVS"));
        assert!(!matcher.matches("main.c"));
    }

    #[test]
    fn test_invalid_patterns_are_skipped() {
        let matcher = IgnoreMatcher::new(["[unclosed", "*.tmp", "  "]);
        assert_eq!(matcher.len(), 1);
        assert!(matcher.matches("a.tmp"));
    }

    #[test]
    fn test_parse_and_render() {
        let patterns = parse_ignore_file("*.o\n\n  bin  \n");
        assert_eq!(patterns, vec!["*.o".to_string(), "bin".to_string()]);
        assert_eq!(render_ignore_file(&patterns), "*.o\nbin\n");
        assert_eq!(render_ignore_file(&[]), "");
    }
}
