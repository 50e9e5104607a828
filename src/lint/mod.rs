//! Translation checks: local rules run before queueing, a line diff for
//! reviews, and the external `l10n-lint` tool.

pub mod external;

use serde::Serialize;

pub use external::{LintOutcome, LintRunner, run_l10n_lint};

/// Longest line accepted in a description.
pub const MAX_LINE: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintIssue {
    pub severity: Severity,
    /// 1-based line in the translation (line 1 is the short description).
    pub line: Option<usize>,
    pub message: String,
}

impl LintIssue {
    fn error(line: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            line,
            message: message.into(),
        }
    }

    fn warning(line: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            line,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for LintIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match self.line {
            Some(n) => write!(f, "{level}: line {n}: {}", self.message),
            None => write!(f, "{level}: {}", self.message),
        }
    }
}

/// Non-empty blocks separated by blank lines.
fn paragraphs(text: &str) -> usize {
    text.split('\n')
        .fold((0, true), |(count, blank_before), line| {
            let blank = line.trim().is_empty() || line.trim() == ".";
            if !blank && blank_before {
                (count + 1, false)
            } else {
                (count, blank)
            }
        })
        .0
}

/// Check a translation against the original long description.
pub fn check_translation(original_long: &str, short: &str, long: &str) -> Vec<LintIssue> {
    let mut issues = Vec::new();

    if short.trim().is_empty() {
        issues.push(LintIssue::error(Some(1), "short description is empty"));
    }
    if short.chars().count() > MAX_LINE {
        issues.push(LintIssue::error(
            Some(1),
            format!("short description is {} characters (max {MAX_LINE})", short.chars().count()),
        ));
    }
    if short.trim_end().ends_with('.') && !short.trim_end().ends_with("...") {
        issues.push(LintIssue::warning(Some(1), "short description ends with a period"));
    }

    for (i, line) in std::iter::once(short).chain(long.lines()).enumerate() {
        let n = Some(i + 1);
        if line.contains("<trans>") {
            issues.push(LintIssue::error(n, "untranslated <trans> placeholder"));
        }
        if i > 0 && line.chars().count() > MAX_LINE {
            issues.push(LintIssue::error(
                n,
                format!("line is {} characters (max {MAX_LINE})", line.chars().count()),
            ));
        }
        if line != line.trim_end() {
            issues.push(LintIssue::warning(n, "trailing whitespace"));
        }
    }

    let (orig, ours) = (paragraphs(original_long), paragraphs(long));
    if orig != ours && !original_long.trim().is_empty() {
        issues.push(LintIssue::warning(
            None,
            format!("original has {orig} paragraph(s), translation has {ours}"),
        ));
    }

    issues
}

pub fn has_errors(issues: &[LintIssue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Error)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DiffLine {
    Same(String),
    Removed(String),
    Added(String),
}

impl std::fmt::Display for DiffLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffLine::Same(l) => write!(f, "  {l}"),
            DiffLine::Removed(l) => write!(f, "- {l}"),
            DiffLine::Added(l) => write!(f, "+ {l}"),
        }
    }
}

/// Line diff by longest common subsequence.
pub fn line_diff(old: &str, new: &str) -> Vec<DiffLine> {
    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();
    let (n, m) = (a.len(), b.len());

    // lcs[i][j] = LCS length of a[i..] and b[j..]
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut out = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            out.push(DiffLine::Same(a[i].to_string()));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            out.push(DiffLine::Removed(a[i].to_string()));
            i += 1;
        } else {
            out.push(DiffLine::Added(b[j].to_string()));
            j += 1;
        }
    }
    out.extend(a[i..].iter().map(|l| DiffLine::Removed(l.to_string())));
    out.extend(b[j..].iter().map(|l| DiffLine::Added(l.to_string())));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIG: &str = "First paragraph.\n\nSecond paragraph.";

    fn messages(issues: &[LintIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.message.as_str()).collect()
    }

    #[test]
    fn clean_translation() {
        let issues = check_translation(ORIG, "redigerare", "Första stycket.\n\nAndra stycket.");
        assert!(issues.is_empty(), "{issues:?}");
    }

    #[test]
    fn empty_short_and_placeholder_are_errors() {
        let issues = check_translation(ORIG, "", "<trans>\n\nAndra.");
        assert!(has_errors(&issues));
        assert!(messages(&issues).contains(&"short description is empty"));
        let trans = issues.iter().find(|i| i.message.contains("<trans>")).unwrap();
        assert_eq!(trans.line, Some(2));
    }

    #[test]
    fn long_lines() {
        let long_short = "x".repeat(81);
        let issues = check_translation("", &long_short, &"ä".repeat(81));
        let errs: Vec<_> = issues.iter().filter(|i| i.severity == Severity::Error).collect();
        assert_eq!(errs.len(), 2);
        assert_eq!(errs[0].line, Some(1));
        assert_eq!(errs[1].line, Some(2));
        assert!(check_translation("", "kort", &"ä".repeat(80)).is_empty());
    }

    #[test]
    fn warnings() {
        let issues = check_translation(ORIG, "redigerare.", "Ett stycke. \nsamma stycke");
        assert!(!has_errors(&issues));
        let msgs = messages(&issues);
        assert!(msgs.contains(&"short description ends with a period"));
        assert!(msgs.contains(&"trailing whitespace"));
        assert!(msgs.contains(&"original has 2 paragraph(s), translation has 1"));
    }

    #[test]
    fn ellipsis_is_not_a_period() {
        assert!(check_translation("", "och så vidare...", "").is_empty());
    }

    #[test]
    fn paragraph_counting() {
        assert_eq!(paragraphs(""), 0);
        assert_eq!(paragraphs("a\nb"), 1);
        assert_eq!(paragraphs("a\n\nb\n.\nc\n"), 3);
        assert_eq!(paragraphs("\n\na\n\n"), 1);
    }

    #[test]
    fn diff_marks_changes() {
        let diff = line_diff("ett\ntvå\ntre", "ett\n2\ntre\nfyra");
        assert_eq!(
            diff,
            vec![
                DiffLine::Same("ett".into()),
                DiffLine::Removed("två".into()),
                DiffLine::Added("2".into()),
                DiffLine::Same("tre".into()),
                DiffLine::Added("fyra".into()),
            ]
        );
        assert_eq!(diff[1].to_string(), "- två");
    }

    #[test]
    fn diff_of_identical_and_empty() {
        assert!(line_diff("a\nb", "a\nb").iter().all(|d| matches!(d, DiffLine::Same(_))));
        assert_eq!(line_diff("", "x"), vec![DiffLine::Added("x".into())]);
        assert_eq!(line_diff("x", ""), vec![DiffLine::Removed("x".into())]);
    }
}
