//! Gettext PO export and import of package descriptions.
//!
//! Each package becomes two entries: the short description keyed by its
//! English text, and the long description under `msgctxt "long:<package>"`.
//! Extracted comments (`#. Package:`, `#. MD5:`) carry the identity back on
//! import.

use crate::ddtp::PackageDescription;
use crate::error::PoError;
use crate::submit::Submission;

const LONG_CONTEXT_PREFIX: &str = "long:";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoEntry {
    /// `#.` comments, without the marker.
    pub comments: Vec<String>,
    pub context: Option<String>,
    pub msgid: String,
    pub msgstr: String,
}

impl PoEntry {
    /// Value of a `#. Key: value` comment.
    pub fn comment_value(&self, key: &str) -> Option<&str> {
        self.comments.iter().find_map(|c| {
            c.strip_prefix(key)
                .and_then(|rest| rest.strip_prefix(':'))
                .map(str::trim)
        })
    }
}

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// `keyword "value"`, split over lines when the value is multi-line.
fn push_string(out: &mut String, keyword: &str, value: &str) {
    if !value.contains('\n') {
        out.push_str(&format!("{keyword} \"{}\"\n", escape(value)));
        return;
    }
    out.push_str(&format!("{keyword} \"\"\n"));
    let mut lines = value.split('\n').peekable();
    while let Some(line) = lines.next() {
        if lines.peek().is_some() {
            out.push_str(&format!("\"{}\\n\"\n", escape(line)));
        } else if !line.is_empty() {
            out.push_str(&format!("\"{}\"\n", escape(line)));
        }
    }
}

/// Minimal header declaring language and UTF-8.
pub fn header(lang: &str) -> String {
    format!(
        "msgid \"\"\nmsgstr \"\"\n\"Language: {lang}\\n\"\n\"Content-Type: text/plain; charset=UTF-8\\n\"\n"
    )
}

pub fn render_entry(entry: &PoEntry) -> String {
    let mut out = String::new();
    for c in &entry.comments {
        out.push_str(&format!("#. {c}\n"));
    }
    if let Some(ctx) = &entry.context {
        push_string(&mut out, "msgctxt", ctx);
    }
    push_string(&mut out, "msgid", &entry.msgid);
    push_string(&mut out, "msgstr", &entry.msgstr);
    out
}

pub fn long_context(package: &str) -> String {
    format!("{LONG_CONTEXT_PREFIX}{package}")
}

/// Entries for one package: short always, long when there is one.
pub fn package_entries(pkg: &PackageDescription) -> Vec<PoEntry> {
    let (short_tr, long_tr) = pkg
        .translation
        .as_deref()
        .map(crate::ddtp::split_translation)
        .unwrap_or_default();
    let comments = vec![format!("Package: {}", pkg.name), format!("MD5: {}", pkg.md5)];

    let mut entries = vec![PoEntry {
        comments: comments.clone(),
        context: None,
        msgid: pkg.short.clone(),
        msgstr: short_tr,
    }];
    if !pkg.long.is_empty() {
        entries.push(PoEntry {
            comments,
            context: Some(long_context(&pkg.name)),
            msgid: pkg.long.clone(),
            msgstr: long_tr,
        });
    }
    entries
}

/// A PO catalogue for `packages`, ready for a CAT tool.
pub fn export_po(lang: &str, packages: &[PackageDescription]) -> String {
    let mut out = format!(
        "# DDTP translations export\n# Language: {lang}\n# Packages: {}\n",
        packages.len()
    );
    out.push_str(&header(lang));
    for pkg in packages {
        for entry in package_entries(pkg) {
            out.push('\n');
            out.push_str(&render_entry(&entry));
        }
    }
    out
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    None,
    Context,
    Id,
    Str,
}

fn quoted(rest: &str, line: usize) -> Result<String, PoError> {
    let rest = rest.trim();
    rest.strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .map(unescape)
        .ok_or_else(|| PoError::Malformed {
            line,
            reason: format!("expected quoted string, got `{rest}`"),
        })
}

/// Parse the entries of a PO file. The header entry (empty msgid) and
/// obsolete `#~` entries are skipped; plural forms keep `msgstr[0]`.
pub fn parse_po(text: &str) -> Result<Vec<PoEntry>, PoError> {
    let mut entries = Vec::new();
    let mut current = PoEntry::default();
    let mut field = Field::None;
    let mut started = false;

    fn flush(entry: &mut PoEntry, started: &mut bool, entries: &mut Vec<PoEntry>) {
        if *started && !entry.msgid.is_empty() {
            entries.push(std::mem::take(entry));
        } else {
            *entry = PoEntry::default();
        }
        *started = false;
    }

    for (idx, raw) in text.lines().enumerate() {
        let lineno = idx + 1;
        let line = raw.trim_end();

        if line.is_empty() {
            flush(&mut current, &mut started, &mut entries);
            field = Field::None;
            continue;
        }
        if let Some(c) = line.strip_prefix("#.") {
            if field == Field::Str {
                flush(&mut current, &mut started, &mut entries);
                field = Field::None;
            }
            current.comments.push(c.trim().to_string());
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let (keyword, rest) = line.split_once(' ').unwrap_or((line, ""));
        let next = match keyword {
            "msgctxt" => Field::Context,
            "msgid" => Field::Id,
            "msgid_plural" => {
                field = Field::None;
                continue;
            }
            "msgstr" | "msgstr[0]" => Field::Str,
            k if k.starts_with("msgstr[") => {
                field = Field::None;
                continue;
            }
            _ if line.starts_with('"') => {
                let value = quoted(line, lineno)?;
                match field {
                    Field::Context => current.context.get_or_insert_with(String::new).push_str(&value),
                    Field::Id => current.msgid.push_str(&value),
                    Field::Str => current.msgstr.push_str(&value),
                    Field::None => {}
                }
                continue;
            }
            _ => {
                return Err(PoError::Malformed {
                    line: lineno,
                    reason: format!("unknown keyword `{keyword}`"),
                });
            }
        };

        // A new msgctxt/msgid after a msgstr starts the next entry.
        if field == Field::Str && next != Field::Str {
            flush(&mut current, &mut started, &mut entries);
        }
        let value = quoted(rest, lineno)?;
        match next {
            Field::Context => current.context = Some(value),
            Field::Id => current.msgid = value,
            Field::Str => current.msgstr = value,
            Field::None => {}
        }
        field = next;
        started = true;
    }
    flush(&mut current, &mut started, &mut entries);
    Ok(entries)
}

/// Translations found in a PO file.
///
/// Each short entry carries its identity in `#. Package:` / `#. MD5:`
/// comments; when those are missing the entry is matched against
/// `packages` by its English msgid. Long entries are found by their
/// `long:<package>` context and, when present, the same MD5 comment. A
/// translation is returned only when its short description is translated
/// and, if it has a long description, that one is too.
pub fn import_translations(
    text: &str,
    lang: &str,
    packages: &[PackageDescription],
) -> Result<Vec<Submission>, PoError> {
    let entries = parse_po(text)?;
    let mut out: Vec<Submission> = Vec::new();

    for short in entries.iter().filter(|e| e.context.is_none() && !e.msgstr.is_empty()) {
        let md5_comment = short.comment_value("MD5").filter(|m| !m.is_empty());
        let name_comment = short.comment_value("Package").filter(|n| !n.is_empty());
        let known = match (md5_comment, name_comment) {
            (Some(md5), _) => packages.iter().find(|p| p.md5 == md5),
            (None, Some(name)) => packages.iter().find(|p| p.name == name),
            (None, None) => packages.iter().find(|p| p.short == short.msgid),
        };

        let Some(package) = name_comment.or(known.map(|p| p.name.as_str())) else {
            continue;
        };
        let md5 = md5_comment.or(known.map(|p| p.md5.as_str())).unwrap_or_default();
        if out.iter().any(|s| s.package == package && s.md5 == md5) {
            continue;
        }

        let ctx = long_context(package);
        let long_entry = entries.iter().find(|e| {
            e.context.as_deref() == Some(ctx.as_str())
                && e.comment_value("MD5").is_none_or(|m| m == md5)
        });
        let long = long_entry
            .map(|e| e.msgstr.trim_end().to_string())
            .unwrap_or_default();
        let has_long = known.is_some_and(|p| !p.long.is_empty())
            || long_entry.is_some_and(|e| !e.msgid.is_empty());
        if has_long && long.is_empty() {
            continue;
        }

        out.push(Submission {
            package: package.to_string(),
            md5: md5.to_string(),
            lang: lang.to_string(),
            short: short.msgstr.clone(),
            long,
            comment: String::new(),
        });
    }
    Ok(out)
}
