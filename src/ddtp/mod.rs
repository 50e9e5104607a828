//! Untranslated Debian package descriptions: model, parsing, caching, fetching.

pub mod cache;
pub mod fetcher;
pub mod parser;

use md5::{Digest, Md5};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub use cache::DescriptionCache;
pub use fetcher::DdtpFetcher;
pub use parser::{parse_ddtp_response, parse_translation_file, untranslated_from};

/// Every language code the DDTP accepts, with its English name.
pub const DDTP_LANGUAGES: &[(&str, &str)] = &[
    ("ar", "Arabic"),
    ("bg", "Bulgarian"),
    ("ca", "Catalan"),
    ("cs", "Czech"),
    ("da", "Danish"),
    ("de", "German"),
    ("el", "Greek"),
    ("eo", "Esperanto"),
    ("es", "Spanish"),
    ("eu", "Basque"),
    ("fi", "Finnish"),
    ("fr", "French"),
    ("gl", "Galician"),
    ("hu", "Hungarian"),
    ("id", "Indonesian"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("km", "Khmer"),
    ("ko", "Korean"),
    ("lt", "Lithuanian"),
    ("ml", "Malayalam"),
    ("nb", "Norwegian Bokmål"),
    ("nl", "Dutch"),
    ("pl", "Polish"),
    ("pt", "Portuguese"),
    ("pt_BR", "Brazilian Portuguese"),
    ("ro", "Romanian"),
    ("ru", "Russian"),
    ("sk", "Slovak"),
    ("sl", "Slovenian"),
    ("sr", "Serbian"),
    ("sv", "Swedish"),
    ("th", "Thai"),
    ("tr", "Turkish"),
    ("uk", "Ukrainian"),
    ("vi", "Vietnamese"),
    ("zh_CN", "Chinese (Simplified)"),
    ("zh_TW", "Chinese (Traditional)"),
];

/// English name for a DDTP language code.
pub fn language_name(code: &str) -> Option<&'static str> {
    DDTP_LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Where a description stands from the translator's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionStatus {
    #[default]
    Untranslated,
    Modified,
    Queued,
    Submitted,
    Error,
}

/// One package description as published by the DDTP.
///
/// The cache files keep the field names `package`, `md5`, `short` and `long`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescription {
    #[serde(rename = "package")]
    pub name: String,
    #[serde(default)]
    pub md5: String,
    #[serde(default)]
    pub short: String,
    /// Long description; paragraph breaks are empty lines.
    #[serde(default)]
    pub long: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    #[serde(default)]
    pub status: DescriptionStatus,
}

impl PackageDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            md5: String::new(),
            short: String::new(),
            long: String::new(),
            language: None,
            translation: None,
            status: DescriptionStatus::Untranslated,
        }
    }

    /// Original description as one text: short line, blank line, long part.
    pub fn original_text(&self) -> String {
        if self.long.is_empty() {
            self.short.clone()
        } else {
            format!("{}\n\n{}", self.short, self.long)
        }
    }

    /// Record an edited translation.
    pub fn set_translation(&mut self, text: impl Into<String>) {
        self.translation = Some(text.into());
        self.status = DescriptionStatus::Modified;
    }
}

/// Split an editor buffer into (short, long): the first line is the short
/// description, everything after it is the long one.
pub fn split_translation(text: &str) -> (String, String) {
    let text = text.trim();
    match text.split_once('\n') {
        Some((short, long)) => (short.trim().to_string(), long.trim().to_string()),
        None => (text.to_string(), String::new()),
    }
}

/// MD5 hex digest of a description, as used in `Description-md5`.
pub fn description_md5(description: &str) -> String {
    let digest = Md5::digest(description.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// The `Description` field as it appears in a Packages file: short line,
/// then the long lines indented by one space, ` .` for blank lines.
pub fn description_field(short: &str, long: &str) -> String {
    let mut out = format!("{short}\n");
    for line in long.lines() {
        if line.trim().is_empty() {
            out.push_str(" .\n");
        } else {
            out.push(' ');
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// `Description-md5` of an English description.
pub fn english_md5(short: &str, long: &str) -> String {
    description_md5(&description_field(short, long))
}

/// Packages whose name starts with `letter` (case-insensitive) and matches
/// `pattern`, in their original order.
pub fn filter_packages<'a>(
    packages: &'a [PackageDescription],
    letter: Option<&str>,
    pattern: Option<&Regex>,
) -> Vec<&'a PackageDescription> {
    let letter = letter.map(|l| l.trim().to_lowercase()).filter(|l| !l.is_empty());
    packages
        .iter()
        .filter(|p| {
            letter
                .as_deref()
                .is_none_or(|l| p.name.to_lowercase().starts_with(l))
        })
        .filter(|p| pattern.is_none_or(|re| re.is_match(&p.name)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_table_is_complete() {
        assert_eq!(DDTP_LANGUAGES.len(), 38);
        assert_eq!(language_name("pt_BR"), Some("Brazilian Portuguese"));
        assert_eq!(language_name("xx"), None);
    }

    #[test]
    fn md5_of_known_text() {
        assert_eq!(description_md5(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            description_md5("hello world"),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }

    #[test]
    fn md5_of_english_description() {
        assert_eq!(
            description_field("Vi IMproved", "Vim is an editor.\n\nMore."),
            "Vi IMproved\n Vim is an editor.\n .\n More.\n"
        );
        assert_eq!(
            english_md5("Vi IMproved", "Vim is an editor.\n\nMore."),
            "e1df1318d4b5b157427170984ff4d4c8"
        );
        assert_eq!(english_md5("do nothing", ""), "4d1fe3c3cbcc30b74f7311346217947c");
    }

    fn named(names: &[&str]) -> Vec<PackageDescription> {
        names.iter().map(|n| PackageDescription::new(*n)).collect()
    }

    #[test]
    fn filter_by_letter_and_pattern() {
        let pkgs = named(&["libc6", "Less", "vim", "libvim-dev", "zsh"]);
        let names = |v: Vec<&PackageDescription>| v.iter().map(|p| p.name.clone()).collect::<Vec<_>>();

        assert_eq!(names(filter_packages(&pkgs, None, None)).len(), 5);
        assert_eq!(names(filter_packages(&pkgs, Some("L"), None)), ["libc6", "Less", "libvim-dev"]);
        assert_eq!(names(filter_packages(&pkgs, Some(" "), None)).len(), 5);

        let re = Regex::new("vim").unwrap();
        assert_eq!(names(filter_packages(&pkgs, None, Some(&re))), ["vim", "libvim-dev"]);
        assert_eq!(names(filter_packages(&pkgs, Some("l"), Some(&re))), ["libvim-dev"]);

        let anchored = Regex::new("^lib.*-dev$").unwrap();
        assert_eq!(names(filter_packages(&pkgs, None, Some(&anchored))), ["libvim-dev"]);
    }

    #[test]
    fn split_short_and_long() {
        let (short, long) = split_translation("  kort text\nförsta raden\n\nandra stycket \n");
        assert_eq!(short, "kort text");
        assert_eq!(long, "första raden\n\nandra stycket");

        let (short, long) = split_translation("bara kort");
        assert_eq!(short, "bara kort");
        assert!(long.is_empty());
    }

    #[test]
    fn cache_json_uses_legacy_field_names() {
        let json = r#"{"package":"vim","md5":"abc","short":"editor","long":"Vi IMproved"}"#;
        let desc: PackageDescription = serde_json::from_str(json).unwrap();
        assert_eq!(desc.name, "vim");
        assert_eq!(desc.status, DescriptionStatus::Untranslated);

        let back = serde_json::to_value(&desc).unwrap();
        assert_eq!(back["package"], "vim");
        assert!(back.get("translation").is_none());
    }

    #[test]
    fn editing_marks_modified() {
        let mut desc = PackageDescription::new("vim");
        desc.set_translation("redigerare");
        assert_eq!(desc.status, DescriptionStatus::Modified);
        assert_eq!(desc.translation.as_deref(), Some("redigerare"));
    }
}
