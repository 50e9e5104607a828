//! Parsers for DDTP `ddt.cgi` answers and Debian `Translation-<lang>` files.

use std::collections::HashMap;

use super::PackageDescription;

/// Append one indented description line to a long description.
///
/// A lone `.` is a paragraph separator and becomes an empty line.
fn push_long_line(long: &mut String, line: &str) {
    let stripped = line.trim();
    if stripped == "." {
        long.push('\n');
    } else {
        if !long.is_empty() {
            long.push('\n');
        }
        long.push_str(stripped);
    }
}

fn is_continuation(line: &str) -> bool {
    line.starts_with(' ') || line.starts_with('\t')
}

/// Parse the `getuntranslated` answer of `ddt.cgi`.
///
/// ```text
/// Package: <name>
/// Description-md5: <hash>
/// Description-en: <short description>
///  <long description line>
///  .
/// ```
pub fn parse_ddtp_response(text: &str) -> Vec<PackageDescription> {
    let mut packages = Vec::new();
    let mut current: Option<PackageDescription> = None;

    for line in text.lines() {
        if let Some(name) = line.strip_prefix("Package: ") {
            if let Some(done) = current.take() {
                packages.push(done);
            }
            current = Some(PackageDescription::new(name.trim()));
        } else if let Some(cur) = current.as_mut() {
            if let Some(md5) = line.strip_prefix("Description-md5: ") {
                cur.md5 = md5.trim().to_string();
            } else if let Some(short) = line.strip_prefix("Description-en: ") {
                cur.short = short.trim().to_string();
            } else if is_continuation(line) {
                push_long_line(&mut cur.long, line);
            }
        }
    }

    if let Some(done) = current {
        packages.push(done);
    }
    packages
}

/// Parse a `Translation-<lang>` file into a map keyed by description md5.
///
/// Entries without a `Description-md5` field are dropped.
pub fn parse_translation_file(text: &str) -> HashMap<String, PackageDescription> {
    let mut entries = HashMap::new();
    let mut current: Option<PackageDescription> = None;
    let mut in_desc = false;

    fn flush(entry: Option<PackageDescription>, entries: &mut HashMap<String, PackageDescription>) {
        if let Some(entry) = entry
            && !entry.md5.is_empty()
        {
            entries.insert(entry.md5.clone(), entry);
        }
    }

    for line in text.lines() {
        if let Some(name) = line.strip_prefix("Package: ") {
            flush(current.take(), &mut entries);
            current = Some(PackageDescription::new(name.trim()));
            in_desc = false;
        } else if let Some(md5) = line.strip_prefix("Description-md5: ") {
            if let Some(cur) = current.as_mut() {
                cur.md5 = md5.trim().to_string();
            }
        } else if line.starts_with("Description-") {
            if let Some(cur) = current.as_mut() {
                cur.short = line
                    .split_once(": ")
                    .map(|(_, s)| s.to_string())
                    .unwrap_or_default();
            }
            in_desc = true;
        } else if in_desc && is_continuation(line) {
            if let Some(cur) = current.as_mut() {
                push_long_line(&mut cur.long, line);
            }
        } else {
            in_desc = false;
        }
    }

    flush(current, &mut entries);
    entries
}

/// Entries of the English file whose md5 has no translation, sorted by
/// package then md5.
pub fn untranslated_from(
    en: HashMap<String, PackageDescription>,
    translated: &HashMap<String, PackageDescription>,
) -> Vec<PackageDescription> {
    let mut out: Vec<_> = en
        .into_iter()
        .filter(|(md5, _)| !translated.contains_key(md5))
        .map(|(_, desc)| desc)
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.md5.cmp(&b.md5)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const DDTP_SAMPLE: &str = "\
Package: vim
Description-md5: 59e8b8f7757db8b53566d5d119872de8
Description-en: Vi IMproved - enhanced vi editor
 Vim is an almost compatible version of the UNIX editor Vi.
 .
 Many new features have been added.

Package: zsh
Description-md5: 8c9e1b4a1d4bb5b1c2b4b1e8b3b0a001
Description-en: shell with lots of features
 Zsh is a UNIX command interpreter.
";

    #[test]
    fn parses_multiple_packages() {
        let pkgs = parse_ddtp_response(DDTP_SAMPLE);
        assert_eq!(pkgs.len(), 2);
        assert_eq!(pkgs[0].name, "vim");
        assert_eq!(pkgs[0].md5, "59e8b8f7757db8b53566d5d119872de8");
        assert_eq!(pkgs[0].short, "Vi IMproved - enhanced vi editor");
        assert_eq!(
            pkgs[0].long,
            "Vim is an almost compatible version of the UNIX editor Vi.\n\nMany new features have been added."
        );
        assert_eq!(pkgs[1].name, "zsh");
        assert_eq!(pkgs[1].long, "Zsh is a UNIX command interpreter.");
    }

    #[test]
    fn ignores_lines_before_first_package() {
        let pkgs = parse_ddtp_response(" stray\nDescription-en: nope\nPackage: a\n");
        assert_eq!(pkgs.len(), 1);
        assert!(pkgs[0].short.is_empty());
    }

    #[test]
    fn empty_response_yields_nothing() {
        assert!(parse_ddtp_response("").is_empty());
    }

    const TRANSLATION_EN: &str = "\
Package: alpha
Description-md5: aaaa
Description-en: first package
 Long text.

Package: beta
Description-md5: bbbb
Description-en: second package
 Para one.
 .
 Para two.
Some-Field: stops the description
 not part of it

Package: nomd5
Description-en: dropped
";

    #[test]
    fn parses_translation_file() {
        let entries = parse_translation_file(TRANSLATION_EN);
        assert_eq!(entries.len(), 2);
        let beta = &entries["bbbb"];
        assert_eq!(beta.name, "beta");
        assert_eq!(beta.short, "second package");
        assert_eq!(beta.long, "Para one.\n\nPara two.");
    }

    #[test]
    fn translated_language_field_counts_as_description() {
        let sv = "Package: alpha\nDescription-md5: aaaa\nDescription-sv: första paketet\n Lång text.\n";
        let entries = parse_translation_file(sv);
        assert_eq!(entries["aaaa"].short, "första paketet");
        assert_eq!(entries["aaaa"].long, "Lång text.");
    }

    #[test]
    fn untranslated_is_difference_sorted() {
        let en = parse_translation_file(TRANSLATION_EN);
        let sv = parse_translation_file(
            "Package: alpha\nDescription-md5: aaaa\nDescription-sv: första\n",
        );
        let missing = untranslated_from(en, &sv);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].name, "beta");

        let en = parse_translation_file(TRANSLATION_EN);
        let all = untranslated_from(en, &HashMap::new());
        let names: Vec<_> = all.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["alpha", "beta"]);
    }

    #[test]
    fn same_package_in_two_versions_orders_by_md5() {
        let en = "Package: vim\nDescription-md5: ffff\nDescription-en: new\n\n\
                  Package: vim\nDescription-md5: 0000\nDescription-en: old\n\n\
                  Package: curl\nDescription-md5: 9999\nDescription-en: tool\n";
        for _ in 0..5 {
            let all = untranslated_from(parse_translation_file(en), &HashMap::new());
            let keys: Vec<_> = all.iter().map(|p| (p.name.as_str(), p.md5.as_str())).collect();
            assert_eq!(keys, [("curl", "9999"), ("vim", "0000"), ("vim", "ffff")]);
        }
    }
}
