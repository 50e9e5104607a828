//! Review items and decisions, and the parsers for the pages that carry them.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::html::{self, Form};

static PENDING_REVIEW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)Pending review.*?<ol>(.*?)</ol>").expect("valid regex"));
static REVIEWED_BY_YOU_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)Reviewed by you.*?<ol>(.*?)</ol>").expect("valid regex"));
static PENDING_TRANSLATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Pending translation.*?<ol>(.*?)</ol>").expect("valid regex")
});
static RECENTLY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Recently translated.*?<ol>(.*?)</ol>").expect("valid regex")
});
static REVIEW_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"forreview/([\w.+-]+)\?(\d+)">([\w.+-]+)</a>\s*\(([^)]*)\)"#).expect("valid regex")
});
static TRANSLATE_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"translate/([\w.+-]+)").expect("valid regex"));
static ANCHOR_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">([\w.+-]+)</a>").expect("valid regex"));

static UNTRANSLATED_SHORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Untranslated:\s*<tt>(.*?)</tt>").expect("valid regex"));
static UNTRANSLATED_LONG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)Untranslated:.*?<pre>(.*?)</pre>").expect("valid regex"));
static OWNER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"the owner is:\s*<b>(.*?)</b>").expect("valid regex"));
static LOG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)Log:\s*<pre>(.*?)</pre>").expect("valid regex"));
static STATS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Pending translation.*?(\d+).*?Pending review.*?(\d+).*?Sent.*?(\d+)")
        .expect("valid regex")
});

/// A translation waiting for review, as listed on the language page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub package: String,
    pub timestamp: String,
    /// Free-form note such as "needs review, had 1".
    pub note: String,
    #[serde(default)]
    pub reviewed_by_you: bool,
}

/// The review form of one package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewPage {
    pub package: String,
    pub short_orig: String,
    pub long_orig: String,
    pub short_trans: String,
    pub long_trans: String,
    pub comment: String,
    pub owner: String,
    pub log: String,
}

/// What the reviewer does with a proposed translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    AcceptAsIs,
    AcceptWithChanges { short: String, long: String },
    CommentOnly,
}

impl ReviewDecision {
    /// Form fields DDTSS expects for this decision (besides `comment`).
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            ReviewDecision::AcceptAsIs => vec![("accept", "Accept as is".into())],
            ReviewDecision::AcceptWithChanges { short, long } => vec![
                ("submit", "Accept with changes".into()),
                ("short", short.clone()),
                ("long", long.clone()),
            ],
            ReviewDecision::CommentOnly => vec![("nothing", "Change comment only".into())],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReviewDecision::AcceptAsIs => "accept",
            ReviewDecision::AcceptWithChanges { .. } => "changes",
            ReviewDecision::CommentOnly => "comment",
        }
    }
}

/// Status of a package on the DDTSS, as seen from the language page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    Pending,
    ReviewedComment,
    ReviewedOk,
}

impl PackageStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PackageStatus::Pending => "pending",
            PackageStatus::ReviewedComment => "commented",
            PackageStatus::ReviewedOk => "reviewed",
        }
    }
}

/// Counters from the language page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdtssStats {
    pub pending_translation: u32,
    pub pending_review: u32,
    pub sent: u32,
}

fn review_items(section: Option<regex::Captures<'_>>, reviewed_by_you: bool) -> Vec<ReviewItem> {
    let Some(section) = section else {
        return Vec::new();
    };
    REVIEW_ITEM_RE
        .captures_iter(&section[1])
        .map(|m| ReviewItem {
            package: m[1].to_string(),
            timestamp: m[2].to_string(),
            note: m[4].trim().to_string(),
            reviewed_by_you,
        })
        .collect()
}

/// Items of the "Pending review" and "Reviewed by you" lists.
pub fn parse_pending_reviews(body: &str) -> Vec<ReviewItem> {
    let mut items = review_items(PENDING_REVIEW_RE.captures(body), false);
    items.extend(review_items(REVIEWED_BY_YOU_RE.captures(body), true));
    items
}

/// Per-package status derived from the language page lists.
pub fn parse_package_statuses(body: &str) -> BTreeMap<String, PackageStatus> {
    let mut out = BTreeMap::new();

    if let Some(section) = PENDING_TRANSLATION_RE.captures(body) {
        for m in TRANSLATE_LINK_RE.captures_iter(&section[1]) {
            out.insert(m[1].to_string(), PackageStatus::Pending);
        }
    }

    for item in parse_pending_reviews(body) {
        let status = if item.reviewed_by_you {
            PackageStatus::ReviewedOk
        } else if !item.note.is_empty() {
            PackageStatus::ReviewedComment
        } else {
            PackageStatus::Pending
        };
        out.insert(item.package, status);
    }

    if let Some(section) = RECENTLY_RE.captures(body) {
        for m in ANCHOR_TEXT_RE.captures_iter(&section[1]) {
            out.insert(m[1].to_string(), PackageStatus::ReviewedOk);
        }
    }

    out
}

pub fn parse_review_page(body: &str, package: &str) -> ReviewPage {
    let form = Form::parse(body);
    ReviewPage {
        package: package.to_string(),
        short_orig: html::capture(&UNTRANSLATED_SHORT_RE, body)
            .map(|s| html::unescape(&s))
            .unwrap_or_default(),
        long_orig: html::capture(&UNTRANSLATED_LONG_RE, body)
            .map(|s| html::unescape(&s))
            .unwrap_or_default(),
        short_trans: form.field("short").unwrap_or_default().to_string(),
        long_trans: form.textarea("long").unwrap_or_default().to_string(),
        comment: form.textarea("comment").unwrap_or_default().to_string(),
        owner: html::capture(&OWNER_RE, body).unwrap_or_default(),
        log: html::capture(&LOG_RE, body)
            .map(|s| html::unescape(&s))
            .unwrap_or_default(),
    }
}

pub fn parse_stats(body: &str) -> DdtssStats {
    STATS_RE
        .captures(body)
        .map(|c| DdtssStats {
            pending_translation: c[1].parse().unwrap_or(0),
            pending_review: c[2].parse().unwrap_or(0),
            sent: c[3].parse().unwrap_or(0),
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LANG_PAGE: &str = r#"
<h2>Pending translation</h2>
<ol>
<li><a href="translate/vim">vim</a> (locked)</li>
<li><a href="translate/zsh">zsh</a></li>
</ol>
<h2>Pending review</h2>
<ol>
<li><a href="forreview/curl?1700000000">curl</a> (needs review, had 1)</li>
<li><a href="forreview/wget?1700000100">wget</a> ()</li>
</ol>
<h2>Reviewed by you</h2>
<ol>
<li><a href="forreview/less?1700000200">less</a> (reviewed)</li>
</ol>
<h2>Recently translated</h2>
<ol>
<li><a href="show/bash">bash</a></li>
</ol>
"#;

    #[test]
    fn pending_reviews_from_both_lists() {
        let items = parse_pending_reviews(LANG_PAGE);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].package, "curl");
        assert_eq!(items[0].timestamp, "1700000000");
        assert_eq!(items[0].note, "needs review, had 1");
        assert!(!items[0].reviewed_by_you);
        assert_eq!(items[2].package, "less");
        assert!(items[2].reviewed_by_you);
    }

    #[test]
    fn statuses_cover_every_list() {
        let statuses = parse_package_statuses(LANG_PAGE);
        assert_eq!(statuses["vim"], PackageStatus::Pending);
        assert_eq!(statuses["zsh"], PackageStatus::Pending);
        assert_eq!(statuses["curl"], PackageStatus::ReviewedComment);
        assert_eq!(statuses["wget"], PackageStatus::Pending);
        assert_eq!(statuses["less"], PackageStatus::ReviewedOk);
        assert_eq!(statuses["bash"], PackageStatus::ReviewedOk);
    }

    #[test]
    fn review_page_fields() {
        let body = r#"
<h1>Review curl</h1>
Untranslated: <tt>command line tool for transferring data with URL syntax</tt>
<pre>curl is a command line tool &amp; more.</pre>
<form>
<input name="short" value="kommandoradsverktyg för dataöverföring">
<textarea name="long">curl är ett verktyg.</textarea>
<textarea name="comment">bra</textarea>
</form>
<p>the owner is: <b>anna</b></p>
Log: <pre>2024-01-01 anna: fetched</pre>
"#;
        let page = parse_review_page(body, "curl");
        assert_eq!(
            page.short_orig,
            "command line tool for transferring data with URL syntax"
        );
        assert_eq!(page.long_orig, "curl is a command line tool & more.");
        assert_eq!(page.short_trans, "kommandoradsverktyg för dataöverföring");
        assert_eq!(page.long_trans, "curl är ett verktyg.");
        assert_eq!(page.comment, "bra");
        assert_eq!(page.owner, "anna");
        assert_eq!(page.log, "2024-01-01 anna: fetched");
    }

    #[test]
    fn stats_parse_and_default() {
        let body = "<li>Pending translation: 12</li><li>Pending review: 3</li><li>Sent: 456</li>";
        assert_eq!(
            parse_stats(body),
            DdtssStats {
                pending_translation: 12,
                pending_review: 3,
                sent: 456
            }
        );
        assert_eq!(parse_stats("nothing here"), DdtssStats::default());
    }

    #[test]
    fn decision_fields() {
        assert_eq!(
            ReviewDecision::AcceptAsIs.form_fields(),
            vec![("accept", "Accept as is".to_string())]
        );
        let changes = ReviewDecision::AcceptWithChanges {
            short: "s".into(),
            long: "l".into(),
        };
        assert_eq!(changes.form_fields()[0].1, "Accept with changes");
        assert_eq!(changes.label(), "changes");
        assert_eq!(ReviewDecision::CommentOnly.form_fields()[0].0, "nothing");
    }

    #[test]
    fn status_labels() {
        assert_eq!(PackageStatus::Pending.label(), "pending");
        assert_eq!(PackageStatus::ReviewedComment.label(), "commented");
        assert_eq!(PackageStatus::ReviewedOk.label(), "reviewed");
    }
}
