//! Scraping helpers for DDTSS pages: form fields, headings, error messages.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::DdtssError;

static TEXTAREA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<textarea([^>]*)>(.*?)</textarea>"#).expect("valid regex")
});
static INPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<input([^>]*)>"#).expect("valid regex"));
static NAME_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bname\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).expect("valid regex")
});
static VALUE_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bvalue\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).expect("valid regex")
});
static H1_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

/// Known DDTSS failure texts and the error they map to.
///
/// Order matters: the first pattern found in the body wins.
const ERROR_PATTERNS: &[(&str, ErrorKind)] = &[
    ("You must be logged in", ErrorKind::Auth),
    ("Invalid username/password", ErrorKind::Auth),
    ("Account not active yet", ErrorKind::Auth),
    ("locked, sorry", ErrorKind::Locked),
    ("gone, sorry", ErrorKind::NotFound),
    ("Couldn't fetch", ErrorKind::NotFound),
    ("didn't contain package name", ErrorKind::NotFound),
    ("Encoding error", ErrorKind::Server),
    ("not complete, still &lt;trans&gt;", ErrorKind::Validation),
    ("not complete, still <trans>", ErrorKind::Validation),
    ("line longer than 80 characters", ErrorKind::Validation),
];

#[derive(Debug, Clone, Copy)]
enum ErrorKind {
    Auth,
    Locked,
    NotFound,
    Validation,
    Server,
}

impl ErrorKind {
    fn into_error(self, msg: String) -> DdtssError {
        match self {
            ErrorKind::Auth => DdtssError::Auth(msg),
            ErrorKind::Locked => DdtssError::Locked(msg),
            ErrorKind::NotFound => DdtssError::NotFound(msg),
            ErrorKind::Validation => DdtssError::Validation(msg),
            ErrorKind::Server => DdtssError::Server(msg),
        }
    }
}

/// Map a response body to the DDTSS error it reports, if any.
///
/// The message is the page heading with tags removed, or the matched text
/// when the page has no heading.
pub fn check_error(body: &str) -> Result<(), DdtssError> {
    for (pattern, kind) in ERROR_PATTERNS {
        if body.contains(pattern) {
            let msg = heading(body)
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| unescape(pattern));
            return Err(kind.into_error(msg));
        }
    }
    Ok(())
}

/// Text of the first `<h1>`, tags stripped and entities decoded.
pub fn heading(body: &str) -> Option<String> {
    H1_RE
        .captures(body)
        .map(|c| unescape(strip_tags(&c[1]).trim()))
}

pub fn strip_tags(html: &str) -> String {
    TAG_RE.replace_all(html, "").into_owned()
}

/// Decode the handful of entities DDTSS emits.
pub fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn attr(attrs: &str, re: &Regex) -> Option<String> {
    re.captures(attrs).and_then(|c| {
        c.get(1)
            .or_else(|| c.get(2))
            .or_else(|| c.get(3))
            .map(|m| unescape(m.as_str()))
    })
}

/// Named form controls of a page.
#[derive(Debug, Default, Clone)]
pub struct Form {
    /// `<input name=... value=...>`
    pub fields: HashMap<String, String>,
    /// `<textarea name=...>content</textarea>`
    pub textareas: HashMap<String, String>,
}

impl Form {
    pub fn parse(body: &str) -> Self {
        let mut form = Form::default();
        for cap in INPUT_RE.captures_iter(body) {
            if let Some(name) = attr(&cap[1], &NAME_ATTR_RE) {
                let value = attr(&cap[1], &VALUE_ATTR_RE).unwrap_or_default();
                form.fields.insert(name, value);
            }
        }
        for cap in TEXTAREA_RE.captures_iter(body) {
            if let Some(name) = attr(&cap[1], &NAME_ATTR_RE) {
                form.textareas.insert(name, unescape(&cap[2]));
            }
        }
        form
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn textarea(&self, name: &str) -> Option<&str> {
        self.textareas.get(name).map(String::as_str)
    }

    /// Textarea first, then input of the same name.
    pub fn value(&self, name: &str) -> String {
        self.textarea(name)
            .or_else(|| self.field(name))
            .unwrap_or_default()
            .to_string()
    }

    pub fn has_textareas(&self) -> bool {
        !self.textareas.is_empty()
    }
}

/// First capture group of `re` in `body`, trimmed.
pub fn capture(re: &Regex, body: &str) -> Option<String> {
    re.captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_error_on_normal_page() {
        assert!(check_error("<html><h1>Translate vim</h1></html>").is_ok());
    }

    #[test]
    fn lock_message_comes_from_heading() {
        let body = "<html><h1>Translation <b>vim</b> locked, sorry...</h1></html>";
        assert_eq!(
            check_error(body),
            Err(DdtssError::Locked("Translation vim locked, sorry...".into()))
        );
    }

    #[test]
    fn auth_without_heading_uses_pattern() {
        assert_eq!(
            check_error("You must be logged in for this to work"),
            Err(DdtssError::Auth("You must be logged in".into()))
        );
    }

    #[test]
    fn validation_errors() {
        let trans = "<h1>Translation not complete, still &lt;trans&gt;</h1>";
        assert_eq!(
            check_error(trans),
            Err(DdtssError::Validation("Translation not complete, still <trans>".into()))
        );
        let long = "<h1>Translation contains line longer than 80 characters</h1>";
        assert!(matches!(check_error(long), Err(DdtssError::Validation(_))));
    }

    #[test]
    fn not_found_and_encoding() {
        assert!(matches!(
            check_error("<h1>Package translation for foo gone, sorry...</h1>"),
            Err(DdtssError::NotFound(_))
        ));
        assert!(matches!(
            check_error("<h1>Couldn't fetch an untranslated description: sv, x@y, foo</h1>"),
            Err(DdtssError::NotFound(_))
        ));
        assert!(matches!(
            check_error("<h1>Encoding error retrieving data for package foo</h1>"),
            Err(DdtssError::Server(_))
        ));
    }

    #[test]
    fn parses_inputs_and_textareas() {
        let body = r#"
            <form method="post">
              <input type="text" name="short" value="redigerare &amp; mer" size="80">
              <input type=hidden name=_charset_>
              <textarea name="long" rows="10">rad ett
rad &lt;två&gt;</textarea>
              <textarea name='comment'></textarea>
            </form>"#;
        let form = Form::parse(body);
        assert_eq!(form.field("short"), Some("redigerare & mer"));
        assert_eq!(form.field("_charset_"), Some(""));
        assert_eq!(form.textarea("long"), Some("rad ett\nrad <två>"));
        assert_eq!(form.textarea("comment"), Some(""));
        assert_eq!(form.value("short"), "redigerare & mer");
        assert!(form.has_textareas());
    }

    #[test]
    fn unescape_amp_last() {
        assert_eq!(unescape("&amp;lt;"), "&lt;");
    }
}
