//! HTTP client for the DDTSS web interface.
//!
//! Cookie-based: logging in sets an `id` cookie valid for 70 days, which is
//! persisted through a [`SessionStore`] and reused until it expires or the
//! server stops accepting it.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use reqwest::Url;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::multipart::Form as Multipart;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::html::{self, Form};
use super::review::{
    self, DdtssStats, PackageStatus, ReviewDecision, ReviewItem, ReviewPage,
};
use super::session::{self, Session, SessionStore};
use crate::config::{self, AppDirs, Settings};
use crate::error::DdtssError;

/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest line DDTSS accepts in a translation.
pub const MAX_LINE_LENGTH: usize = 80;

static REFRESH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url=([^"]+/(?:translate|forreview)/([\w.+-]+))"#).expect("valid regex")
});
static ORIG_SHORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Description:\s*(.*?)(?:\n|<br)").expect("valid regex"));
static ORIG_LONG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)class=["']?untranslated["']?[^>]*>(.*?)</(?:pre|div|td)"#)
        .expect("valid regex")
});

/// Markers of a page shown to a logged-in user.
const LOGGED_IN_MARKERS: &[&str] = &["Logged in as", "logged in", "Pending translation", "Pending review"];

/// The translate form of one package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatePage {
    pub package: String,
    pub short_orig: String,
    pub long_orig: String,
    pub short_trans: String,
    pub long_trans: String,
}

/// Reject credentials DDTSS would refuse anyway.
pub fn validate_credentials(alias: &str, password: &str) -> Result<(), DdtssError> {
    if alias.chars().count() < 2 || !alias.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(DdtssError::Auth(
            "alias must be at least 2 alphanumeric characters".into(),
        ));
    }
    if password.chars().count() < 5 {
        return Err(DdtssError::Auth("password must be at least 5 characters".into()));
    }
    Ok(())
}

/// Reject translations DDTSS would refuse: leftover `<trans>` tags or lines
/// over 80 characters.
pub fn validate_translation(short: &str, long: &str) -> Result<(), DdtssError> {
    if short.contains("<trans>") || long.contains("<trans>") {
        return Err(DdtssError::Validation(
            "Translation not complete, still <trans>".into(),
        ));
    }
    if std::iter::once(short)
        .chain(long.lines())
        .any(|line| line.chars().count() > MAX_LINE_LENGTH)
    {
        return Err(DdtssError::Validation(
            "Translation contains line longer than 80 characters".into(),
        ));
    }
    Ok(())
}

/// Client bound to one DDTSS instance and one language.
pub struct DdtssClient {
    http: reqwest::Client,
    jar: Arc<Jar>,
    base_url: String,
    lang: String,
    store: Option<SessionStore>,
    session: Mutex<Option<Session>>,
}

impl DdtssClient {
    pub fn new(base_url: impl Into<String>, lang: impl Into<String>) -> Result<Self, DdtssError> {
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .user_agent(config::user_agent())
            .cookie_provider(Arc::clone(&jar))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DdtssError::Connection(e.to_string()))?;

        Ok(Self {
            http,
            jar,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            lang: lang.into(),
            store: None,
            session: Mutex::new(None),
        })
    }

    pub fn from_settings(settings: &Settings, dirs: &AppDirs, lang: &str) -> Result<Self, DdtssError> {
        Ok(Self::new(&settings.ddtss_url, lang)?
            .with_session_store(SessionStore::new(dirs.session_file())))
    }

    /// Persist sessions in `store` and resume a stored one if still valid.
    pub fn with_session_store(mut self, store: SessionStore) -> Self {
        if let Some(session) = store.load() {
            debug!(alias = %session.alias, expires = %session.expires_at, "Resuming DDTSS session");
            self.seed_cookie(&session);
            self.session = Mutex::new(Some(session));
        }
        self.store = Some(store);
        self
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn lang_url(&self, path: &str) -> String {
        self.lang_url_in(&self.lang, path)
    }

    fn lang_url_in(&self, lang: &str, path: &str) -> String {
        self.url(&format!("{lang}/{path}"))
    }

    fn cookie_url(&self) -> Option<Url> {
        Url::parse(&self.base_url).ok()
    }

    fn seed_cookie(&self, session: &Session) {
        if let Some(url) = self.cookie_url() {
            self.jar.add_cookie_str(&session.cookie_header(), &url);
        }
    }

    /// Current `id` cookie value in the jar.
    fn jar_session_cookie(&self) -> Option<String> {
        let url = self.cookie_url()?;
        let header = self.jar.cookies(&url)?;
        session::session_cookie_value(header.to_str().ok()?)
    }

    /// The session in use, if any.
    pub async fn session(&self) -> Option<Session> {
        self.session.lock().await.clone()
    }

    pub async fn is_logged_in(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(Session::is_valid)
    }

    /// Forget the session locally and on disk.
    pub async fn invalidate_session(&self) {
        let previous = self.session.lock().await.take();
        if let Some(s) = previous {
            info!(alias = %s.alias, "Invalidating DDTSS session");
        }
        if let Some(url) = self.cookie_url() {
            self.jar
                .add_cookie_str(&format!("{}=; Max-Age=0; Path=/", session::SESSION_COOKIE), &url);
        }
        if let Some(store) = &self.store
            && let Err(e) = store.clear()
        {
            warn!(error = %e, "Failed to remove session file");
        }
    }

    /// Authenticate and persist the resulting session.
    pub async fn login(&self, alias: &str, password: &SecretString) -> Result<Session, DdtssError> {
        validate_credentials(alias, password.expose_secret())?;

        let form = Multipart::new()
            .text("alias", alias.to_string())
            .text("password", password.expose_secret().to_string())
            .text("submit", "Submit");
        let (_, body) = self.send_multipart(&self.url("login"), form).await?;
        html::check_error(&body)?;

        let cookie = self.jar_session_cookie();
        let marked = LOGGED_IN_MARKERS.iter().any(|m| body.contains(m));
        if cookie.is_none() && !marked {
            return Err(DdtssError::Auth("Login failed (unexpected response)".into()));
        }

        let session = Session::new(alias, cookie.unwrap_or_default());
        if session.is_valid() {
            if let Some(store) = &self.store
                && let Err(e) = store.save(&session)
            {
                warn!(error = %e, "Failed to persist DDTSS session");
            }
        } else {
            warn!(alias, "Login accepted but no session cookie was set");
        }
        info!(alias, "Logged in to DDTSS");
        *self.session.lock().await = Some(session.clone());
        Ok(session)
    }

    /// Reuse a valid session for `alias` or log in.
    pub async fn ensure_session(&self, alias: &str, password: &SecretString) -> Result<Session, DdtssError> {
        let current = self.session.lock().await.clone();
        if let Some(s) = current
            && s.alias == alias
            && s.is_valid()
        {
            return Ok(s);
        }
        self.login(alias, password).await
    }

    /// Fetch a package for translation (or the next available one).
    pub async fn fetch_package(&self, package: Option<&str>) -> Result<TranslatePage, DdtssError> {
        let mut url = self.lang_url("fetch");
        if let Some(pkg) = package {
            url = format!("{url}?package={}", encode(pkg));
        }
        let (_, body) = self.get(&url).await?;
        self.check(&body).await?;

        if let Some(caps) = REFRESH_RE.captures(&body) {
            let target = &caps[1];
            let pkg = caps[2].to_string();
            let redirect = if target.starts_with("http") {
                target.to_string()
            } else {
                let marker = format!("/{}/", self.lang);
                let tail = target.rsplit_once(&marker).map(|(_, t)| t).unwrap_or(target);
                self.lang_url(tail)
            };
            debug!(package = %pkg, url = %redirect, "Following DDTSS refresh");
            let (_, body) = self.get(&redirect).await?;
            self.check(&body).await?;
            return Ok(parse_translate_page(&body, &pkg));
        }

        if Form::parse(&body).has_textareas() {
            let pkg = package.unwrap_or("unknown");
            return Ok(parse_translate_page(&body, pkg));
        }

        Err(DdtssError::NotFound("No package available for translation".into()))
    }

    pub async fn translate_page(&self, package: &str) -> Result<TranslatePage, DdtssError> {
        let url = self.lang_url(&format!("translate/{}", encode(package)));
        let (_, body) = self.get(&url).await?;
        self.check(&body).await?;
        Ok(parse_translate_page(&body, package))
    }

    /// Fetch the package, load its form, post the translation to the team
    /// of `lang` (the client's language when empty).
    pub async fn submit_translation(
        &self,
        lang: &str,
        package: &str,
        short: &str,
        long: &str,
        comment: &str,
    ) -> Result<(), DdtssError> {
        validate_translation(short, long)?;
        let lang = if lang.is_empty() { self.lang.as_str() } else { lang };
        let pkg = encode(package);

        let fetch_url = self.lang_url_in(lang, &format!("fetch?package={pkg}"));
        let (_, fetch_body) = self.get(&fetch_url).await?;
        self.check(&fetch_body).await?;

        let translate_url = self.lang_url_in(lang, &format!("translate/{pkg}"));
        let (_, page) = self.get(&translate_url).await?;
        self.check(&page).await?;
        if page.contains("Fetching package") {
            return Err(DdtssError::NotFound(format!(
                "Package {package} not available for translation"
            )));
        }

        let form = Multipart::new()
            .text("short", short.to_string())
            .text("long", long.to_string())
            .text("comment", comment.to_string())
            .text("submit", "Submit")
            .text("_charset_", "UTF-8");
        let (status, body) = self.send_multipart(&translate_url, form).await?;
        self.check(&body).await?;

        if body.to_lowercase().contains("submitted") || matches!(status, 200 | 301 | 302) {
            info!(package, lang, "Translation submitted to DDTSS");
            return Ok(());
        }
        Err(DdtssError::UnexpectedResponse(format!(
            "HTTP {status} after submitting {package}"
        )))
    }

    pub async fn pending_reviews(&self) -> Result<Vec<ReviewItem>, DdtssError> {
        let body = self.language_page().await?;
        Ok(review::parse_pending_reviews(&body))
    }

    pub async fn package_statuses(
        &self,
    ) -> Result<std::collections::BTreeMap<String, PackageStatus>, DdtssError> {
        let body = self.language_page().await?;
        Ok(review::parse_package_statuses(&body))
    }

    pub async fn stats(&self) -> Result<DdtssStats, DdtssError> {
        let body = self.language_page().await?;
        Ok(review::parse_stats(&body))
    }

    pub async fn review_page(&self, package: &str) -> Result<ReviewPage, DdtssError> {
        let url = self.lang_url(&format!("forreview/{}", encode(package)));
        let (_, body) = self.get(&url).await?;
        self.check(&body).await?;
        Ok(review::parse_review_page(&body, package))
    }

    pub async fn submit_review(
        &self,
        package: &str,
        decision: &ReviewDecision,
        comment: &str,
    ) -> Result<(), DdtssError> {
        if let ReviewDecision::AcceptWithChanges { short, long } = decision {
            validate_translation(short, long)?;
        }
        let url = self.lang_url(&format!("forreview/{}", encode(package)));
        let mut form = Multipart::new()
            .text("_charset_", "UTF-8")
            .text("comment", comment.to_string());
        for (name, value) in decision.form_fields() {
            form = form.text(name, value);
        }
        let (_, body) = self.send_multipart(&url, form).await?;
        self.check(&body).await?;
        info!(package, decision = decision.label(), "Review submitted");
        Ok(())
    }

    /// Give up a translation in progress, releasing its lock.
    pub async fn abandon(&self, package: &str) -> Result<(), DdtssError> {
        let url = self.lang_url(&format!("translate/{}", encode(package)));
        let form = Multipart::new()
            .text("abandon", "Abandon")
            .text("_charset_", "UTF-8");
        let (_, body) = self.send_multipart(&url, form).await?;
        self.check(&body).await?;
        info!(package, "Translation abandoned");
        Ok(())
    }

    async fn language_page(&self) -> Result<String, DdtssError> {
        let (_, body) = self.get(&self.lang_url("")).await?;
        self.check(&body).await?;
        Ok(body)
    }

    /// Classify the body; a login-required answer also drops the session.
    async fn check(&self, body: &str) -> Result<(), DdtssError> {
        let result = html::check_error(body);
        if let Err(DdtssError::Auth(_)) = &result {
            let had_session = self.session.lock().await.is_some();
            if had_session {
                self.invalidate_session().await;
            }
        }
        result
    }

    async fn get(&self, url: &str) -> Result<(u16, String), DdtssError> {
        debug!(url, "GET");
        let resp = self.http.get(url).send().await.map_err(map_reqwest)?;
        read_body(resp).await
    }

    async fn send_multipart(&self, url: &str, form: Multipart) -> Result<(u16, String), DdtssError> {
        debug!(url, "POST");
        let resp = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(map_reqwest)?;
        read_body(resp).await
    }
}

async fn read_body(resp: reqwest::Response) -> Result<(u16, String), DdtssError> {
    let status = resp.status().as_u16();
    let bytes = resp.bytes().await.map_err(map_reqwest)?;
    let body = String::from_utf8_lossy(&bytes).into_owned();
    if status >= 500 && html::check_error(&body).is_ok() {
        return Err(DdtssError::Server(format!("HTTP {status}")));
    }
    Ok((status, body))
}

fn map_reqwest(e: reqwest::Error) -> DdtssError {
    if e.is_timeout() {
        DdtssError::Timeout(REQUEST_TIMEOUT)
    } else {
        DdtssError::Connection(e.to_string())
    }
}

/// Percent-encode a package name for use in a path or query.
fn encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// Parse a translate (or review) page into its original and current texts.
pub fn parse_translate_page(body: &str, package: &str) -> TranslatePage {
    let form = Form::parse(body);
    TranslatePage {
        package: package.to_string(),
        short_orig: html::capture(&ORIG_SHORT_RE, body)
            .map(|s| html::unescape(&s))
            .unwrap_or_default(),
        long_orig: html::capture(&ORIG_LONG_RE, body)
            .map(|s| html::unescape(html::strip_tags(&s).trim()))
            .unwrap_or_default(),
        short_trans: form.value("short"),
        long_trans: form.textarea("long").unwrap_or_default().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_rules() {
        assert!(validate_credentials("ab", "12345").is_ok());
        assert!(validate_credentials("a", "12345").is_err());
        assert!(validate_credentials("a-b", "12345").is_err());
        assert!(validate_credentials("anna", "1234").is_err());
    }

    #[test]
    fn translation_rules() {
        assert!(validate_translation("kort", "lång\n\nrad").is_ok());
        assert!(matches!(
            validate_translation("<trans>", ""),
            Err(DdtssError::Validation(_))
        ));
        let long_line = "å".repeat(81);
        assert!(validate_translation("kort", &long_line).is_err());
        assert!(validate_translation(&"å".repeat(80), "").is_ok());
    }

    #[test]
    fn package_names_are_encoded() {
        assert_eq!(encode("libc6-dev"), "libc6-dev");
        assert_eq!(encode("g++"), "g%2B%2B");
        assert_eq!(encode("a b"), "a%20b");
    }

    #[test]
    fn translate_page_parsing() {
        let body = r#"
<h1>Translate vim</h1>
Description: Vi IMproved - enhanced vi editor<br>
<pre class="untranslated">Vim is an <i>almost</i> compatible version.</pre>
<form>
<input name="short" value="">
<textarea name="short">Vi IMproved - förbättrad vi</textarea>
<textarea name="long">&lt;trans&gt;</textarea>
</form>"#;
        let page = parse_translate_page(body, "vim");
        assert_eq!(page.short_orig, "Vi IMproved - enhanced vi editor");
        assert_eq!(page.long_orig, "Vim is an almost compatible version.");
        assert_eq!(page.short_trans, "Vi IMproved - förbättrad vi");
        assert_eq!(page.long_trans, "<trans>");
    }

    #[test]
    fn urls_are_built_under_language() {
        let client = DdtssClient::new("http://localhost/ddtss/index.cgi/", "sv").unwrap();
        assert_eq!(client.url("login"), "http://localhost/ddtss/index.cgi/login");
        assert_eq!(
            client.lang_url("translate/vim"),
            "http://localhost/ddtss/index.cgi/sv/translate/vim"
        );
        assert_eq!(client.lang_url(""), "http://localhost/ddtss/index.cgi/sv/");
        assert_eq!(
            client.lang_url_in("de", "fetch?package=vim"),
            "http://localhost/ddtss/index.cgi/de/fetch?package=vim"
        );
    }
}
