//! DDTSS login session: the `id` cookie and its lifetime, persisted on disk.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Name of the DDTSS session cookie.
pub const SESSION_COOKIE: &str = "id";

/// DDTSS keeps a login cookie for 70 days.
pub const SESSION_LIFETIME_DAYS: i64 = 70;

/// An authenticated DDTSS session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub alias: String,
    pub cookie: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(alias: impl Into<String>, cookie: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            alias: alias.into(),
            cookie: cookie.into(),
            created_at: now,
            expires_at: now + Duration::days(SESSION_LIFETIME_DAYS),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        !self.cookie.is_empty() && !self.is_expired_at(Utc::now())
    }

    /// `Set-Cookie` style string for seeding a cookie jar.
    pub fn cookie_header(&self) -> String {
        format!("{SESSION_COOKIE}={}; Path=/", self.cookie)
    }
}

/// Extract the session cookie value from a `Cookie:` header value
/// (`id=abc; other=x`).
pub fn session_cookie_value(header: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
    })
}

/// JSON file holding the current session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load a still-valid session. Expired or unreadable files yield `None`.
    pub fn load(&self) -> Option<Session> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<Session>(&raw) {
            Ok(session) if session.is_valid() => Some(session),
            Ok(session) => {
                debug!(alias = %session.alias, "Stored DDTSS session expired");
                None
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable session file");
                None
            }
        }
    }

    pub fn save(&self, session: &Session) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(session).map_err(std::io::Error::other)?;
        std::fs::write(&self.path, json)
    }

    pub fn clear(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_lives_seventy_days() {
        let s = Session::new("anna", "abc");
        assert_eq!((s.expires_at - s.created_at).num_days(), 70);
        assert!(s.is_valid());
        assert!(s.is_expired_at(s.expires_at));
        assert!(!s.is_expired_at(s.created_at + Duration::days(69)));
    }

    #[test]
    fn empty_cookie_is_not_valid() {
        assert!(!Session::new("anna", "").is_valid());
    }

    #[test]
    fn cookie_value_from_header() {
        assert_eq!(session_cookie_value("lang=sv; id=xyz"), Some("xyz".into()));
        assert_eq!(session_cookie_value("id="), None);
        assert_eq!(session_cookie_value("idx=1"), None);
    }

    #[test]
    fn store_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("cfg").join("session.json"));
        assert!(store.load().is_none());

        let s = Session::new("anna", "abc");
        store.save(&s).unwrap();
        assert_eq!(store.load(), Some(s));

        store.clear().unwrap();
        assert!(store.load().is_none());
        store.clear().unwrap();
    }

    #[test]
    fn expired_session_is_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        let mut s = Session::new("anna", "abc");
        s.expires_at = Utc::now() - Duration::days(1);
        store.save(&s).unwrap();
        assert!(store.load().is_none());
    }
}
