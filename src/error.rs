//! Error types for ddtp-translate.

use std::time::Duration;

/// Top-level error type for the client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("DDTSS error: {0}")]
    Ddtss(#[from] DdtssError),

    #[error("Submit error: {0}")]
    Submit(#[from] SubmitError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Lint error: {0}")]
    Lint(#[from] LintError),

    #[error("PO error: {0}")]
    Po(#[from] PoError),
}

impl Error {
    /// A sentence suitable for showing to the translator.
    pub fn user_message(&self) -> String {
        match self {
            Error::Ddtss(e) => e.user_message(),
            Error::Submit(e) => e.user_message(),
            Error::Fetch(e) => e.user_message(),
            Error::Lint(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("No home directory could be determined")]
    NoHomeDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors while retrieving package descriptions.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Failed to decompress {url}: {reason}")]
    Decompress { url: String, reason: String },

    #[error("DDTP returned no packages for {lang}")]
    Empty { lang: String },

    #[error("Both ddtp.debian.org and the Debian mirror are unreachable")]
    Unavailable,

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    pub fn user_message(&self) -> String {
        match self {
            FetchError::Unavailable => {
                "Could not fetch DDTP data. Both ddtp.debian.org and the Debian mirror are unreachable."
                    .to_string()
            }
            FetchError::Http { url, .. } | FetchError::Status { url, .. } => {
                format!("Network error: {url} did not answer ({self})")
            }
            other => other.to_string(),
        }
    }
}

/// Errors reported by (or while talking to) the DDTSS web interface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DdtssError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Package locked: {0}")]
    Locked(String),

    #[error("Package not available: {0}")]
    NotFound(String),

    #[error("Translation rejected: {0}")]
    Validation(String),

    #[error("DDTSS server error: {0}")]
    Server(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl DdtssError {
    pub fn user_message(&self) -> String {
        match self {
            DdtssError::Auth(msg) => format!("Login failed: {msg}"),
            DdtssError::Locked(msg) => format!("Package locked: {msg}"),
            DdtssError::NotFound(msg) => format!("Package not available: {msg}"),
            DdtssError::Validation(msg) => format!("Validation error: {msg}"),
            DdtssError::Server(msg) => format!("DDTSS reported an error: {msg}"),
            DdtssError::Connection(msg) => format!("Network error: {msg}"),
            DdtssError::Timeout(d) => format!("Network error: no answer within {}s", d.as_secs()),
            DdtssError::UnexpectedResponse(msg) => format!("Error: {msg}"),
        }
    }

    /// Whether the request may succeed after a fresh login.
    pub fn is_auth(&self) -> bool {
        matches!(self, DdtssError::Auth(_))
    }
}

/// Errors from a submission channel.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Ddtss(#[from] DdtssError),

    #[error("Failed to build email: {0}")]
    BuildEmail(String),

    #[error("SMTP send failed: {0}")]
    Smtp(String),

    #[error("Submitter not configured: {0}")]
    NotConfigured(String),
}

impl SubmitError {
    pub fn user_message(&self) -> String {
        match self {
            SubmitError::Ddtss(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

/// Send queue errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue entry {id} not found")]
    NotFound { id: String },

    #[error("Failed to persist queue to {path}: {reason}")]
    Persist { path: String, reason: String },

    #[error("Corrupt queue file {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Lint errors (not lint findings; those are reported as issues).
#[derive(Debug, thiserror::Error)]
pub enum LintError {
    #[error("l10n-lint not found on PATH")]
    NotInstalled,

    #[error("l10n-lint timed out after {0:?}")]
    Timeout(Duration),

    #[error("l10n-lint failed to run: {0}")]
    Spawn(String),

    #[error("Translation is empty, nothing to lint")]
    EmptyTranslation,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LintError {
    pub fn user_message(&self) -> String {
        match self {
            LintError::NotInstalled => {
                "l10n-lint is not installed. Install it with `pip install l10n-lint` or `apt install l10n-lint`."
                    .to_string()
            }
            other => other.to_string(),
        }
    }
}

/// PO import/export errors.
#[derive(Debug, thiserror::Error)]
pub enum PoError {
    #[error("Malformed PO file at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the client.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_for_lock_conflict() {
        let err = Error::Ddtss(DdtssError::Locked("Translation vim locked, sorry...".into()));
        assert_eq!(
            err.user_message(),
            "Package locked: Translation vim locked, sorry..."
        );
    }

    #[test]
    fn submit_error_unwraps_ddtss_message() {
        let err = Error::Submit(SubmitError::Ddtss(DdtssError::Auth(
            "Invalid username/password".into(),
        )));
        assert_eq!(err.user_message(), "Login failed: Invalid username/password");
    }

    #[test]
    fn fetch_and_lint_messages() {
        assert_eq!(
            FetchError::Unavailable.user_message(),
            Error::Fetch(FetchError::Unavailable).user_message()
        );
        assert!(FetchError::Unavailable.user_message().starts_with("Could not fetch DDTP data"));
        let status = FetchError::Status {
            url: "https://ddtp.debian.org/ddt.cgi".into(),
            status: 503,
        };
        assert!(status.user_message().starts_with("Network error: https://ddtp.debian.org/ddt.cgi"));
        assert!(LintError::NotInstalled.user_message().contains("not installed"));
        assert!(DdtssError::Auth("x".into()).is_auth());
    }
}
