//! Configuration: settings file, environment overrides and on-disk locations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Directory name used under the XDG config/cache/data roots.
pub const APP_DIR: &str = "ddtp-translate";

pub const DEFAULT_DDTSS_URL: &str = "https://ddtp.debian.org/ddtss/index.cgi";
pub const DEFAULT_DDTP_URL: &str = "https://ddtp.debian.org/ddt.cgi";
pub const DEFAULT_MIRROR_URL: &str = "https://deb.debian.org/debian";

/// User-Agent sent with every HTTP request.
pub fn user_agent() -> String {
    format!("ddtp-translate/{}", env!("CARGO_PKG_VERSION"))
}

/// How translations leave the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubmitMethod {
    #[default]
    Ddtss,
    Email,
}

impl std::str::FromStr for SubmitMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ddtss" => Ok(SubmitMethod::Ddtss),
            "email" | "smtp" => Ok(SubmitMethod::Email),
            other => Err(ConfigError::InvalidValue {
                key: "submit_method".into(),
                message: format!("expected `ddtss` or `email`, got `{other}`"),
            }),
        }
    }
}

/// Outgoing mail settings for the legacy email channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpSettings {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Implicit TLS when true, STARTTLS otherwise.
    #[serde(default = "default_true")]
    pub use_tls: bool,
    #[serde(default)]
    pub from_email: String,
    #[serde(default)]
    pub from_name: String,
    #[serde(skip)]
    pub password_override: Option<SecretString>,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_smtp_port(),
            username: String::new(),
            password: None,
            use_tls: true,
            from_email: String::new(),
            from_name: String::new(),
            password_override: None,
        }
    }
}

impl SmtpSettings {
    /// The SMTP password, environment first.
    pub fn password(&self) -> Option<SecretString> {
        self.password_override
            .clone()
            .or_else(|| self.password.clone().map(SecretString::from))
    }
}

/// Application settings, persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub ddtss_alias: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ddtss_password: Option<String>,

    #[serde(default = "default_language")]
    pub default_language: String,

    /// Seconds to wait between two queued submissions.
    #[serde(default = "default_send_delay")]
    pub send_delay: u64,

    #[serde(default = "default_max_packages")]
    pub max_packages: usize,

    #[serde(default = "default_true")]
    pub auto_lint: bool,

    #[serde(default)]
    pub enable_logging: bool,

    #[serde(default)]
    pub submit_method: SubmitMethod,

    #[serde(default)]
    pub smtp: SmtpSettings,

    #[serde(default = "default_ddtss_url")]
    pub ddtss_url: String,

    #[serde(default = "default_ddtp_url")]
    pub ddtp_url: String,

    #[serde(default = "default_mirror_url")]
    pub mirror_url: String,

    #[serde(skip)]
    pub ddtss_password_override: Option<SecretString>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ddtss_alias: String::new(),
            ddtss_password: None,
            default_language: default_language(),
            send_delay: default_send_delay(),
            max_packages: default_max_packages(),
            auto_lint: true,
            enable_logging: false,
            submit_method: SubmitMethod::default(),
            smtp: SmtpSettings::default(),
            ddtss_url: default_ddtss_url(),
            ddtp_url: default_ddtp_url(),
            mirror_url: default_mirror_url(),
            ddtss_password_override: None,
        }
    }
}

impl Settings {
    /// Load settings from `path`. A missing or unreadable file yields defaults.
    pub fn load(path: &Path) -> Self {
        let Ok(raw) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring malformed settings file");
                Self::default()
            }
        }
    }

    /// Write settings to `path`, creating the parent directory.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Apply `DDTP_*` / `DDTSS_*` environment overrides.
    ///
    /// Passwords taken from the environment are kept out of the settings file.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(alias) = std::env::var("DDTSS_ALIAS") {
            self.ddtss_alias = alias;
        }
        if let Ok(pw) = std::env::var("DDTSS_PASSWORD") {
            self.ddtss_password_override = Some(SecretString::from(pw));
        }
        if let Ok(lang) = std::env::var("DDTP_LANGUAGE") {
            self.default_language = lang;
        }
        if let Some(delay) = parse_env::<u64>("DDTP_SEND_DELAY")? {
            self.send_delay = delay;
        }
        if let Some(max) = parse_env::<usize>("DDTP_MAX_PACKAGES")? {
            self.max_packages = max;
        }
        if let Ok(method) = std::env::var("DDTP_SUBMIT_METHOD") {
            self.submit_method = method.parse()?;
        }
        if let Ok(url) = std::env::var("DDTSS_URL") {
            self.ddtss_url = url;
        }
        if let Ok(host) = std::env::var("DDTP_SMTP_HOST") {
            self.smtp.host = host;
        }
        if let Some(port) = parse_env::<u16>("DDTP_SMTP_PORT")? {
            self.smtp.port = port;
        }
        if let Ok(user) = std::env::var("DDTP_SMTP_USERNAME") {
            self.smtp.username = user;
        }
        if let Ok(pw) = std::env::var("DDTP_SMTP_PASSWORD") {
            self.smtp.password_override = Some(SecretString::from(pw));
        }
        if let Ok(from) = std::env::var("DDTP_FROM_EMAIL") {
            self.smtp.from_email = from;
        }
        Ok(())
    }

    /// Alias and password for DDTSS, if both are configured.
    pub fn ddtss_credentials(&self) -> Result<(String, SecretString), ConfigError> {
        if self.ddtss_alias.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "ddtss_alias".into(),
                hint: "Set it in settings.json or DDTSS_ALIAS.".into(),
            });
        }
        let password = self
            .ddtss_password_override
            .clone()
            .or_else(|| self.ddtss_password.clone().map(SecretString::from))
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "ddtss_password".into(),
                hint: "Set it in settings.json or DDTSS_PASSWORD.".into(),
            })?;
        Ok((self.ddtss_alias.clone(), password))
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_secs(self.send_delay)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

fn default_language() -> String {
    "sv".to_string()
}

fn default_send_delay() -> u64 {
    30
}

fn default_max_packages() -> usize {
    500
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

fn default_ddtss_url() -> String {
    DEFAULT_DDTSS_URL.to_string()
}

fn default_ddtp_url() -> String {
    DEFAULT_DDTP_URL.to_string()
}

fn default_mirror_url() -> String {
    DEFAULT_MIRROR_URL.to_string()
}

/// On-disk locations (XDG config, cache and data roots).
#[derive(Debug, Clone)]
pub struct AppDirs {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppDirs {
    /// Resolve the platform directories.
    pub fn discover() -> Result<Self, ConfigError> {
        let config = dirs::config_dir().ok_or(ConfigError::NoHomeDir)?;
        let cache = dirs::cache_dir().ok_or(ConfigError::NoHomeDir)?;
        let data = dirs::data_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(Self {
            config_dir: config.join(APP_DIR),
            cache_dir: cache.join(APP_DIR),
            data_dir: data.join(APP_DIR),
        })
    }

    /// All three directories below one root (tests, portable installs).
    pub fn under(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            cache_dir: root.join("cache"),
            data_dir: root.join("data"),
        }
    }

    pub fn ensure(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.cache_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    pub fn session_file(&self) -> PathBuf {
        self.config_dir.join("ddtss_session.json")
    }

    pub fn queue_file(&self) -> PathBuf {
        self.data_dir.join("queue.json")
    }

    pub fn log_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.default_language, "sv");
        assert_eq!(s.send_delay, 30);
        assert_eq!(s.max_packages, 500);
        assert!(s.auto_lint);
        assert!(!s.enable_logging);
        assert_eq!(s.submit_method, SubmitMethod::Ddtss);
        assert_eq!(s.smtp.port, 587);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"ddtss_alias": "anna", "send_delay": 5}"#).unwrap();

        let s = Settings::load(&path);
        assert_eq!(s.ddtss_alias, "anna");
        assert_eq!(s.send_delay, 5);
        assert_eq!(s.max_packages, 500);
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(Settings::load(&path).default_language, "sv");
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut s = Settings::default();
        s.ddtss_alias = "bert".into();
        s.submit_method = SubmitMethod::Email;
        s.save(&path).unwrap();

        let loaded = Settings::load(&path);
        assert_eq!(loaded.ddtss_alias, "bert");
        assert_eq!(loaded.submit_method, SubmitMethod::Email);
    }

    #[test]
    fn override_password_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut s = Settings::default();
        s.ddtss_alias = "carl".into();
        s.ddtss_password_override = Some(SecretString::from("hunter22"));
        s.save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("hunter22"));

        let (alias, pw) = s.ddtss_credentials().unwrap();
        assert_eq!(alias, "carl");
        assert_eq!(pw.expose_secret(), "hunter22");
    }

    #[test]
    fn credentials_require_alias() {
        let s = Settings::default();
        assert!(matches!(
            s.ddtss_credentials(),
            Err(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn submit_method_parsing() {
        assert_eq!("DDTSS".parse::<SubmitMethod>().unwrap(), SubmitMethod::Ddtss);
        assert_eq!("smtp".parse::<SubmitMethod>().unwrap(), SubmitMethod::Email);
        assert!("pigeon".parse::<SubmitMethod>().is_err());
    }

    #[test]
    fn app_dirs_layout() {
        let dirs = AppDirs::under(Path::new("/tmp/x"));
        assert_eq!(dirs.queue_file(), Path::new("/tmp/x/data/queue.json"));
        assert_eq!(
            dirs.session_file(),
            Path::new("/tmp/x/config/ddtss_session.json")
        );
    }
}
