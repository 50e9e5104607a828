//! Fetch untranslated descriptions: DDTP first, Debian mirror second, stale
//! cache last.

use std::io::Read;
use std::time::Duration;

use tracing::{info, warn};

use super::cache::DescriptionCache;
use super::parser::{parse_ddtp_response, parse_translation_file, untranslated_from};
use super::PackageDescription;
use crate::config::{self, Settings};
use crate::error::FetchError;
use crate::retry::{RetryPolicy, with_backoff};

const DDTP_TIMEOUT: Duration = Duration::from_secs(15);
const MIRROR_TIMEOUT: Duration = Duration::from_secs(60);

/// Distributions known to carry `i18n/Translation-*` files.
pub const DISTS: &[&str] = &["sid", "trixie", "bookworm"];

/// Retrieves description lists over HTTP with a local cache in front.
pub struct DdtpFetcher {
    client: reqwest::Client,
    ddtp_url: String,
    mirror_url: String,
    dist: String,
    cache: DescriptionCache,
    retry: RetryPolicy,
}

impl DdtpFetcher {
    pub fn new(ddtp_url: impl Into<String>, mirror_url: impl Into<String>, cache: DescriptionCache) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(config::user_agent())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            ddtp_url: ddtp_url.into(),
            mirror_url: mirror_url.into(),
            dist: DISTS[0].to_string(),
            cache,
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_settings(settings: &Settings, cache: DescriptionCache) -> Self {
        Self::new(&settings.ddtp_url, &settings.mirror_url, cache)
    }

    pub fn with_dist(mut self, dist: impl Into<String>) -> Self {
        self.dist = dist.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(&self) -> &DescriptionCache {
        &self.cache
    }

    /// Untranslated descriptions for `lang`.
    ///
    /// A fresh cache answers immediately unless `force_refresh` is set. Then
    /// DDTP, then the mirror comparison, then a stale cache entry.
    pub async fn fetch_untranslated(
        &self,
        lang: &str,
        force_refresh: bool,
    ) -> Result<Vec<PackageDescription>, FetchError> {
        let key = DescriptionCache::untranslated_key(lang);

        if !force_refresh
            && let Some(cached) = self.cache.read_fresh(&key).await
        {
            return Ok(cached);
        }

        match self.fetch_from_ddtp(lang).await {
            Ok(packages) => {
                info!(lang, count = packages.len(), "Fetched untranslated list from DDTP");
                self.store(&key, &packages).await;
                return Ok(packages);
            }
            Err(e) => warn!(lang, error = %e, "DDTP unavailable, trying mirror"),
        }

        match self.fetch_from_mirror(lang, force_refresh).await {
            Ok(packages) if !packages.is_empty() => {
                info!(lang, dist = %self.dist, count = packages.len(), "Built untranslated list from mirror");
                self.store(&key, &packages).await;
                return Ok(packages);
            }
            Ok(_) => warn!(lang, "Mirror comparison found nothing"),
            Err(e) => warn!(lang, error = %e, "Mirror unavailable"),
        }

        if let Some(stale) = self.cache.read_any(&key).await {
            warn!(lang, "Serving stale cache");
            return Ok(stale);
        }

        Err(FetchError::Unavailable)
    }

    /// Number of untranslated descriptions for `lang`.
    pub async fn untranslated_count(&self, lang: &str) -> Result<usize, FetchError> {
        Ok(self.fetch_untranslated(lang, false).await?.len())
    }

    async fn store(&self, key: &str, packages: &[PackageDescription]) {
        if let Err(e) = self.cache.write(key, packages).await {
            warn!(key, error = %e, "Failed to write cache");
        }
    }

    async fn fetch_from_ddtp(&self, lang: &str) -> Result<Vec<PackageDescription>, FetchError> {
        let url = format!("{}?lcode={lang}&getuntranslated=1", self.ddtp_url);
        let text = with_backoff(&self.retry, "ddtp", is_transient, || {
            self.get_text(&url, DDTP_TIMEOUT)
        })
        .await?;

        let mut packages = parse_ddtp_response(&text);
        if packages.is_empty() {
            return Err(FetchError::Empty { lang: lang.to_string() });
        }
        tag_language(&mut packages, lang);
        Ok(packages)
    }

    /// Compare the English Translation file with the one for `lang`.
    pub async fn fetch_from_mirror(
        &self,
        lang: &str,
        force_refresh: bool,
    ) -> Result<Vec<PackageDescription>, FetchError> {
        let key = DescriptionCache::mirror_key(lang, &self.dist);
        if !force_refresh
            && let Some(cached) = self.cache.read_fresh(&key).await
        {
            return Ok(cached);
        }

        let en_text = self.fetch_translation_file("en").await?;
        let lang_text = match self.fetch_translation_file(lang).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(lang, error = %e, "No Translation file for language, treating all as untranslated");
                None
            }
        };

        let en = parse_translation_file(&en_text);
        let translated = lang_text
            .as_deref()
            .map(parse_translation_file)
            .unwrap_or_default();
        let mut packages = untranslated_from(en, &translated);
        tag_language(&mut packages, lang);

        self.store(&key, &packages).await;
        Ok(packages)
    }

    async fn fetch_translation_file(&self, lang: &str) -> Result<String, FetchError> {
        let url = format!(
            "{}/dists/{}/main/i18n/Translation-{lang}.bz2",
            self.mirror_url, self.dist
        );
        let compressed = with_backoff(&self.retry, "mirror", is_transient, || {
            self.get_bytes(&url, MIRROR_TIMEOUT)
        })
        .await?;

        let url_for_err = url.clone();
        tokio::task::spawn_blocking(move || decompress_bz2(&compressed))
            .await
            .map_err(|e| FetchError::Decompress {
                url: url_for_err.clone(),
                reason: e.to_string(),
            })?
            .map_err(|e| FetchError::Decompress {
                url: url_for_err,
                reason: e.to_string(),
            })
    }

    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let bytes = self.get_bytes(url, timeout).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn get_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::Http {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| FetchError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

fn tag_language(packages: &mut [PackageDescription], lang: &str) {
    for p in packages {
        p.language = Some(lang.to_string());
    }
}

fn is_transient(e: &FetchError) -> bool {
    match e {
        FetchError::Http { .. } => true,
        FetchError::Status { status, .. } => *status >= 500,
        _ => false,
    }
}

/// Decompress a bzip2 stream into (lossy) UTF-8 text.
pub fn decompress_bz2(data: &[u8]) -> std::io::Result<String> {
    let mut decoder = bzip2::read::BzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn bz2_round_trip() {
        let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::fast());
        enc.write_all("Package: ä\n".as_bytes()).unwrap();
        let compressed = enc.finish().unwrap();
        assert_eq!(decompress_bz2(&compressed).unwrap(), "Package: ä\n");
    }

    #[test]
    fn garbage_is_not_bz2() {
        assert!(decompress_bz2(b"definitely not bzip2").is_err());
    }

    #[test]
    fn only_network_and_server_errors_are_transient() {
        assert!(is_transient(&FetchError::Http {
            url: "u".into(),
            reason: "reset".into()
        }));
        assert!(is_transient(&FetchError::Status {
            url: "u".into(),
            status: 503
        }));
        assert!(!is_transient(&FetchError::Status {
            url: "u".into(),
            status: 404
        }));
        assert!(!is_transient(&FetchError::Empty { lang: "sv".into() }));
    }

    #[tokio::test]
    async fn unreachable_hosts_fall_back_to_stale_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DescriptionCache::new(dir.path()).with_ttl(Duration::ZERO);
        let mut stale = PackageDescription::new("stale");
        stale.md5 = "ffff".into();
        cache
            .write(&DescriptionCache::untranslated_key("sv"), &[stale])
            .await
            .unwrap();

        let fetcher = DdtpFetcher::new("http://127.0.0.1:9/ddt.cgi", "http://127.0.0.1:9/debian", cache)
            .with_retry(RetryPolicy::none());
        let pkgs = fetcher.fetch_untranslated("sv", false).await.unwrap();
        assert_eq!(pkgs[0].name, "stale");
    }

    #[tokio::test]
    async fn nothing_anywhere_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = DdtpFetcher::new(
            "http://127.0.0.1:9/ddt.cgi",
            "http://127.0.0.1:9/debian",
            DescriptionCache::new(dir.path()),
        )
        .with_retry(RetryPolicy::none());
        assert!(matches!(
            fetcher.fetch_untranslated("sv", true).await,
            Err(FetchError::Unavailable)
        ));
    }
}
