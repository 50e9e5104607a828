//! File-backed JSON cache of description lists with a freshness TTL.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::fs;
use tracing::{debug, warn};

use super::PackageDescription;
use crate::error::FetchError;

/// Default lifetime of a cached list.
pub const CACHE_TTL: Duration = Duration::from_secs(3600);

/// JSON files under the cache directory, one per list.
#[derive(Debug, Clone)]
pub struct DescriptionCache {
    dir: PathBuf,
    ttl: Duration,
}

impl DescriptionCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ttl: CACHE_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Cache key of the merged untranslated list for a language.
    pub fn untranslated_key(lang: &str) -> String {
        format!("untranslated_{lang}")
    }

    /// Cache key of the mirror comparison for a language and distribution.
    pub fn mirror_key(lang: &str, dist: &str) -> String {
        format!("mirror_untranslated_{lang}_{dist}")
    }

    pub fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Whether the entry exists and is younger than the TTL.
    pub async fn is_fresh(&self, key: &str) -> bool {
        let Ok(meta) = fs::metadata(self.path(key)).await else {
            return false;
        };
        let Ok(modified) = meta.modified() else {
            return false;
        };
        SystemTime::now()
            .duration_since(modified)
            .map(|age| age < self.ttl)
            .unwrap_or(true)
    }

    /// Read the entry only if it is fresh.
    pub async fn read_fresh(&self, key: &str) -> Option<Vec<PackageDescription>> {
        if !self.is_fresh(key).await {
            return None;
        }
        let hit = self.read_any(key).await;
        if hit.is_some() {
            debug!(key, "Cache hit");
        }
        hit
    }

    /// Read the entry regardless of age. Unreadable entries count as missing.
    pub async fn read_any(&self, key: &str) -> Option<Vec<PackageDescription>> {
        let path = self.path(key);
        let raw = fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str(&raw) {
            Ok(list) => Some(list),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding unreadable cache file");
                None
            }
        }
    }

    pub async fn write(&self, key: &str, packages: &[PackageDescription]) -> Result<(), FetchError> {
        fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_string_pretty(packages)?;
        write_atomic(&self.path(key), &json).await?;
        debug!(key, count = packages.len(), "Cache written");
        Ok(())
    }

    /// Drop an entry so the next fetch goes to the network.
    pub async fn invalidate(&self, key: &str) -> Result<(), FetchError> {
        match fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write to a sibling temp file and rename over the target.
pub(crate) async fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents).await?;
    fs::rename(&tmp, path).await
}
