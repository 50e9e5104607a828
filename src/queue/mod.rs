//! Durable send queue.
//!
//! Every mutation is written to disk before returning, so a crash loses at
//! most the item being sent. Entries found in `sending` on load are put back
//! to `ready`.

pub mod batch;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ddtp::cache::write_atomic;
use crate::error::QueueError;
use crate::submit::Submission;

pub use batch::{BatchEvent, BatchReport, BatchSender, ReviewReport, accept_all_reviews};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Ready,
    Sending,
    Sent,
    Error,
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueueStatus::Ready => "ready",
            QueueStatus::Sending => "sending",
            QueueStatus::Sent => "sent",
            QueueStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    pub package: String,
    pub md5: String,
    #[serde(default)]
    pub lang: String,
    pub short: String,
    pub long: String,
    #[serde(default)]
    pub comment: String,
    pub status: QueueStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// First eight characters of an entry id, or the whole id when shorter.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

impl QueueEntry {
    fn new(s: Submission) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            package: s.package,
            md5: s.md5,
            lang: s.lang,
            short: s.short,
            long: s.long,
            comment: s.comment,
            status: QueueStatus::Ready,
            error: None,
            added_at: now,
            updated_at: now,
        }
    }

    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }

    /// Short and long description as one editor text.
    pub fn translation_text(&self) -> String {
        if self.long.is_empty() {
            self.short.clone()
        } else {
            format!("{}\n{}", self.short, self.long)
        }
    }

    pub fn to_submission(&self) -> Submission {
        Submission {
            package: self.package.clone(),
            md5: self.md5.clone(),
            lang: self.lang.clone(),
            short: self.short.clone(),
            long: self.long.clone(),
            comment: self.comment.clone(),
        }
    }

    fn set_status(&mut self, status: QueueStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.updated_at = Utc::now();
    }
}

/// Number of entries per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub total: usize,
    pub ready: usize,
    pub sending: usize,
    pub sent: usize,
    pub error: usize,
}

#[derive(Debug)]
pub struct SendQueue {
    path: PathBuf,
    entries: Vec<QueueEntry>,
}

impl SendQueue {
    /// Load the queue at `path`. A missing file is an empty queue.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let path = path.into();
        let mut entries: Vec<QueueEntry> = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| QueueError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(QueueError::Persist {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let mut reset = 0;
        for entry in entries.iter_mut().filter(|e| e.status == QueueStatus::Sending) {
            entry.set_status(QueueStatus::Ready, None);
            reset += 1;
        }
        if reset > 0 {
            warn!(count = reset, "Reset interrupted queue entries to ready");
        }

        debug!(path = %path.display(), entries = entries.len(), "Queue loaded");
        let queue = Self { path, entries };
        if reset > 0 {
            queue.save().await?;
        }
        Ok(queue)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save(&self) -> Result<(), QueueError> {
        let persist_err = |reason: String| QueueError::Persist {
            path: self.path.display().to_string(),
            reason,
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| persist_err(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(&self.entries).map_err(|e| persist_err(e.to_string()))?;
        write_atomic(&self.path, &json)
            .await
            .map_err(|e| persist_err(e.to_string()))
    }

    /// Queue a translation. An existing entry for the same package and md5
    /// gets the new text and goes back to `ready`. Returns the entry id.
    pub async fn add(&mut self, submission: Submission) -> Result<String, QueueError> {
        let existing = self
            .entries
            .iter()
            .position(|e| e.package == submission.package && e.md5 == submission.md5);
        let id = match existing {
            Some(pos) => {
                let entry = &mut self.entries[pos];
                entry.short = submission.short;
                entry.long = submission.long;
                entry.comment = submission.comment;
                if !submission.lang.is_empty() {
                    entry.lang = submission.lang;
                }
                entry.set_status(QueueStatus::Ready, None);
                debug!(package = %entry.package, "Replaced queued translation");
                entry.id.clone()
            }
            None => {
                let entry = QueueEntry::new(submission);
                info!(package = %entry.package, id = %entry.id, "Queued translation");
                let id = entry.id.clone();
                self.entries.push(entry);
                id
            }
        };
        self.save().await?;
        Ok(id)
    }

    pub async fn remove(&mut self, id: &str) -> Result<QueueEntry, QueueError> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| QueueError::NotFound { id: id.to_string() })?;
        let entry = self.entries.remove(pos);
        self.save().await?;
        Ok(entry)
    }

    /// Drop entries already sent. Returns how many were removed.
    pub async fn clear_sent(&mut self) -> Result<usize, QueueError> {
        self.retain(|e| e.status != QueueStatus::Sent).await
    }

    /// Drop everything except entries currently being sent.
    pub async fn clear(&mut self) -> Result<usize, QueueError> {
        self.retain(|e| e.status == QueueStatus::Sending).await
    }

    /// Put failed entries back to `ready`.
    pub async fn retry_failed(&mut self) -> Result<usize, QueueError> {
        let mut n = 0;
        for entry in self.entries.iter_mut().filter(|e| e.status == QueueStatus::Error) {
            entry.set_status(QueueStatus::Ready, None);
            n += 1;
        }
        if n > 0 {
            self.save().await?;
        }
        Ok(n)
    }

    async fn retain(&mut self, keep: impl Fn(&QueueEntry) -> bool) -> Result<usize, QueueError> {
        let before = self.entries.len();
        self.entries.retain(|e| keep(e));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.save().await?;
        }
        Ok(removed)
    }

    /// Order by package name, case-insensitively.
    pub async fn sort(&mut self) -> Result<(), QueueError> {
        self.entries.sort_by_key(|e| e.package.to_lowercase());
        self.save().await
    }

    pub fn counts(&self) -> QueueCounts {
        let mut c = QueueCounts {
            total: self.entries.len(),
            ..QueueCounts::default()
        };
        for e in &self.entries {
            match e.status {
                QueueStatus::Ready => c.ready += 1,
                QueueStatus::Sending => c.sending += 1,
                QueueStatus::Sent => c.sent += 1,
                QueueStatus::Error => c.error += 1,
            }
        }
        c
    }

    pub fn ready(&self) -> Vec<&QueueEntry> {
        self.entries
            .iter()
            .filter(|e| e.status == QueueStatus::Ready)
            .collect()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// The unsent translation queued for a description, if any.
    pub fn pending_for(&self, md5: &str) -> Option<&QueueEntry> {
        self.entries
            .iter()
            .find(|e| e.md5 == md5 && e.status != QueueStatus::Sent)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Full id of the single entry whose id starts with `prefix`.
    pub fn resolve_id(&self, prefix: &str) -> Result<String, QueueError> {
        let mut matches = self.entries.iter().filter(|e| e.id.starts_with(prefix));
        match (matches.next(), matches.next()) {
            (Some(e), None) if !prefix.is_empty() => Ok(e.id.clone()),
            _ => Err(QueueError::NotFound { id: prefix.to_string() }),
        }
    }

    /// Update one entry's status and persist.
    pub async fn set_status(
        &mut self,
        id: &str,
        status: QueueStatus,
        error: Option<String>,
    ) -> Result<(), QueueError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| QueueError::NotFound { id: id.to_string() })?;
        entry.set_status(status, error);
        self.save().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(package: &str, md5: &str) -> Submission {
        Submission {
            package: package.into(),
            md5: md5.into(),
            lang: "sv".into(),
            short: format!("{package} kort"),
            long: format!("{package} lång"),
            comment: String::new(),
        }
    }

    #[tokio::test]
    async fn missing_file_is_empty_queue() {
        let dir = tempfile::tempdir().unwrap();
        let q = SendQueue::load(dir.path().join("queue.json")).await.unwrap();
        assert!(q.is_empty());
        assert_eq!(q.counts(), QueueCounts::default());
    }

    #[tokio::test]
    async fn add_persists_and_replaces_same_description() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("queue.json");
        let mut q = SendQueue::load(&path).await.unwrap();

        let first = q.add(sub("vim", "aaa")).await.unwrap();
        q.set_status(&first, QueueStatus::Error, Some("boom".into()))
            .await
            .unwrap();

        let mut again = sub("vim", "aaa");
        again.short = "ny text".into();
        let second = q.add(again).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(q.entries().len(), 1);
        assert_eq!(q.entries()[0].short, "ny text");
        assert_eq!(q.entries()[0].status, QueueStatus::Ready);
        assert!(q.entries()[0].error.is_none());

        q.add(sub("vim", "bbb")).await.unwrap();
        assert_eq!(q.entries().len(), 2);

        let reloaded = SendQueue::load(&path).await.unwrap();
        assert_eq!(reloaded.entries(), q.entries());
    }

    #[tokio::test]
    async fn sending_entries_reset_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        let mut q = SendQueue::load(&path).await.unwrap();
        let id = q.add(sub("curl", "c")).await.unwrap();
        q.set_status(&id, QueueStatus::Sending, None).await.unwrap();

        let reloaded = SendQueue::load(&path).await.unwrap();
        assert_eq!(reloaded.get(&id).unwrap().status, QueueStatus::Ready);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("\"sending\""));
    }

    #[tokio::test]
    async fn clear_variants() {
        let dir = tempfile::tempdir().unwrap();
        let mut q = SendQueue::load(dir.path().join("queue.json")).await.unwrap();
        let a = q.add(sub("a", "1")).await.unwrap();
        let b = q.add(sub("b", "2")).await.unwrap();
        let c = q.add(sub("c", "3")).await.unwrap();
        q.set_status(&a, QueueStatus::Sent, None).await.unwrap();
        q.set_status(&b, QueueStatus::Sending, None).await.unwrap();

        assert_eq!(q.clear_sent().await.unwrap(), 1);
        assert!(q.get(&a).is_none());

        assert_eq!(q.clear().await.unwrap(), 1);
        assert!(q.get(&c).is_none());
        assert_eq!(q.entries().len(), 1);
        assert_eq!(q.entries()[0].id, b);
    }

    #[tokio::test]
    async fn remove_sort_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut q = SendQueue::load(dir.path().join("queue.json")).await.unwrap();
        q.add(sub("zsh", "1")).await.unwrap();
        let bash = q.add(sub("Bash", "2")).await.unwrap();
        q.add(sub("curl", "3")).await.unwrap();

        q.sort().await.unwrap();
        let names: Vec<_> = q.entries().iter().map(|e| e.package.as_str()).collect();
        assert_eq!(names, ["Bash", "curl", "zsh"]);

        q.set_status(&bash, QueueStatus::Error, Some("x".into()))
            .await
            .unwrap();
        let c = q.counts();
        assert_eq!((c.total, c.ready, c.error), (3, 2, 1));
        assert_eq!(q.ready().len(), 2);

        assert_eq!(q.retry_failed().await.unwrap(), 1);
        assert_eq!(q.counts().ready, 3);

        let removed = q.remove(&bash).await.unwrap();
        assert_eq!(removed.package, "Bash");
        assert!(matches!(
            q.remove(&bash).await,
            Err(QueueError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn resolve_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let mut q = SendQueue::load(dir.path().join("queue.json")).await.unwrap();
        let id = q.add(sub("vim", "1")).await.unwrap();
        assert_eq!(q.resolve_id(&id[..8]).unwrap(), id);
        assert!(q.resolve_id("").is_err());
        assert!(q.resolve_id("not-an-id").is_err());
    }

    #[test]
    fn short_ids_never_split_past_the_end() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id(""), "");
        assert_eq!(short_id("åäöåäö"), "åäöå");
    }

    #[tokio::test]
    async fn hand_edited_short_ids_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(
            &path,
            r#"[{"id":"x1","package":"vim","md5":"m","short":"s","long":"","status":"ready",
                "added_at":"2026-01-01T00:00:00Z","updated_at":"2026-01-01T00:00:00Z"}]"#,
        )
        .unwrap();
        let q = SendQueue::load(&path).await.unwrap();
        assert_eq!(q.entries()[0].short_id(), "x1");
        assert_eq!(q.resolve_id("x1").unwrap(), "x1");
    }

    #[tokio::test]
    async fn pending_translation_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let mut q = SendQueue::load(dir.path().join("queue.json")).await.unwrap();
        let vim = q.add(sub("vim", "aaa")).await.unwrap();
        let mut short_only = sub("true", "bbb");
        short_only.long.clear();
        q.add(short_only).await.unwrap();

        assert_eq!(
            q.pending_for("aaa").unwrap().translation_text(),
            "vim kort\nvim lång"
        );
        assert_eq!(q.pending_for("bbb").unwrap().translation_text(), "true kort");
        assert!(q.pending_for("ccc").is_none());

        q.set_status(&vim, QueueStatus::Sent, None).await.unwrap();
        assert!(q.pending_for("aaa").is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            SendQueue::load(&path).await,
            Err(QueueError::Corrupt { .. })
        ));
    }
}
