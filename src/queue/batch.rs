//! Sequential, rate-limited, cancellable batch submission.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::{QueueStatus, SendQueue};
use crate::ddtss::{DdtssClient, ReviewDecision};
use crate::error::{DdtssError, QueueError};
use crate::submit::Submitter;

/// Granularity of cancellation checks while waiting between sends.
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Outcome of one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Progress notifications emitted while a batch runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    Started { total: usize },
    ItemStarted { index: usize, total: usize, package: String },
    ItemSent { package: String },
    ItemFailed { package: String, error: String },
    Cancelled { remaining: usize },
    Finished(BatchReport),
}

/// Sends the ready part of a queue one entry at a time.
pub struct BatchSender {
    delay: Duration,
    events: Option<mpsc::UnboundedSender<BatchEvent>>,
}

impl BatchSender {
    pub fn new(delay: Duration) -> Self {
        Self { delay, events: None }
    }

    pub fn with_progress(mut self, events: mpsc::UnboundedSender<BatchEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: BatchEvent) {
        if let Some(tx) = &self.events {
            // Receiver gone just means nobody is watching.
            let _ = tx.send(event);
        }
    }

    /// Submit every entry that is `ready` when the call starts.
    ///
    /// Failures are recorded on the entry and the batch moves on. The queue
    /// is persisted after each item. `cancel` is checked before each item and
    /// during the pause between items.
    pub async fn send(
        &self,
        queue: &mut SendQueue,
        submitter: &dyn Submitter,
        cancel: &Arc<AtomicBool>,
    ) -> Result<BatchReport, QueueError> {
        let ids: Vec<String> = queue.ready().iter().map(|e| e.id.clone()).collect();
        let mut report = BatchReport {
            total: ids.len(),
            ..BatchReport::default()
        };
        info!(total = report.total, channel = submitter.name(), "Batch send started");
        self.emit(BatchEvent::Started { total: report.total });

        for (index, id) in ids.iter().enumerate() {
            if index > 0 && !sleep_unless_cancelled(self.delay, cancel).await {
                self.cancelled(&mut report, ids.len() - index);
                break;
            }
            if cancel.load(Ordering::Relaxed) {
                self.cancelled(&mut report, ids.len() - index);
                break;
            }

            let Some(entry) = queue.get(id) else {
                continue;
            };
            let submission = entry.to_submission();
            self.emit(BatchEvent::ItemStarted {
                index: index + 1,
                total: report.total,
                package: submission.package.clone(),
            });

            queue.set_status(id, QueueStatus::Sending, None).await?;
            match submitter.submit(&submission).await {
                Ok(()) => {
                    queue.set_status(id, QueueStatus::Sent, None).await?;
                    report.sent += 1;
                    self.emit(BatchEvent::ItemSent {
                        package: submission.package,
                    });
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!(package = %submission.package, error = %message, "Submission failed");
                    queue
                        .set_status(id, QueueStatus::Error, Some(message.clone()))
                        .await?;
                    report.failed += 1;
                    self.emit(BatchEvent::ItemFailed {
                        package: submission.package,
                        error: message,
                    });
                }
            }
        }

        info!(
            sent = report.sent,
            failed = report.failed,
            cancelled = report.cancelled,
            "Batch send finished"
        );
        self.emit(BatchEvent::Finished(report));
        Ok(report)
    }

    fn cancelled(&self, report: &mut BatchReport, remaining: usize) {
        report.cancelled = true;
        info!(remaining, "Batch send cancelled");
        self.emit(BatchEvent::Cancelled { remaining });
    }
}

/// Sleep for `delay`, waking early if `cancel` is set. Returns false when
/// cancelled.
async fn sleep_unless_cancelled(delay: Duration, cancel: &AtomicBool) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        tokio::time::sleep((deadline - now).min(CANCEL_POLL)).await;
    }
}

/// Outcome of accepting the pending reviews in bulk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReviewReport {
    pub accepted: usize,
    pub failed: Vec<(String, String)>,
    pub skipped: usize,
    pub cancelled: bool,
}

/// Accept as-is every pending review not already reviewed by this user.
pub async fn accept_all_reviews(
    client: &DdtssClient,
    comment: &str,
    delay: Duration,
    cancel: &Arc<AtomicBool>,
) -> Result<ReviewReport, DdtssError> {
    let items = client.pending_reviews().await?;
    let mut report = ReviewReport::default();

    let mut first = true;
    for item in items {
        if item.reviewed_by_you {
            report.skipped += 1;
            continue;
        }
        let waited = first || sleep_unless_cancelled(delay, cancel).await;
        if !waited || cancel.load(Ordering::Relaxed) {
            report.cancelled = true;
            break;
        }
        first = false;

        match client
            .submit_review(&item.package, &ReviewDecision::AcceptAsIs, comment)
            .await
        {
            Ok(()) => report.accepted += 1,
            Err(e) if e.is_auth() => return Err(e),
            Err(e) => {
                error!(package = %item.package, error = %e, "Review failed");
                report.failed.push((item.package, e.to_string()));
            }
        }
    }

    info!(
        accepted = report.accepted,
        failed = report.failed.len(),
        skipped = report.skipped,
        "Bulk review finished"
    );
    Ok(report)
}
