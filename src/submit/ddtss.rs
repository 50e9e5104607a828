use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::{info, warn};

use super::{Submission, Submitter};
use crate::ddtss::DdtssClient;
use crate::error::{DdtssError, SubmitError};

/// Submits through a logged-in DDTSS session, to the language team named
/// in each submission.
///
/// A submission rejected with "You must be logged in" is retried exactly
/// once after a fresh login.
pub struct DdtssSubmitter {
    client: Arc<DdtssClient>,
    alias: String,
    password: SecretString,
}

impl DdtssSubmitter {
    pub fn new(client: Arc<DdtssClient>, alias: impl Into<String>, password: SecretString) -> Self {
        Self {
            client,
            alias: alias.into(),
            password,
        }
    }

    async fn post(&self, s: &Submission) -> Result<(), DdtssError> {
        self.client
            .submit_translation(&s.lang, &s.package, &s.short, &s.long, &s.comment)
            .await
    }
}

#[async_trait]
impl Submitter for DdtssSubmitter {
    fn name(&self) -> &str {
        "ddtss"
    }

    async fn submit(&self, submission: &Submission) -> Result<(), SubmitError> {
        self.client.ensure_session(&self.alias, &self.password).await?;
        match self.post(submission).await {
            Err(e) if e.is_auth() => {
                warn!(package = %submission.package, error = %e, "Session rejected, logging in again");
                self.client.invalidate_session().await;
                self.client.login(&self.alias, &self.password).await?;
                self.post(submission).await?;
            }
            other => other?,
        }
        info!(package = %submission.package, lang = %submission.lang, "Submitted via DDTSS");
        Ok(())
    }
}
