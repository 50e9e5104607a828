//! Submission channels: the DDTSS web interface and the legacy DDTP email
//! gateway.

pub mod ddtss;
pub mod email;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SubmitError;

pub use ddtss::DdtssSubmitter;
pub use email::{DDTP_EMAIL, EmailSubmitter, build_translation_email, translation_email_body};

/// One translated description ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub package: String,
    pub md5: String,
    pub lang: String,
    pub short: String,
    pub long: String,
    #[serde(default)]
    pub comment: String,
}

/// Something that can deliver a translation upstream.
#[async_trait]
pub trait Submitter: Send + Sync {
    /// Channel name for logs ("ddtss", "email").
    fn name(&self) -> &str;

    async fn submit(&self, submission: &Submission) -> Result<(), SubmitError>;
}
