//! Legacy submission by email to the DDTP gateway.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::info;

use super::{Submission, Submitter};
use crate::config::SmtpSettings;
use crate::error::SubmitError;

/// Address of the DDTP email gateway.
pub const DDTP_EMAIL: &str = "pdesc@ddtp.debian.org";

/// SMTP connect and command timeout.
pub const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Body in the DDTP mail format.
///
/// Long description lines are indented by one space and blank lines become
/// ` .`.
pub fn translation_email_body(s: &Submission) -> String {
    let mut lines = vec![
        format!("Package: {}", s.package),
        format!("Description-md5: {}", s.md5),
        format!("Description-{}: {}", s.lang, s.short),
    ];
    for line in s.long.lines() {
        if line.trim().is_empty() {
            lines.push(" .".to_string());
        } else {
            lines.push(format!(" {line}"));
        }
    }
    let mut body = lines.join("\n");
    body.push('\n');
    body
}

pub fn translation_email_subject(s: &Submission) -> String {
    format!("[DDTP] {} {}", s.package, s.md5)
}

pub fn build_translation_email(s: &Submission, smtp: &SmtpSettings) -> Result<Message, SubmitError> {
    if smtp.from_email.is_empty() {
        return Err(SubmitError::NotConfigured("sender address (from_email) is empty".into()));
    }
    let from = if smtp.from_name.is_empty() {
        smtp.from_email.clone()
    } else {
        format!("{} <{}>", smtp.from_name, smtp.from_email)
    };

    Message::builder()
        .from(
            from.parse()
                .map_err(|e| SubmitError::BuildEmail(format!("Invalid from address: {e}")))?,
        )
        .to(DDTP_EMAIL
            .parse()
            .map_err(|e| SubmitError::BuildEmail(format!("Invalid to address: {e}")))?)
        .subject(translation_email_subject(s))
        .header(ContentType::TEXT_PLAIN)
        .body(translation_email_body(s))
        .map_err(|e| SubmitError::BuildEmail(e.to_string()))
}

/// Sends translations as mail over SMTP.
pub struct EmailSubmitter {
    smtp: SmtpSettings,
}

impl EmailSubmitter {
    pub fn new(smtp: SmtpSettings) -> Self {
        Self { smtp }
    }

    /// Implicit TLS when `use_tls`, otherwise plain with opportunistic STARTTLS.
    fn transport(&self) -> Result<SmtpTransport, SubmitError> {
        let host = self.smtp.host.as_str();
        if host.is_empty() {
            return Err(SubmitError::NotConfigured("SMTP server not configured".into()));
        }

        let base = if self.smtp.use_tls {
            SmtpTransport::relay(host)
                .map_err(|e| SubmitError::Smtp(format!("SMTP relay error: {e}")))?
        } else {
            let params = TlsParameters::new(host.to_string())
                .map_err(|e| SubmitError::Smtp(format!("TLS setup failed: {e}")))?;
            SmtpTransport::builder_dangerous(host).tls(Tls::Opportunistic(params))
        };
        let mut builder = base.port(self.smtp.port).timeout(Some(SMTP_TIMEOUT));

        if let Some(password) = self.smtp.password()
            && !self.smtp.username.is_empty()
            && !password.expose_secret().is_empty()
        {
            builder = builder.credentials(Credentials::new(
                self.smtp.username.clone(),
                password.expose_secret().to_string(),
            ));
        }
        Ok(builder.build())
    }
}

#[async_trait]
impl Submitter for EmailSubmitter {
    fn name(&self) -> &str {
        "email"
    }

    async fn submit(&self, submission: &Submission) -> Result<(), SubmitError> {
        let email = build_translation_email(submission, &self.smtp)?;
        let transport = self.transport()?;

        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| SubmitError::Smtp(format!("SMTP task failed: {e}")))?
            .map_err(|e| SubmitError::Smtp(e.to_string()))?;

        info!(package = %submission.package, to = DDTP_EMAIL, "Translation emailed");
        Ok(())
    }
}
