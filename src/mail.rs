use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::SmtpConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(String),
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("smtp: {0}")]
    Transport(String),
}

/// Outgoing email. Bodies are HTML.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), MailError>;
}

/// SMTP sender; without a configured host it only logs what would be sent.
pub struct SmtpMailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> Result<Self, MailError> {
        let from = cfg
            .from
            .parse::<Mailbox>()
            .map_err(|e| MailError::Address(format!("SMTP_FROM: {e}")))?;

        let transport = if cfg.host.trim().is_empty() {
            warn!("SMTP_HOST not set; mail will be logged, not sent");
            None
        } else {
            let builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
                .map_err(|e| MailError::Transport(e.to_string()))?
                .port(cfg.port);
            let builder = match (&cfg.username, &cfg.password) {
                (Some(user), Some(pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
                _ => builder,
            };
            Some(builder.build())
        };
        Ok(Self { transport, from })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), MailError> {
        let Some(transport) = &self.transport else {
            info!(subject, recipient = to, "mailer in log-only mode; skipping send");
            return Ok(());
        };
        let recipient = to
            .parse::<Mailbox>()
            .map_err(|e| MailError::Address(e.to_string()))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(subject)
            .header(header::ContentType::TEXT_HTML)
            .body(html.to_string())
            .map_err(|e| MailError::Build(e.to_string()))?;
        transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        info!(subject, "email sent");
        Ok(())
    }
}

pub fn build_mailer(cfg: &SmtpConfig) -> Result<Arc<dyn Mailer>, MailError> {
    Ok(Arc::new(SmtpMailer::new(cfg)?))
}

pub mod templates {
    //! Subjects and bodies of the account emails.

    fn code_body(heading: &str, lead: &str, code: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<body style="font-family: sans-serif; color: #333;">
    <h2>{heading}</h2>
    <p>{lead}</p>
    <p style="font-size: 24px; font-weight: bold; letter-spacing: 4px;">{code}</p>
    <p style="color: #999; font-size: 12px;">The code expires in 10 minutes. If you did not request it, ignore this email.</p>
</body>
</html>"#
        )
    }

    pub fn email_verification(code: &str) -> (&'static str, String) {
        (
            "BlogPoint email verification",
            code_body("Confirm your email", "Enter this code to verify your BlogPoint account:", code),
        )
    }

    pub fn account_deletion(code: &str) -> (&'static str, String) {
        (
            "BlogPoint account deletion",
            code_body("Confirm account deletion", "Enter this code to permanently delete your account:", code),
        )
    }

    pub fn password_reset(link: &str) -> (&'static str, String) {
        (
            "BlogPoint password reset",
            format!(
                r#"<!DOCTYPE html>
<html>
<body style="font-family: sans-serif; color: #333;">
    <h2>Password reset</h2>
    <p>Follow the link below to choose a new password:</p>
    <p><a href="{link}">{link}</a></p>
    <p style="color: #999; font-size: 12px;">The link expires in 10 minutes. If you did not request it, ignore this email.</p>
</body>
</html>"#
            ),
        )
    }

}
