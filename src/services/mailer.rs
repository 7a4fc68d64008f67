//! SMTP email dispatch

use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;
use tracing::warn;

use crate::config::SmtpSettings;
use crate::constants::{MAIL_RETRY_DELAY, MAIL_SEND_ATTEMPTS, SMTP_TIMEOUT};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid address {address:?}: {source}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("Failed to build email: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Mail handle shared through the application state.
///
/// Building it performs no network I/O; the SMTP connection is made on the
/// first send.
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl Mailer {
    pub fn new(settings: &SmtpSettings) -> Result<Self, MailError> {
        let sender = parse_mailbox(&settings.sender)?;
        let tls = TlsParameters::new(settings.host.clone())?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
            .port(settings.port)
            .tls(Tls::Opportunistic(tls))
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Self { transport, sender })
    }

    pub const fn sender(&self) -> &Mailbox {
        &self.sender
    }

    /// Builds a plain-text message from the configured sender.
    pub fn build_message(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<Message, MailError> {
        let message = Message::builder()
            .from(self.sender.clone())
            .to(parse_mailbox(recipient)?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_owned())?;
        Ok(message)
    }

    /// Sends an email, retrying transient SMTP failures.
    #[allow(dead_code)]
    pub async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let message = self.build_message(recipient, subject, body)?;

        let mut attempt = 1;
        loop {
            match self.transport.send(message.clone()).await {
                Ok(_) => return Ok(()),
                Err(e) if attempt < MAIL_SEND_ATTEMPTS && !e.is_permanent() => {
                    warn!(attempt, error = %e, "SMTP send failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(MAIL_RETRY_DELAY).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|source| MailError::Address {
        address: address.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smtp_settings(sender: &str) -> SmtpSettings {
        SmtpSettings {
            host: "smtp.mailtrap.io".to_string(),
            port: 2525,
            username: "user".to_string(),
            password: "pass".to_string(),
            sender: sender.to_string(),
        }
    }

    #[test]
    fn test_new_parses_sender() {
        let mailer = Mailer::new(&smtp_settings("Greenlight <no-reply@greenlight.local>")).unwrap();
        assert_eq!(mailer.sender().email.to_string(), "no-reply@greenlight.local");
        assert_eq!(mailer.sender().name.as_deref(), Some("Greenlight"));
    }

    #[test]
    fn test_new_rejects_bad_sender() {
        let err = Mailer::new(&smtp_settings("not an address")).err().unwrap();
        assert!(matches!(err, MailError::Address { .. }));
        assert!(err.to_string().contains("not an address"));
    }

    #[test]
    fn test_build_message() {
        let mailer = Mailer::new(&smtp_settings("Greenlight <no-reply@greenlight.local>")).unwrap();
        let message = mailer
            .build_message("alice@example.com", "Welcome", "Thanks for signing up.")
            .unwrap();

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: alice@example.com"));
        assert!(raw.contains("Subject: Welcome"));
        assert!(raw.contains("Thanks for signing up."));
    }

    #[test]
    fn test_build_message_rejects_bad_recipient() {
        let mailer = Mailer::new(&smtp_settings("no-reply@greenlight.local")).unwrap();
        let err = mailer.build_message("alice", "Welcome", "body").unwrap_err();
        assert!(matches!(err, MailError::Address { ref address, .. } if address == "alice"));
    }

    #[tokio::test]
    async fn test_send_gives_up_after_retries() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut settings = smtp_settings("no-reply@greenlight.local");
        settings.host = "127.0.0.1".to_string();
        settings.port = port;
        let mailer = Mailer::new(&settings).unwrap();

        let started = std::time::Instant::now();
        let err = mailer
            .send("alice@example.com", "Welcome", "body")
            .await
            .unwrap_err();

        assert!(matches!(err, MailError::Smtp(_)));
        assert!(started.elapsed() >= MAIL_RETRY_DELAY * (MAIL_SEND_ATTEMPTS - 1));
    }
}
