//! SMTP email delivery
//!
//! Transport selection follows the configured port: SSL-on-connect for
//! 465, STARTTLS upgrade for other TLS ports, plaintext when TLS is off.
//! One SMTP session per send; no pooling. SMTP 4xx responses and
//! connect/auth failures are transient, 5xx responses are permanent.

use crate::config::SmtpConfig;
use crate::deliver::{DeliveryOutcome, DeliveryProvider};
use crate::types::Subscription;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// SMTP delivery provider
pub struct EmailProvider {
    config: SmtpConfig,
}

impl EmailProvider {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Build a fresh transport for one send
    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, String> {
        let host = &self.config.host;

        let mut builder = if self.config.use_ssl && self.config.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| format!("SMTPS setup for {}: {}", host, e))?
        } else if self.config.use_ssl {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| format!("STARTTLS setup for {}: {}", host, e))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };

        builder = builder.port(self.config.port);

        if !self.config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ));
        }

        Ok(builder.build())
    }

    /// Assemble the RFC 5322 message
    ///
    /// lettre fills in `Date` and `Message-ID` at build time. The rendered
    /// content-type line is applied verbatim so multipart bodies keep
    /// their boundary.
    fn build_message(
        to: &str,
        subject: &str,
        body: &str,
        content_type: &str,
        sender: &str,
    ) -> Result<Message, String> {
        let from = sender
            .parse()
            .map_err(|e| format!("invalid sender address '{}': {}", sender, e))?;
        let to = to
            .parse()
            .map_err(|e| format!("invalid recipient address '{}': {}", to, e))?;
        let content_type = ContentType::parse(content_type)
            .map_err(|e| format!("invalid content type '{}': {}", content_type, e))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(content_type)
            .body(body.to_string())
            .map_err(|e| format!("message assembly: {}", e))
    }
}

#[async_trait]
impl DeliveryProvider for EmailProvider {
    async fn send(
        &self,
        subscription: &Subscription,
        subject: &str,
        body: &str,
        content_type: &str,
        sender: &str,
    ) -> DeliveryOutcome {
        let to = subscription.destination();
        if to.is_empty() {
            return DeliveryOutcome::PermanentFailure(
                "subscription has no email address".to_string(),
            );
        }

        // Malformed addresses or content types will not improve on retry
        let message = match Self::build_message(to, subject, body, content_type, sender) {
            Ok(message) => message,
            Err(reason) => return DeliveryOutcome::PermanentFailure(reason),
        };

        let transport = match self.transport() {
            Ok(transport) => transport,
            Err(reason) => return DeliveryOutcome::TransientFailure(reason),
        };

        match transport.send(message).await {
            Ok(_) => DeliveryOutcome::Delivered,
            Err(e) if e.is_permanent() => {
                DeliveryOutcome::PermanentFailure(format!("SMTP rejected: {}", e))
            }
            // 4xx, connection, DNS, and auth failures all retry later
            Err(e) => DeliveryOutcome::TransientFailure(format!("SMTP failure: {}", e)),
        }
    }

    fn name(&self) -> &str {
        "email"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(port: u16, use_ssl: bool) -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".to_string(),
            port,
            username: "mailer".to_string(),
            password: "secret".to_string(),
            use_ssl,
            default_sender: "herald@example.com".to_string(),
        }
    }

    #[test]
    fn test_transport_builds_for_each_mode() {
        // SSL-on-connect, STARTTLS, and plaintext must all construct
        assert!(EmailProvider::new(config(465, true)).transport().is_ok());
        assert!(EmailProvider::new(config(587, true)).transport().is_ok());
        assert!(EmailProvider::new(config(25, false)).transport().is_ok());
    }

    #[test]
    fn test_build_message_plain() {
        let message = EmailProvider::build_message(
            "a@example.com",
            "Subject",
            "hello",
            "text/plain; charset=utf-8",
            "herald@example.com",
        )
        .unwrap();

        let bytes = message.formatted();
        let raw = String::from_utf8_lossy(&bytes);
        assert!(raw.contains("From: herald@example.com"));
        assert!(raw.contains("To: a@example.com"));
        assert!(raw.contains("Subject: Subject"));
        assert!(raw.contains("Date: "));
        assert!(raw.contains("hello"));
    }

    #[test]
    fn test_build_message_preserves_multipart_boundary() {
        let boundary = "=_herald_abc123";
        let body = format!(
            "--{b}\r\nContent-Type: text/plain\r\n\r\nsummary\r\n--{b}--\r\n",
            b = boundary
        );
        let message = EmailProvider::build_message(
            "a@example.com",
            "Digest",
            &body,
            &format!("multipart/mixed; boundary=\"{}\"", boundary),
            "herald@example.com",
        )
        .unwrap();

        let bytes = message.formatted();
        let raw = String::from_utf8_lossy(&bytes);
        assert!(raw.contains(&format!("boundary=\"{}\"", boundary)));
        assert!(raw.contains(&format!("--{}--", boundary)));
    }

    #[test]
    fn test_build_message_rejects_bad_addresses() {
        assert!(EmailProvider::build_message(
            "not an address",
            "S",
            "b",
            "text/plain; charset=utf-8",
            "herald@example.com",
        )
        .is_err());

        assert!(EmailProvider::build_message(
            "a@example.com",
            "S",
            "b",
            "text/plain; charset=utf-8",
            "not an address",
        )
        .is_err());
    }
}
