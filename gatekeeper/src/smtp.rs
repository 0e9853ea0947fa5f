use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use gatekeeper_core::{ClientError, Email, Mailer};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::warn;

use crate::config::SmtpConfig;

/// Sends HTML mail through an SMTP relay using STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig, timeout: Duration) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .with_context(|| format!("SMTP_FROM is not a valid address: {}", config.from))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .with_context(|| format!("Failed to configure SMTP relay {}", config.host))?
            .port(config.port)
            .timeout(Some(timeout));
        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

/// Build the MIME message. Recipients that are not valid addresses are dropped.
pub fn build_message(from: &Mailbox, email: &Email) -> Result<Message, ClientError> {
    let mut builder = Message::builder()
        .from(from.clone())
        .subject(email.subject.clone())
        .header(ContentType::TEXT_HTML);

    let mut recipients = 0;
    for recipient in &email.recipients {
        match recipient.parse::<Mailbox>() {
            Ok(mailbox) => {
                builder = builder.to(mailbox);
                recipients += 1;
            }
            Err(e) => warn!("Dropping invalid recipient {}: {}", recipient, e),
        }
    }
    if recipients == 0 {
        return Err(ClientError::Rejected {
            status: 553,
            message: "no valid recipients".to_string(),
        });
    }

    builder
        .body(email.html_body.clone())
        .map_err(|e| ClientError::Rejected {
            status: 554,
            message: e.to_string(),
        })
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<(), ClientError> {
        let message = build_message(&self.from, email)?;
        self.transport.send(message).await.map_err(|e| {
            match e.status() {
                Some(code) => ClientError::Rejected {
                    status: code.to_string().parse().unwrap_or(0),
                    message: e.to_string(),
                },
                None => ClientError::connection(e.to_string()),
            }
        })?;
        Ok(())
    }
}
