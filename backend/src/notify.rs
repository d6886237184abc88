//! E-mail notifications for new submissions.
//!
//! The team inbox gets every submission; the submitter optionally gets a short
//! confirmation. Delivery problems are reported to the caller, which logs
//! them and carries on.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;

use crate::config::SmtpConfig;
use crate::crypto::integrity::short_id;
use crate::store::Submission;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to send email: {0}")]
    SendFailed(String),
    #[error("invalid mail configuration: {0}")]
    InvalidConfig(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn submission_received(&self, submission: &Submission) -> Result<(), NotifyError>;
}

/// Subject and bodies of one e-mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent {
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl EmailContent {
    /// Message for the team inbox.
    pub fn notification(submission: &Submission) -> Self {
        let subject = format!(
            "New contact request [{}] from {}",
            short_id(&submission.id),
            submission.company
        );

        let mut fields = vec![
            ("Name", submission.name.clone()),
            ("Company", submission.company.clone()),
            ("Email", submission.email.clone()),
            ("Interests", submission.interests.join(", ")),
        ];
        for (label, value) in [
            ("Other interest", &submission.interest_other),
            ("Website", &submission.website),
            ("Budget", &submission.budget),
            ("Deadline", &submission.deadline),
        ] {
            if !value.is_empty() {
                fields.push((label, value.clone()));
            }
        }
        fields.push(("Received", submission.created_at.to_rfc3339()));

        let mut text = String::new();
        let mut html = String::from("<table>");
        for (label, value) in &fields {
            text.push_str(&format!("{label}: {value}\n"));
            html.push_str(&format!(
                "<tr><th align=\"left\">{label}</th><td>{}</td></tr>",
                escape_html(value)
            ));
        }
        html.push_str("</table>");

        text.push_str(&format!("\n{}\n", submission.message));
        html.push_str(&format!(
            "<p style=\"white-space: pre-wrap\">{}</p>",
            escape_html(&submission.message)
        ));

        Self { subject, text, html }
    }

    /// Acknowledgement for the person who filled in the form.
    pub fn confirmation(submission: &Submission) -> Self {
        let greeting = if submission.name.is_empty() {
            "Hello".to_string()
        } else {
            format!("Hello {}", submission.name)
        };
        let text = format!(
            "{greeting},\n\nthank you for getting in touch. We received your message and will get back to you soon.\n\nReference: {}\n",
            short_id(&submission.id)
        );
        let html = format!(
            "<p>{},</p><p>thank you for getting in touch. We received your message and will get back to you soon.</p><p>Reference: {}</p>",
            escape_html(&greeting),
            short_id(&submission.id)
        );

        Self {
            subject: "We received your message".to_string(),
            text,
            html,
        }
    }
}

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    notify: Mailbox,
    send_confirmation: bool,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let mut builder = if config.use_tls {
            let tls_params = TlsParameters::new(config.host.clone())
                .map_err(|e| NotifyError::InvalidConfig(format!("TLS configuration error: {e}")))?;

            // 465 is implicit TLS, everything else negotiates STARTTLS
            if config.port == 465 {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                    .map_err(|e| NotifyError::InvalidConfig(format!("SMTP relay error: {e}")))?
                    .port(config.port)
                    .tls(Tls::Wrapper(tls_params))
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                    .map_err(|e| NotifyError::InvalidConfig(format!("SMTP relay error: {e}")))?
                    .port(config.port)
                    .tls(Tls::Required(tls_params))
            }
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host).port(config.port)
        };

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: parse_mailbox(&config.from_address)?,
            notify: parse_mailbox(&config.notify_address)?,
            send_confirmation: config.send_confirmation,
        })
    }

    async fn send(&self, to: Mailbox, reply_to: Option<Mailbox>, content: EmailContent) -> Result<(), NotifyError> {
        let mut builder = Message::builder().from(self.from.clone()).to(to);
        if let Some(reply_to) = reply_to {
            builder = builder.reply_to(reply_to);
        }

        let message = builder
            .subject(content.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(content.text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(content.html),
                    ),
            )
            .map_err(|e| NotifyError::SendFailed(format!("failed to build email: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::SendFailed(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn submission_received(&self, submission: &Submission) -> Result<(), NotifyError> {
        // A malformed submitter address only loses the reply-to header.
        let submitter = submission.email.parse::<Mailbox>().ok();

        self.send(
            self.notify.clone(),
            submitter.clone(),
            EmailContent::notification(submission),
        )
        .await?;

        if self.send_confirmation {
            if let Some(submitter) = submitter {
                self.send(submitter, None, EmailContent::confirmation(submission))
                    .await?;
            }
        }
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address
        .parse()
        .map_err(|e| NotifyError::InvalidConfig(format!("invalid address {address:?}: {e}")))
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
