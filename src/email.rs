//! Outgoing email notifications.
//!
//! Sends HTML emails via SMTP. Without SMTP configuration, emails are only
//! logged.
//!
//! The collection registry only sends [`EmailKind::Update`]. The account
//! kinds (`Invite`, `PasswordReset`, `Welcome`) and their templates are part
//! of the [`Notifier`] surface for an account service built on this crate;
//! nothing in the crate sends them itself.

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;

use crate::config::SmtpConfig;

/// Email configuration.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// SMTP server hostname.
    pub smtp_host: String,
    /// SMTP server port.
    pub smtp_port: u16,
    /// SMTP username (optional for local testing).
    pub smtp_user: Option<String>,
    /// SMTP password (optional for local testing).
    pub smtp_pass: Option<String>,
    /// From email address.
    pub from_email: String,
    /// From display name.
    pub from_name: String,
    /// Base URL for links in invite and reset emails.
    pub app_url: String,
}

impl EmailConfig {
    pub fn from_smtp(smtp: &SmtpConfig, app_url: &str) -> Self {
        Self {
            smtp_host: smtp.host.clone(),
            smtp_port: smtp.port,
            smtp_user: smtp.user.clone(),
            smtp_pass: smtp.pass.clone(),
            from_email: smtp.from_email.clone(),
            from_name: smtp.from_name.clone(),
            app_url: app_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// Error building the email message.
    #[error("Failed to build email: {0}")]
    MessageError(String),
    /// Error sending the email.
    #[error("Failed to send email: {0}")]
    TransportError(String),
    /// A parameter the template needs is missing.
    #[error("Missing email parameter: {0}")]
    MissingParam(&'static str),
}

/// What an email is about. Each kind has its own subject and template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    Invite,
    PasswordReset,
    Welcome,
    Update,
}

impl EmailKind {
    pub fn subject(&self) -> &'static str {
        match self {
            EmailKind::Invite => "Invitation to register",
            EmailKind::PasswordReset => "Reset password",
            EmailKind::Welcome => "Welcome to Modulux",
            EmailKind::Update => "Update notification",
        }
    }
}

/// Template parameters. Each kind reads the ones it needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailParams {
    pub inviter_name: Option<String>,
    pub invite_token: Option<String>,
    pub reset_token: Option<String>,
    pub new_user_name: Option<String>,
    /// Summary line for update notifications.
    pub update_summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub kind: EmailKind,
    pub recipient: String,
    pub params: EmailParams,
}

impl OutboundEmail {
    /// Schema change notification for one recipient.
    pub fn update(recipient: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            kind: EmailKind::Update,
            recipient: recipient.into(),
            params: EmailParams {
                update_summary: Some(summary.into()),
                ..Default::default()
            },
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_email(&self, email: OutboundEmail) -> Result<(), EmailError>;
}

/// Renders the HTML body of an email.
pub fn render_body(email: &OutboundEmail, app_url: &str) -> Result<String, EmailError> {
    let params = &email.params;
    let content = match email.kind {
        EmailKind::Invite => {
            let token = params
                .invite_token
                .as_deref()
                .ok_or(EmailError::MissingParam("invite_token"))?;
            let inviter = params
                .inviter_name
                .as_deref()
                .ok_or(EmailError::MissingParam("inviter_name"))?;
            format!(
                r#"<h1>Hello from Modulux!</h1>
      <p>You have been invited by {inviter} to register for a project.
      Click the button below to start your registration.</p>
      <a href="{app_url}/create-user/{token}" class="button">Register now</a>"#,
                inviter = escape_html(inviter),
                app_url = app_url,
                token = urlencoding::encode(token),
            )
        }
        EmailKind::PasswordReset => {
            let token = params
                .reset_token
                .as_deref()
                .ok_or(EmailError::MissingParam("reset_token"))?;
            format!(
                r#"<h1>Reset Password</h1>
      <p>You have received a request to reset your password.
      Click the button below to proceed with resetting your password.</p>
      <p>If you did not request this, you can safely ignore this message.</p>
      <a href="{app_url}/reset-password/{token}" class="button">Reset Password</a>"#,
                app_url = app_url,
                token = urlencoding::encode(token),
            )
        }
        EmailKind::Welcome => {
            let name = params
                .new_user_name
                .as_deref()
                .ok_or(EmailError::MissingParam("new_user_name"))?;
            format!(
                r#"<h1>Welcome, {}!</h1>
      <p>Your registration was successful!</p>"#,
                escape_html(name)
            )
        }
        EmailKind::Update => format!(
            r#"<h1>Update notification</h1>
      <p>{}</p>"#,
            escape_html(
                params
                    .update_summary
                    .as_deref()
                    .unwrap_or("Content in your project has changed.")
            )
        ),
    };

    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8">
    <title>{subject}</title>
  </head>
  <body>
    <div class="container">
      {content}
      <div class="footer"><p>&copy; Modulux</p></div>
    </div>
  </body>
</html>"#,
        subject = email.kind.subject(),
        content = content,
    ))
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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

/// Notifier that sends email over SMTP.
#[derive(Clone)]
pub struct SmtpNotifier {
    config: EmailConfig,
}

impl SmtpNotifier {
    /// Creates a new notifier with the given configuration.
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, email: &OutboundEmail) -> Result<Message, EmailError> {
        let body = render_body(email, &self.config.app_url)?;
        let from = format!("{} <{}>", self.config.from_name, self.config.from_email);

        Message::builder()
            .from(
                from.parse()
                    .map_err(|e| EmailError::MessageError(format!("{}", e)))?,
            )
            .to(email
                .recipient
                .parse()
                .map_err(|e| EmailError::MessageError(format!("{}", e)))?)
            .subject(email.kind.subject())
            .header(ContentType::TEXT_HTML)
            .body(body)
            .map_err(|e| EmailError::MessageError(e.to_string()))
    }

    /// Builds the SMTP transport.
    fn build_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, EmailError> {
        let mut builder = if self.config.smtp_port == 465 {
            // SSL/TLS on port 465
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_host)
                .map_err(|e| EmailError::TransportError(e.to_string()))?
                .port(465)
        } else {
            // STARTTLS on port 587 or plain for local testing
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
                .map_err(|e| EmailError::TransportError(e.to_string()))?
                .port(self.config.smtp_port)
        };

        if let (Some(user), Some(pass)) = (&self.config.smtp_user, &self.config.smtp_pass) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_email(&self, email: OutboundEmail) -> Result<(), EmailError> {
        let message = self.build_message(&email)?;
        let transport = self.build_transport()?;

        transport
            .send(message)
            .await
            .map_err(|e| EmailError::TransportError(e.to_string()))?;

        tracing::info!("Sent '{}' email to {}", email.kind.subject(), email.recipient);
        Ok(())
    }
}

impl std::fmt::Debug for SmtpNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpNotifier")
            .field("smtp_host", &self.config.smtp_host)
            .field("smtp_port", &self.config.smtp_port)
            .field("from_email", &self.config.from_email)
            .finish()
    }
}

/// Used when SMTP is not configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_email(&self, email: OutboundEmail) -> Result<(), EmailError> {
        tracing::info!(
            "SMTP not configured, not sending '{}' email to {}",
            email.kind.subject(),
            email.recipient
        );
        Ok(())
    }
}
