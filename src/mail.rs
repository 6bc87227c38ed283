/*!
 * Mail
 * SMTP delivery of magic-link login emails
 */
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;

use crate::routes::auth::LOGIN_TOKEN_TTL_MINUTES;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: Option<u16>,
    pub username: String,
    pub password: Option<String>,
}

impl MailConfig {
    pub fn from_env() -> Self {
        Self {
            smtp_host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
            smtp_port: std::env::var("SMTP_PORT").ok().and_then(|s| s.parse().ok()),
            username: std::env::var("EMAIL_USER").unwrap_or_default(),
            password: std::env::var("EMAIL_PASS").ok().filter(|p| !p.is_empty()),
        }
    }
}

lazy_static::lazy_static! {
    static ref MAIL_CONFIG: MailConfig = MailConfig::from_env();
}

pub fn login_email_html(link: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
    <h2 style="color: #333;">Admin Access Request</h2>
    <p>You requested access to the admin panel. Click the link below to log in:</p>
    <a href="{link}" style="display: inline-block; background-color: #007bff; color: white; padding: 12px 24px; text-decoration: none; border-radius: 5px; margin: 20px 0;">Login to Admin Panel</a>
    <p style="color: #666; font-size: 14px;">This link will expire in {ttl} minutes.</p>
    <p style="color: #666; font-size: 14px;">If you didn't request this, please ignore this email.</p>
</div>"#,
        link = link,
        ttl = LOGIN_TOKEN_TTL_MINUTES,
    )
}

/// Sends the login link. Without `EMAIL_PASS` the link is logged instead so local
/// setups can still sign in.
pub async fn send_login_link(to: &str, link: &str) -> Result<(), MailError> {
    let cfg = &*MAIL_CONFIG;

    let password = match cfg.password.as_ref() {
        Some(p) => p,
        None => {
            tracing::warn!(to = %to, link = %link, "EMAIL_PASS not set, login link not mailed");
            return Ok(());
        }
    };

    let from: Mailbox = cfg.username.parse()?;
    let message = Message::builder()
        .from(from)
        .to(to.parse()?)
        .subject("Admin Login Link")
        .header(ContentType::TEXT_HTML)
        .body(login_email_html(link))?;

    let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.smtp_host)?
        .credentials(Credentials::new(cfg.username.clone(), password.clone()));
    if let Some(port) = cfg.smtp_port {
        builder = builder.port(port);
    }

    builder.build().send(message).await?;
    tracing::info!(to = %to, "login email sent");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_email_contains_link_and_expiry() {
        let html = login_email_html("https://admin.example.com/auth/verify?token=abc");
        assert!(html.contains(r#"href="https://admin.example.com/auth/verify?token=abc""#));
        assert!(html.contains("expire in 15 minutes"));
    }

    #[test]
    fn test_mail_config_defaults_to_gmail_relay() {
        let cfg = MailConfig::from_env();
        if std::env::var("SMTP_HOST").is_err() {
            assert_eq!(cfg.smtp_host, "smtp.gmail.com");
        }
    }
}
