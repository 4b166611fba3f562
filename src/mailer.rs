use anyhow::Context as _;
use serde_json::json;

use crate::config::Config;
use crate::error::AppError;

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

/// Outbound mail for email verification.
#[derive(Clone)]
pub enum Mailer {
    Resend {
        client: reqwest::Client,
        api_key: String,
        from: String,
    },
    /// No provider configured; links are written to the log.
    Log,
}

impl Mailer {
    pub fn from_config(config: &Config) -> Self {
        match config.resend_api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(api_key) => Mailer::Resend {
                client: reqwest::Client::new(),
                api_key: api_key.to_string(),
                from: config.email_from.clone(),
            },
            None => {
                tracing::warn!("RESEND_API_KEY not set, verification links will only be logged");
                Mailer::Log
            }
        }
    }

    pub async fn send_verification(&self, to: &str, link: &str) -> Result<(), AppError> {
        match self {
            Mailer::Log => {
                tracing::info!(to, link, "email verification link (mail delivery disabled)");
                Ok(())
            }
            Mailer::Resend { client, api_key, from } => {
                let body = json!({
                    "from": from,
                    "to": [to],
                    "subject": "Verify your email for Piggy ID",
                    "html": format!(
                        "<p>Click the link below to link this email to your Piggy ID.</p>\
                         <p><a href=\"{link}\">Verify email</a></p>\
                         <p>The link expires in 24 hours.</p>"
                    ),
                });
                client
                    .post(RESEND_ENDPOINT)
                    .bearer_auth(api_key)
                    .json(&body)
                    .send()
                    .await?
                    .error_for_status()
                    .context("resend rejected verification mail")?;
                tracing::info!(to, "verification mail sent");
                Ok(())
            }
        }
    }
}
