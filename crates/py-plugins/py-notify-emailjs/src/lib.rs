//! # py-notify-emailjs
//!
//! `Notifier` that sends comment notifications through the EmailJS REST API.

use async_trait::async_trait;
use py_core::models::CommentNotification;
use py_core::traits::Notifier;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, warn};

pub const DEFAULT_ENDPOINT: &str = "https://api.emailjs.com/api/v1.0/email/send";
const FROM_NAME: &str = "PerdidosYa!";

#[derive(Debug, Clone)]
pub struct EmailJsSettings {
    pub endpoint: String,
    pub service_id: String,
    pub template_id: String,
    pub public_key: SecretString,
    pub reply_to: String,
}

pub struct EmailJsNotifier {
    client: Client,
    settings: EmailJsSettings,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    service_id: &'a str,
    template_id: &'a str,
    user_id: &'a str,
    template_params: TemplateParams<'a>,
}

#[derive(Debug, Serialize)]
struct TemplateParams<'a> {
    to_email: &'a str,
    bcc: String,
    subject: String,
    from_name: &'a str,
    reply_to: &'a str,
    recipient_name: &'a str,
    item_name: &'a str,
    item_url: &'a str,
    comment_author: &'a str,
    comment_text: &'a str,
}

fn send_request<'a>(settings: &'a EmailJsSettings, n: &'a CommentNotification) -> SendRequest<'a> {
    SendRequest {
        service_id: &settings.service_id,
        template_id: &settings.template_id,
        user_id: settings.public_key.expose_secret(),
        template_params: TemplateParams {
            to_email: &n.recipient_email,
            bcc: n.bcc_emails.join(","),
            subject: n.subject(),
            from_name: FROM_NAME,
            reply_to: &settings.reply_to,
            recipient_name: &n.recipient_name,
            item_name: &n.item_name,
            item_url: &n.item_url,
            comment_author: &n.comment_author,
            comment_text: &n.comment_text,
        },
    }
}

impl EmailJsNotifier {
    pub fn new(settings: EmailJsSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }
}

#[async_trait]
impl Notifier for EmailJsNotifier {
    /// A non-success status is reported as `Ok(false)`; transport errors as `Err`.
    async fn send_comment_notification(&self, notification: &CommentNotification) -> anyhow::Result<bool> {
        let response = self
            .client
            .post(&self.settings.endpoint)
            .json(&send_request(&self.settings, notification))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "EmailJS rejected the message");
            return Ok(false);
        }
        debug!(recipient = %notification.recipient_email, "EmailJS accepted the message");
        Ok(true)
    }
}
