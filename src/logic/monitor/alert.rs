//! Alert channel
//!
//! Subject + body delivery. Without a configured endpoint alerts are dropped
//! silently.

use serde_json::json;

use crate::constants::ALERT_WEBHOOK_TIMEOUT;
use crate::logic::error::MonitorError;

pub trait AlertNotifier: Send {
    fn send(&self, subject: &str, body: &str) -> Result<(), MonitorError>;
}

/// Unconfigured channel
pub struct NoopNotifier;

impl AlertNotifier for NoopNotifier {
    fn send(&self, subject: &str, _body: &str) -> Result<(), MonitorError> {
        log::debug!("No alert channel configured, dropping '{}'", subject);
        Ok(())
    }
}

/// JSON POST `{"subject": .., "text": ..}` to a webhook URL.
pub struct WebhookNotifier {
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl AlertNotifier for WebhookNotifier {
    fn send(&self, subject: &str, body: &str) -> Result<(), MonitorError> {
        let payload = json!({
            "subject": subject,
            "text": format!("{}\n\n{}", subject, body),
        });

        let response = ureq::post(&self.url)
            .timeout(ALERT_WEBHOOK_TIMEOUT)
            .set("Content-Type", "application/json")
            .send_string(&payload.to_string());

        match response {
            Ok(resp) => {
                log::info!("Alert '{}' delivered ({})", subject, resp.status());
                Ok(())
            }
            Err(e) => Err(MonitorError::Alert(e.to_string())),
        }
    }
}

/// Webhook when a URL is configured, otherwise the no-op channel.
pub fn notifier_for(url: Option<&str>) -> Box<dyn AlertNotifier> {
    match url {
        Some(url) => Box::new(WebhookNotifier::new(url)),
        None => Box::new(NoopNotifier),
    }
}
