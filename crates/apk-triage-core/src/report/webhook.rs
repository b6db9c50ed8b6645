//! Webhook delivery of exported reports

use crate::error::{Result, ScanError};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use std::path::Path;
use tracing::{debug, info};

/// Posts report files to a chat-style webhook
pub struct WebhookNotifier {
    url: String,
    http_client: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a notifier for `url`
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(format!("apk-triage/{}", crate::VERSION))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ScanError::Notification(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            http_client,
        })
    }

    /// Send the JSON report, and the HTML report when one exists
    pub async fn notify(&self, json: &Path, html: Option<&Path>, subject: &str) -> Result<()> {
        let mut form = Form::new().part("file1", file_part(json, "application/json").await?);
        let mut message = format!(
            "APK Analysis Results for: {}\n\nJSON Report: {}",
            subject,
            file_name(json)
        );

        if let Some(html) = html {
            form = form.part("file2", file_part(html, "text/html").await?);
            message.push_str(&format!("\nHTML Report: {}", file_name(html)));
        }
        form = form.text("content", message);

        debug!("Posting report for {} to webhook", subject);
        let response = self
            .http_client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                ScanError::Notification(format!("failed to send webhook request: {}", e))
            })?;

        check_status(response.status())?;
        info!("Results sent to webhook");
        Ok(())
    }
}

fn check_status(status: StatusCode) -> Result<()> {
    if status == StatusCode::OK || status == StatusCode::NO_CONTENT {
        Ok(())
    } else {
        Err(ScanError::Notification(format!(
            "webhook request failed with status: {}",
            status.as_u16()
        )))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn file_part(path: &Path, mime: &str) -> Result<Part> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        ScanError::Notification(format!("failed to open {}: {}", path.display(), e))
    })?;
    Part::bytes(bytes)
        .file_name(file_name(path))
        .mime_str(mime)
        .map_err(|e| ScanError::Notification(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_statuses() {
        assert!(check_status(StatusCode::OK).is_ok());
        assert!(check_status(StatusCode::NO_CONTENT).is_ok());
        assert!(matches!(
            check_status(StatusCode::CREATED),
            Err(ScanError::Notification(_))
        ));
        assert!(check_status(StatusCode::BAD_REQUEST).is_err());
    }

    #[tokio::test]
    async fn test_missing_report_file_is_notification_error() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hook").unwrap();
        let err = notifier
            .notify(Path::new("/nonexistent/results.json"), None, "com.example")
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Notification(_)));
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_notification_error() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("results.json");
        std::fs::write(&json, "{}").unwrap();

        // Port 9 (discard) is not listening in test environments
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hook").unwrap();
        let err = notifier.notify(&json, None, "com.example").await.unwrap_err();
        assert!(matches!(err, ScanError::Notification(_)));
    }
}
