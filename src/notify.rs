use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{error, info};
use url::Url;

use crate::config::SmtpConfig;
use crate::Result;

const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const SUBJECT_PREVIEW_CHARS: usize = 100;

/// Capability to deliver one notification. Fails closed: transport and
/// authentication errors are logged by the implementation and reported as
/// `false`, never raised.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> bool;
}

/// SMTP sender over STARTTLS with the configured credentials.
pub struct EmailNotifier {
    smtp: SmtpConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailNotifier {
    pub fn new(smtp: SmtpConfig) -> Result<Self> {
        let credentials = Credentials::new(smtp.sender_email.clone(), smtp.sender_password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.server)?
            .port(smtp.port)
            .credentials(credentials)
            .timeout(Some(SEND_TIMEOUT))
            .build();

        Ok(Self { smtp, transport })
    }

    fn build_message(&self, subject: &str, body: &str) -> Result<Message> {
        let message = Message::builder()
            .from(self.smtp.sender_email.parse()?)
            .to(self.smtp.recipient_email.parse()?)
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body.to_string())?;

        Ok(message)
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, subject: &str, body: &str) -> bool {
        let message = match self.build_message(subject, body) {
            Ok(message) => message,
            Err(e) => {
                error!("failed to compose notification email: {e}");
                return false;
            }
        };

        match self.transport.send(message).await {
            Ok(_) => {
                info!("email notification sent to {}", self.smtp.recipient_email);
                true
            }
            Err(e) => {
                error!("failed to send email notification: {e}");
                false
            }
        }
    }
}

/// Formats one notification per batch of new matches and hands it to the
/// sender. Retry on failure is the loop's concern, not this one's.
pub struct NotificationPolicy {
    url: Url,
}

impl NotificationPolicy {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub async fn notify(&self, matches: &[String], sender: &dyn Notifier) -> bool {
        sender
            .send(&self.subject(matches), &self.body(matches))
            .await
    }

    fn subject(&self, matches: &[String]) -> String {
        let first = matches.first().map(String::as_str).unwrap_or_default();

        if first.chars().count() > SUBJECT_PREVIEW_CHARS {
            let preview: String = first.chars().take(SUBJECT_PREVIEW_CHARS).collect();
            format!("New match: {preview}...")
        } else {
            format!("New match: {first}")
        }
    }

    fn body(&self, matches: &[String]) -> String {
        let mut body = String::from("Found new line(s) matching your search terms:\n\n");
        body.push_str(&matches.join("\n\n"));
        body.push_str(&format!("\n\nView the page at: {}", self.url));
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSender {
        outcome: bool,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingSender {
        fn new(outcome: bool) -> Self {
            Self {
                outcome,
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Notifier for RecordingSender {
        async fn send(&self, subject: &str, body: &str) -> bool {
            self.sent
                .lock()
                .unwrap()
                .push((subject.to_string(), body.to_string()));
            self.outcome
        }
    }

    fn policy() -> NotificationPolicy {
        NotificationPolicy::new(Url::parse("https://example.com/forum").unwrap())
    }

    fn lines(list: &[&str]) -> Vec<String> {
        list.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_subject_uses_first_match() {
        let subject = policy().subject(&lines(&["New Pickup: Alpha Widget", "other"]));
        assert_eq!(subject, "New match: New Pickup: Alpha Widget");
    }

    #[test]
    fn test_long_subject_is_truncated_with_ellipsis() {
        let long_line = "x".repeat(150);
        let subject = policy().subject(&lines(&[&long_line]));

        assert!(subject.ends_with("..."));
        assert!(subject.contains(&"x".repeat(100)));
        assert!(!subject.contains(&"x".repeat(101)));
    }

    #[test]
    fn test_subject_at_limit_is_not_truncated() {
        let line = "y".repeat(100);
        let subject = policy().subject(&lines(&[&line]));
        assert_eq!(subject, format!("New match: {line}"));
    }

    #[test]
    fn test_truncation_respects_multibyte_boundaries() {
        let line = "é".repeat(150);
        let subject = policy().subject(&lines(&[&line]));

        assert!(subject.ends_with("..."));
        assert!(subject.contains(&"é".repeat(100)));
    }

    #[test]
    fn test_body_lists_all_matches_with_blank_lines() {
        let body = policy().body(&lines(&["first line", "second line"]));

        assert!(body.contains("first line\n\nsecond line"));
        assert!(body.ends_with("View the page at: https://example.com/forum"));
    }

    #[tokio::test]
    async fn test_single_notification_covers_whole_batch() {
        let sender = RecordingSender::new(true);
        let matches = lines(&["one match", "two match", "three match"]);

        assert!(policy().notify(&matches, &sender).await);

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("one match"));
        assert!(sent[0].1.contains("three match"));
    }

    #[tokio::test]
    async fn test_notify_reports_sender_failure() {
        let sender = RecordingSender::new(false);
        assert!(!policy().notify(&lines(&["a match"]), &sender).await);
    }
}
