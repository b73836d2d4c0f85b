use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Body, Mailbox, Message, MultiPart};
use log::{debug, error, info, warn};
use regex::Regex;

use crate::auth::GmailSession;
use crate::config::Config;
use crate::models::{Recipient, SendStats};
use crate::utils::personalize_greeting;

const SEND_ENDPOINT: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";

/// Anything that can deliver one message. Kept as a seam so the bulk loop
/// is exercisable without a live mail API.
pub trait MailTransport {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

pub struct GmailMailer {
    session: GmailSession,
    http: reqwest::Client,
    sender: Mailbox,
    attachment: Option<PathBuf>,
}

impl GmailMailer {
    pub fn new(session: GmailSession, cfg: &Config) -> Result<Self> {
        let sender = cfg
            .sender
            .parse::<Mailbox>()
            .context("SENDER_ADDRESS is not a valid mailbox")?;

        let attachment = match &cfg.attachment_path {
            Some(path) if path.exists() => Some(path.clone()),
            Some(path) => {
                warn!("Attachment {} not found, sending without it", path.display());
                None
            }
            None => None,
        };

        Ok(Self {
            session,
            http: reqwest::Client::new(),
            sender,
            attachment,
        })
    }

    /// RFC 2822 message: plain body plus an HTML alternative, wrapped in a
    /// mixed part when an attachment is present.
    fn build_message(&self, to: &str, subject: &str, body: &str) -> Result<Vec<u8>> {
        let to_mailbox = to.parse::<Mailbox>().context("Invalid recipient email")?;

        let alternative =
            MultiPart::alternative_plain_html(body.to_string(), render_html_body(body));

        let builder = Message::builder()
            .from(self.sender.clone())
            .to(to_mailbox)
            .subject(subject);

        let message = match self.attachment_part()? {
            Some(part) => {
                builder.multipart(MultiPart::mixed().multipart(alternative).singlepart(part))?
            }
            None => builder.multipart(alternative)?,
        };

        Ok(message.formatted())
    }

    fn attachment_part(&self) -> Result<Option<lettre::message::SinglePart>> {
        let Some(path) = &self.attachment else {
            return Ok(None);
        };

        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read attachment {}", path.display()))?;
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("attachment")
            .to_string();
        let content_type = match path.extension().and_then(|ext| ext.to_str()) {
            Some("pdf") => ContentType::parse("application/pdf"),
            _ => ContentType::parse("application/octet-stream"),
        }?;

        debug!("Attaching {} ({} bytes)", filename, bytes.len());
        Ok(Some(
            Attachment::new(filename).body(Body::new(bytes), content_type),
        ))
    }
}

impl MailTransport for GmailMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let raw = self.build_message(to, subject, body)?;
        let encoded = URL_SAFE.encode(&raw);

        let response = self
            .http
            .post(SEND_ENDPOINT)
            .bearer_auth(self.session.access_token())
            .json(&serde_json::json!({ "raw": encoded }))
            .send()
            .await
            .context("Gmail send request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("Gmail API rejected the message ({status}): {detail}");
        }

        Ok(())
    }
}

/// Sequential per-recipient dispatch. One failing recipient is counted and
/// logged, never allowed to abort the batch.
pub async fn send_bulk<M: MailTransport>(
    mailer: &M,
    recipients: &[Recipient],
    subject: &str,
    body: &str,
    display_name: fn(&str) -> String,
) -> SendStats {
    let mut stats = SendStats {
        total: recipients.len(),
        ..SendStats::default()
    };

    for recipient in recipients {
        let address = recipient.address.trim();
        if address.is_empty() {
            warn!("Skipping recipient with an empty address");
            stats.failed += 1;
            continue;
        }

        let name = display_name(address);
        let personalized = personalize_greeting(body, &name);
        debug!("Sending to {address} (greeting name: {name})");

        match mailer.send(address, subject, &personalized).await {
            Ok(()) => {
                info!("Email sent to {address}");
                stats.successful += 1;
            }
            Err(err) => {
                error!("Failed to send to {address}: {err:?}");
                stats.failed += 1;
            }
        }
    }

    stats
}

/// Render the body as lightweight markdown: `[text](url)` links and bare
/// URLs become anchors, double newlines become paragraphs. The result is a
/// minimal self-contained HTML document.
fn render_html_body(body: &str) -> String {
    let escaped = escape_html(body);

    let link_re = Regex::new(r"\[([^\]]+)\]\((https?://[^\s)]+)\)").unwrap();
    let linked = link_re.replace_all(&escaped, r#"<a href="$2">$1</a>"#);

    // Bare URLs only at start of text or after whitespace, so URLs already
    // inside href attributes stay untouched.
    let bare_re = Regex::new(r#"(^|\s)(https?://[^\s<"]+)"#).unwrap();
    let linked = bare_re.replace_all(&linked, r#"$1<a href="$2">$2</a>"#);

    let paragraphs = linked
        .split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .map(|p| format!("    <p>{}</p>", p.trim().replace('\n', "<br>\n")))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"></head>\n\
         <body style=\"font-family: Arial, Helvetica, sans-serif; font-size: 15px; \
         line-height: 1.5; color: #222222; max-width: 600px; margin: 0 auto; padding: 16px;\">\n\
         {paragraphs}\n</body>\n</html>"
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::name_from_address;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMailer {
        failing: HashSet<String>,
        sent: Mutex<Vec<(String, String, String)>>,
    }

    impl RecordingMailer {
        fn failing_for(addresses: &[&str]) -> Self {
            Self {
                failing: addresses.iter().map(|a| a.to_string()).collect(),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    impl MailTransport for RecordingMailer {
        async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
            if self.failing.contains(to) {
                anyhow::bail!("simulated transport failure");
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn recipients(addresses: &[&str]) -> Vec<Recipient> {
        addresses
            .iter()
            .map(|a| Recipient {
                address: a.to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn bulk_send_counts_every_outcome() {
        let mailer = RecordingMailer::failing_for(&["broken@example.com"]);
        let recipients = recipients(&[
            "jane.smith@co.com",
            "broken@example.com",
            "",
            "john.doe@example.com",
        ]);

        let stats = send_bulk(&mailer, &recipients, "Role", "Hello,\n\nbody", name_from_address).await;

        assert_eq!(
            stats,
            SendStats {
                total: 4,
                successful: 2,
                failed: 2,
            }
        );
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_later_recipients() {
        let mailer = RecordingMailer::failing_for(&["first@example.com"]);
        let recipients = recipients(&["first@example.com", "second@example.com"]);

        send_bulk(&mailer, &recipients, "Role", "Hello,", name_from_address).await;

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "second@example.com");
    }

    #[tokio::test]
    async fn greeting_is_personalized_per_recipient() {
        let mailer = RecordingMailer::default();
        let recipients = recipients(&["jane.smith@co.com"]);
        let template_body = "Hello,\n\nI am applying for this role.\n{link}";

        send_bulk(&mailer, &recipients, "Role", template_body, name_from_address).await;

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent[0].1, "Role");
        assert!(sent[0].2.starts_with("Hello Jane Smith,"));
        // No template engine: unknown placeholders pass through untouched.
        assert!(sent[0].2.contains("{link}"));
    }

    #[test]
    fn markdown_links_become_anchors() {
        let html = render_html_body("Apply via [the posting](https://example.com/job).");
        assert!(html.contains(r#"<a href="https://example.com/job">the posting</a>"#));
    }

    #[test]
    fn bare_urls_become_anchors_exactly_once() {
        let html = render_html_body("See https://example.com/job for details.");
        assert!(html.contains(r#"<a href="https://example.com/job">https://example.com/job</a>"#));
        assert_eq!(html.matches("<a href=").count(), 1);
    }

    #[test]
    fn html_in_the_body_is_escaped() {
        let html = render_html_body("Salary < 100k & benefits");
        assert!(html.contains("Salary &lt; 100k &amp; benefits"));
    }

    #[test]
    fn paragraph_breaks_become_paragraph_tags() {
        let html = render_html_body("First paragraph.\n\nSecond paragraph.");
        assert!(html.contains("<p>First paragraph.</p>"));
        assert!(html.contains("<p>Second paragraph.</p>"));
    }
}
