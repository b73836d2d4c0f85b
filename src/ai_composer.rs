use std::borrow::Cow;

use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs,
    },
};
use log::{debug, warn};
use tokio::time::Duration;
use url::Url;

use crate::config::Config;
use crate::models::GeneratedEmail;

/// Character budget for the page text inside the prompt; anything beyond it
/// is cut, even mid-sentence, to stay under request-size limits.
const MAX_PAGE_TEXT_CHARS: usize = 12_000;
const TRUNCATION_MARKER: &str = "...";

const SUBJECT_MARKER: &str = "SUBJECT:";
const CONTENT_MARKER: &str = "CONTENT:";

const COMPLETION_TIMEOUT_SECS: u64 = 60;

const SYSTEM_PROMPT: &str =
    "You are a professional email writer helping to create personalized job application emails.";

/// One completion call that both infers the job description from the page
/// text and drafts the email from the template and resume.
pub async fn compose_email(
    cfg: &Config,
    template: &str,
    page_text: &str,
    resume_text: &str,
    job_url: &Url,
) -> Result<GeneratedEmail> {
    let openai_config = OpenAIConfig::default().with_api_key(&cfg.api_key);
    let client = Client::with_config(openai_config);

    let page_text = truncate_page_text(page_text);
    let user_prompt = build_prompt(template, &page_text, resume_text, job_url);
    debug!("Prompt assembled, {} characters", user_prompt.len());

    let request = CreateChatCompletionRequestArgs::default()
        .model(&cfg.model)
        .messages([
            ChatCompletionRequestSystemMessage::from(SYSTEM_PROMPT).into(),
            ChatCompletionRequestUserMessage::from(user_prompt).into(),
        ])
        .temperature(0.7)
        .max_tokens(2000u32)
        .build()
        .context("Failed to build completion request")?;

    debug!("Requesting email draft from model {}", cfg.model);
    let response = match tokio::time::timeout(
        Duration::from_secs(COMPLETION_TIMEOUT_SECS),
        client.chat().create(request),
    )
    .await
    {
        Ok(api_result) => api_result.context("Completion request failed")?,
        Err(_) => anyhow::bail!(
            "Completion request timed out after {COMPLETION_TIMEOUT_SECS} seconds"
        ),
    };

    for choice in response.choices {
        if let Some(content) = choice.message.content {
            debug!("Received completion, {} characters", content.len());
            return Ok(parse_completion(&content));
        }
    }

    anyhow::bail!("No content in completion response")
}

/// Cut at exactly `MAX_PAGE_TEXT_CHARS` characters (not bytes) and append
/// the marker; shorter input passes through unchanged.
pub fn truncate_page_text(text: &str) -> Cow<'_, str> {
    match text.char_indices().nth(MAX_PAGE_TEXT_CHARS) {
        None => Cow::Borrowed(text),
        Some((byte_idx, _)) => {
            warn!("Job page text was truncated to {MAX_PAGE_TEXT_CHARS} characters");
            Cow::Owned(format!("{}{TRUNCATION_MARKER}", &text[..byte_idx]))
        }
    }
}

fn build_prompt(template: &str, page_text: &str, resume_text: &str, job_url: &Url) -> String {
    format!(
        r#"I need you to perform two tasks:

1. First, extract the job description from this webpage content:

{page_text}

Please identify and extract:
- Job title
- Company name (if available)
- Job responsibilities
- Required qualifications
- Preferred qualifications (if any)
- Any other relevant details about the position

2. Then, using the extracted job description, generate a personalized email using this template:

{template}

And this resume:

{resume_text}

Please generate a professional email that:
1. Follows the template structure
2. Highlights relevant experience from the resume that matches the job description
3. Includes a personalized greeting (use "Hello" as placeholder)
4. Ends with the job description link: {job_url}
5. Maintains a professional and engaging tone
6. Uses short paragraphs that read well on a phone screen

Format your reply exactly as:
{SUBJECT_MARKER} <subject line of at most 100 characters that contains the job title>
{CONTENT_MARKER}
<the complete email body, ready to be sent>"#
    )
}

/// Split the raw completion on the subject/content markers. When either
/// marker is missing (or they arrive out of order), the whole reply becomes
/// the body and no subject is reported.
pub fn parse_completion(raw: &str) -> GeneratedEmail {
    match (raw.find(SUBJECT_MARKER), raw.find(CONTENT_MARKER)) {
        (Some(subject_at), Some(content_at)) if subject_at < content_at => {
            let subject_line = raw[subject_at + SUBJECT_MARKER.len()..content_at]
                .lines()
                .next()
                .unwrap_or_default()
                .trim();
            let subject = (!subject_line.is_empty()).then(|| subject_line.to_string());
            let body = raw[content_at + CONTENT_MARKER.len()..].trim().to_string();
            GeneratedEmail { subject, body }
        }
        _ => {
            debug!("Completion carried no subject/content markers, treating the whole reply as the body");
            GeneratedEmail {
                subject: None,
                body: raw.trim().to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_page_text_is_cut_at_the_exact_budget() {
        let text = "x".repeat(MAX_PAGE_TEXT_CHARS + 500);
        let truncated = truncate_page_text(&text);
        assert_eq!(
            truncated.len(),
            MAX_PAGE_TEXT_CHARS + TRUNCATION_MARKER.len()
        );
        assert!(truncated.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            &truncated[..MAX_PAGE_TEXT_CHARS],
            &text[..MAX_PAGE_TEXT_CHARS]
        );
    }

    #[test]
    fn budget_counts_characters_not_bytes() {
        let text = "é".repeat(MAX_PAGE_TEXT_CHARS + 1);
        let truncated = truncate_page_text(&text);
        assert_eq!(
            truncated.chars().count(),
            MAX_PAGE_TEXT_CHARS + TRUNCATION_MARKER.len()
        );
    }

    #[test]
    fn short_page_text_passes_through_unchanged() {
        let text = "a short posting";
        assert!(matches!(truncate_page_text(text), Cow::Borrowed(t) if t == text));

        let exact = "y".repeat(MAX_PAGE_TEXT_CHARS);
        assert!(matches!(truncate_page_text(&exact), Cow::Borrowed(_)));
    }

    #[test]
    fn parses_subject_and_content_markers() {
        let raw = "SUBJECT: Foo\nCONTENT: Bar\n\nBaz";
        let email = parse_completion(raw);
        assert_eq!(email.subject.as_deref(), Some("Foo"));
        assert_eq!(email.body, "Bar\n\nBaz");
    }

    #[test]
    fn body_keeps_paragraph_breaks() {
        let raw = "SUBJECT: Rust Engineer Application\nCONTENT:\nHello,\n\nFirst paragraph.\n\nSecond paragraph.\n";
        let email = parse_completion(raw);
        assert_eq!(
            email.body,
            "Hello,\n\nFirst paragraph.\n\nSecond paragraph."
        );
    }

    #[test]
    fn missing_markers_fall_back_to_whole_reply_as_body() {
        let raw = "Hello,\n\nI am applying for the role.\n";
        let email = parse_completion(raw);
        assert_eq!(email.subject, None);
        assert_eq!(email.body, "Hello,\n\nI am applying for the role.");
    }

    #[test]
    fn content_marker_alone_is_not_enough() {
        let raw = "CONTENT: body only, no subject marker";
        let email = parse_completion(raw);
        assert_eq!(email.subject, None);
        assert_eq!(email.body, raw);
    }

    #[test]
    fn out_of_order_markers_fall_back() {
        let raw = "CONTENT: text\nSUBJECT: late subject";
        let email = parse_completion(raw);
        assert_eq!(email.subject, None);
        assert_eq!(email.body, raw.trim());
    }

    #[test]
    fn blank_subject_is_reported_as_none() {
        let raw = "SUBJECT:\nCONTENT: body";
        let email = parse_completion(raw);
        assert_eq!(email.subject, None);
        assert_eq!(email.body, "body");
    }
}
