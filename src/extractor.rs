use anyhow::Result;
use log::{debug, info};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::models::JobPosting;

/// Elements assumed to carry no job content; their whole subtrees are
/// dropped before text extraction.
const NOISE_SELECTOR: &str = "script, style, nav, header, footer, iframe, meta";

/// Content root candidates, most specific first.
const ROOT_SELECTORS: [&str; 3] = ["main", "article", "body"];

/// Single GET, no retry. Non-2xx statuses and transport errors surface as
/// one failure signal; there is no partial result.
pub async fn fetch_job_page(client: &Client, url: &Url) -> Result<JobPosting> {
    let raw_html = client
        .get(url.clone())
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    debug!("Fetched {} bytes of HTML from {url}", raw_html.len());
    let text = extract_page_text(&raw_html);
    info!("Extracted {} characters of page text from {url}", text.len());

    Ok(JobPosting {
        url: url.clone(),
        raw_html,
        text,
    })
}

/// Reduce an HTML document to readable plain text: strip noise subtrees,
/// pick the most specific content root, join its non-empty text segments
/// with newlines.
pub fn extract_page_text(html: &str) -> String {
    let mut document = Html::parse_document(html);

    let noise = Selector::parse(NOISE_SELECTOR).unwrap();
    let noise_ids: Vec<_> = document.select(&noise).map(|el| el.id()).collect();
    for id in noise_ids {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    for candidate in ROOT_SELECTORS {
        let selector = Selector::parse(candidate).unwrap();
        if let Some(root) = document.select(&selector).next() {
            debug!("Using <{candidate}> as the content root");
            return joined_text(root);
        }
    }

    // No structural root at all (fragment input); take whatever text is left.
    joined_text(document.root_element())
}

fn joined_text(root: ElementRef<'_>) -> String {
    root.text()
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_main_over_surrounding_content() {
        let html = r#"
            <html><body>
                <nav>Site navigation</nav>
                <main><h1>Senior Rust Engineer</h1><p>Build things.</p></main>
                <article><p>Unrelated article</p></article>
                <footer>Copyright</footer>
            </body></html>
        "#;
        let text = extract_page_text(html);
        assert!(text.contains("Senior Rust Engineer"));
        assert!(text.contains("Build things."));
        assert!(!text.contains("Unrelated article"));
        assert!(!text.contains("Site navigation"));
        assert!(!text.contains("Copyright"));
    }

    #[test]
    fn script_and_style_content_never_leaks() {
        let html = r#"
            <html><body><main>
                <script>var tracking = "secret";</script>
                <style>.hidden { display: none; }</style>
                <p>Visible requirement</p>
            </main></body></html>
        "#;
        let text = extract_page_text(html);
        assert!(text.contains("Visible requirement"));
        assert!(!text.contains("tracking"));
        assert!(!text.contains("display: none"));
    }

    #[test]
    fn falls_back_to_article_when_no_main() {
        let html = r#"
            <html><body>
                <header>Masthead</header>
                <article><p>Job duties here</p></article>
            </body></html>
        "#;
        let text = extract_page_text(html);
        assert_eq!(text, "Job duties here");
    }

    #[test]
    fn falls_back_to_body_text() {
        let html = "<html><body><div><p>First line</p><p>Second line</p></div></body></html>";
        assert_eq!(extract_page_text(html), "First line\nSecond line");
    }

    #[test]
    fn segments_are_trimmed_and_blank_ones_dropped() {
        let html = "<html><body><main><p>  spaced  </p><p>   </p><p>next</p></main></body></html>";
        assert_eq!(extract_page_text(html), "spaced\nnext");
    }
}
