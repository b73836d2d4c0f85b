use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use url::Url;

use crate::ai_composer::compose_email;
use crate::auth;
use crate::config::Config;
use crate::dataset::load_recipients;
use crate::extractor::fetch_job_page;
use crate::logger::init_logger;
use crate::mailer::{GmailMailer, send_bulk};
use crate::models::{EmailTemplate, ResumeDocument};
use crate::utils::{GREETING_PLACEHOLDER, name_from_address, preview};

const PAGE_PREVIEW_CHARS: usize = 7_000;
const EMAIL_PREVIEW_CHARS: usize = 500;
const DIVIDER_WIDTH: usize = 50;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const ACCEPT_HEADER: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

pub async fn run_pipeline(dry_run: bool, assume_yes: bool, verbose: bool) -> Result<()> {
    init_logger(verbose)?;
    debug!("Logger initialized");

    let cfg = Config::from_env()?;
    debug!("Configuration loaded from environment");

    // 1) All required files, reported together, before any network call.
    let missing = missing_required_files(&cfg);
    if !missing.is_empty() {
        println!("The following required files are missing:");
        for entry in &missing {
            println!("- {entry}");
        }
        println!("\nPlease create these files and try again.");
        return Ok(());
    }

    // 2) Job URL.
    let url_input = prompt("Please enter the job description URL: ")?;
    let job_url = Url::parse(&url_input).context("Invalid job description URL")?;

    // 3) Scrape.
    println!("Scraping job page content...");
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(10))
        .user_agent(USER_AGENT)
        .default_headers({
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert(reqwest::header::ACCEPT, ACCEPT_HEADER.parse()?);
            headers
        })
        .build()?;
    let posting = fetch_job_page(&client, &job_url)
        .await
        .context("Failed to scrape job page content")?;
    debug!(
        "Scraped {} ({} bytes of HTML, {} characters of text)",
        posting.url,
        posting.raw_html.len(),
        posting.text.len()
    );

    println!("Job page content successfully scraped!");
    println!("\nExtracted page content (first {PAGE_PREVIEW_CHARS} characters):");
    divider();
    println!("{}", preview(&posting.text, PAGE_PREVIEW_CHARS));
    divider();

    if !confirm(
        "\nDo you want to proceed with this job page content? (y/n): ",
        assume_yes,
    )? {
        println!("Operation cancelled by user.");
        return Ok(());
    }

    // 4) Local inputs.
    println!("\nLoading email template...");
    let template = EmailTemplate::load(&cfg.template_path)?;
    if !template.text.contains(GREETING_PLACEHOLDER) {
        warn!(
            "Template {} has no \"{GREETING_PLACEHOLDER}\" greeting placeholder; \
             greetings will not be personalized",
            template.path.display()
        );
    }

    println!("Extracting resume text...");
    let resume = ResumeDocument::load(&cfg.resume_path)?;
    debug!(
        "Loaded resume from {} ({} characters)",
        resume.path.display(),
        resume.text.len()
    );

    // 5) One completion call: infer the job description, draft the email.
    println!("Generating email content...");
    let email = compose_email(&cfg, &template.text, &posting.text, &resume.text, &job_url)
        .await
        .context("Failed to generate email content")?;

    println!("\nGenerated email content:");
    divider();
    if let Some(subject) = &email.subject {
        println!("Subject: {subject}\n");
    }
    println!("{}", preview(&email.body, EMAIL_PREVIEW_CHARS));
    divider();

    if !confirm(
        "\nDo you want to proceed with sending this email? (y/n): ",
        assume_yes,
    )? {
        println!("Operation cancelled by user.");
        return Ok(());
    }

    // 6) Recipients and subject.
    println!("\nLoading recipient emails...");
    let recipients = load_recipients(&cfg.dataset_path)?;
    if recipients.is_empty() {
        bail!("No recipients found in dataset");
    }
    println!("Found {} recipients in the dataset.", recipients.len());

    let subject = match &email.subject {
        Some(generated) => {
            let input = prompt(&format!(
                "\nPlease enter the email subject (press Enter to use \"{generated}\"): "
            ))?;
            if input.is_empty() {
                generated.clone()
            } else {
                input
            }
        }
        None => prompt("\nPlease enter the email subject: ")?,
    };

    if dry_run {
        info!("--dry-run flag set, skipping authentication and sending");
        println!("\nDry run: skipping authentication and sending.");
        return Ok(());
    }

    // 7) Authenticate once, then dispatch sequentially.
    println!("\nSending emails...");
    let session = auth::authenticate(&cfg)
        .await
        .context("Gmail authentication failed")?;
    let mailer = GmailMailer::new(session, &cfg)?;
    let stats = send_bulk(&mailer, &recipients, &subject, &email.body, name_from_address).await;

    println!("\nEmail sending completed!");
    println!("Total emails: {}", stats.total);
    println!("Successfully sent: {}", stats.successful);
    println!("Failed to send: {}", stats.failed);

    Ok(())
}

fn missing_required_files(cfg: &Config) -> Vec<String> {
    let required = [
        ("Resume file", &cfg.resume_path),
        ("Email dataset", &cfg.dataset_path),
        ("Email template", &cfg.template_path),
    ];

    required
        .iter()
        .filter(|(_, path)| !path.exists())
        .map(|(label, path)| format!("{label}: {}", path.display()))
        .collect()
}

fn divider() {
    println!("{}", "-".repeat(DIVIDER_WIDTH));
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

fn confirm(message: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        debug!("--yes flag set, skipping confirmation");
        return Ok(true);
    }
    Ok(prompt(message)?.eq_ignore_ascii_case("y"))
}
