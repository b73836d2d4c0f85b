use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use url::Url;

/// One fetched and reduced job posting. Built once per run, never mutated.
#[derive(Debug, Clone)]
pub struct JobPosting {
    pub url: Url,
    pub raw_html: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ResumeDocument {
    pub path: PathBuf,
    pub text: String,
}

impl ResumeDocument {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read resume at {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            text,
        })
    }
}

#[derive(Debug, Clone)]
pub struct EmailTemplate {
    pub path: PathBuf,
    pub text: String,
}

impl EmailTemplate {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read email template at {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            text,
        })
    }
}

/// Output of the single completion call. The subject is absent when the
/// model reply carried no recognizable subject marker.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedEmail {
    pub subject: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    pub address: String,
}

#[derive(Debug, Default, PartialEq)]
pub struct SendStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}
