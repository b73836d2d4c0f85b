use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Runtime configuration, read from the environment exactly once at startup
/// and passed by reference into each component.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub sender: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub resume_path: PathBuf,
    pub dataset_path: PathBuf,
    pub template_path: PathBuf,
    pub token_cache_path: PathBuf,
    pub client_secret_path: PathBuf,
    pub attachment_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine; variables may come from the shell.
        let _ = dotenvy::dotenv();

        Ok(Config {
            api_key: env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?,
            model: env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            sender: env::var("SENDER_ADDRESS")
                .context("SENDER_ADDRESS is not set (used for the From header)")?,
            client_id: env_opt("GOOGLE_CLIENT_ID"),
            client_secret: env_opt("GOOGLE_CLIENT_SECRET"),
            redirect_uri: env_opt("GOOGLE_REDIRECT_URI"),
            resume_path: env_path("RESUME_PATH", "resume_parsed.txt"),
            dataset_path: env_path("DATASET_PATH", "email_dataset.csv"),
            template_path: env_path("TEMPLATE_PATH", "email_template.txt"),
            token_cache_path: env_path("TOKEN_CACHE_PATH", "token.json"),
            client_secret_path: env_path("CLIENT_SECRET_PATH", "credentials.json"),
            attachment_path: env_opt("ATTACHMENT_PATH").map(PathBuf::from),
        })
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_path(key: &str, default: &str) -> PathBuf {
    env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}
