use anyhow::{Context, Result, anyhow};
use ftail::Ftail;
use log::LevelFilter;
use std::env;
use std::fs;

const LOGS_DIR: &str = ".logs";
const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Console gets warnings only (the interactive prompts own stdout); the
/// full Info/Debug stream goes to a log file under ~/.logs/outreach/.
pub fn init_logger(verbose: bool) -> Result<()> {
    let home = env::home_dir().ok_or_else(|| anyhow!("Could not determine $HOME"))?;

    let logs_path = home.join(LOGS_DIR).join(PKG_NAME);
    fs::create_dir_all(&logs_path)
        .with_context(|| format!("Could not create logs dir at {}", logs_path.display()))?;

    let console_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };

    Ftail::new()
        .console(console_level)
        .single_file(
            &logs_path.join(format!("{PKG_NAME}.log")),
            true,
            LevelFilter::Info,
        )
        .init()
        .map_err(|e| anyhow!("Could not initialize logger: {e}"))
}
