use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use log::debug;

use crate::models::Recipient;

const EMAIL_COLUMN: &str = "email";

/// Load the recipient list from a CSV dataset. The file must carry an
/// `email` column; rows with blank addresses are kept so the send loop can
/// count them as failures instead of silently shrinking the batch.
pub fn load_recipients(path: &Path) -> Result<Vec<Recipient>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read email dataset at {}", path.display()))?;
    let recipients = parse_recipients(content.as_bytes())
        .with_context(|| format!("Failed to parse email dataset at {}", path.display()))?;
    debug!(
        "Loaded {} recipients from {}",
        recipients.len(),
        path.display()
    );
    Ok(recipients)
}

fn parse_recipients(input: impl Read) -> Result<Vec<Recipient>> {
    let mut reader = csv::Reader::from_reader(input);

    let headers = reader.headers()?.clone();
    let email_idx = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(EMAIL_COLUMN))
        .ok_or_else(|| anyhow!("Dataset has no `{EMAIL_COLUMN}` column"))?;

    let mut recipients = Vec::new();
    for record in reader.records() {
        let record = record?;
        let address = record.get(email_idx).unwrap_or_default().trim().to_string();
        recipients.push(Recipient { address });
    }

    Ok(recipients)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_addresses_from_the_email_column() {
        let csv = "name,email\nJane,jane.smith@co.com\nJohn,john.doe@example.com\n";
        let recipients = parse_recipients(csv.as_bytes()).unwrap();
        assert_eq!(recipients.len(), 2);
        assert_eq!(recipients[0].address, "jane.smith@co.com");
        assert_eq!(recipients[1].address, "john.doe@example.com");
    }

    #[test]
    fn header_match_ignores_case_and_padding() {
        let csv = "id, Email \n1,a@b.com\n";
        let recipients = parse_recipients(csv.as_bytes()).unwrap();
        assert_eq!(recipients[0].address, "a@b.com");
    }

    #[test]
    fn missing_email_column_is_an_error() {
        let csv = "name,address\nJane,somewhere\n";
        let err = parse_recipients(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("email"));
    }

    #[test]
    fn blank_addresses_are_kept_for_failure_counting() {
        let csv = "name,email\nJane,jane@co.com\nNoAddress,\nBob,bob@co.com\n";
        let recipients = parse_recipients(csv.as_bytes()).unwrap();
        assert_eq!(recipients.len(), 3);
        assert_eq!(recipients[1].address, "");
        assert_eq!(recipients[2].address, "bob@co.com");
    }
}
