/// Literal greeting token the template and the generated body carry; the
/// dispatcher turns its first occurrence into "Hello {name}" per recipient.
pub const GREETING_PLACEHOLDER: &str = "Hello";

const FALLBACK_NAME: &str = "there";

/// Best-effort display name from the local part of an address:
/// "john.doe@example.com" becomes "John Doe". Lossy by design; kept as a
/// standalone strategy function so the dispatcher never hardcodes it.
pub fn name_from_address(address: &str) -> String {
    let local = address.split('@').next().unwrap_or_default();
    let name = title_case(&local.replace('.', " ")).trim().to_string();
    if name.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        name
    }
}

/// Uppercase every alphabetic character that follows a non-alphabetic one,
/// lowercase the rest ("mary-jane watson" -> "Mary-Jane Watson").
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_alpha = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Substitute only the first greeting occurrence; later "Hello"s in the body
/// are content, not placeholders.
pub fn personalize_greeting(body: &str, name: &str) -> String {
    body.replacen(
        GREETING_PLACEHOLDER,
        &format!("{GREETING_PLACEHOLDER} {name}"),
        1,
    )
}

/// First `limit` characters of `text`, with an ellipsis marker when cut.
pub fn preview(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        None => text.to_string(),
        Some((idx, _)) => format!("{}...", &text[..idx]),
    }
}
