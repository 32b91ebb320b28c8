/// Log-safety helpers
///
/// Nothing that identifies a person leaves the process in a log line:
/// address local parts, fiscal identifiers and subject text all pass
/// through here first. The domain half of an address stays visible
/// because it is what operators actually debug with.
use regex::Regex;
use std::sync::LazyLock;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@([A-Za-z0-9.-]+\.[A-Za-z]{2,})").unwrap()
});

/// Blanks the local part of every address in `text`, keeping the domain.
///
/// ```
/// use mailgate_core::utils::redact::redact_email;
///
/// assert_eq!(
///     redact_email("bounce from carol@tenant.io"),
///     "bounce from ***@tenant.io"
/// );
/// ```
pub fn redact_email(text: &str) -> String {
    EMAIL_RE.replace_all(text, "***@$1").to_string()
}

/// Masks a fiscal identifier, keeping only the last two digits
pub fn mask_fiscal(value: &str) -> String {
    if value.len() <= 2 {
        "*".repeat(value.len())
    } else {
        format!("{}{}", "*".repeat(value.len() - 2), &value[value.len() - 2..])
    }
}

/// Collapses a subject line to a short stub plus its length. Anything
/// long enough to carry content is hidden; trivially short subjects pass
/// through as-is.
pub fn redact_subject(subject: &str) -> String {
    let length = subject.chars().count();
    if length <= 5 {
        return subject.to_string();
    }
    let stub: String = subject.chars().take(3).collect();
    format!("{}... ({} chars)", stub, length)
}

/// Domain half of an address, for log lines that must not carry the
/// local part
pub fn email_domain(email: &str) -> String {
    match email.rsplit_once('@') {
        Some((_, domain)) if !domain.is_empty() => domain.to_string(),
        _ => "unknown".to_string(),
    }
}
