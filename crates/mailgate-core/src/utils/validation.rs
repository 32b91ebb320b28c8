/// Input validation for the ingestion contract
use crate::constants::*;
use crate::error::GatewayError;
use regex::Regex;
use uuid::Uuid;

lazy_static::lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$"
    ).unwrap();
}

pub fn validate_email_address(email: &str) -> Result<(), GatewayError> {
    if email.len() > MAX_EMAIL_ADDRESS_LENGTH {
        return Err(GatewayError::InvalidEmail(format!(
            "Address exceeds {} characters",
            MAX_EMAIL_ADDRESS_LENGTH
        )));
    }
    if EMAIL_REGEX.is_match(email) {
        Ok(())
    } else {
        Err(GatewayError::InvalidEmail(format!(
            "Invalid email address: {}",
            crate::utils::redact::redact_email(email)
        )))
    }
}

pub fn validate_subject(subject: &str) -> Result<(), GatewayError> {
    let len = subject.chars().count();
    if len < MIN_SUBJECT_LENGTH || len > MAX_SUBJECT_LENGTH {
        return Err(GatewayError::Validation(format!(
            "Subject must be {}..={} characters, got {}",
            MIN_SUBJECT_LENGTH, MAX_SUBJECT_LENGTH, len
        )));
    }
    if subject.contains('\r') || subject.contains('\n') {
        return Err(GatewayError::Validation(
            "Subject must not contain CR or LF".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_recipient_lists(cc: &[String], bcc: &[String]) -> Result<(), GatewayError> {
    if cc.len() > MAX_CC_RECIPIENTS {
        return Err(GatewayError::Validation(format!(
            "At most {} cc recipients allowed",
            MAX_CC_RECIPIENTS
        )));
    }
    if bcc.len() > MAX_CC_RECIPIENTS {
        return Err(GatewayError::Validation(format!(
            "At most {} bcc recipients allowed",
            MAX_CC_RECIPIENTS
        )));
    }
    for addr in cc.iter().chain(bcc.iter()) {
        validate_email_address(addr)?;
    }
    Ok(())
}

/// Only `X-Custom-*` and the explicit safe list pass through
pub fn validate_headers(headers: &[(String, String)]) -> Result<(), GatewayError> {
    if headers.len() > MAX_CUSTOM_HEADERS {
        return Err(GatewayError::Validation(format!(
            "At most {} custom headers allowed",
            MAX_CUSTOM_HEADERS
        )));
    }
    for (name, value) in headers {
        let allowed = name.starts_with(SAFE_HEADER_PREFIX)
            || SAFE_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name));
        if !allowed {
            return Err(GatewayError::Validation(format!(
                "Header not in safe list: {}",
                name
            )));
        }
        if value.len() > MAX_HEADER_VALUE_LENGTH {
            return Err(GatewayError::Validation(format!(
                "Header value for {} exceeds {} characters",
                name, MAX_HEADER_VALUE_LENGTH
            )));
        }
        if value.contains('\r') || value.contains('\n') {
            return Err(GatewayError::Validation(format!(
                "Header value for {} must not contain CR or LF",
                name
            )));
        }
    }
    Ok(())
}

pub fn validate_tags(tags: &[String]) -> Result<(), GatewayError> {
    if tags.len() > MAX_TAGS {
        return Err(GatewayError::Validation(format!(
            "At most {} tags allowed",
            MAX_TAGS
        )));
    }
    for tag in tags {
        if tag.is_empty() || tag.len() > MAX_TAG_LENGTH {
            return Err(GatewayError::Validation(format!(
                "Tags must be 1..={} characters",
                MAX_TAG_LENGTH
            )));
        }
    }
    Ok(())
}

pub fn validate_html_size(html: &str) -> Result<(), GatewayError> {
    if html.len() > MAX_HTML_BYTES {
        return Err(GatewayError::InvalidTemplate(format!(
            "HTML exceeds {} bytes",
            MAX_HTML_BYTES
        )));
    }
    Ok(())
}

/// Attachment admission: allow-listed MIME type, per-file and total bounds
pub fn validate_attachments(
    attachments: &[crate::models::AttachmentMeta],
) -> Result<(), GatewayError> {
    if attachments.len() > MAX_ATTACHMENTS_PER_EMAIL {
        return Err(GatewayError::Validation(format!(
            "At most {} attachments allowed",
            MAX_ATTACHMENTS_PER_EMAIL
        )));
    }
    let mut total = 0usize;
    for att in attachments {
        let parsed: mime::Mime = att.content_type.parse().map_err(|_| {
            GatewayError::Validation(format!(
                "Attachment type is not a MIME type: {}",
                att.content_type
            ))
        })?;
        if !ALLOWED_ATTACHMENT_TYPES
            .iter()
            .any(|t| t.eq_ignore_ascii_case(parsed.essence_str()))
        {
            return Err(GatewayError::Validation(format!(
                "Attachment type not allowed: {}",
                att.content_type
            )));
        }
        if att.size > MAX_ATTACHMENT_SIZE_BYTES {
            return Err(GatewayError::Validation(format!(
                "Attachment {} exceeds {} bytes",
                att.filename, MAX_ATTACHMENT_SIZE_BYTES
            )));
        }
        total += att.size;
    }
    if total > MAX_TOTAL_ATTACHMENT_BYTES {
        return Err(GatewayError::Validation(format!(
            "Attachments exceed {} bytes total",
            MAX_TOTAL_ATTACHMENT_BYTES
        )));
    }
    Ok(())
}

/// Ids are UUIDs everywhere; enforced here rather than trusted downstream
pub fn parse_uuid(value: &str, field: &str) -> Result<Uuid, GatewayError> {
    Uuid::parse_str(value)
        .map_err(|_| GatewayError::Validation(format!("{} must be a UUID", field)))
}
