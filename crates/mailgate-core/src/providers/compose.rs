/// MIME composition for raw dispatch
///
/// Both drivers hand providers a fully composed RFC 5322 message: SES via
/// `send_raw_email`, SMTP via `send_raw`. Safe-listed custom headers are
/// injected at the top of the header block after composition.
use super::RenderedEmail;
use crate::error::GatewayError;
use lettre::address::Envelope;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, Message, MultiPart, SinglePart};

fn parse_mailbox(addr: &str) -> Result<Mailbox, GatewayError> {
    addr.parse::<Mailbox>().map_err(|e| {
        GatewayError::InvalidEmail(format!(
            "Unparseable address {}: {}",
            crate::utils::redact::redact_email(addr),
            e
        ))
    })
}

fn parse_address(addr: &str) -> Result<lettre::Address, GatewayError> {
    addr.parse::<lettre::Address>().map_err(|e| {
        GatewayError::InvalidEmail(format!(
            "Unparseable address {}: {}",
            crate::utils::redact::redact_email(addr),
            e
        ))
    })
}

/// Builds the raw message bytes for a rendered email
pub fn compose_raw(email: &RenderedEmail) -> Result<Vec<u8>, GatewayError> {
    let mut builder = Message::builder()
        .from(parse_mailbox(&email.from)?)
        .to(parse_mailbox(&email.to)?)
        .subject(email.subject.clone());
    for cc in &email.cc {
        builder = builder.cc(parse_mailbox(cc)?);
    }
    for bcc in &email.bcc {
        builder = builder.bcc(parse_mailbox(bcc)?);
    }
    if let Some(reply_to) = &email.reply_to {
        builder = builder.reply_to(parse_mailbox(reply_to)?);
    }

    let message = if email.attachments.is_empty() {
        builder
            .header(ContentType::TEXT_HTML)
            .body(email.html.clone())
    } else {
        let mut multipart = MultiPart::mixed().singlepart(SinglePart::html(email.html.clone()));
        for (meta, content) in &email.attachments {
            let content_type = ContentType::parse(&meta.content_type).map_err(|e| {
                GatewayError::Validation(format!(
                    "Bad attachment content type {}: {}",
                    meta.content_type, e
                ))
            })?;
            multipart = multipart.singlepart(
                Attachment::new(meta.filename.clone()).body(content.clone(), content_type),
            );
        }
        builder.multipart(multipart)
    }
    .map_err(|e| GatewayError::InvalidTemplate(format!("Message composition failed: {}", e)))?;

    Ok(inject_headers(message.formatted(), &email.headers))
}

/// SMTP envelope (return path + recipients) for the same message
pub fn build_envelope(email: &RenderedEmail) -> Result<Envelope, GatewayError> {
    let recipients = email
        .all_recipients()
        .iter()
        .map(|r| parse_address(r))
        .collect::<Result<Vec<_>, _>>()?;
    Envelope::new(Some(parse_address(&email.from)?), recipients)
        .map_err(|e| GatewayError::InvalidEmail(format!("Envelope build failed: {}", e)))
}

/// Prepends already-validated safe-list headers to the header block.
/// Values were CR/LF-checked at ingestion; this is a plain byte splice.
fn inject_headers(raw: Vec<u8>, headers: &[(String, String)]) -> Vec<u8> {
    if headers.is_empty() {
        return raw;
    }
    let mut out = Vec::with_capacity(raw.len() + headers.len() * 64);
    for (name, value) in headers {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(&raw);
    out
}
