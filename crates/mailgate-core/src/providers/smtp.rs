/// SMTP dispatch driver (secondary plug-in)
///
/// Classification follows SMTP reply classes: 4xx responses are
/// retryable, 5xx are permanent.
use super::compose::{build_envelope, compose_raw};
use super::{ProviderDriver, RenderedEmail, SendOutcome, SendQuota};
use crate::error::GatewayError;
use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::info;
use uuid::Uuid;

pub struct SmtpProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
}

impl SmtpProvider {
    pub fn new(host: &str, username: &str, password: &str) -> Result<Self, GatewayError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| GatewayError::ProviderConfig(format!("SMTP relay setup failed: {}", e)))?
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .build();
        Ok(Self {
            transport,
            host: host.to_string(),
        })
    }
}

fn classify_smtp_failure(e: &lettre::transport::smtp::Error) -> GatewayError {
    if e.is_permanent() {
        // 5xx
        GatewayError::ProviderMessageRejected(format!("SMTP permanent failure: {}", e))
    } else if e.is_transient() {
        // 4xx
        GatewayError::ProviderUnavailable(format!("SMTP transient failure: {}", e))
    } else if e.is_timeout() {
        GatewayError::ProviderTimeout(format!("SMTP timeout: {}", e))
    } else {
        GatewayError::Network(format!("SMTP connection failure: {}", e))
    }
}

#[async_trait]
impl ProviderDriver for SmtpProvider {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, email: &RenderedEmail) -> Result<SendOutcome, GatewayError> {
        let raw = compose_raw(email)?;
        let envelope = build_envelope(email)?;

        let response = self
            .transport
            .send_raw(&envelope, &raw)
            .await
            .map_err(|e| classify_smtp_failure(&e))?;

        // SMTP has no provider message id; synthesize one from the reply
        let provider_message_id = response
            .message()
            .next()
            .and_then(|line| line.split_whitespace().last())
            .filter(|token| !token.is_empty())
            .map(|token| token.to_string())
            .unwrap_or_else(|| format!("smtp-{}", Uuid::new_v4()));

        info!(
            provider = "smtp",
            host = %self.host,
            to_domain = %crate::utils::redact::email_domain(&email.to),
            "Dispatched email via SMTP"
        );
        Ok(SendOutcome {
            provider_message_id,
        })
    }

    async fn verify_connection(&self) -> Result<(), GatewayError> {
        let ok = self
            .transport
            .test_connection()
            .await
            .map_err(|e| classify_smtp_failure(&e))?;
        if ok {
            Ok(())
        } else {
            Err(GatewayError::ProviderUnavailable(format!(
                "SMTP connection test to {} failed",
                self.host
            )))
        }
    }

    async fn get_quota(&self) -> Result<SendQuota, GatewayError> {
        // SMTP relays publish no quota API; report unlimited and let the
        // token bucket enforce the configured rate
        Ok(SendQuota {
            max_24_hour_send: f64::INFINITY,
            max_send_rate: f64::INFINITY,
            sent_last_24_hours: 0.0,
        })
    }
}
