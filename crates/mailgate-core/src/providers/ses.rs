/// AWS SES dispatch driver (primary)
use super::compose::compose_raw;
use super::{ProviderDriver, RenderedEmail, SendOutcome, SendQuota};
use crate::error::GatewayError;
use async_trait::async_trait;
use tracing::info;

pub struct SesProvider {
    client: aws_sdk_ses::Client,
}

impl SesProvider {
    pub fn new(client: aws_sdk_ses::Client) -> Self {
        Self { client }
    }
}

/// Maps an SES failure onto the retry taxonomy. SES reports errors as
/// coded exceptions; the code names are stable API surface.
pub fn classify_ses_failure(detail: &str) -> GatewayError {
    let d = detail;
    if d.contains("MessageRejected") {
        GatewayError::ProviderMessageRejected(d.to_string())
    } else if d.contains("AccountSendingPaused") || d.contains("ConfigurationSetSendingPaused") {
        GatewayError::ProviderMessageRejected(d.to_string())
    } else if d.contains("MailFromDomainNotVerified") || d.contains("ConfigurationSetDoesNotExist")
    {
        GatewayError::ProviderConfig(d.to_string())
    } else if d.contains("Throttling") || d.contains("TooManyRequests") {
        GatewayError::ProviderThrottling(d.to_string())
    } else if d.contains("quota") || d.contains("LimitExceeded") {
        GatewayError::QuotaExceeded(d.to_string())
    } else if d.contains("ServiceUnavailable") || d.contains("InternalFailure") {
        GatewayError::ProviderUnavailable(d.to_string())
    } else if d.contains("timed out") || d.contains("timeout") {
        GatewayError::ProviderTimeout(d.to_string())
    } else if d.contains("dispatch failure") || d.contains("connector") || d.contains("connection")
    {
        GatewayError::Network(d.to_string())
    } else {
        GatewayError::Unknown(d.to_string())
    }
}

#[async_trait]
impl ProviderDriver for SesProvider {
    fn name(&self) -> &str {
        "ses"
    }

    async fn send(&self, email: &RenderedEmail) -> Result<SendOutcome, GatewayError> {
        use aws_sdk_ses::primitives::Blob;

        let raw = compose_raw(email)?;
        let raw_message = aws_sdk_ses::types::RawMessage::builder()
            .data(Blob::new(raw))
            .build()
            .map_err(|e| GatewayError::Unknown(format!("Failed to build raw message: {}", e)))?;

        let response = self
            .client
            .send_raw_email()
            .raw_message(raw_message)
            .source(&email.from)
            .set_destinations(Some(email.all_recipients()))
            .send()
            .await
            .map_err(|e| {
                classify_ses_failure(&aws_sdk_ses::error::DisplayErrorContext(&e).to_string())
            })?;

        let message_id = response.message_id;
        info!(
            provider = "ses",
            message_id = %message_id,
            to_domain = %crate::utils::redact::email_domain(&email.to),
            "Dispatched email via SES"
        );
        Ok(SendOutcome {
            provider_message_id: message_id,
        })
    }

    async fn verify_connection(&self) -> Result<(), GatewayError> {
        self.get_quota().await.map(|_| ())
    }

    async fn get_quota(&self) -> Result<SendQuota, GatewayError> {
        let response = self.client.get_send_quota().send().await.map_err(|e| {
            classify_ses_failure(&aws_sdk_ses::error::DisplayErrorContext(&e).to_string())
        })?;
        Ok(SendQuota {
            max_24_hour_send: response.max24_hour_send(),
            max_send_rate: response.max_send_rate(),
            sent_last_24_hours: response.sent_last24_hours(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn test_permanent_codes() {
        let err = classify_ses_failure("MessageRejected: Email address is not verified");
        assert!(matches!(err, GatewayError::ProviderMessageRejected(_)));
        assert!(!err.is_retryable());

        let paused = classify_ses_failure("AccountSendingPausedException");
        assert!(!paused.is_retryable());
    }

    #[test]
    fn test_configuration_codes() {
        let err = classify_ses_failure("MailFromDomainNotVerifiedException: domain pending");
        assert!(matches!(err, GatewayError::ProviderConfig(_)));
        assert_eq!(err.category(), ErrorCategory::ConfigurationError);
    }

    #[test]
    fn test_quota_codes_retryable() {
        let throttled = classify_ses_failure("Throttling: Maximum sending rate exceeded");
        assert_eq!(throttled.category(), ErrorCategory::QuotaError);
        assert!(throttled.is_retryable());

        let quota = classify_ses_failure("Daily message quota exceeded");
        assert!(quota.is_retryable());
    }

    #[test]
    fn test_transient_and_timeout() {
        assert_eq!(
            classify_ses_failure("ServiceUnavailable").category(),
            ErrorCategory::TransientError
        );
        assert_eq!(
            classify_ses_failure("request timed out").category(),
            ErrorCategory::TimeoutError
        );
        assert_eq!(
            classify_ses_failure("dispatch failure: connector error").category(),
            ErrorCategory::TransientError
        );
    }

    #[test]
    fn test_unknown_retried_with_logging() {
        let err = classify_ses_failure("SomethingNew");
        assert!(matches!(err, GatewayError::Unknown(_)));
        assert!(err.is_retryable());
    }
}
