/// Error types for the Mailgate gateway
///
/// Errors are values: every variant carries the taxonomy code, category,
/// retryability and HTTP status as methods, so the ingestion API, the
/// worker pipeline and the DLQ all make decisions off the same taxonomy.
use thiserror::Error;

/// Classification driving the retry decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    ValidationError,
    PermanentError,
    ConfigurationError,
    QuotaError,
    TransientError,
    TimeoutError,
}

impl ErrorCategory {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::QuotaError | Self::TransientError | Self::TimeoutError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::PermanentError => "PERMANENT_ERROR",
            Self::ConfigurationError => "CONFIGURATION_ERROR",
            Self::QuotaError => "QUOTA_ERROR",
            Self::TransientError => "TRANSIENT_ERROR",
            Self::TimeoutError => "TIMEOUT_ERROR",
        }
    }
}

#[derive(Error, Debug)]
pub enum GatewayError {
    // -- client-visible ingestion errors -------------------------------------
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Idempotency conflict: {0}")]
    Conflict(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    // -- worker-only failures ------------------------------------------------
    #[error("Outbox row not found: {0}")]
    OutboxNotFound(String),

    #[error("Recipient not found: {0}")]
    RecipientNotFound(String),

    #[error("Recipient suppressed: {0}")]
    RecipientSuppressed(String),

    #[error("Sending domain not verified: {0}")]
    DomainNotVerified(String),

    // -- provider outcomes ---------------------------------------------------
    #[error("Provider rejected message: {0}")]
    ProviderMessageRejected(String),

    #[error("Provider configuration error: {0}")]
    ProviderConfig(String),

    #[error("Provider throttling: {0}")]
    ProviderThrottling(String),

    #[error("Provider quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider timeout: {0}")]
    ProviderTimeout(String),

    #[error("Provider circuit open: {0}")]
    ProviderCircuitOpen(String),

    // -- infrastructure ------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Queue refused write (memory pressure): {0}")]
    QueueFull(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl GatewayError {
    /// Stable taxonomy code recorded in logs, events, and error envelopes
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::InvalidEmail(_) => "INVALID_EMAIL",
            Self::InvalidTemplate(_) => "INVALID_TEMPLATE",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Conflict(_) => "CONFLICT",
            Self::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            Self::RateLimitExceeded(_) => "RATE_LIMIT_EXCEEDED",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::OutboxNotFound(_) => "OUTBOX_NOT_FOUND",
            Self::RecipientNotFound(_) => "RECIPIENT_NOT_FOUND",
            Self::RecipientSuppressed(_) => "RECIPIENT_SUPPRESSED",
            Self::DomainNotVerified(_) => "DOMAIN_NOT_VERIFIED",
            Self::ProviderMessageRejected(_) => "PROVIDER_MESSAGE_REJECTED",
            Self::ProviderConfig(_) => "PROVIDER_CONFIG_ERROR",
            Self::ProviderThrottling(_) => "PROVIDER_THROTTLING",
            Self::QuotaExceeded(_) => "QUOTA_EXCEEDED",
            Self::ProviderUnavailable(_) => "PROVIDER_SERVICE_UNAVAILABLE",
            Self::Network(_) => "NETWORK_ERROR",
            Self::ProviderTimeout(_) => "PROVIDER_TIMEOUT",
            Self::ProviderCircuitOpen(_) => "PROVIDER_CIRCUIT_OPEN",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Queue(_) => "QUEUE_ERROR",
            Self::QueueFull(_) => "QUEUE_FULL",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Crypto(_) => "CRYPTO_ERROR",
            Self::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// Category feeding the retry decision table
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_)
            | Self::InvalidPayload(_)
            | Self::InvalidEmail(_)
            | Self::InvalidTemplate(_)
            | Self::Unauthorized(_)
            | Self::Forbidden(_)
            | Self::Conflict(_)
            | Self::PayloadTooLarge(_)
            | Self::RateLimitExceeded(_)
            | Self::OutboxNotFound(_)
            | Self::RecipientNotFound(_) => ErrorCategory::ValidationError,

            Self::RecipientSuppressed(_) | Self::ProviderMessageRejected(_) => {
                ErrorCategory::PermanentError
            }

            Self::DomainNotVerified(_) | Self::ProviderConfig(_) | Self::Config(_) => {
                ErrorCategory::ConfigurationError
            }

            Self::ProviderThrottling(_) | Self::QuotaExceeded(_) => ErrorCategory::QuotaError,

            Self::ServiceUnavailable(_)
            | Self::ProviderUnavailable(_)
            | Self::Network(_)
            | Self::ProviderCircuitOpen(_)
            | Self::Storage(_)
            | Self::Queue(_)
            | Self::QueueFull(_)
            | Self::Crypto(_) => ErrorCategory::TransientError,

            Self::ProviderTimeout(_) => ErrorCategory::TimeoutError,

            // UNKNOWN is treated as transient (retried) with extra logging
            Self::Unknown(_) => ErrorCategory::TransientError,
        }
    }

    /// Whether a failed dispatch attempt should be retried
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// HTTP status for errors that surface synchronously to clients
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_)
            | Self::InvalidPayload(_)
            | Self::InvalidEmail(_)
            | Self::InvalidTemplate(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) | Self::DomainNotVerified(_) | Self::RecipientSuppressed(_) => 403,
            Self::Conflict(_) => 409,
            Self::OutboxNotFound(_) | Self::RecipientNotFound(_) => 404,
            Self::PayloadTooLarge(_) => 413,
            Self::RateLimitExceeded(_) => 429,
            Self::ServiceUnavailable(_) | Self::QueueFull(_) => 503,
            _ => 500,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

impl From<std::env::VarError> for GatewayError {
    fn from(err: std::env::VarError) -> Self {
        Self::Config(err.to_string())
    }
}
