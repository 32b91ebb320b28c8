/// Application constants
///
/// This module contains all hardcoded values used throughout the gateway.
/// Constants are organized by category for easy maintenance.
// ============================================================================
// Message Format Constants
// ============================================================================
/// Envelope protocol version for queued jobs
pub const ENVELOPE_VERSION: &str = "1.0";

/// Source identifier stamped on every audit and queue record
pub const SOURCE_NAME: &str = "mailgate";

// ============================================================================
// Queue Defaults
// ============================================================================

/// Default queue name
pub const DEFAULT_QUEUE_NAME: &str = "email:send";

/// Job time-to-live from enqueue; expired jobs move to the DLQ
pub const JOB_TTL_SECONDS: i64 = 24 * 60 * 60;

/// Default job priority (1 = most urgent .. 10 = least)
pub const DEFAULT_PRIORITY: u8 = 5;

/// Most urgent priority
pub const MIN_PRIORITY: u8 = 1;

/// Least urgent priority
pub const MAX_PRIORITY: u8 = 10;

/// Consecutive jobs a worker may take from one tenant before yielding
pub const MAX_JOBS_PER_TENANT_BATCH: u32 = 3;

/// Visibility lease for a claimed job; extended while processing
pub const JOB_LEASE_SECONDS: u64 = 60;

/// Upper bound on queued jobs held by the in-memory queue before it
/// refuses writes (never evicts)
pub const QUEUE_CAPACITY: usize = 100_000;

/// Maximum serialized job envelope size
pub const MAX_ENVELOPE_BYTES: usize = 64 * 1024;

// ============================================================================
// Retry / DLQ Configuration
// ============================================================================

/// Maximum delivery attempts before DLQ promotion
pub const MAX_ATTEMPTS: u32 = 5;

/// Base delay for exponential backoff in milliseconds
pub const BASE_DELAY_MS: u64 = 1000;

/// Maximum delay for exponential backoff in milliseconds
pub const MAX_DELAY_MS: u64 = 60_000;

/// Jitter factor for retry delays (0.0 to 1.0)
pub const JITTER_FACTOR: f64 = 0.25;

/// DLQ entry time-to-live (7 days)
pub const DLQ_TTL_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// DLQ capacity; older entries beyond the cap are archived externally
pub const DLQ_MAX_ENTRIES: usize = 10_000;

/// Delay between re-enqueued jobs during DLQ replay
pub const REPLAY_DELAY_MS: u64 = 1000;

/// Consecutive replay failures before the replay tool aborts
pub const REPLAY_CIRCUIT_THRESHOLD: u32 = 5;

// ============================================================================
// Worker Runtime
// ============================================================================

/// In-flight jobs per worker process
pub const WORKER_CONCURRENCY: usize = 16;

/// Per-job validation timeout
pub const VALIDATE_TIMEOUT_SECONDS: u64 = 5;

/// Per-call provider dispatch timeout
pub const PROVIDER_SEND_TIMEOUT_MS: u64 = 30_000;

/// Grace window the worker waits for in-flight jobs on shutdown
pub const DRAIN_TIMEOUT_SECONDS: u64 = 30;

/// Age after which a PENDING outbox row is eligible for sweeper re-enqueue
pub const SWEEPER_PENDING_GRACE_SECONDS: i64 = 60;

/// Sweeper loop interval
pub const SWEEPER_INTERVAL_SECONDS: u64 = 30;

// ============================================================================
// Provider Guard Rails
// ============================================================================

/// Consecutive transient/timeout failures before a circuit opens
pub const PROVIDER_CIRCUIT_OPEN_THRESHOLD: u32 = 5;

/// Cool-down before an open circuit allows a half-open probe
pub const PROVIDER_CIRCUIT_COOLDOWN_MS: u64 = 30_000;

/// Default provider send rate (emails per second) for the token bucket;
/// actual limit should come from the provider's published quota
pub const PROVIDER_DEFAULT_SEND_RATE: f64 = 14.0;

// ============================================================================
// Ingestion Limits
// ============================================================================

/// Maximum request body size (1 MiB)
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Maximum sanitized HTML size (1 MiB)
pub const MAX_HTML_BYTES: usize = 1024 * 1024;

/// HTML above this size is stored out of line and referenced by handle
pub const HTML_INLINE_THRESHOLD_BYTES: usize = 64 * 1024;

/// Maximum e-mail address length
pub const MAX_EMAIL_ADDRESS_LENGTH: usize = 254;

/// Subject length bounds
pub const MIN_SUBJECT_LENGTH: usize = 1;
pub const MAX_SUBJECT_LENGTH: usize = 150;

/// Maximum cc / bcc entries each
pub const MAX_CC_RECIPIENTS: usize = 5;

/// Maximum custom headers, and maximum header value length
pub const MAX_CUSTOM_HEADERS: usize = 10;
pub const MAX_HEADER_VALUE_LENGTH: usize = 256;

/// Maximum tags per email and tag length
pub const MAX_TAGS: usize = 5;
pub const MAX_TAG_LENGTH: usize = 32;

/// Attachment limits
pub const MAX_ATTACHMENTS_PER_EMAIL: usize = 10;
pub const MAX_ATTACHMENT_SIZE_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_TOTAL_ATTACHMENT_BYTES: usize = 40 * 1024 * 1024;

/// Header names accepted from clients (prefix match for `X-Custom-`)
pub const SAFE_HEADER_PREFIX: &str = "X-Custom-";
pub const SAFE_HEADERS: &[&str] = &["X-Priority"];

/// Attachment MIME types accepted at ingestion
pub const ALLOWED_ATTACHMENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "application/zip",
    "application/gzip",
    "application/x-7z-compressed",
    "text/plain",
    "text/csv",
];

// ============================================================================
// Idempotency
// ============================================================================

/// Idempotency key TTL; at least the longest retry horizon so DLQ-phase
/// re-submits behave deterministically (48 hours)
pub const IDEMPOTENCY_TTL_SECONDS: u64 = 48 * 60 * 60;

// ============================================================================
// Admission Defaults
// ============================================================================

/// Per-company request caps when the company record carries none
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;
pub const DEFAULT_REQUESTS_PER_HOUR: u32 = 1_000;
pub const DEFAULT_REQUESTS_PER_DAY: u32 = 10_000;

/// Per-company sending caps when the company record carries none
pub const DEFAULT_DAILY_EMAIL_CAP: u32 = 5_000;
pub const DEFAULT_MONTHLY_EMAIL_CAP: u32 = 100_000;

// ============================================================================
// Domain Verification
// ============================================================================

/// Consecutive successful probes required to mark a domain VERIFIED
pub const DOMAIN_VERIFY_SUCCESS_STREAK: u32 = 3;

/// Base interval between verification probes
pub const DOMAIN_PROBE_BASE_SECONDS: u64 = 60;

/// Maximum probe backoff while a domain sits in TEMPORARY_FAILURE
pub const DOMAIN_PROBE_MAX_SECONDS: u64 = 3600;

// ============================================================================
// Break-glass & Audit
// ============================================================================

/// Minimum justification length for a break-glass session
pub const BREAK_GLASS_MIN_JUSTIFICATION: usize = 20;

/// Maximum break-glass session lifetime
pub const BREAK_GLASS_SESSION_SECONDS: u64 = 60 * 60;

/// Operator profile allowed to open break-glass sessions
pub const PROFILE_AUDIT: &str = "audit";

/// Default operator profile; sees masked values only
pub const PROFILE_OPERATIONS: &str = "operations";

// ============================================================================
// Retention
// ============================================================================

/// Minimum retention for email logs and events (days)
pub const LOG_RETENTION_DAYS: i64 = 90;

/// Minimum retention for outbox rows (days)
pub const OUTBOX_RETENTION_DAYS: i64 = 180;

// ============================================================================
// Pagination
// ============================================================================

/// Default and maximum page sizes for list endpoints
pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

// ============================================================================
// Error Reason Bounds
// ============================================================================

/// Maximum stored failure-reason length
pub const MAX_ERROR_REASON_LENGTH: usize = 500;

// ============================================================================
// Logging & Monitoring
// ============================================================================

/// Metric namespace for CloudWatch
pub const METRICS_NAMESPACE: &str = "Mailgate";

/// Log target for audit events
pub const LOG_TARGET_AUDIT: &str = "audit";
