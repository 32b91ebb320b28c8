/// Environment-driven configuration
///
/// Every recognized option has a default from `constants`; binaries read
/// the environment once at startup and pass the typed structs down.
use crate::constants::*;
use crate::error::GatewayError;
use std::time::Duration;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, GatewayError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| GatewayError::Config(format!("Invalid value for {}: {}", name, raw))),
        Err(_) => Ok(default),
    }
}

fn env_required(name: &str) -> Result<String, GatewayError> {
    std::env::var(name).map_err(|_| GatewayError::Config(format!("Missing {}", name)))
}

/// Queue and retry tuning
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub queue_name: String,
    pub concurrency: usize,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
    pub dlq_ttl_ms: u64,
    pub dlq_max_entries: usize,
    pub max_jobs_per_tenant_batch: u32,
    pub job_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            concurrency: WORKER_CONCURRENCY,
            max_attempts: MAX_ATTEMPTS,
            base_delay_ms: BASE_DELAY_MS,
            max_delay_ms: MAX_DELAY_MS,
            jitter_factor: JITTER_FACTOR,
            dlq_ttl_ms: DLQ_TTL_MS,
            dlq_max_entries: DLQ_MAX_ENTRIES,
            max_jobs_per_tenant_batch: MAX_JOBS_PER_TENANT_BATCH,
            job_ttl: Duration::from_secs(JOB_TTL_SECONDS as u64),
        }
    }
}

impl QueueConfig {
    pub fn from_env() -> Result<Self, GatewayError> {
        let defaults = Self::default();
        Ok(Self {
            queue_name: env_or("QUEUE_NAME", defaults.queue_name)?,
            concurrency: env_or("QUEUE_CONCURRENCY", defaults.concurrency)?,
            max_attempts: env_or("MAX_ATTEMPTS", defaults.max_attempts)?,
            base_delay_ms: env_or("BASE_DELAY_MS", defaults.base_delay_ms)?,
            max_delay_ms: env_or("MAX_DELAY_MS", defaults.max_delay_ms)?,
            jitter_factor: env_or("JITTER_FACTOR", defaults.jitter_factor)?,
            dlq_ttl_ms: env_or("DLQ_TTL_MS", defaults.dlq_ttl_ms)?,
            dlq_max_entries: env_or("DLQ_MAX_SIZE", defaults.dlq_max_entries)?,
            max_jobs_per_tenant_batch: env_or(
                "MAX_JOBS_PER_TENANT_BATCH",
                defaults.max_jobs_per_tenant_batch,
            )?,
            job_ttl: defaults.job_ttl,
        })
    }
}

/// Provider guard-rail tuning
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub send_timeout: Duration,
    pub circuit_open_threshold: u32,
    pub circuit_cooldown: Duration,
    pub send_rate_per_second: f64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_millis(PROVIDER_SEND_TIMEOUT_MS),
            circuit_open_threshold: PROVIDER_CIRCUIT_OPEN_THRESHOLD,
            circuit_cooldown: Duration::from_millis(PROVIDER_CIRCUIT_COOLDOWN_MS),
            send_rate_per_second: PROVIDER_DEFAULT_SEND_RATE,
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Result<Self, GatewayError> {
        let defaults = Self::default();
        Ok(Self {
            send_timeout: Duration::from_millis(env_or(
                "PROVIDER_SEND_TIMEOUT_MS",
                defaults.send_timeout.as_millis() as u64,
            )?),
            circuit_open_threshold: env_or(
                "PROVIDER_CIRCUIT_OPEN_THRESHOLD",
                defaults.circuit_open_threshold,
            )?,
            circuit_cooldown: Duration::from_millis(env_or(
                "PROVIDER_CIRCUIT_COOLDOWN_MS",
                defaults.circuit_cooldown.as_millis() as u64,
            )?),
            send_rate_per_second: env_or(
                "PROVIDER_SEND_RATE_PER_SECOND",
                defaults.send_rate_per_second,
            )?,
        })
    }
}

/// Names of the backing AWS resources
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub outbox_table: String,
    pub events_table: String,
    pub logs_table: String,
    pub idempotency_table: String,
    pub companies_table: String,
    pub recipients_table: String,
    pub domains_table: String,
    pub suppression_table: String,
    pub dlq_table: String,
    pub counters_table: String,
    pub audit_table: String,
    pub queue_url: String,
    pub body_bucket: String,
    pub dlq_archive_bucket: Option<String>,
    pub kms_key_id: String,
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, GatewayError> {
        Ok(Self {
            outbox_table: env_or("OUTBOX_TABLE", "email_outbox".to_string())?,
            events_table: env_or("EVENTS_TABLE", "email_events".to_string())?,
            logs_table: env_or("LOGS_TABLE", "email_logs".to_string())?,
            idempotency_table: env_or("IDEMPOTENCY_TABLE", "idempotency_keys".to_string())?,
            companies_table: env_or("COMPANIES_TABLE", "companies".to_string())?,
            recipients_table: env_or("RECIPIENTS_TABLE", "recipients".to_string())?,
            domains_table: env_or("DOMAINS_TABLE", "domains".to_string())?,
            suppression_table: env_or("SUPPRESSION_TABLE", "suppression_entries".to_string())?,
            dlq_table: env_or("DLQ_TABLE", "dlq_entries".to_string())?,
            counters_table: env_or("COUNTERS_TABLE", "admission_counters".to_string())?,
            audit_table: env_or("AUDIT_TABLE", "audit_events".to_string())?,
            queue_url: env_required("QUEUE_URL")?,
            body_bucket: env_required("BODY_BUCKET")?,
            dlq_archive_bucket: std::env::var("DLQ_ARCHIVE_BUCKET").ok(),
            kms_key_id: env_required("KMS_KEY_ID")?,
        })
    }
}

/// Retention horizons; the sweeper pseudonymizes PII past these
#[derive(Debug, Clone, Copy)]
pub struct RetentionConfig {
    pub outbox_days: i64,
    pub logs_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            outbox_days: OUTBOX_RETENTION_DAYS,
            logs_days: LOG_RETENTION_DAYS,
        }
    }
}

impl RetentionConfig {
    pub fn from_env() -> Result<Self, GatewayError> {
        let defaults = Self::default();
        Ok(Self {
            outbox_days: env_or("RETENTION_OUTBOX_DAYS", defaults.outbox_days)?,
            logs_days: env_or("RETENTION_LOGS_DAYS", defaults.logs_days)?,
        })
    }
}

/// Security material shared by the API and worker
#[derive(Clone)]
pub struct SecurityConfig {
    /// HMAC key for API-key and fiscal-identifier hashing
    pub hash_key: secrecy::SecretString,
    /// HS256 signing secret for break-glass session tokens
    pub break_glass_secret: secrecy::SecretString,
}

impl SecurityConfig {
    pub fn from_env() -> Result<Self, GatewayError> {
        Ok(Self {
            hash_key: secrecy::SecretString::from(env_required("HASH_KEY")?),
            break_glass_secret: secrecy::SecretString::from(env_required("BREAK_GLASS_SECRET")?),
        })
    }
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig").finish_non_exhaustive()
    }
}
