/// API context - shared state for all handlers
///
/// The service graph is constructed explicitly here; handlers depend on
/// the traits, never on concrete clients.
use mailgate_core::config::{ProviderConfig, QueueConfig, SecurityConfig, StorageConfig};
use mailgate_core::error::GatewayError;
use mailgate_core::services::admission::{AdmissionControl, DynamoDbCounterStore};
use mailgate_core::services::audit::{AuditLog, BreakGlass, DynamoDbAuditLog};
use mailgate_core::services::body_store::{BodyStore, S3BodyStore};
use mailgate_core::services::companies::{CompanyStore, DynamoDbCompanyStore};
use mailgate_core::services::dlq::{DlqStore, DynamoDbDlqStore};
use mailgate_core::services::domains::{
    DomainStore, DomainVerifier, DynamoDbDomainStore, SesDomainVerifier,
};
use mailgate_core::services::idempotency::{DynamoDbIdempotencyStore, IdempotencyStore};
use mailgate_core::services::metrics::{CloudWatchMetricsService, MetricsService};
use mailgate_core::services::outbox::{DynamoDbOutboxStore, OutboxStore};
use mailgate_core::services::queue::{JobQueue, SqsJobQueue};
use mailgate_core::services::recipients::{DynamoDbRecipientStore, RecipientStore};
use mailgate_core::services::secrets::{FiscalCipher, KmsFiscalCipher};
use mailgate_core::services::suppression::{DynamoDbSuppressionList, SuppressionList};
use std::sync::Arc;

pub struct ApiContext {
    pub outbox: Arc<dyn OutboxStore>,
    pub queue: Arc<dyn JobQueue>,
    pub dlq: Arc<dyn DlqStore>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    pub companies: Arc<dyn CompanyStore>,
    pub recipients: Arc<dyn RecipientStore>,
    pub domains: Arc<dyn DomainStore>,
    pub domain_verifier: Arc<dyn DomainVerifier>,
    pub suppression: Arc<dyn SuppressionList>,
    pub admission: Arc<AdmissionControl>,
    pub body_store: Arc<dyn BodyStore>,
    pub cipher: Arc<dyn FiscalCipher>,
    pub audit: Arc<dyn AuditLog>,
    pub break_glass: Arc<BreakGlass>,
    pub metrics: Arc<dyn MetricsService>,
    pub security: SecurityConfig,
    pub queue_config: QueueConfig,
}

impl ApiContext {
    pub async fn from_env() -> Result<Arc<Self>, GatewayError> {
        let aws_config = aws_config::load_from_env().await;
        let dynamodb = aws_sdk_dynamodb::Client::new(&aws_config);
        let sqs = aws_sdk_sqs::Client::new(&aws_config);
        let ses = aws_sdk_ses::Client::new(&aws_config);
        let s3 = aws_sdk_s3::Client::new(&aws_config);
        let kms = aws_sdk_kms::Client::new(&aws_config);
        let cloudwatch = aws_sdk_cloudwatch::Client::new(&aws_config);

        let storage = StorageConfig::from_env()?;
        let queue_config = QueueConfig::from_env()?;
        // provider guard tuning is worker-side; validated here so a bad
        // deployment fails at startup, not at dispatch
        let _provider = ProviderConfig::from_env()?;
        let security = SecurityConfig::from_env()?;

        Ok(Arc::new(Self {
            outbox: Arc::new(DynamoDbOutboxStore::new(
                dynamodb.clone(),
                storage.outbox_table.clone(),
                storage.events_table.clone(),
                storage.logs_table.clone(),
            )),
            queue: Arc::new(SqsJobQueue::new(sqs, storage.queue_url.clone())),
            dlq: Arc::new(DynamoDbDlqStore::new(
                dynamodb.clone(),
                s3.clone(),
                storage.dlq_table.clone(),
                storage.dlq_archive_bucket.clone(),
            )),
            idempotency: Arc::new(DynamoDbIdempotencyStore::new(
                dynamodb.clone(),
                storage.idempotency_table.clone(),
            )),
            companies: Arc::new(DynamoDbCompanyStore::new(
                dynamodb.clone(),
                storage.companies_table.clone(),
            )),
            recipients: Arc::new(DynamoDbRecipientStore::new(
                dynamodb.clone(),
                storage.recipients_table.clone(),
            )),
            domains: Arc::new(DynamoDbDomainStore::new(
                dynamodb.clone(),
                storage.domains_table.clone(),
            )),
            domain_verifier: Arc::new(SesDomainVerifier::new(ses)),
            suppression: Arc::new(DynamoDbSuppressionList::new(
                dynamodb.clone(),
                storage.suppression_table.clone(),
            )),
            admission: Arc::new(AdmissionControl::new(Arc::new(DynamoDbCounterStore::new(
                dynamodb.clone(),
                storage.counters_table.clone(),
            )))),
            body_store: Arc::new(S3BodyStore::new(s3, storage.body_bucket.clone())),
            cipher: Arc::new(KmsFiscalCipher::new(kms, storage.kms_key_id.clone())),
            audit: Arc::new(DynamoDbAuditLog::new(dynamodb, storage.audit_table.clone())),
            break_glass: Arc::new(BreakGlass::new(security.break_glass_secret.clone())),
            metrics: Arc::new(CloudWatchMetricsService::new(cloudwatch)),
            security,
            queue_config,
        }))
    }
}
