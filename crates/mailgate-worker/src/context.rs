/// Worker context - shared service graph for the dispatch pipeline
///
/// Constructed explicitly in `main` from the environment; tests assemble
/// one from in-memory implementations.
use mailgate_core::config::{
    ProviderConfig, QueueConfig, RetentionConfig, SecurityConfig, StorageConfig,
};
use mailgate_core::error::GatewayError;
use mailgate_core::providers::guard::GuardedProvider;
use mailgate_core::providers::ses::SesProvider;
use mailgate_core::providers::{ProviderBinding, ProviderRouter};
use mailgate_core::services::admission::{AdmissionControl, DynamoDbCounterStore};
use mailgate_core::services::body_store::{BodyStore, S3BodyStore};
use mailgate_core::services::companies::{CompanyStore, DynamoDbCompanyStore};
use mailgate_core::services::dlq::{DlqStore, DynamoDbDlqStore};
use mailgate_core::services::domains::{DomainStore, DynamoDbDomainStore};
use mailgate_core::services::metrics::{CloudWatchMetricsService, MetricsService};
use mailgate_core::services::outbox::{DynamoDbOutboxStore, OutboxStore};
use mailgate_core::services::queue::{JobQueue, SqsJobQueue};
use mailgate_core::services::recipients::{DynamoDbRecipientStore, RecipientStore};
use mailgate_core::services::suppression::{DynamoDbSuppressionList, SuppressionList};
use std::sync::Arc;
use uuid::Uuid;

pub struct WorkerContext {
    pub outbox: Arc<dyn OutboxStore>,
    pub queue: Arc<dyn JobQueue>,
    pub dlq: Arc<dyn DlqStore>,
    pub companies: Arc<dyn CompanyStore>,
    pub recipients: Arc<dyn RecipientStore>,
    pub domains: Arc<dyn DomainStore>,
    pub suppression: Arc<dyn SuppressionList>,
    pub admission: Arc<AdmissionControl>,
    pub body_store: Arc<dyn BodyStore>,
    pub providers: Arc<ProviderRouter>,
    pub metrics: Arc<dyn MetricsService>,
    pub queue_config: QueueConfig,
    pub retention: RetentionConfig,
    pub worker_id: String,
}

impl WorkerContext {
    pub async fn from_env() -> Result<Self, GatewayError> {
        let aws_config = aws_config::load_from_env().await;
        let dynamodb = aws_sdk_dynamodb::Client::new(&aws_config);
        let sqs = aws_sdk_sqs::Client::new(&aws_config);
        let ses = aws_sdk_ses::Client::new(&aws_config);
        let s3 = aws_sdk_s3::Client::new(&aws_config);
        let cloudwatch = aws_sdk_cloudwatch::Client::new(&aws_config);

        let storage = StorageConfig::from_env()?;
        let queue_config = QueueConfig::from_env()?;
        let retention = RetentionConfig::from_env()?;
        let provider_config = ProviderConfig::from_env()?;
        // loaded for parity with the API process; the worker itself only
        // reads PII through masked paths
        let _security = SecurityConfig::from_env()?;

        let ses_driver = Arc::new(GuardedProvider::new(
            Arc::new(SesProvider::new(ses)),
            &provider_config,
        ));
        let providers = Arc::new(ProviderRouter::new(vec![ProviderBinding {
            priority: 1,
            company_id: None,
            active: true,
            driver: ses_driver,
        }]));

        Ok(Self {
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
            suppression: Arc::new(DynamoDbSuppressionList::new(
                dynamodb.clone(),
                storage.suppression_table.clone(),
            )),
            admission: Arc::new(AdmissionControl::new(Arc::new(DynamoDbCounterStore::new(
                dynamodb,
                storage.counters_table.clone(),
            )))),
            body_store: Arc::new(S3BodyStore::new(s3, storage.body_bucket.clone())),
            providers,
            metrics: Arc::new(CloudWatchMetricsService::new(cloudwatch)),
            queue_config,
            retention,
            worker_id: format!("worker-{}", Uuid::new_v4()),
        })
    }
}
