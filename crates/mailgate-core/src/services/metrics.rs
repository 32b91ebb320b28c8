/// Metrics sink
///
/// The pipeline records datums through `MetricsService`; when each datum
/// ships is the implementation's business. The CloudWatch sink buffers
/// and sends full `put_metric_data` pages; the capturing sink backs
/// tests. Metrics are lossy by design: a failed page is logged and
/// dropped, never retried into the hot path.
use crate::constants::METRICS_NAMESPACE;
use async_trait::async_trait;
use aws_sdk_cloudwatch::types::StandardUnit;
use tracing::warn;

/// Unit attached to a datum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricUnit {
    Count,
    Millis,
    Seconds,
    Bytes,
    Raw,
}

impl MetricUnit {
    fn standard_unit(self) -> StandardUnit {
        match self {
            Self::Count => StandardUnit::Count,
            Self::Millis => StandardUnit::Milliseconds,
            Self::Seconds => StandardUnit::Seconds,
            Self::Bytes => StandardUnit::Bytes,
            Self::Raw => StandardUnit::None,
        }
    }
}

/// One recorded measurement
#[derive(Debug, Clone)]
pub struct Datum {
    pub name: String,
    pub value: f64,
    pub unit: MetricUnit,
    pub dimensions: Vec<(String, String)>,
}

impl Datum {
    pub fn new(name: &str, value: f64, unit: MetricUnit, dimensions: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            value,
            unit,
            dimensions: dimensions
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn into_cloudwatch(self) -> aws_sdk_cloudwatch::types::MetricDatum {
        use aws_sdk_cloudwatch::types::Dimension;

        let mut builder = aws_sdk_cloudwatch::types::MetricDatum::builder()
            .metric_name(self.name)
            .value(self.value)
            .unit(self.unit.standard_unit())
            .timestamp(aws_smithy_types::DateTime::from(
                std::time::SystemTime::now(),
            ));
        for (name, value) in self.dimensions {
            builder = builder.dimensions(Dimension::builder().name(name).value(value).build());
        }
        builder.build()
    }
}

#[async_trait]
pub trait MetricsService: Send + Sync {
    /// Queues one datum
    async fn record(&self, datum: Datum);

    /// Pushes anything still buffered out to the backend
    async fn flush(&self);

    // convenience recorders used throughout the pipeline

    async fn record_counter(&self, name: &str, value: f64, dimensions: &[(&str, &str)]) {
        self.record(Datum::new(name, value, MetricUnit::Count, dimensions))
            .await;
    }

    async fn record_histogram(
        &self,
        name: &str,
        value: f64,
        unit: MetricUnit,
        dimensions: &[(&str, &str)],
    ) {
        self.record(Datum::new(name, value, unit, dimensions)).await;
    }

    async fn record_gauge(
        &self,
        name: &str,
        value: f64,
        unit: MetricUnit,
        dimensions: &[(&str, &str)],
    ) {
        self.record(Datum::new(name, value, unit, dimensions)).await;
    }
}

/// CloudWatch accepts at most twenty datums per put_metric_data call;
/// the buffer drains a full page at a time
const CLOUDWATCH_PAGE: usize = 20;

pub struct CloudWatchMetricsService {
    client: aws_sdk_cloudwatch::Client,
    namespace: String,
    buffer: tokio::sync::Mutex<Vec<Datum>>,
}

impl CloudWatchMetricsService {
    pub fn new(client: aws_sdk_cloudwatch::Client) -> Self {
        Self::with_namespace(client, METRICS_NAMESPACE.to_string())
    }

    pub fn with_namespace(client: aws_sdk_cloudwatch::Client, namespace: String) -> Self {
        Self {
            client,
            namespace,
            buffer: tokio::sync::Mutex::new(Vec::with_capacity(CLOUDWATCH_PAGE)),
        }
    }

    async fn ship(&self, page: Vec<Datum>) {
        if page.is_empty() {
            return;
        }
        let count = page.len();
        let data = page.into_iter().map(Datum::into_cloudwatch).collect();

        if let Err(e) = self
            .client
            .put_metric_data()
            .namespace(&self.namespace)
            .set_metric_data(Some(data))
            .send()
            .await
        {
            // dropped, not retried: metrics never block or back up the
            // pipeline that produces them
            warn!(
                target: "metrics",
                dropped = count,
                error = %e,
                "CloudWatch page rejected"
            );
        }
    }
}

#[async_trait]
impl MetricsService for CloudWatchMetricsService {
    async fn record(&self, datum: Datum) {
        let page = {
            let mut buffer = self.buffer.lock().await;
            buffer.push(datum);
            if buffer.len() >= CLOUDWATCH_PAGE {
                Some(std::mem::take(&mut *buffer))
            } else {
                None
            }
        };
        if let Some(page) = page {
            self.ship(page).await;
        }
    }

    async fn flush(&self) {
        let pending = std::mem::take(&mut *self.buffer.lock().await);
        for page in pending.chunks(CLOUDWATCH_PAGE) {
            self.ship(page.to_vec()).await;
        }
    }
}

/// Helper functions for the pipeline's standard metrics
pub struct Metrics;

impl Metrics {
    /// Request accepted at the ingestion edge
    pub async fn accepted(service: &dyn MetricsService, company: &str) {
        service
            .record_counter("EmailsAccepted", 1.0, &[("Company", company)])
            .await;
    }

    /// Request rejected at the ingestion edge
    pub async fn rejected(service: &dyn MetricsService, code: &str) {
        service
            .record_counter("EmailsRejected", 1.0, &[("Code", code)])
            .await;
    }

    pub async fn enqueued(service: &dyn MetricsService, company: &str) {
        service
            .record_counter("JobsEnqueued", 1.0, &[("Company", company)])
            .await;
    }

    pub async fn dispatched(service: &dyn MetricsService, provider: &str) {
        service
            .record_counter("EmailsDispatched", 1.0, &[("Provider", provider)])
            .await;
    }

    pub async fn sent(service: &dyn MetricsService, provider: &str) {
        service
            .record_counter("EmailsSent", 1.0, &[("Provider", provider)])
            .await;
    }

    pub async fn failed(service: &dyn MetricsService, category: &str) {
        service
            .record_counter("EmailsFailed", 1.0, &[("Category", category)])
            .await;
    }

    pub async fn retried(service: &dyn MetricsService, code: &str) {
        service
            .record_counter("EmailsRetried", 1.0, &[("Code", code)])
            .await;
    }

    pub async fn dlq_promoted(service: &dyn MetricsService, code: &str) {
        service
            .record_counter("DlqPromoted", 1.0, &[("Code", code)])
            .await;
    }

    pub async fn suppression_hit(service: &dyn MetricsService, company: &str) {
        service
            .record_counter("SuppressionHits", 1.0, &[("Company", company)])
            .await;
    }

    pub async fn ingestion_latency(service: &dyn MetricsService, duration_ms: f64) {
        service
            .record_histogram("IngestionLatency", duration_ms, MetricUnit::Millis, &[])
            .await;
    }

    pub async fn queue_wait(service: &dyn MetricsService, duration_ms: f64) {
        service
            .record_histogram("QueueWaitTime", duration_ms, MetricUnit::Millis, &[])
            .await;
    }

    pub async fn dispatch_duration(service: &dyn MetricsService, provider: &str, duration_ms: f64) {
        service
            .record_histogram(
                "DispatchDuration",
                duration_ms,
                MetricUnit::Millis,
                &[("Provider", provider)],
            )
            .await;
    }

    /// Enqueue → SENT
    pub async fn end_to_end(service: &dyn MetricsService, duration_ms: f64) {
        service
            .record_histogram("EndToEndTime", duration_ms, MetricUnit::Millis, &[])
            .await;
    }

    /// Queue depth gauge; every lane is reported, prioritized included
    pub async fn queue_depth(
        service: &dyn MetricsService,
        depth: &crate::services::queue::QueueDepth,
    ) {
        for (lane, value) in [
            ("waiting", depth.waiting),
            ("prioritized", depth.prioritized),
            ("delayed", depth.delayed),
            ("active", depth.active),
        ] {
            service
                .record_gauge(
                    "QueueDepth",
                    value as f64,
                    MetricUnit::Count,
                    &[("Lane", lane)],
                )
                .await;
        }
    }

    pub async fn dlq_depth(service: &dyn MetricsService, depth: usize) {
        service
            .record_gauge("DlqDepth", depth as f64, MetricUnit::Count, &[])
            .await;
    }

    pub async fn fairness_rounds(service: &dyn MetricsService, company: &str, rounds: u32) {
        service
            .record_gauge(
                "FairnessRoundsWithoutProcessing",
                rounds as f64,
                MetricUnit::Count,
                &[("Company", company)],
            )
            .await;
    }
}

/// Capturing sink for tests; every datum stays in memory for assertions
#[derive(Default)]
pub struct CapturingMetrics {
    recorded: tokio::sync::Mutex<Vec<Datum>>,
}

impl CapturingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values recorded under `name`, in order
    pub async fn values(&self, name: &str) -> Vec<f64> {
        self.recorded
            .lock()
            .await
            .iter()
            .filter(|d| d.name == name)
            .map(|d| d.value)
            .collect()
    }

    pub async fn count(&self, name: &str) -> usize {
        self.values(name).await.len()
    }

    /// Full datums under `name`, for dimension assertions
    pub async fn datums(&self, name: &str) -> Vec<Datum> {
        self.recorded
            .lock()
            .await
            .iter()
            .filter(|d| d.name == name)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MetricsService for CapturingMetrics {
    async fn record(&self, datum: Datum) {
        self.recorded.lock().await.push(datum);
    }

    async fn flush(&self) {}
}
