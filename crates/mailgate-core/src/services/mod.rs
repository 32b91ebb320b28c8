/// Service traits and their production / in-memory implementations
///
/// Every backing dependency of the pipeline is a trait with one AWS-backed
/// implementation and one in-memory implementation used by tests and
/// local runs.
pub mod admission;
pub mod audit;
pub mod body_store;
pub mod companies;
pub mod dlq;
pub mod domains;
pub mod idempotency;
pub mod metrics;
pub mod outbox;
pub mod queue;
pub mod recipients;
pub mod secrets;
pub mod suppression;
