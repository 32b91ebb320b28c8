/// Suppression list
///
/// Per-tenant entries plus a global overlay (sentinel partition). A hit
/// rejects the send at ingestion and fails it permanently at the worker
/// re-check. Bounce and complaint events feed the list.
use crate::error::GatewayError;
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

/// Partition holding the global overlay
pub const GLOBAL_SCOPE: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuppressionReason {
    Bounce,
    Complaint,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionEntry {
    /// Company id, or `*` for the global overlay
    pub scope: String,
    pub email: String,
    pub reason: SuppressionReason,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait SuppressionList: Send + Sync {
    /// Checks the tenant scope first, then the global overlay
    async fn is_suppressed(&self, company_id: Uuid, email: &str) -> Result<bool, GatewayError>;

    async fn suppress(
        &self,
        scope: &str,
        email: &str,
        reason: SuppressionReason,
    ) -> Result<(), GatewayError>;

    async fn unsuppress(&self, scope: &str, email: &str) -> Result<(), GatewayError>;
}

fn normalize(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

// ============================================================================
// DynamoDB implementation
// ============================================================================

pub struct DynamoDbSuppressionList {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

impl DynamoDbSuppressionList {
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: String) -> Self {
        Self { client, table_name }
    }

    async fn lookup(&self, scope: &str, email: &str) -> Result<bool, GatewayError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("scope", AttributeValue::S(scope.to_string()))
            .key("email", AttributeValue::S(normalize(email)))
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Suppression lookup failed: {}", e)))?;
        Ok(result.item().is_some())
    }
}

#[async_trait]
impl SuppressionList for DynamoDbSuppressionList {
    async fn is_suppressed(&self, company_id: Uuid, email: &str) -> Result<bool, GatewayError> {
        if self.lookup(&company_id.to_string(), email).await? {
            return Ok(true);
        }
        self.lookup(GLOBAL_SCOPE, email).await
    }

    async fn suppress(
        &self,
        scope: &str,
        email: &str,
        reason: SuppressionReason,
    ) -> Result<(), GatewayError> {
        let entry = SuppressionEntry {
            scope: scope.to_string(),
            email: normalize(email),
            reason,
            created_at: Utc::now(),
        };
        let payload = serde_json::to_string(&entry)
            .map_err(|e| GatewayError::Storage(format!("Suppression serialization: {}", e)))?;
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("scope", AttributeValue::S(entry.scope.clone()))
            .item("email", AttributeValue::S(entry.email.clone()))
            .item("payload", AttributeValue::S(payload))
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Suppression put failed: {}", e)))?;
        info!(
            scope = %entry.scope,
            email = %crate::utils::redact::redact_email(&entry.email),
            reason = ?reason,
            "Added suppression entry"
        );
        Ok(())
    }

    async fn unsuppress(&self, scope: &str, email: &str) -> Result<(), GatewayError> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("scope", AttributeValue::S(scope.to_string()))
            .key("email", AttributeValue::S(normalize(email)))
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Suppression delete failed: {}", e)))?;
        Ok(())
    }
}

// ============================================================================
// In-memory implementation (tests and local runs)
// ============================================================================

#[derive(Default)]
pub struct InMemorySuppressionList {
    entries: tokio::sync::Mutex<HashSet<(String, String)>>,
}

impl InMemorySuppressionList {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SuppressionList for InMemorySuppressionList {
    async fn is_suppressed(&self, company_id: Uuid, email: &str) -> Result<bool, GatewayError> {
        let entries = self.entries.lock().await;
        let email = normalize(email);
        Ok(entries.contains(&(company_id.to_string(), email.clone()))
            || entries.contains(&(GLOBAL_SCOPE.to_string(), email)))
    }

    async fn suppress(
        &self,
        scope: &str,
        email: &str,
        _reason: SuppressionReason,
    ) -> Result<(), GatewayError> {
        self.entries
            .lock()
            .await
            .insert((scope.to_string(), normalize(email)));
        Ok(())
    }

    async fn unsuppress(&self, scope: &str, email: &str) -> Result<(), GatewayError> {
        self.entries
            .lock()
            .await
            .remove(&(scope.to_string(), normalize(email)));
        Ok(())
    }
}
