/// Company (tenant) store
///
/// Lookup by hashed API key happens on every request; approval-state
/// transitions are audited by the caller.
use crate::error::GatewayError;
use crate::models::{ApprovalState, Company};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::Sha256;
use std::collections::HashMap;
use uuid::Uuid;

/// HMAC of an API key; the plaintext key is never stored
pub fn hash_api_key(hash_key: &secrecy::SecretString, api_key: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(hash_key.expose_secret().as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(api_key.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Prefix retained for identification in logs and support tooling
pub fn api_key_prefix(api_key: &str) -> String {
    api_key.chars().take(8).collect()
}

#[async_trait]
pub trait CompanyStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Company>, GatewayError>;

    async fn get_by_api_key_hash(&self, hash: &str) -> Result<Option<Company>, GatewayError>;

    async fn put(&self, company: &Company) -> Result<(), GatewayError>;

    async fn set_approval_state(
        &self,
        id: Uuid,
        state: ApprovalState,
    ) -> Result<Company, GatewayError>;
}

// ============================================================================
// DynamoDB implementation
// ============================================================================

pub struct DynamoDbCompanyStore {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

impl DynamoDbCompanyStore {
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: String) -> Self {
        Self { client, table_name }
    }

    fn from_item(item: &HashMap<String, AttributeValue>) -> Result<Company, GatewayError> {
        let payload = item
            .get("payload")
            .and_then(|v| v.as_s().ok())
            .ok_or_else(|| GatewayError::Storage("Company item missing payload".to_string()))?;
        serde_json::from_str(payload)
            .map_err(|e| GatewayError::Storage(format!("Company deserialization failed: {}", e)))
    }
}

#[async_trait]
impl CompanyStore for DynamoDbCompanyStore {
    async fn get(&self, id: Uuid) -> Result<Option<Company>, GatewayError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Company get failed: {}", e)))?;
        result.item().map(Self::from_item).transpose()
    }

    async fn get_by_api_key_hash(&self, hash: &str) -> Result<Option<Company>, GatewayError> {
        // api_key_hash carries a GSI in production; query it
        let result = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name("api_key_hash-index")
            .key_condition_expression("api_key_hash = :h")
            .expression_attribute_values(":h", AttributeValue::S(hash.to_string()))
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Company key lookup failed: {}", e)))?;
        result.items().first().map(Self::from_item).transpose()
    }

    async fn put(&self, company: &Company) -> Result<(), GatewayError> {
        let payload = serde_json::to_string(company)
            .map_err(|e| GatewayError::Storage(format!("Company serialization failed: {}", e)))?;
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("id", AttributeValue::S(company.id.to_string()))
            .item(
                "api_key_hash",
                AttributeValue::S(company.api_key_hash.clone()),
            )
            .item("payload", AttributeValue::S(payload))
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Company put failed: {}", e)))?;
        Ok(())
    }

    async fn set_approval_state(
        &self,
        id: Uuid,
        state: ApprovalState,
    ) -> Result<Company, GatewayError> {
        let mut company = self
            .get(id)
            .await?
            .ok_or_else(|| GatewayError::Validation(format!("Unknown company {}", id)))?;
        company.approval_state = state;
        company.updated_at = Utc::now();
        self.put(&company).await?;
        Ok(company)
    }
}

// ============================================================================
// In-memory implementation (tests and local runs)
// ============================================================================

#[derive(Default)]
pub struct InMemoryCompanyStore {
    companies: tokio::sync::Mutex<HashMap<Uuid, Company>>,
}

impl InMemoryCompanyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CompanyStore for InMemoryCompanyStore {
    async fn get(&self, id: Uuid) -> Result<Option<Company>, GatewayError> {
        Ok(self.companies.lock().await.get(&id).cloned())
    }

    async fn get_by_api_key_hash(&self, hash: &str) -> Result<Option<Company>, GatewayError> {
        Ok(self
            .companies
            .lock()
            .await
            .values()
            .find(|c| c.api_key_hash == hash)
            .cloned())
    }

    async fn put(&self, company: &Company) -> Result<(), GatewayError> {
        self.companies
            .lock()
            .await
            .insert(company.id, company.clone());
        Ok(())
    }

    async fn set_approval_state(
        &self,
        id: Uuid,
        state: ApprovalState,
    ) -> Result<Company, GatewayError> {
        let mut companies = self.companies.lock().await;
        let company = companies
            .get_mut(&id)
            .ok_or_else(|| GatewayError::Validation(format!("Unknown company {}", id)))?;
        company.approval_state = state;
        company.updated_at = Utc::now();
        Ok(company.clone())
    }
}
