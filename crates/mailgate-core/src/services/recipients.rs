/// Recipient store
///
/// A send identifies its recipient by at least one of {recipientId,
/// externalId, fiscalHash}; `resolve_or_create` is the worker's entry
/// point and encrypts fiscal identifiers through the cipher before
/// anything is persisted.
use crate::error::GatewayError;
use crate::models::{FiscalIdentifier, Recipient};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

/// Identifier block as it arrives on a send
#[derive(Debug, Clone, Default)]
pub struct RecipientLookup {
    pub recipient_id: Option<Uuid>,
    pub external_id: Option<String>,
    pub fiscal_hash: Option<String>,
}

impl RecipientLookup {
    pub fn is_empty(&self) -> bool {
        self.recipient_id.is_none() && self.external_id.is_none() && self.fiscal_hash.is_none()
    }
}

#[async_trait]
pub trait RecipientStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Recipient>, GatewayError>;

    async fn find(
        &self,
        company_id: Uuid,
        lookup: &RecipientLookup,
    ) -> Result<Option<Recipient>, GatewayError>;

    async fn put(&self, recipient: &Recipient) -> Result<(), GatewayError>;

    /// Case-insensitive substring match over display and legal names,
    /// used by the operator listing filters
    async fn find_by_name(
        &self,
        company_id: Uuid,
        name: &str,
    ) -> Result<Vec<Recipient>, GatewayError>;

    /// Resolves the identifier block, creating the recipient when no
    /// match exists. `fiscal` is pre-encrypted by the caller.
    async fn resolve_or_create(
        &self,
        company_id: Uuid,
        email: &str,
        lookup: &RecipientLookup,
        fiscal: Option<FiscalIdentifier>,
    ) -> Result<Recipient, GatewayError> {
        if let Some(existing) = self.find(company_id, lookup).await? {
            if existing.is_deleted() {
                return Err(GatewayError::RecipientNotFound(format!(
                    "Recipient {} is deleted",
                    existing.id
                )));
            }
            return Ok(existing);
        }

        let now = Utc::now();
        let recipient = Recipient {
            id: lookup.recipient_id.unwrap_or_else(Uuid::new_v4),
            company_id,
            external_id: lookup.external_id.clone(),
            email: email.to_ascii_lowercase(),
            fiscal,
            display_name: None,
            legal_name: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        self.put(&recipient).await?;
        Ok(recipient)
    }
}

// ============================================================================
// DynamoDB implementation
// ============================================================================

pub struct DynamoDbRecipientStore {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

impl DynamoDbRecipientStore {
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: String) -> Self {
        Self { client, table_name }
    }

    fn from_item(item: &HashMap<String, AttributeValue>) -> Result<Recipient, GatewayError> {
        let payload = item
            .get("payload")
            .and_then(|v| v.as_s().ok())
            .ok_or_else(|| GatewayError::Storage("Recipient item missing payload".to_string()))?;
        serde_json::from_str(payload)
            .map_err(|e| GatewayError::Storage(format!("Recipient deserialization failed: {}", e)))
    }
}

#[async_trait]
impl RecipientStore for DynamoDbRecipientStore {
    async fn get(&self, id: Uuid) -> Result<Option<Recipient>, GatewayError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Recipient get failed: {}", e)))?;
        result.item().map(Self::from_item).transpose()
    }

    async fn find(
        &self,
        company_id: Uuid,
        lookup: &RecipientLookup,
    ) -> Result<Option<Recipient>, GatewayError> {
        if let Some(id) = lookup.recipient_id {
            if let Some(r) = self.get(id).await?
                && r.company_id == company_id
            {
                return Ok(Some(r));
            }
            return Ok(None);
        }

        // external_id and fiscal_hash are per-tenant unique; the company
        // partition carries GSIs for both
        let (index, attr, value) = if let Some(external_id) = &lookup.external_id {
            ("external_id-index", "external_id", external_id.clone())
        } else if let Some(fiscal_hash) = &lookup.fiscal_hash {
            ("fiscal_hash-index", "fiscal_hash", fiscal_hash.clone())
        } else {
            return Ok(None);
        };

        let result = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name(index)
            .key_condition_expression("company_id = :c AND #a = :v")
            .expression_attribute_names("#a", attr)
            .expression_attribute_values(":c", AttributeValue::S(company_id.to_string()))
            .expression_attribute_values(":v", AttributeValue::S(value))
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Recipient lookup failed: {}", e)))?;
        result.items().first().map(Self::from_item).transpose()
    }

    async fn put(&self, recipient: &Recipient) -> Result<(), GatewayError> {
        let payload = serde_json::to_string(recipient)
            .map_err(|e| GatewayError::Storage(format!("Recipient serialization failed: {}", e)))?;
        let mut put = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item("id", AttributeValue::S(recipient.id.to_string()))
            .item(
                "company_id",
                AttributeValue::S(recipient.company_id.to_string()),
            )
            .item("payload", AttributeValue::S(payload));
        if let Some(external_id) = &recipient.external_id {
            put = put.item("external_id", AttributeValue::S(external_id.clone()));
        }
        if let Some(fiscal) = &recipient.fiscal {
            put = put.item("fiscal_hash", AttributeValue::S(fiscal.hash.clone()));
        }
        put.send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Recipient put failed: {}", e)))?;
        Ok(())
    }

    async fn find_by_name(
        &self,
        company_id: Uuid,
        name: &str,
    ) -> Result<Vec<Recipient>, GatewayError> {
        // operator filter; a company-scoped scan is acceptable here
        let result = self
            .client
            .scan()
            .table_name(&self.table_name)
            .filter_expression("company_id = :c")
            .expression_attribute_values(":c", AttributeValue::S(company_id.to_string()))
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Recipient scan failed: {}", e)))?;

        let needle = name.to_lowercase();
        let mut matches = Vec::new();
        for item in result.items() {
            let recipient = Self::from_item(item)?;
            if name_matches(&recipient, &needle) {
                matches.push(recipient);
            }
        }
        Ok(matches)
    }
}

fn name_matches(recipient: &Recipient, needle: &str) -> bool {
    recipient
        .display_name
        .as_deref()
        .map(|n| n.to_lowercase().contains(needle))
        .unwrap_or(false)
        || recipient
            .legal_name
            .as_deref()
            .map(|n| n.to_lowercase().contains(needle))
            .unwrap_or(false)
}

// ============================================================================
// In-memory implementation (tests and local runs)
// ============================================================================

#[derive(Default)]
pub struct InMemoryRecipientStore {
    recipients: tokio::sync::Mutex<HashMap<Uuid, Recipient>>,
}

impl InMemoryRecipientStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecipientStore for InMemoryRecipientStore {
    async fn get(&self, id: Uuid) -> Result<Option<Recipient>, GatewayError> {
        Ok(self.recipients.lock().await.get(&id).cloned())
    }

    async fn find(
        &self,
        company_id: Uuid,
        lookup: &RecipientLookup,
    ) -> Result<Option<Recipient>, GatewayError> {
        let recipients = self.recipients.lock().await;
        Ok(recipients
            .values()
            .find(|r| {
                r.company_id == company_id
                    && (lookup.recipient_id == Some(r.id)
                        || (lookup.external_id.is_some() && lookup.external_id == r.external_id)
                        || (lookup.fiscal_hash.is_some()
                            && lookup.fiscal_hash.as_deref()
                                == r.fiscal.as_ref().map(|f| f.hash.as_str())))
            })
            .cloned())
    }

    async fn put(&self, recipient: &Recipient) -> Result<(), GatewayError> {
        self.recipients
            .lock()
            .await
            .insert(recipient.id, recipient.clone());
        Ok(())
    }

    async fn find_by_name(
        &self,
        company_id: Uuid,
        name: &str,
    ) -> Result<Vec<Recipient>, GatewayError> {
        let needle = name.to_lowercase();
        Ok(self
            .recipients
            .lock()
            .await
            .values()
            .filter(|r| r.company_id == company_id && name_matches(r, &needle))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_creates_once() {
        let store = InMemoryRecipientStore::new();
        let company = Uuid::new_v4();
        let lookup = RecipientLookup {
            external_id: Some("cust-42".into()),
            ..Default::default()
        };

        let created = store
            .resolve_or_create(company, "Alice@Example.com", &lookup, None)
            .await
            .unwrap();
        assert_eq!(created.email, "alice@example.com");

        let resolved = store
            .resolve_or_create(company, "alice@example.com", &lookup, None)
            .await
            .unwrap();
        assert_eq!(resolved.id, created.id);
    }

    #[tokio::test]
    async fn test_find_by_fiscal_hash() {
        let store = InMemoryRecipientStore::new();
        let company = Uuid::new_v4();
        let fiscal = FiscalIdentifier {
            hash: "fh-1".into(),
            ciphertext: "ct".into(),
            salt: "00".into(),
            key_version: "v1".into(),
        };
        store
            .resolve_or_create(
                company,
                "a@b.com",
                &RecipientLookup::default(),
                Some(fiscal),
            )
            .await
            .unwrap();

        let lookup = RecipientLookup {
            fiscal_hash: Some("fh-1".into()),
            ..Default::default()
        };
        assert!(store.find(company, &lookup).await.unwrap().is_some());
        assert!(store.find(Uuid::new_v4(), &lookup).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deleted_recipient_rejected() {
        let store = InMemoryRecipientStore::new();
        let company = Uuid::new_v4();
        let lookup = RecipientLookup {
            external_id: Some("gone".into()),
            ..Default::default()
        };
        let mut r = store
            .resolve_or_create(company, "a@b.com", &lookup, None)
            .await
            .unwrap();
        r.deleted_at = Some(Utc::now());
        store.put(&r).await.unwrap();

        let err = store
            .resolve_or_create(company, "a@b.com", &lookup, None)
            .await;
        assert!(matches!(err, Err(GatewayError::RecipientNotFound(_))));
    }
}
