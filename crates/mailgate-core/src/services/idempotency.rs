/// Idempotency keys for the ingestion endpoint
///
/// (company_id, key) maps to the accepted outbox id plus a hash of the
/// payload that produced it. Replaying the same key with the same payload
/// returns the original row; a different payload is a CONFLICT. The TTL
/// is at least the longest retry horizon so DLQ-phase re-submits behave
/// deterministically.
use crate::error::GatewayError;
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Result of the atomic insert-or-compare
#[derive(Debug, Clone, PartialEq)]
pub enum IdempotencyOutcome {
    /// First time this key was seen; proceed with the new outbox row
    Inserted,
    /// Same key, same payload: return the stored row
    Replay {
        outbox_id: Uuid,
        received_at: DateTime<Utc>,
    },
    /// Same key, different payload
    Conflict,
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically records (company, key) → (outbox, payload_hash), or
    /// classifies the collision when the key already exists.
    async fn put_or_get(
        &self,
        company_id: Uuid,
        key: &str,
        outbox_id: Uuid,
        payload_hash: &str,
        ttl: Duration,
    ) -> Result<IdempotencyOutcome, GatewayError>;
}

/// Canonical request hash: HMAC-SHA256 over the serialized payload, keyed
/// so hashes are not portable across deployments
pub fn payload_hash(key: &secrecy::SecretString, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(key.expose_secret().as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

// ============================================================================
// DynamoDB implementation
// ============================================================================

pub struct DynamoDbIdempotencyStore {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

impl DynamoDbIdempotencyStore {
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: String) -> Self {
        Self { client, table_name }
    }

    fn partition_key(company_id: Uuid, key: &str) -> String {
        format!("{}#{}", company_id, key)
    }
}

#[async_trait]
impl IdempotencyStore for DynamoDbIdempotencyStore {
    async fn put_or_get(
        &self,
        company_id: Uuid,
        key: &str,
        outbox_id: Uuid,
        payload_hash: &str,
        ttl: Duration,
    ) -> Result<IdempotencyOutcome, GatewayError> {
        let pk = Self::partition_key(company_id, key);
        let now = Utc::now();
        let expiration = now.timestamp() + ttl.as_secs() as i64;

        let put = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item("pk", AttributeValue::S(pk.clone()))
            .item("outbox_id", AttributeValue::S(outbox_id.to_string()))
            .item(
                "payload_hash",
                AttributeValue::S(payload_hash.to_string()),
            )
            .item("received_at", AttributeValue::S(now.to_rfc3339()))
            .item("ttl", AttributeValue::N(expiration.to_string()))
            .condition_expression("attribute_not_exists(pk)")
            .send()
            .await;

        match put {
            Ok(_) => {
                debug!(company_id = %company_id, "Recorded idempotency key");
                Ok(IdempotencyOutcome::Inserted)
            }
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false) =>
            {
                let existing = self
                    .client
                    .get_item()
                    .table_name(&self.table_name)
                    .key("pk", AttributeValue::S(pk))
                    .send()
                    .await
                    .map_err(|e| {
                        GatewayError::Storage(format!("Idempotency read failed: {}", e))
                    })?;

                let item = existing.item().ok_or_else(|| {
                    GatewayError::Storage("Idempotency key vanished mid-replay".to_string())
                })?;

                let stored_hash = item
                    .get("payload_hash")
                    .and_then(|v| v.as_s().ok())
                    .cloned()
                    .unwrap_or_default();
                if stored_hash != payload_hash {
                    return Ok(IdempotencyOutcome::Conflict);
                }

                let stored_outbox = item
                    .get("outbox_id")
                    .and_then(|v| v.as_s().ok())
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .ok_or_else(|| {
                        GatewayError::Storage("Idempotency record missing outbox id".to_string())
                    })?;
                let received_at = item
                    .get("received_at")
                    .and_then(|v| v.as_s().ok())
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or(now);

                Ok(IdempotencyOutcome::Replay {
                    outbox_id: stored_outbox,
                    received_at,
                })
            }
            Err(e) => Err(GatewayError::Storage(format!(
                "Idempotency put failed: {}",
                e
            ))),
        }
    }
}

// ============================================================================
// In-memory implementation (tests and local runs)
// ============================================================================

struct StoredKey {
    outbox_id: Uuid,
    payload_hash: String,
    received_at: DateTime<Utc>,
    expires_at: i64,
}

#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    store: tokio::sync::Mutex<HashMap<String, StoredKey>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn put_or_get(
        &self,
        company_id: Uuid,
        key: &str,
        outbox_id: Uuid,
        payload_hash: &str,
        ttl: Duration,
    ) -> Result<IdempotencyOutcome, GatewayError> {
        let pk = format!("{}#{}", company_id, key);
        let now = Utc::now();
        let mut store = self.store.lock().await;

        if let Some(existing) = store.get(&pk)
            && existing.expires_at > now.timestamp()
        {
            if existing.payload_hash != payload_hash {
                return Ok(IdempotencyOutcome::Conflict);
            }
            return Ok(IdempotencyOutcome::Replay {
                outbox_id: existing.outbox_id,
                received_at: existing.received_at,
            });
        }

        store.insert(
            pk,
            StoredKey {
                outbox_id,
                payload_hash: payload_hash.to_string(),
                received_at: now,
                expires_at: now.timestamp() + ttl.as_secs() as i64,
            },
        );
        Ok(IdempotencyOutcome::Inserted)
    }
}
