/// Body store: storage handles for sanitized HTML and attachment content
///
/// Small HTML bodies ride inline in the outbox row; anything above the
/// inline threshold is stored here and referenced by key, keeping the
/// queue envelope small.
use crate::constants::HTML_INLINE_THRESHOLD_BYTES;
use crate::error::GatewayError;
use crate::models::BodyRef;
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

#[async_trait]
pub trait BodyStore: Send + Sync {
    async fn put(&self, key: &str, content: Vec<u8>) -> Result<(), GatewayError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, GatewayError>;

    async fn delete(&self, key: &str) -> Result<(), GatewayError>;

    /// Stores sanitized HTML out of line when it exceeds the inline
    /// threshold, returning the reference to persist
    async fn store_html(&self, outbox_id: Uuid, html: &str) -> Result<BodyRef, GatewayError> {
        if html.len() <= HTML_INLINE_THRESHOLD_BYTES {
            return Ok(BodyRef::Inline {
                html: html.to_string(),
            });
        }
        let key = format!("bodies/{}.html", outbox_id);
        self.put(&key, html.as_bytes().to_vec()).await?;
        Ok(BodyRef::Stored {
            key,
            size: html.len(),
        })
    }

    /// Resolves a reference back to the HTML text
    async fn load_html(&self, body: &BodyRef) -> Result<String, GatewayError> {
        match body {
            BodyRef::Inline { html } => Ok(html.clone()),
            BodyRef::Stored { key, .. } => {
                let bytes = self.get(key).await?;
                String::from_utf8(bytes)
                    .map_err(|e| GatewayError::Storage(format!("Stored HTML not UTF-8: {}", e)))
            }
        }
    }

    /// Key for attachment content scoped to its outbox row
    fn attachment_key(&self, outbox_id: Uuid, index: usize, filename: &str) -> String {
        format!("attachments/{}/{}-{}", outbox_id, index, filename)
    }
}

// ============================================================================
// S3 implementation
// ============================================================================

pub struct S3BodyStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3BodyStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl BodyStore for S3BodyStore {
    async fn put(&self, key: &str, content: Vec<u8>) -> Result<(), GatewayError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(content.into())
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("S3 put failed: {}", e)))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, GatewayError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("S3 get failed: {}", e)))?;
        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| GatewayError::Storage(format!("S3 body read failed: {}", e)))?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn delete(&self, key: &str) -> Result<(), GatewayError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("S3 delete failed: {}", e)))?;
        Ok(())
    }
}

// ============================================================================
// In-memory implementation (tests and local runs)
// ============================================================================

#[derive(Default)]
pub struct InMemoryBodyStore {
    objects: tokio::sync::Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBodyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BodyStore for InMemoryBodyStore {
    async fn put(&self, key: &str, content: Vec<u8>) -> Result<(), GatewayError> {
        self.objects.lock().await.insert(key.to_string(), content);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, GatewayError> {
        self.objects
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| GatewayError::Storage(format!("No object at {}", key)))
    }

    async fn delete(&self, key: &str) -> Result<(), GatewayError> {
        self.objects.lock().await.remove(key);
        Ok(())
    }
}
