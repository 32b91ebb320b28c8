/// Offset and opaque-cursor pagination for operator listings
///
/// A cursor is base64-encoded JSON of the sort key and the row id; it is
/// opaque to clients. Cursor and offset cannot be combined.
use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::error::GatewayError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    /// Sort key: creation timestamp of the last row on the previous page
    pub created_at: DateTime<Utc>,
    /// Tie-breaker
    pub id: Uuid,
}

impl Cursor {
    pub fn encode(&self) -> String {
        // serialization of a plain struct cannot fail
        let json = serde_json::to_vec(self).expect("cursor serialization");
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(raw: &str) -> Result<Self, GatewayError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw)
            .map_err(|_| GatewayError::Validation("Malformed cursor".to_string()))?;
        serde_json::from_slice(&bytes)
            .map_err(|_| GatewayError::Validation("Malformed cursor".to_string()))
    }
}

/// Validated page request
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub page_size: usize,
    pub offset: Option<usize>,
    pub cursor: Option<Cursor>,
}

impl PageRequest {
    pub fn new(
        page_size: Option<usize>,
        offset: Option<usize>,
        cursor: Option<&str>,
    ) -> Result<Self, GatewayError> {
        if offset.is_some() && cursor.is_some() {
            return Err(GatewayError::Validation(
                "cursor and offset cannot be combined".to_string(),
            ));
        }
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(GatewayError::Validation(format!(
                "pageSize must be 1..={}",
                MAX_PAGE_SIZE
            )));
        }
        let cursor = cursor.map(Cursor::decode).transpose()?;
        Ok(Self {
            page_size,
            offset,
            cursor,
        })
    }
}

/// Pagination block returned with every list response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub page_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    pub total: Option<usize>,
    pub has_more: bool,
}
