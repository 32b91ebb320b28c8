/// Recipient model
///
/// Fiscal identifiers are stored only as (hash, ciphertext, salt); the
/// plaintext never touches storage or logs.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Encrypted fiscal identifier at rest. The ciphertext envelope records
/// the key version so keys can rotate without re-encrypting history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiscalIdentifier {
    /// HMAC-SHA256(salt, plaintext): used for lookups
    pub hash: String,
    /// Base64 ciphertext
    pub ciphertext: String,
    /// Per-record salt (hex)
    pub salt: String,
    /// Version of the key that produced the ciphertext
    pub key_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub id: Uuid,
    pub company_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Lower-cased at the edge
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiscal: Option<FiscalIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legal_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recipient {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Masked view for the default `operations` profile
    pub fn masked_fiscal(&self) -> Option<String> {
        self.fiscal
            .as_ref()
            .map(|f| format!("***{}", &f.hash[f.hash.len().saturating_sub(4)..]))
    }

    pub fn masked_legal_name(&self) -> Option<String> {
        self.legal_name.as_ref().map(|n| mask_name(n))
    }
}

/// Keeps the first character of each word, masks the rest
pub fn mask_name(name: &str) -> String {
    name.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => format!("{}{}", first, "*".repeat(chars.count())),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
