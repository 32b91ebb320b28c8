/// Fiscal-identifier protection
///
/// A fiscal identifier is stored only as (hash, ciphertext, salt). The
/// hash is an HMAC keyed per deployment and salted per record, used for
/// lookups; the ciphertext comes from a rotation-aware cipher whose
/// envelope records the key version.
use crate::error::GatewayError;
use crate::models::FiscalIdentifier;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::Sha256;
use tracing::debug;

/// Rotation-aware encryption interface. `encrypt` always uses the current
/// key; `decrypt` accepts any ciphertext produced by a still-registered
/// key version.
#[async_trait]
pub trait FiscalCipher: Send + Sync {
    async fn encrypt(&self, plaintext: &[u8]) -> Result<(String, String), GatewayError>;

    async fn decrypt(&self, ciphertext: &str, key_version: &str) -> Result<Vec<u8>, GatewayError>;

    fn current_key_version(&self) -> String;
}

/// Builds the at-rest triple for a fiscal identifier
pub async fn protect_fiscal_id(
    cipher: &dyn FiscalCipher,
    hash_key: &secrecy::SecretString,
    plaintext: &str,
) -> Result<FiscalIdentifier, GatewayError> {
    let salt: [u8; 16] = rand::random();
    let hash = fiscal_hash(hash_key, &salt, plaintext);
    let (ciphertext, key_version) = cipher.encrypt(plaintext.as_bytes()).await?;
    Ok(FiscalIdentifier {
        hash,
        ciphertext,
        salt: hex::encode(salt),
        key_version,
    })
}

/// Deployment-keyed, salted hash of a fiscal identifier
pub fn fiscal_hash(hash_key: &secrecy::SecretString, salt: &[u8], plaintext: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(hash_key.expose_secret().as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(salt);
    mac.update(plaintext.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Unsalted lookup hash used by list filters (cpfCnpj is hashed at the
/// server before any query runs)
pub fn fiscal_lookup_hash(hash_key: &secrecy::SecretString, plaintext: &str) -> String {
    fiscal_hash(hash_key, b"", plaintext)
}

// ============================================================================
// KMS implementation
// ============================================================================

pub struct KmsFiscalCipher {
    client: aws_sdk_kms::Client,
    key_id: String,
}

impl KmsFiscalCipher {
    pub fn new(client: aws_sdk_kms::Client, key_id: String) -> Self {
        Self { client, key_id }
    }
}

#[async_trait]
impl FiscalCipher for KmsFiscalCipher {
    async fn encrypt(&self, plaintext: &[u8]) -> Result<(String, String), GatewayError> {
        let response = self
            .client
            .encrypt()
            .key_id(&self.key_id)
            .plaintext(aws_smithy_types::Blob::new(plaintext))
            .send()
            .await
            .map_err(|e| GatewayError::Crypto(format!("KMS encrypt failed: {}", e)))?;

        let ciphertext = response
            .ciphertext_blob()
            .map(|b| BASE64.encode(b.as_ref()))
            .ok_or_else(|| GatewayError::Crypto("KMS returned no ciphertext".to_string()))?;
        // KMS reports the exact key that encrypted, which may be an alias
        // target after rotation
        let key_version = response
            .key_id()
            .unwrap_or(self.key_id.as_str())
            .to_string();

        debug!("Encrypted fiscal identifier under key {}", key_version);
        Ok((ciphertext, key_version))
    }

    async fn decrypt(&self, ciphertext: &str, _key_version: &str) -> Result<Vec<u8>, GatewayError> {
        let blob = BASE64
            .decode(ciphertext)
            .map_err(|e| GatewayError::Crypto(format!("Ciphertext not base64: {}", e)))?;
        let response = self
            .client
            .decrypt()
            .ciphertext_blob(aws_smithy_types::Blob::new(blob))
            .send()
            .await
            .map_err(|e| GatewayError::Crypto(format!("KMS decrypt failed: {}", e)))?;
        response
            .plaintext()
            .map(|b| b.as_ref().to_vec())
            .ok_or_else(|| GatewayError::Crypto("KMS returned no plaintext".to_string()))
    }

    fn current_key_version(&self) -> String {
        self.key_id.clone()
    }
}

// ============================================================================
// Static-key implementation (tests and local runs)
// ============================================================================

/// XOR-with-keystream stand-in used only by tests and local runs; the
/// interface is what matters, production always goes through KMS.
pub struct StaticFiscalCipher {
    key: secrecy::SecretString,
    version: String,
}

impl StaticFiscalCipher {
    pub fn new(key: secrecy::SecretString, version: &str) -> Self {
        Self {
            key,
            version: version.to_string(),
        }
    }

    fn keystream(&self, len: usize) -> Vec<u8> {
        self.key
            .expose_secret()
            .as_bytes()
            .iter()
            .cycle()
            .take(len)
            .copied()
            .collect()
    }
}

#[async_trait]
impl FiscalCipher for StaticFiscalCipher {
    async fn encrypt(&self, plaintext: &[u8]) -> Result<(String, String), GatewayError> {
        let stream = self.keystream(plaintext.len());
        let bytes: Vec<u8> = plaintext
            .iter()
            .zip(stream.iter())
            .map(|(p, k)| p ^ k)
            .collect();
        Ok((BASE64.encode(bytes), self.version.clone()))
    }

    async fn decrypt(&self, ciphertext: &str, key_version: &str) -> Result<Vec<u8>, GatewayError> {
        if key_version != self.version {
            return Err(GatewayError::Crypto(format!(
                "Unknown key version {}",
                key_version
            )));
        }
        let bytes = BASE64
            .decode(ciphertext)
            .map_err(|e| GatewayError::Crypto(format!("Ciphertext not base64: {}", e)))?;
        let stream = self.keystream(bytes.len());
        Ok(bytes
            .iter()
            .zip(stream.iter())
            .map(|(c, k)| c ^ k)
            .collect())
    }

    fn current_key_version(&self) -> String {
        self.version.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> StaticFiscalCipher {
        StaticFiscalCipher::new(secrecy::SecretString::from("test-key".to_string()), "v1")
    }

    #[tokio::test]
    async fn test_round_trip() {
        let c = cipher();
        let (ciphertext, version) = c.encrypt(b"12345678901").await.unwrap();
        assert_eq!(version, "v1");
        assert_ne!(ciphertext, BASE64.encode(b"12345678901"));
        let plaintext = c.decrypt(&ciphertext, &version).await.unwrap();
        assert_eq!(plaintext, b"12345678901");
    }

    #[tokio::test]
    async fn test_unknown_key_version_rejected() {
        let c = cipher();
        let (ciphertext, _) = c.encrypt(b"x").await.unwrap();
        assert!(c.decrypt(&ciphertext, "v99").await.is_err());
    }

    #[tokio::test]
    async fn test_protect_builds_triple() {
        let c = cipher();
        let hash_key = secrecy::SecretString::from("hash-key".to_string());
        let fiscal = protect_fiscal_id(&c, &hash_key, "12345678901")
            .await
            .unwrap();
        assert!(!fiscal.hash.is_empty());
        assert!(!fiscal.ciphertext.is_empty());
        assert_eq!(fiscal.key_version, "v1");
        // plaintext never appears in the triple
        assert!(!fiscal.ciphertext.contains("12345678901"));

        let decrypted = c
            .decrypt(&fiscal.ciphertext, &fiscal.key_version)
            .await
            .unwrap();
        assert_eq!(decrypted, b"12345678901");
    }

    #[test]
    fn test_salted_hashes_differ() {
        let hash_key = secrecy::SecretString::from("hash-key".to_string());
        let h1 = fiscal_hash(&hash_key, b"salt-a", "12345678901");
        let h2 = fiscal_hash(&hash_key, b"salt-b", "12345678901");
        assert_ne!(h1, h2);

        // the lookup hash is deterministic
        assert_eq!(
            fiscal_lookup_hash(&hash_key, "12345678901"),
            fiscal_lookup_hash(&hash_key, "12345678901")
        );
    }
}
