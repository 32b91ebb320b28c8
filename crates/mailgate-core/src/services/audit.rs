/// Break-glass elevation and the audit trail
///
/// The default `operations` profile sees masked PII only. Seeing unmasked
/// values requires a break-glass session: the `audit` profile, a signed
/// justification of at least 20 characters, a session capped at 60
/// minutes, and an audit record for every access.
use crate::constants::{
    BREAK_GLASS_MIN_JUSTIFICATION, BREAK_GLASS_SESSION_SECONDS, LOG_TARGET_AUDIT, PROFILE_AUDIT,
};
use crate::error::GatewayError;
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Claims carried by a break-glass session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakGlassClaims {
    /// Operator user id
    pub sub: String,
    pub profile: String,
    pub justification: String,
    pub iat: i64,
    pub exp: i64,
}

/// One audited access to unmasked PII
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub user: String,
    pub reason: String,
    pub resource: String,
    pub ip: String,
    pub occurred_at: DateTime<Utc>,
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), GatewayError>;
}

pub struct BreakGlass {
    secret: secrecy::SecretString,
}

impl BreakGlass {
    pub fn new(secret: secrecy::SecretString) -> Self {
        Self { secret }
    }

    /// Issues a session token. The caller has already authenticated the
    /// operator; this enforces profile and justification rules.
    pub fn issue(
        &self,
        user: &str,
        profile: &str,
        justification: &str,
    ) -> Result<String, GatewayError> {
        if profile != PROFILE_AUDIT {
            return Err(GatewayError::Forbidden(format!(
                "Profile '{}' cannot open break-glass sessions",
                profile
            )));
        }
        if justification.trim().len() < BREAK_GLASS_MIN_JUSTIFICATION {
            return Err(GatewayError::Validation(format!(
                "Justification must be at least {} characters",
                BREAK_GLASS_MIN_JUSTIFICATION
            )));
        }

        let now = Utc::now().timestamp();
        let claims = BreakGlassClaims {
            sub: user.to_string(),
            profile: profile.to_string(),
            justification: justification.trim().to_string(),
            iat: now,
            exp: now + BREAK_GLASS_SESSION_SECONDS as i64,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.expose_secret().as_bytes()),
        )
        .map_err(|e| GatewayError::Crypto(format!("Token signing failed: {}", e)))
    }

    /// Validates a session token; expired or tampered tokens fail closed
    pub fn verify(&self, token: &str) -> Result<BreakGlassClaims, GatewayError> {
        let data = decode::<BreakGlassClaims>(
            token,
            &DecodingKey::from_secret(self.secret.expose_secret().as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| GatewayError::Unauthorized(format!("Invalid break-glass session: {}", e)))?;

        if data.claims.profile != PROFILE_AUDIT {
            return Err(GatewayError::Forbidden(
                "Session profile is not 'audit'".to_string(),
            ));
        }
        Ok(data.claims)
    }
}

/// Records one unmasked access under an active session
pub async fn audit_access(
    log: &dyn AuditLog,
    claims: &BreakGlassClaims,
    resource: &str,
    ip: &str,
) -> Result<(), GatewayError> {
    let event = AuditEvent {
        id: Uuid::new_v4(),
        user: claims.sub.clone(),
        reason: claims.justification.clone(),
        resource: resource.to_string(),
        ip: ip.to_string(),
        occurred_at: Utc::now(),
    };
    info!(
        target: LOG_TARGET_AUDIT,
        user = %event.user,
        resource = %event.resource,
        ip = %event.ip,
        "Break-glass access"
    );
    log.append(event).await
}

// ============================================================================
// DynamoDB implementation
// ============================================================================

pub struct DynamoDbAuditLog {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

impl DynamoDbAuditLog {
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: String) -> Self {
        Self { client, table_name }
    }
}

#[async_trait]
impl AuditLog for DynamoDbAuditLog {
    async fn append(&self, event: AuditEvent) -> Result<(), GatewayError> {
        let payload = serde_json::to_string(&event)
            .map_err(|e| GatewayError::Storage(format!("Audit serialization failed: {}", e)))?;
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("id", AttributeValue::S(event.id.to_string()))
            .item(
                "occurred_at",
                AttributeValue::S(event.occurred_at.to_rfc3339()),
            )
            .item("payload", AttributeValue::S(payload))
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Audit append failed: {}", e)))?;
        Ok(())
    }
}

// ============================================================================
// In-memory implementation (tests and local runs)
// ============================================================================

#[derive(Default)]
pub struct InMemoryAuditLog {
    events: tokio::sync::Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, event: AuditEvent) -> Result<(), GatewayError> {
        self.events.lock().await.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn break_glass() -> BreakGlass {
        BreakGlass::new(secrecy::SecretString::from("test-signing-secret".to_string()))
    }

    #[test]
    fn test_issue_and_verify() {
        let bg = break_glass();
        let token = bg
            .issue("op-1", PROFILE_AUDIT, "investigating bounce storm for acme")
            .unwrap();
        let claims = bg.verify(&token).unwrap();
        assert_eq!(claims.sub, "op-1");
        assert!(claims.exp - claims.iat <= BREAK_GLASS_SESSION_SECONDS as i64);
    }

    #[test]
    fn test_short_justification_rejected() {
        let bg = break_glass();
        assert!(bg.issue("op-1", PROFILE_AUDIT, "because").is_err());
    }

    #[test]
    fn test_wrong_profile_rejected() {
        let bg = break_glass();
        let err = bg.issue(
            "op-1",
            crate::constants::PROFILE_OPERATIONS,
            "a perfectly long justification here",
        );
        assert!(matches!(err, Err(GatewayError::Forbidden(_))));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let bg = break_glass();
        let token = bg
            .issue("op-1", PROFILE_AUDIT, "investigating bounce storm for acme")
            .unwrap();
        let other = BreakGlass::new(secrecy::SecretString::from("different-secret".to_string()));
        assert!(other.verify(&token).is_err());
        assert!(bg.verify("garbage.token.here").is_err());
    }

    #[tokio::test]
    async fn test_access_audited() {
        let bg = break_glass();
        let log = InMemoryAuditLog::new();
        let token = bg
            .issue("op-1", PROFILE_AUDIT, "support ticket 4211 investigation")
            .unwrap();
        let claims = bg.verify(&token).unwrap();

        audit_access(&log, &claims, "emails/123", "10.1.2.3")
            .await
            .unwrap();

        let events = log.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user, "op-1");
        assert_eq!(events[0].resource, "emails/123");
        assert_eq!(events[0].reason, "support ticket 4211 investigation");
    }
}
