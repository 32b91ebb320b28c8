/// Domain store and verification probes
///
/// DKIM key material is delegated to the provider's Easy-DKIM: onboarding
/// requests tokens to publish as `<token>._domainkey.<domain>` CNAMEs,
/// and the periodic probe polls identity and DKIM verification state.
/// The state machine itself lives on `models::Domain`.
use crate::error::GatewayError;
use crate::models::{DkimStatus, Domain, DomainStatus};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::Utc;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

#[async_trait]
pub trait DomainStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Domain>, GatewayError>;

    async fn find_by_name(
        &self,
        company_id: Uuid,
        name: &str,
    ) -> Result<Option<Domain>, GatewayError>;

    async fn put(&self, domain: &Domain) -> Result<(), GatewayError>;

    /// Domains due for a verification probe
    async fn due_for_probe(&self, limit: usize) -> Result<Vec<Domain>, GatewayError>;
}

/// Outcome of one DNS-side verification probe
#[derive(Debug, Clone, Copy)]
pub struct ProbeOutcome {
    pub identity_verified: bool,
    pub dkim_verified: bool,
}

#[async_trait]
pub trait DomainVerifier: Send + Sync {
    /// Requests DKIM tokens for a new domain
    async fn request_dkim_tokens(&self, domain: &str) -> Result<Vec<String>, GatewayError>;

    /// Polls current verification state
    async fn probe(&self, domain: &str) -> Result<ProbeOutcome, GatewayError>;
}

/// Creates the domain record and kicks off provider-side verification
pub async fn onboard_domain(
    store: &dyn DomainStore,
    verifier: &dyn DomainVerifier,
    company_id: Uuid,
    name: &str,
) -> Result<Domain, GatewayError> {
    let name = name.trim().to_ascii_lowercase();
    if name.is_empty() || !name.contains('.') {
        return Err(GatewayError::Validation(format!(
            "Not a domain name: {}",
            name
        )));
    }
    if let Some(existing) = store.find_by_name(company_id, &name).await? {
        return Ok(existing);
    }

    let tokens = verifier.request_dkim_tokens(&name).await?;
    let now = Utc::now();
    let domain = Domain {
        id: Uuid::new_v4(),
        company_id,
        name: name.clone(),
        status: DomainStatus::Pending,
        dkim_status: DkimStatus::Pending,
        dkim_selectors: tokens.clone(),
        dkim_tokens: tokens,
        last_checked: None,
        probe_successes: 0,
        probe_failures: 0,
        warmup: None,
        created_at: now,
        updated_at: now,
    };
    store.put(&domain).await?;
    info!(domain = %name, "Domain onboarded, DKIM tokens issued");
    Ok(domain)
}

/// Runs one probe cycle for a domain and persists the updated state
pub async fn run_probe(
    store: &dyn DomainStore,
    verifier: &dyn DomainVerifier,
    mut domain: Domain,
) -> Result<Domain, GatewayError> {
    // hard FAILED is operator-set; probes never resurrect it
    if domain.status == DomainStatus::Failed {
        return Ok(domain);
    }

    let now = Utc::now();
    match verifier.probe(&domain.name).await {
        Ok(outcome) => {
            domain.apply_probe(outcome.identity_verified, outcome.dkim_verified, now);
        }
        Err(e) => {
            warn!(domain = %domain.name, error = %e, "Verification probe errored");
            domain.apply_probe(false, false, now);
        }
    }
    store.put(&domain).await?;
    Ok(domain)
}

// ============================================================================
// SES verifier
// ============================================================================

pub struct SesDomainVerifier {
    client: aws_sdk_ses::Client,
}

impl SesDomainVerifier {
    pub fn new(client: aws_sdk_ses::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DomainVerifier for SesDomainVerifier {
    async fn request_dkim_tokens(&self, domain: &str) -> Result<Vec<String>, GatewayError> {
        let response = self
            .client
            .verify_domain_dkim()
            .domain(domain)
            .send()
            .await
            .map_err(|e| {
                GatewayError::ProviderConfig(format!("SES verify_domain_dkim failed: {}", e))
            })?;
        Ok(response.dkim_tokens().to_vec())
    }

    async fn probe(&self, domain: &str) -> Result<ProbeOutcome, GatewayError> {
        let identity = self
            .client
            .get_identity_verification_attributes()
            .identities(domain)
            .send()
            .await
            .map_err(|e| {
                GatewayError::ProviderUnavailable(format!(
                    "SES identity attributes lookup failed: {}",
                    e
                ))
            })?;
        let identity_verified = identity
            .verification_attributes()
            .get(domain)
            .map(|attr| {
                matches!(
                    attr.verification_status(),
                    aws_sdk_ses::types::VerificationStatus::Success
                )
            })
            .unwrap_or(false);

        let dkim = self
            .client
            .get_identity_dkim_attributes()
            .identities(domain)
            .send()
            .await
            .map_err(|e| {
                GatewayError::ProviderUnavailable(format!(
                    "SES DKIM attributes lookup failed: {}",
                    e
                ))
            })?;
        let dkim_verified = dkim
            .dkim_attributes()
            .get(domain)
            .map(|attr| {
                matches!(
                    attr.dkim_verification_status(),
                    aws_sdk_ses::types::VerificationStatus::Success
                )
            })
            .unwrap_or(false);

        Ok(ProbeOutcome {
            identity_verified,
            dkim_verified,
        })
    }
}

// ============================================================================
// DynamoDB store
// ============================================================================

pub struct DynamoDbDomainStore {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

impl DynamoDbDomainStore {
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: String) -> Self {
        Self { client, table_name }
    }

    fn from_item(item: &HashMap<String, AttributeValue>) -> Result<Domain, GatewayError> {
        let payload = item
            .get("payload")
            .and_then(|v| v.as_s().ok())
            .ok_or_else(|| GatewayError::Storage("Domain item missing payload".to_string()))?;
        serde_json::from_str(payload)
            .map_err(|e| GatewayError::Storage(format!("Domain deserialization failed: {}", e)))
    }
}

#[async_trait]
impl DomainStore for DynamoDbDomainStore {
    async fn get(&self, id: Uuid) -> Result<Option<Domain>, GatewayError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Domain get failed: {}", e)))?;
        result.item().map(Self::from_item).transpose()
    }

    async fn find_by_name(
        &self,
        company_id: Uuid,
        name: &str,
    ) -> Result<Option<Domain>, GatewayError> {
        let result = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name("company_id-name-index")
            .key_condition_expression("company_id = :c AND #n = :n")
            .expression_attribute_names("#n", "name")
            .expression_attribute_values(":c", AttributeValue::S(company_id.to_string()))
            .expression_attribute_values(":n", AttributeValue::S(name.to_string()))
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Domain lookup failed: {}", e)))?;
        result.items().first().map(Self::from_item).transpose()
    }

    async fn put(&self, domain: &Domain) -> Result<(), GatewayError> {
        let payload = serde_json::to_string(domain)
            .map_err(|e| GatewayError::Storage(format!("Domain serialization failed: {}", e)))?;
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("id", AttributeValue::S(domain.id.to_string()))
            .item(
                "company_id",
                AttributeValue::S(domain.company_id.to_string()),
            )
            .item("name", AttributeValue::S(domain.name.clone()))
            .item("status", AttributeValue::S(format!("{:?}", domain.status)))
            .item("payload", AttributeValue::S(payload))
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Domain put failed: {}", e)))?;
        Ok(())
    }

    async fn due_for_probe(&self, limit: usize) -> Result<Vec<Domain>, GatewayError> {
        let result = self
            .client
            .scan()
            .table_name(&self.table_name)
            .send()
            .await
            .map_err(|e| GatewayError::Storage(format!("Domain scan failed: {}", e)))?;

        let now = Utc::now();
        let mut due = Vec::new();
        for item in result.items() {
            let domain = Self::from_item(item)?;
            let settled = matches!(
                domain.status,
                DomainStatus::Failed | DomainStatus::Verified
            );
            let is_due = match domain.last_checked {
                Some(checked) => {
                    checked
                        + chrono::Duration::from_std(domain.next_probe_delay())
                            .unwrap_or_else(|_| chrono::Duration::hours(1))
                        <= now
                }
                None => true,
            };
            if !settled && is_due {
                due.push(domain);
                if due.len() >= limit {
                    break;
                }
            }
        }
        Ok(due)
    }
}

// ============================================================================
// In-memory implementations (tests and local runs)
// ============================================================================

#[derive(Default)]
pub struct InMemoryDomainStore {
    domains: tokio::sync::Mutex<HashMap<Uuid, Domain>>,
}

impl InMemoryDomainStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DomainStore for InMemoryDomainStore {
    async fn get(&self, id: Uuid) -> Result<Option<Domain>, GatewayError> {
        Ok(self.domains.lock().await.get(&id).cloned())
    }

    async fn find_by_name(
        &self,
        company_id: Uuid,
        name: &str,
    ) -> Result<Option<Domain>, GatewayError> {
        Ok(self
            .domains
            .lock()
            .await
            .values()
            .find(|d| d.company_id == company_id && d.name == name)
            .cloned())
    }

    async fn put(&self, domain: &Domain) -> Result<(), GatewayError> {
        self.domains.lock().await.insert(domain.id, domain.clone());
        Ok(())
    }

    async fn due_for_probe(&self, limit: usize) -> Result<Vec<Domain>, GatewayError> {
        let now = Utc::now();
        let domains = self.domains.lock().await;
        Ok(domains
            .values()
            .filter(|d| {
                d.status != DomainStatus::Failed
                    && d.status != DomainStatus::Verified
                    && match d.last_checked {
                        Some(checked) => {
                            let due = checked
                                + chrono::Duration::from_std(d.next_probe_delay())
                                    .unwrap_or_else(|_| chrono::Duration::hours(1));
                            due <= now
                        }
                        None => true,
                    }
            })
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Scriptable verifier for tests
pub struct MockDomainVerifier {
    outcomes: tokio::sync::Mutex<Vec<ProbeOutcome>>,
}

impl MockDomainVerifier {
    pub fn new(outcomes: Vec<ProbeOutcome>) -> Self {
        Self {
            outcomes: tokio::sync::Mutex::new(outcomes),
        }
    }
}

#[async_trait]
impl DomainVerifier for MockDomainVerifier {
    async fn request_dkim_tokens(&self, domain: &str) -> Result<Vec<String>, GatewayError> {
        Ok(vec![
            format!("{}-token-1", domain),
            format!("{}-token-2", domain),
            format!("{}-token-3", domain),
        ])
    }

    async fn probe(&self, _domain: &str) -> Result<ProbeOutcome, GatewayError> {
        let mut outcomes = self.outcomes.lock().await;
        if outcomes.is_empty() {
            Ok(ProbeOutcome {
                identity_verified: false,
                dkim_verified: false,
            })
        } else {
            Ok(outcomes.remove(0))
        }
    }
}
