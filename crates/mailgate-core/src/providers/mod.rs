/// Provider layer: pluggable dispatch drivers
///
/// A driver exposes `send`, `verify_connection` and `get_quota`. Every
/// production call path wraps a driver in `guard::GuardedProvider`
/// (timeout, circuit breaker, token-bucket rate limit). SES is primary;
/// SMTP is the secondary plug-in. Selection is a priority-ordered list of
/// active configs, optionally pinned per tenant.
pub mod compose;
pub mod guard;
pub mod ses;
pub mod smtp;

use crate::error::GatewayError;
use crate::models::AttachmentMeta;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Fully resolved email at dispatch time: HTML loaded from its reference,
/// attachment content fetched from the body store
#[derive(Debug, Clone)]
pub struct RenderedEmail {
    pub from: String,
    pub to: String,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub reply_to: Option<String>,
    pub subject: String,
    pub html: String,
    pub headers: Vec<(String, String)>,
    pub attachments: Vec<(AttachmentMeta, Vec<u8>)>,
}

impl RenderedEmail {
    /// Every address the provider must deliver to
    pub fn all_recipients(&self) -> Vec<String> {
        std::iter::once(self.to.clone())
            .chain(self.cc.iter().cloned())
            .chain(self.bcc.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub provider_message_id: String,
}

#[derive(Debug, Clone, Copy)]
pub struct SendQuota {
    pub max_24_hour_send: f64,
    pub max_send_rate: f64,
    pub sent_last_24_hours: f64,
}

#[async_trait]
pub trait ProviderDriver: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, email: &RenderedEmail) -> Result<SendOutcome, GatewayError>;

    async fn verify_connection(&self) -> Result<(), GatewayError>;

    async fn get_quota(&self) -> Result<SendQuota, GatewayError>;
}

/// One entry in the priority-ordered provider list
pub struct ProviderBinding {
    /// Lower runs first
    pub priority: u8,
    /// None binds the provider for every tenant
    pub company_id: Option<Uuid>,
    pub active: bool,
    pub driver: Arc<guard::GuardedProvider>,
}

/// Per-tenant provider selection
pub struct ProviderRouter {
    bindings: Vec<ProviderBinding>,
}

impl ProviderRouter {
    pub fn new(mut bindings: Vec<ProviderBinding>) -> Self {
        bindings.sort_by_key(|b| b.priority);
        Self { bindings }
    }

    /// First active binding for the tenant whose circuit currently admits
    /// calls; falls back to the first active binding (which will fail
    /// fast with PROVIDER_CIRCUIT_OPEN, a retryable outcome).
    pub async fn select(
        &self,
        company_id: Uuid,
    ) -> Result<Arc<guard::GuardedProvider>, GatewayError> {
        let eligible: Vec<&ProviderBinding> = self
            .bindings
            .iter()
            .filter(|b| b.active && (b.company_id.is_none() || b.company_id == Some(company_id)))
            .collect();

        if eligible.is_empty() {
            return Err(GatewayError::ProviderConfig(format!(
                "No active provider configured for company {}",
                company_id
            )));
        }

        for binding in &eligible {
            if binding.driver.is_available().await {
                return Ok(binding.driver.clone());
            }
        }
        Ok(eligible[0].driver.clone())
    }
}

pub mod testing {
    //! Scriptable driver for pipeline tests and local runs

    use super::*;
    use std::collections::VecDeque;

    pub enum ScriptedResult {
        Ok(String),
        Err(fn(String) -> GatewayError, String),
    }

    pub struct ScriptedProvider {
        name: String,
        script: tokio::sync::Mutex<VecDeque<ScriptedResult>>,
        pub calls: std::sync::atomic::AtomicU32,
    }

    impl ScriptedProvider {
        pub fn new(name: &str, script: Vec<ScriptedResult>) -> Self {
            Self {
                name: name.to_string(),
                script: tokio::sync::Mutex::new(script.into()),
                calls: std::sync::atomic::AtomicU32::new(0),
            }
        }

        /// Succeeds on every call with generated message ids
        pub fn always_ok(name: &str) -> Self {
            Self::new(name, vec![])
        }
    }

    #[async_trait]
    impl ProviderDriver for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, _email: &RenderedEmail) -> Result<SendOutcome, GatewayError> {
            self.calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let mut script = self.script.lock().await;
            match script.pop_front() {
                None => Ok(SendOutcome {
                    provider_message_id: format!("msg-{}", uuid::Uuid::new_v4()),
                }),
                Some(ScriptedResult::Ok(id)) => Ok(SendOutcome {
                    provider_message_id: id,
                }),
                Some(ScriptedResult::Err(make, msg)) => Err(make(msg)),
            }
        }

        async fn verify_connection(&self) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn get_quota(&self) -> Result<SendQuota, GatewayError> {
            Ok(SendQuota {
                max_24_hour_send: 50_000.0,
                max_send_rate: 14.0,
                sent_last_24_hours: 0.0,
            })
        }
    }
}
