/// Data model shared across the gateway
pub mod company;
pub mod dlq;
pub mod domain;
pub mod event;
pub mod fairness;
pub mod job;
pub mod outbox;
pub mod recipient;

pub use company::{ApprovalState, Company, RateCaps, SendingCaps};
pub use dlq::DlqEntry;
pub use domain::{DkimStatus, Domain, DomainStatus, WarmupPlan};
pub use event::{EmailEvent, EventMetadata, EventType};
pub use fairness::TenantFairness;
pub use job::{JobEnvelope, QueuedJob, RecipientRef};
pub use outbox::{AttachmentMeta, BodyRef, EmailLog, EmailOutbox, OutboxStatus};
pub use recipient::{FiscalIdentifier, Recipient};
