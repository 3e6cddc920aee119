use kestrel_storage::Facade;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const AUDIT_LOG_NAMESPACE: &str = "auth_audit_log";

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("storage error: {0}")]
    Storage(#[from] kestrel_storage::StorageError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Failure,
    Revoked,
    RateLimited,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub subject: String,
    pub action: String,
    pub outcome: AuditOutcome,
    pub detail: Option<String>,
    pub timestamp_nanos: i64,
}

/// Append-only audit trail. Keys are `<timestamp_nanos>.<uuid>` so a
/// prefix-ordered `list_keys` scan of `auth_audit_log` yields entries in
/// chronological order without needing a separate index.
///
/// No retention/pruning job exists yet in this version — an unbounded
/// namespace is acceptable at kernel scale. TODO: add a retention sweep
/// once audit volume at a real deployment scale is known.
pub struct AuditLog {
    facade: std::sync::Arc<Facade>,
}

impl AuditLog {
    pub fn new(facade: std::sync::Arc<Facade>) -> Self {
        Self { facade }
    }

    pub async fn record(
        &self,
        subject: &str,
        action: &str,
        outcome: AuditOutcome,
        detail: Option<String>,
    ) -> Result<(), AuditError> {
        let timestamp_nanos = chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default();
        let key = format!("{timestamp_nanos}.{}", Uuid::new_v4());

        let record = AuditRecord {
            subject: subject.to_string(),
            action: action.to_string(),
            outcome,
            detail,
            timestamp_nanos,
        };

        self.facade.set(AUDIT_LOG_NAMESPACE, &key, record).await?;
        Ok(())
    }
}
