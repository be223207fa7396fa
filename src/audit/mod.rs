//! Append-only operational audit trail.
//!
//! Recording is fire-and-forget: [`AuditRecorder::record`] returns nothing, and
//! sinks log their own failures instead of failing the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, NotSet, Set};
use serde::Serialize;
use tracing::{info, warn};

use crate::db::entities::audit_log;
use crate::db::enums::{ExpiryClass, RecipientClass};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    NotificationSent {
        lease_id: i32,
        record_id: i32,
        recipient_class: RecipientClass,
        expiry_class: ExpiryClass,
        message_id: Option<String>,
    },
    NotificationFailed {
        lease_id: i32,
        record_id: i32,
        recipient_class: RecipientClass,
        expiry_class: ExpiryClass,
        reason: String,
    },
    RetrySucceeded {
        lease_id: i32,
        record_id: i32,
        recipient_class: RecipientClass,
        attempt_count: i32,
    },
    RetryExhausted {
        lease_id: i32,
        record_id: i32,
        recipient_class: RecipientClass,
        attempt_count: i32,
        reason: String,
    },
    RenewalApplied {
        lease_id: i32,
        actor: String,
        previous_expiry: DateTime<Utc>,
        new_expiry: DateTime<Utc>,
        period_months: Option<i32>,
    },
    ExpiryCheckCompleted {
        total_vms: usize,
        expiring_vms: usize,
        notifications_sent: usize,
        notifications_failed: usize,
        retry_exhausted: usize,
    },
}

impl AuditEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AuditEvent::NotificationSent { .. } => "notification_sent",
            AuditEvent::NotificationFailed { .. } => "notification_failed",
            AuditEvent::RetrySucceeded { .. } => "retry_succeeded",
            AuditEvent::RetryExhausted { .. } => "retry_exhausted",
            AuditEvent::RenewalApplied { .. } => "renewal_applied",
            AuditEvent::ExpiryCheckCompleted { .. } => "expiry_check_completed",
        }
    }

    pub fn lease_id(&self) -> Option<i32> {
        match self {
            AuditEvent::NotificationSent { lease_id, .. }
            | AuditEvent::NotificationFailed { lease_id, .. }
            | AuditEvent::RetrySucceeded { lease_id, .. }
            | AuditEvent::RetryExhausted { lease_id, .. }
            | AuditEvent::RenewalApplied { lease_id, .. } => Some(*lease_id),
            AuditEvent::ExpiryCheckCompleted { .. } => None,
        }
    }

    pub fn actor(&self) -> Option<&str> {
        match self {
            AuditEvent::RenewalApplied { actor, .. } => Some(actor),
            _ => None,
        }
    }
}

#[async_trait]
pub trait AuditRecorder: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Writes audit events to the log stream under the `leasewatch::audit` target.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditRecorder;

#[async_trait]
impl AuditRecorder for TracingAuditRecorder {
    async fn record(&self, event: AuditEvent) {
        let details = serde_json::to_string(&event).unwrap_or_default();
        info!(
            target: "leasewatch::audit",
            event_type = event.event_type(),
            lease_id = event.lease_id(),
            details = %details,
            "Audit event."
        );
    }
}

/// Persists audit events to the `audit_logs` table.
#[derive(Clone)]
pub struct DbAuditRecorder {
    db: DatabaseConnection,
}

impl DbAuditRecorder {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditRecorder for DbAuditRecorder {
    async fn record(&self, event: AuditEvent) {
        let details = match serde_json::to_value(&event) {
            Ok(value) => value,
            Err(e) => {
                warn!(event_type = event.event_type(), error = %e, "Failed to serialize audit event.");
                return;
            }
        };
        let row = audit_log::ActiveModel {
            id: NotSet,
            event_type: Set(event.event_type().to_string()),
            vm_lease_id: Set(event.lease_id()),
            actor: Set(event.actor().map(str::to_string)),
            details: Set(details),
            created_at: Set(Utc::now()),
        };
        if let Err(e) = row.insert(&self.db).await {
            warn!(event_type = event.event_type(), error = %e, "Failed to write audit log entry.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::ensure_schema;
    use sea_orm::{Database, EntityTrait};

    fn renewal_event() -> AuditEvent {
        AuditEvent::RenewalApplied {
            lease_id: 7,
            actor: "alice".to_string(),
            previous_expiry: Utc::now(),
            new_expiry: Utc::now(),
            period_months: Some(3),
        }
    }

    #[test]
    fn test_event_metadata() {
        let event = renewal_event();
        assert_eq!(event.event_type(), "renewal_applied");
        assert_eq!(event.lease_id(), Some(7));
        assert_eq!(event.actor(), Some("alice"));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "renewal_applied");
        assert_eq!(json["period_months"], 3);
    }

    #[tokio::test]
    async fn test_db_recorder_persists_events() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        ensure_schema(&db).await.unwrap();
        let recorder = DbAuditRecorder::new(db.clone());

        recorder.record(renewal_event()).await;

        let rows = audit_log::Entity::find().all(&db).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_type, "renewal_applied");
        assert_eq!(rows[0].vm_lease_id, Some(7));
        assert_eq!(rows[0].actor.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_db_recorder_swallows_write_failures() {
        // No schema: the insert fails and must not surface.
        let db = Database::connect("sqlite::memory:").await.unwrap();
        DbAuditRecorder::new(db).record(renewal_event()).await;
    }
}
