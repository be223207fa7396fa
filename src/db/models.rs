use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::enums::{ExpiryClass, NotificationOutcome, RecipientClass};

pub use crate::db::entities::notification_record::Model as NotificationRecord;
pub use crate::db::entities::renewal_event::Model as RenewalEvent;

/// An active lease joined with its owning project, as the expiry engine sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmLease {
    pub id: i32,
    pub project_id: i32,
    pub project_name: String,
    pub name: String,
    pub recipient_email: String,
    pub expires_at: DateTime<Utc>,
    pub account_id: Option<String>,
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
}

/// Claim written before a send attempt. Stored as `PENDING` with no attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotificationRecord {
    pub vm_lease_id: i32,
    pub recipient_class: RecipientClass,
    pub expiry_class: ExpiryClass,
    pub window_start: DateTime<Utc>,
    pub attempted_at: DateTime<Utc>,
}

/// Overwrites the mutable columns of a notification record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub outcome: NotificationOutcome,
    pub attempt_count: i32,
    pub failure_reason: Option<String>,
    pub message_id: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

impl RecordUpdate {
    pub fn sent(attempt_count: i32, message_id: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            outcome: NotificationOutcome::Sent,
            attempt_count,
            failure_reason: None,
            message_id,
            attempted_at: at,
        }
    }

    pub fn failed(attempt_count: i32, reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            outcome: NotificationOutcome::Failed,
            attempt_count,
            failure_reason: Some(reason.into()),
            message_id: None,
            attempted_at: at,
        }
    }
}

/// A renewal to apply. `expected_previous` guards against a concurrent
/// renewal having moved the expiry since it was read.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRenewal {
    pub vm_lease_id: i32,
    pub expected_previous: DateTime<Utc>,
    pub new_expiry: DateTime<Utc>,
    pub period_months: Option<i32>,
    pub actor: String,
    pub applied_at: DateTime<Utc>,
}
