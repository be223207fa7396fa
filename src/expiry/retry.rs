use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audit::AuditEvent;
use crate::db::enums::RecipientClass;
use crate::db::models::{NotificationRecord, RecordUpdate};
use crate::db::store::{LeaseStore, StoreError};
use crate::expiry::dispatcher::NotificationDispatcher;
use crate::expiry::scanner::NotificationThresholds;

const INTERRUPTED_REASON: &str = "interrupted before delivery outcome was recorded";
const SUPERSEDED_REASON: &str = "superseded: lease expiry changed";
const LEASE_GONE_REASON: &str = "superseded: lease no longer exists";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryOutcome {
    /// Stale `PENDING` claims turned into failed attempts.
    pub reclaimed: usize,
    pub retried: usize,
    pub succeeded: usize,
    pub still_failing: usize,
    pub exhausted: usize,
    /// Records closed because the lease was renewed or removed since they failed.
    pub superseded: usize,
    pub exhausted_record_ids: Vec<i32>,
    pub user_sent: usize,
    pub admin_sent: usize,
    pub errors: Vec<String>,
}

enum RetryResult {
    Succeeded(RecipientClass),
    StillFailing,
    Exhausted(i32),
    Superseded,
}

/// Re-attempts failed notifications once per invocation.
///
/// Records attempted during the current invocation are not picked up, so the
/// spacing between attempts is the scan cadence.
pub struct RetryCoordinator {
    dispatcher: Arc<NotificationDispatcher>,
    pending_timeout: Duration,
}

impl RetryCoordinator {
    pub fn new(dispatcher: Arc<NotificationDispatcher>, pending_timeout: Duration) -> Self {
        Self {
            dispatcher,
            pending_timeout,
        }
    }

    pub async fn retry_failed(&self, max_attempts: i32, now: DateTime<Utc>) -> Result<RetryOutcome, StoreError> {
        let store = self.dispatcher.store();
        let mut outcome = RetryOutcome::default();

        for record in store.list_stale_pending_records(now - self.pending_timeout).await? {
            let attempt = record.attempt_count + 1;
            let update = RecordUpdate::failed(attempt, INTERRUPTED_REASON, record.attempted_at);
            match store.update_notification_record(record.id, update).await {
                Ok(_) => {
                    warn!(record_id = record.id, lease_id = record.vm_lease_id, "Reclaimed stale pending notification.");
                    outcome.reclaimed += 1;
                    // Nothing left for the retry pass to pick up.
                    if attempt >= max_attempts {
                        self.report_exhausted(&record, attempt, INTERRUPTED_REASON.to_string()).await;
                        outcome.exhausted += 1;
                        outcome.exhausted_record_ids.push(record.id);
                    }
                }
                Err(e) => outcome.errors.push(format!("record {}: {e}", record.id)),
            }
        }

        let retryable = store.list_retryable_records(max_attempts, now).await?;
        for record in retryable {
            let record_id = record.id;
            match self.retry_one(record, max_attempts, now).await {
                Ok(RetryResult::Succeeded(class)) => {
                    outcome.retried += 1;
                    outcome.succeeded += 1;
                    match class {
                        RecipientClass::User => outcome.user_sent += 1,
                        RecipientClass::Admin => outcome.admin_sent += 1,
                    }
                }
                Ok(RetryResult::StillFailing) => {
                    outcome.retried += 1;
                    outcome.still_failing += 1;
                }
                Ok(RetryResult::Exhausted(id)) => {
                    outcome.retried += 1;
                    outcome.exhausted += 1;
                    outcome.exhausted_record_ids.push(id);
                }
                Ok(RetryResult::Superseded) => outcome.superseded += 1,
                Err(e) => {
                    warn!(record_id, error = %e, "Storage error while retrying notification.");
                    outcome.errors.push(format!("record {record_id}: {e}"));
                }
            }
        }

        info!(
            retried = outcome.retried,
            succeeded = outcome.succeeded,
            still_failing = outcome.still_failing,
            exhausted = outcome.exhausted,
            superseded = outcome.superseded,
            "Notification retry pass finished."
        );
        Ok(outcome)
    }

    async fn retry_one(
        &self,
        record: NotificationRecord,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> Result<RetryResult, StoreError> {
        let store = self.dispatcher.store();
        let lease = match store.get_vm_lease(record.vm_lease_id).await {
            Ok(lease) => lease,
            Err(StoreError::LeaseNotFound(_)) => {
                self.close(store, &record, max_attempts, LEASE_GONE_REASON, now).await?;
                return Ok(RetryResult::Superseded);
            }
            Err(e) => return Err(e),
        };

        if !same_window(self.dispatcher.thresholds(), &record, lease.expires_at) {
            self.close(store, &record, max_attempts, SUPERSEDED_REASON, now).await?;
            return Ok(RetryResult::Superseded);
        }

        let attempt = record.attempt_count + 1;
        let audit = self.dispatcher.audit();
        match self
            .dispatcher
            .deliver(&lease, record.expiry_class, record.recipient_class, now)
            .await
        {
            Ok(receipt) => {
                store
                    .update_notification_record(record.id, RecordUpdate::sent(attempt, receipt.message_id, now))
                    .await?;
                info!(record_id = record.id, lease_id = lease.id, attempt, "Retried notification sent.");
                audit
                    .record(AuditEvent::RetrySucceeded {
                        lease_id: lease.id,
                        record_id: record.id,
                        recipient_class: record.recipient_class,
                        attempt_count: attempt,
                    })
                    .await;
                Ok(RetryResult::Succeeded(record.recipient_class))
            }
            Err(e) => {
                let reason = e.to_string();
                store
                    .update_notification_record(record.id, RecordUpdate::failed(attempt, reason.clone(), now))
                    .await?;
                if attempt >= max_attempts {
                    self.report_exhausted(&record, attempt, reason).await;
                    Ok(RetryResult::Exhausted(record.id))
                } else {
                    warn!(record_id = record.id, lease_id = lease.id, attempt, error = %reason, "Notification retry failed.");
                    Ok(RetryResult::StillFailing)
                }
            }
        }
    }

    async fn report_exhausted(&self, record: &NotificationRecord, attempt: i32, reason: String) {
        warn!(record_id = record.id, lease_id = record.vm_lease_id, attempt, error = %reason, "Notification retries exhausted.");
        self.dispatcher
            .audit()
            .record(AuditEvent::RetryExhausted {
                lease_id: record.vm_lease_id,
                record_id: record.id,
                recipient_class: record.recipient_class,
                attempt_count: attempt,
                reason,
            })
            .await;
    }

    /// Takes a record out of the retry backlog without another send.
    async fn close(
        &self,
        store: &dyn LeaseStore,
        record: &NotificationRecord,
        max_attempts: i32,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let attempts = record.attempt_count.max(max_attempts);
        store
            .update_notification_record(record.id, RecordUpdate::failed(attempts, reason, now))
            .await?;
        info!(record_id = record.id, lease_id = record.vm_lease_id, reason, "Closed superseded notification.");
        Ok(())
    }
}

/// Whether the record still belongs to the lease's current threshold crossing.
fn same_window(thresholds: NotificationThresholds, record: &NotificationRecord, expires_at: DateTime<Utc>) -> bool {
    thresholds.window_start(record.expiry_class, expires_at) == record.window_start
}
