use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditEvent, AuditRecorder};
use crate::db::enums::{ExpiryClass, NotificationOutcome, RecipientClass};
use crate::db::models::{NewNotificationRecord, NotificationRecord, RecordUpdate, VmLease};
use crate::db::store::{LeaseStore, StoreError};
use crate::expiry::renewal::compute_default_renewal_date;
use crate::expiry::scanner::{NotificationThresholds, WorkItem, days_until_expiry};
use crate::notifications::models::LeaseNoticeContext;
use crate::notifications::senders::{MailSender, SendReceipt, SenderError};
use crate::notifications::templates::{MessageRenderer, TemplateError};

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub thresholds: NotificationThresholds,
    pub default_renewal_months: u32,
    pub app_url: String,
    /// Added to the administrator accounts found in the store.
    pub admin_emails: Vec<String>,
    pub concurrency: usize,
    /// Delivery attempts per window, the first one included.
    pub max_attempts: i32,
}

/// Why a single delivery attempt did not go out.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error(transparent)]
    Sender(#[from] SenderError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("Could not resolve administrator recipients: {0}")]
    Recipients(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A SENT record already exists for this window.
    AlreadySent,
    /// An earlier attempt in this window failed; the retry pass owns it.
    AwaitingRetry,
    /// Another invocation holds the claim for this window.
    Claimed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent { record_id: i32, message_id: Option<String> },
    Failed { record_id: i32, reason: String },
    /// Failed with no retries left under `max_attempts`.
    Exhausted { record_id: i32, reason: String },
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientOutcome {
    pub recipient_class: RecipientClass,
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub lease_id: i32,
    pub expiry_class: ExpiryClass,
    pub recipients: Vec<RecipientOutcome>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassTally {
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub vms_processed: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Included in `failed`.
    pub exhausted: usize,
    pub exhausted_record_ids: Vec<i32>,
    pub user: ClassTally,
    pub admin: ClassTally,
    pub errors: Vec<String>,
    pub outcomes: Vec<DispatchOutcome>,
}

impl DispatchReport {
    fn absorb(&mut self, outcome: DispatchOutcome) {
        for recipient in &outcome.recipients {
            let tally = match recipient.recipient_class {
                RecipientClass::User => &mut self.user,
                RecipientClass::Admin => &mut self.admin,
            };
            match recipient.status {
                DeliveryStatus::Sent { .. } => {
                    self.sent += 1;
                    tally.sent += 1;
                }
                DeliveryStatus::Failed { .. } => {
                    self.failed += 1;
                    tally.failed += 1;
                }
                DeliveryStatus::Exhausted { record_id, .. } => {
                    self.failed += 1;
                    tally.failed += 1;
                    self.exhausted += 1;
                    self.exhausted_record_ids.push(record_id);
                }
                DeliveryStatus::Skipped { .. } => {
                    self.skipped += 1;
                    tally.skipped += 1;
                }
            }
        }
        self.outcomes.push(outcome);
    }
}

pub struct NotificationDispatcher {
    store: Arc<dyn LeaseStore>,
    mailer: Arc<dyn MailSender>,
    audit: Arc<dyn AuditRecorder>,
    renderer: MessageRenderer,
    settings: DispatchSettings,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn LeaseStore>,
        mailer: Arc<dyn MailSender>,
        audit: Arc<dyn AuditRecorder>,
        renderer: MessageRenderer,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            mailer,
            audit,
            renderer,
            settings,
        }
    }

    pub fn store(&self) -> &dyn LeaseStore {
        self.store.as_ref()
    }

    pub fn audit(&self) -> &dyn AuditRecorder {
        self.audit.as_ref()
    }

    pub fn thresholds(&self) -> NotificationThresholds {
        self.settings.thresholds
    }

    pub fn max_attempts(&self) -> i32 {
        self.settings.max_attempts
    }

    /// Processes the worklist with bounded concurrency. A failing lease is
    /// reported in `errors` and never stops the others.
    pub async fn dispatch_all(&self, worklist: &[WorkItem], now: DateTime<Utc>) -> DispatchReport {
        let pending: Vec<_> = worklist.iter().map(|item| self.dispatch_entry(item, now)).collect();
        let results: Vec<(i32, Result<DispatchOutcome, StoreError>)> = stream::iter(pending)
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let mut report = DispatchReport {
            vms_processed: worklist.len(),
            ..Default::default()
        };
        for (lease_id, result) in results {
            match result {
                Ok(outcome) => report.absorb(outcome),
                Err(e) => {
                    warn!(lease_id, error = %e, "Storage error while dispatching notifications.");
                    report.errors.push(format!("lease {lease_id}: {e}"));
                }
            }
        }
        report.outcomes.sort_by_key(|o| o.lease_id);

        info!(
            vms = report.vms_processed,
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            "Notification dispatch finished."
        );
        report
    }

    fn dispatch_entry<'a>(
        &'a self,
        item: &'a WorkItem,
        now: DateTime<Utc>,
    ) -> BoxFuture<'a, (i32, Result<DispatchOutcome, StoreError>)> {
        async move { (item.lease.id, self.dispatch(item, now).await) }.boxed()
    }

    /// Notifies every recipient class due for one work item.
    ///
    /// Delivery failures become FAILED records; only storage errors are returned.
    pub async fn dispatch(&self, item: &WorkItem, now: DateTime<Utc>) -> Result<DispatchOutcome, StoreError> {
        let mut recipients = Vec::new();
        for &recipient_class in item.class.recipient_classes() {
            let status = self.dispatch_to(item, recipient_class, now).await?;
            recipients.push(RecipientOutcome {
                recipient_class,
                status,
            });
        }
        Ok(DispatchOutcome {
            lease_id: item.lease.id,
            expiry_class: item.class,
            recipients,
        })
    }

    async fn dispatch_to(
        &self,
        item: &WorkItem,
        recipient_class: RecipientClass,
        now: DateTime<Utc>,
    ) -> Result<DeliveryStatus, StoreError> {
        let lease = &item.lease;
        let window_start = self.settings.thresholds.window_start(item.class, lease.expires_at);

        let existing = self
            .store
            .get_notification_records(lease.id, recipient_class, window_start)
            .await?;
        if let Some(reason) = skip_reason(&existing) {
            debug!(lease_id = lease.id, recipient_class = %recipient_class, ?reason, "Notification already handled for this window.");
            return Ok(DeliveryStatus::Skipped { reason });
        }

        let claim = match self
            .store
            .write_notification_record(NewNotificationRecord {
                vm_lease_id: lease.id,
                recipient_class,
                expiry_class: item.class,
                window_start,
                attempted_at: now,
            })
            .await
        {
            Ok(claim) => claim,
            Err(StoreError::Conflict(_)) => {
                debug!(lease_id = lease.id, recipient_class = %recipient_class, "Notification window claimed by another run.");
                return Ok(DeliveryStatus::Skipped {
                    reason: SkipReason::Claimed,
                });
            }
            Err(e) => return Err(e),
        };

        match self.deliver(lease, item.class, recipient_class, now).await {
            Ok(receipt) => {
                let record = self
                    .store
                    .update_notification_record(claim.id, RecordUpdate::sent(1, receipt.message_id.clone(), now))
                    .await
                    .inspect_err(|e| {
                        error!(
                            lease_id = lease.id,
                            record_id = claim.id,
                            message_id = ?receipt.message_id,
                            error = %e,
                            "Notification was accepted by the provider but could not be marked sent."
                        );
                    })?;
                info!(lease_id = lease.id, recipient_class = %recipient_class, class = %item.class, "Expiry notification sent.");
                self.audit
                    .record(AuditEvent::NotificationSent {
                        lease_id: lease.id,
                        record_id: record.id,
                        recipient_class,
                        expiry_class: item.class,
                        message_id: receipt.message_id.clone(),
                    })
                    .await;
                Ok(DeliveryStatus::Sent {
                    record_id: record.id,
                    message_id: receipt.message_id,
                })
            }
            Err(e) => {
                let reason = e.to_string();
                let record = self
                    .store
                    .update_notification_record(claim.id, RecordUpdate::failed(1, reason.clone(), now))
                    .await?;
                warn!(lease_id = lease.id, recipient_class = %recipient_class, error = %reason, "Expiry notification failed.");
                self.audit
                    .record(AuditEvent::NotificationFailed {
                        lease_id: lease.id,
                        record_id: record.id,
                        recipient_class,
                        expiry_class: item.class,
                        reason: reason.clone(),
                    })
                    .await;
                if record.attempt_count >= self.settings.max_attempts {
                    warn!(record_id = record.id, lease_id = lease.id, "No notification retries allowed; attempts exhausted.");
                    self.audit
                        .record(AuditEvent::RetryExhausted {
                            lease_id: lease.id,
                            record_id: record.id,
                            recipient_class,
                            attempt_count: record.attempt_count,
                            reason: reason.clone(),
                        })
                        .await;
                    return Ok(DeliveryStatus::Exhausted {
                        record_id: record.id,
                        reason,
                    });
                }
                Ok(DeliveryStatus::Failed {
                    record_id: record.id,
                    reason,
                })
            }
        }
    }

    /// Renders and sends one notice. Shared by first attempts and retries.
    pub async fn deliver(
        &self,
        lease: &VmLease,
        expiry_class: ExpiryClass,
        recipient_class: RecipientClass,
        now: DateTime<Utc>,
    ) -> Result<SendReceipt, DeliveryError> {
        let recipients = match recipient_class {
            RecipientClass::User => vec![lease.recipient_email.clone()],
            RecipientClass::Admin => self.admin_recipients().await?,
        };

        // A suggestion that cannot be computed is left out of the message.
        let suggested = compute_default_renewal_date(lease.expires_at, self.settings.default_renewal_months).ok();
        let notice = LeaseNoticeContext::new(
            lease,
            expiry_class,
            recipient_class,
            days_until_expiry(lease.expires_at, now),
            suggested,
            &self.settings.app_url,
        );
        let message = self.renderer.render(&notice)?;
        Ok(self.mailer.send(&recipients, &message).await?)
    }

    async fn admin_recipients(&self) -> Result<Vec<String>, StoreError> {
        let mut recipients = self.store.list_admin_recipients().await?;
        for email in &self.settings.admin_emails {
            if !recipients.iter().any(|r| r.eq_ignore_ascii_case(email)) {
                recipients.push(email.clone());
            }
        }
        Ok(recipients)
    }
}

fn skip_reason(existing: &[NotificationRecord]) -> Option<SkipReason> {
    if existing.iter().any(|r| r.outcome == NotificationOutcome::Sent) {
        Some(SkipReason::AlreadySent)
    } else if existing.iter().any(|r| r.outcome == NotificationOutcome::Failed) {
        Some(SkipReason::AwaitingRetry)
    } else if !existing.is_empty() {
        Some(SkipReason::Claimed)
    } else {
        None
    }
}
