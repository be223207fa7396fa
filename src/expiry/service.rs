use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::audit::{AuditEvent, AuditRecorder};
use crate::db::models::RenewalEvent;
use crate::db::store::{LeaseStore, StoreError};
use crate::expiry::dispatcher::{DispatchSettings, NotificationDispatcher};
use crate::expiry::renewal::{RenewLeaseError, RenewalRequest, renew_lease};
use crate::expiry::retry::{RetryCoordinator, RetryOutcome};
use crate::expiry::scanner::{ScanResult, scan};
use crate::notifications::senders::MailSender;
use crate::notifications::templates::{MessageRenderer, TemplateError};

#[derive(Error, Debug)]
pub enum ExpiryCheckError {
    /// The worklist could not be read; nothing was dispatched.
    #[error("Expiry scan failed: {0}")]
    Storage(#[from] StoreError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryCheckSummary {
    #[serde(rename = "totalVMs")]
    pub total_vms: usize,
    #[serde(rename = "expiringVMs")]
    pub expiring_vms: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
    pub user_notifications: usize,
    pub admin_notifications: usize,
    pub skipped: usize,
    pub retry: RetryOutcome,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ExpiryCheckSettings {
    pub dispatch: DispatchSettings,
    pub pending_timeout: Duration,
}

/// One scheduled invocation: scan, dispatch the worklist, then retry the
/// failure backlog.
pub struct ExpiryCheckService {
    dispatcher: Arc<NotificationDispatcher>,
    retry: RetryCoordinator,
    store: Arc<dyn LeaseStore>,
    audit: Arc<dyn AuditRecorder>,
}

impl ExpiryCheckService {
    pub fn new(
        store: Arc<dyn LeaseStore>,
        mailer: Arc<dyn MailSender>,
        audit: Arc<dyn AuditRecorder>,
        settings: ExpiryCheckSettings,
    ) -> Result<Self, TemplateError> {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            store.clone(),
            mailer,
            audit.clone(),
            MessageRenderer::new()?,
            settings.dispatch,
        ));
        let retry = RetryCoordinator::new(dispatcher.clone(), settings.pending_timeout);
        Ok(Self {
            dispatcher,
            retry,
            store,
            audit,
        })
    }

    /// Classifies active leases without sending anything.
    pub async fn preview(&self, now: DateTime<Utc>) -> Result<ScanResult, StoreError> {
        scan(self.store.as_ref(), now, self.dispatcher.thresholds()).await
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<ExpiryCheckSummary, ExpiryCheckError> {
        let scanned = match self.preview(now).await {
            Ok(scanned) => scanned,
            Err(e) => {
                error!(error = %e, "Could not read the lease worklist.");
                return Err(e.into());
            }
        };

        let dispatch = self.dispatcher.dispatch_all(&scanned.worklist, now).await;
        let mut errors = dispatch.errors;

        // The backlog is independent of this scan, so a failing retry pass
        // does not void the dispatch results.
        let mut retry = match self.retry.retry_failed(self.dispatcher.max_attempts(), now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Notification retry pass failed.");
                errors.push(format!("retry: {e}"));
                RetryOutcome::default()
            }
        };
        errors.extend(retry.errors.iter().cloned());

        // First attempts that already used up `max_attempts` are reported
        // with the backlog's exhausted records.
        let notifications_failed = dispatch.failed + retry.still_failing + retry.exhausted;
        retry.exhausted += dispatch.exhausted;
        retry.exhausted_record_ids.extend(dispatch.exhausted_record_ids);

        let summary = ExpiryCheckSummary {
            total_vms: scanned.total,
            expiring_vms: scanned.counts.due(),
            notifications_sent: dispatch.sent + retry.succeeded,
            notifications_failed,
            user_notifications: dispatch.user.sent + retry.user_sent,
            admin_notifications: dispatch.admin.sent + retry.admin_sent,
            skipped: dispatch.skipped,
            retry,
            errors,
        };

        info!(
            total_vms = summary.total_vms,
            expiring_vms = summary.expiring_vms,
            sent = summary.notifications_sent,
            failed = summary.notifications_failed,
            errors = summary.errors.len(),
            "Expiry check completed."
        );
        self.audit
            .record(AuditEvent::ExpiryCheckCompleted {
                total_vms: summary.total_vms,
                expiring_vms: summary.expiring_vms,
                notifications_sent: summary.notifications_sent,
                notifications_failed: summary.notifications_failed,
                retry_exhausted: summary.retry.exhausted,
            })
            .await;

        Ok(summary)
    }

    pub async fn renew(&self, request: RenewalRequest, now: DateTime<Utc>) -> Result<RenewalEvent, RenewLeaseError> {
        renew_lease(self.store.as_ref(), self.audit.as_ref(), request, now).await
    }
}
