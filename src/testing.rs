//! Test doubles for the expiry engine: an in-memory store, a scripted mailer
//! and an audit sink that keeps what it was given.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::audit::{AuditEvent, AuditRecorder};
use crate::db::enums::{NotificationOutcome, RecipientClass};
use crate::db::models::{
    NewNotificationRecord, NewRenewal, NotificationRecord, RecordUpdate, RenewalEvent, VmLease,
};
use crate::db::store::{LeaseStore, StoreError};
use crate::notifications::models::RenderedMessage;
use crate::notifications::senders::{MailSender, SendReceipt, SenderError, validate_recipients};

pub fn lease_expiring_at(expires_at: DateTime<Utc>) -> VmLease {
    VmLease {
        id: 0,
        project_id: 1,
        project_name: "Partner Lab".to_string(),
        name: "build-agent".to_string(),
        recipient_email: "owner@example.com".to_string(),
        expires_at,
        account_id: Some("acct-42".to_string()),
        hostname: Some("build-agent.lab".to_string()),
        ip_address: Some("10.0.0.4".to_string()),
    }
}

#[derive(Default)]
struct StoreState {
    leases: Vec<VmLease>,
    records: Vec<NotificationRecord>,
    renewals: Vec<RenewalEvent>,
    admins: Vec<String>,
    unavailable: bool,
    /// Fails record updates only; claims and reads still work.
    reject_updates: bool,
    next_id: i32,
}

impl StoreState {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Database(sea_orm::DbErr::Conn(
                sea_orm::RuntimeErr::Internal("store unavailable".to_string()),
            )));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryLeaseStore {
    state: Mutex<StoreState>,
}

impl InMemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the lease under a fresh id and returns it.
    pub async fn insert_lease(&self, mut lease: VmLease) -> i32 {
        let mut state = self.state.lock().await;
        lease.id = state.next_id();
        let id = lease.id;
        state.leases.push(lease);
        id
    }

    pub async fn set_admins(&self, admins: &[&str]) {
        self.state.lock().await.admins = admins.iter().map(|a| a.to_string()).collect();
    }

    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    pub async fn set_reject_updates(&self, reject: bool) {
        self.state.lock().await.reject_updates = reject;
    }

    pub async fn records(&self) -> Vec<NotificationRecord> {
        self.state.lock().await.records.clone()
    }

    pub async fn records_for(&self, lease_id: i32, class: RecipientClass) -> Vec<NotificationRecord> {
        self.records()
            .await
            .into_iter()
            .filter(|r| r.vm_lease_id == lease_id && r.recipient_class == class)
            .collect()
    }

    pub async fn renewal_events(&self) -> Vec<RenewalEvent> {
        self.state.lock().await.renewals.clone()
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn list_active_vm_leases(&self) -> Result<Vec<VmLease>, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.leases.clone())
    }

    async fn get_vm_lease(&self, lease_id: i32) -> Result<VmLease, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;
        state
            .leases
            .iter()
            .find(|l| l.id == lease_id)
            .cloned()
            .ok_or(StoreError::LeaseNotFound(lease_id))
    }

    async fn get_notification_records(
        &self,
        lease_id: i32,
        class: RecipientClass,
        window_start: DateTime<Utc>,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state
            .records
            .iter()
            .filter(|r| r.vm_lease_id == lease_id && r.recipient_class == class && r.window_start == window_start)
            .cloned()
            .collect())
    }

    async fn write_notification_record(
        &self,
        record: NewNotificationRecord,
    ) -> Result<NotificationRecord, StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        let taken = state.records.iter().any(|r| {
            r.vm_lease_id == record.vm_lease_id
                && r.recipient_class == record.recipient_class
                && r.window_start == record.window_start
        });
        if taken {
            return Err(StoreError::Conflict("notification window already claimed".to_string()));
        }
        let now = Utc::now();
        let model = NotificationRecord {
            id: state.next_id(),
            vm_lease_id: record.vm_lease_id,
            recipient_class: record.recipient_class,
            expiry_class: record.expiry_class,
            window_start: record.window_start,
            outcome: NotificationOutcome::Pending,
            failure_reason: None,
            attempt_count: 0,
            message_id: None,
            attempted_at: record.attempted_at,
            created_at: now,
            updated_at: now,
        };
        state.records.push(model.clone());
        Ok(model)
    }

    async fn update_notification_record(
        &self,
        id: i32,
        update: RecordUpdate,
    ) -> Result<NotificationRecord, StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        if state.reject_updates {
            return Err(StoreError::Database(sea_orm::DbErr::Custom("record update rejected".to_string())));
        }
        let record = state
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::RecordNotFound(id))?;
        record.outcome = update.outcome;
        record.attempt_count = update.attempt_count;
        record.failure_reason = update.failure_reason;
        record.message_id = update.message_id;
        record.attempted_at = update.attempted_at;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn list_retryable_records(
        &self,
        max_attempts: i32,
        attempted_before: DateTime<Utc>,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state
            .records
            .iter()
            .filter(|r| {
                r.outcome == NotificationOutcome::Failed
                    && r.attempt_count < max_attempts
                    && r.attempted_at < attempted_before
            })
            .cloned()
            .collect())
    }

    async fn list_stale_pending_records(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state
            .records
            .iter()
            .filter(|r| r.outcome == NotificationOutcome::Pending && r.attempted_at < older_than)
            .cloned()
            .collect())
    }

    async fn list_admin_recipients(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.admins.clone())
    }

    async fn apply_renewal(&self, renewal: NewRenewal) -> Result<RenewalEvent, StoreError> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        let id = state.next_id();
        let lease = state
            .leases
            .iter_mut()
            .find(|l| l.id == renewal.vm_lease_id)
            .ok_or(StoreError::LeaseNotFound(renewal.vm_lease_id))?;
        if lease.expires_at != renewal.expected_previous {
            return Err(StoreError::Conflict("expiry changed since it was read".to_string()));
        }
        lease.expires_at = renewal.new_expiry;
        let event = RenewalEvent {
            id,
            vm_lease_id: renewal.vm_lease_id,
            previous_expiry: renewal.expected_previous,
            new_expiry: renewal.new_expiry,
            period_months: renewal.period_months,
            actor: renewal.actor,
            created_at: renewal.applied_at,
        };
        state.renewals.push(event.clone());
        Ok(event)
    }
}

/// Mailer whose failures are scripted per address.
#[derive(Default)]
pub struct ScriptedMailSender {
    failures: Mutex<HashMap<String, usize>>,
    sent: Mutex<Vec<(Vec<String>, RenderedMessage)>>,
}

impl ScriptedMailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `times` sends that include `address` are rejected.
    pub async fn fail_next(&self, address: &str, times: usize) {
        self.failures.lock().await.insert(address.to_string(), times);
    }

    pub async fn sent(&self) -> Vec<(Vec<String>, RenderedMessage)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl MailSender for ScriptedMailSender {
    async fn send(
        &self,
        recipients: &[String],
        message: &RenderedMessage,
    ) -> Result<SendReceipt, SenderError> {
        validate_recipients(recipients)?;
        {
            let mut failures = self.failures.lock().await;
            for address in recipients {
                if let Some(remaining) = failures.get_mut(address) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(SenderError::Rejected {
                            status: 503,
                            body: "provider unavailable".to_string(),
                        });
                    }
                }
            }
        }
        let mut sent = self.sent.lock().await;
        sent.push((recipients.to_vec(), message.clone()));
        Ok(SendReceipt {
            message_id: Some(format!("msg-{}", sent.len())),
        })
    }
}

#[derive(Default)]
pub struct RecordingAuditRecorder {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditRecorder {
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }

    pub async fn count(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }
}

#[async_trait]
impl AuditRecorder for RecordingAuditRecorder {
    async fn record(&self, event: AuditEvent) {
        self.events.lock().await.push(event);
    }
}
