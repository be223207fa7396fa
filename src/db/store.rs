//! Storage seam of the expiry engine.
//!
//! The scanner, dispatcher, retry pass and renewal path only talk to
//! [`LeaseStore`]. Production uses [`super::sea_orm_store::SeaOrmLeaseStore`];
//! tests run against an in-memory implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

use crate::db::enums::RecipientClass;
use crate::db::models::{
    NewNotificationRecord, NewRenewal, NotificationRecord, RecordUpdate, RenewalEvent, VmLease,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(DbErr),
    /// A uniqueness guard rejected the write. For notification records this
    /// means another invocation already claimed the window; for renewals the
    /// expiry moved since it was read.
    #[error("Conflicting write: {0}")]
    Conflict(String),
    #[error("VM lease not found: {0}")]
    LeaseNotFound(i32),
    #[error("Notification record not found: {0}")]
    RecordNotFound(i32),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<DbErr> for StoreError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(msg)) => StoreError::Conflict(msg),
            _ => StoreError::Database(err),
        }
    }
}

#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// All leases that are not decommissioned.
    async fn list_active_vm_leases(&self) -> Result<Vec<VmLease>, StoreError>;

    /// Decommissioned leases are reported as [`StoreError::LeaseNotFound`].
    async fn get_vm_lease(&self, lease_id: i32) -> Result<VmLease, StoreError>;

    /// Records of one lease and recipient class in the window starting at `window_start`.
    async fn get_notification_records(
        &self,
        lease_id: i32,
        class: RecipientClass,
        window_start: DateTime<Utc>,
    ) -> Result<Vec<NotificationRecord>, StoreError>;

    /// Inserts a `PENDING` claim. Fails with [`StoreError::Conflict`] when a
    /// record for the same (lease, class, window) already exists.
    async fn write_notification_record(
        &self,
        record: NewNotificationRecord,
    ) -> Result<NotificationRecord, StoreError>;

    async fn update_notification_record(
        &self,
        id: i32,
        update: RecordUpdate,
    ) -> Result<NotificationRecord, StoreError>;

    /// `FAILED` records with fewer than `max_attempts` attempts whose last
    /// attempt happened before `attempted_before`.
    async fn list_retryable_records(
        &self,
        max_attempts: i32,
        attempted_before: DateTime<Utc>,
    ) -> Result<Vec<NotificationRecord>, StoreError>;

    /// `PENDING` claims last touched before `older_than`.
    async fn list_stale_pending_records(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<NotificationRecord>, StoreError>;

    /// Contact addresses of every administrator account.
    async fn list_admin_recipients(&self) -> Result<Vec<String>, StoreError>;

    /// Moves the lease expiry and appends the renewal event atomically.
    async fn apply_renewal(&self, renewal: NewRenewal) -> Result<RenewalEvent, StoreError>;
}
