use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, NotSet,
    QueryFilter, QueryOrder, Set, TransactionTrait, prelude::Expr,
};
use tracing::{debug, warn};

use crate::db::entities::{notification_record, project, renewal_event, user, vm_lease};
use crate::db::enums::{LeaseStatus, NotificationOutcome, RecipientClass};
use crate::db::models::{
    NewNotificationRecord, NewRenewal, NotificationRecord, RecordUpdate, RenewalEvent, VmLease,
};
use crate::db::store::{LeaseStore, StoreError};

/// Input for registering a lease.
#[derive(Debug, Clone)]
pub struct NewLease {
    pub project_id: i32,
    pub name: String,
    pub recipient_email: String,
    pub expires_at: DateTime<Utc>,
    pub account_id: Option<String>,
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Clone)]
pub struct SeaOrmLeaseStore {
    db: DatabaseConnection,
}

impl SeaOrmLeaseStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create_project(&self, name: &str) -> Result<project::Model, StoreError> {
        let model = project::ActiveModel {
            id: NotSet,
            name: Set(name.to_string()),
            created_at: Set(Utc::now()),
        };
        Ok(model.insert(&self.db).await?)
    }

    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        role: &str,
    ) -> Result<user::Model, StoreError> {
        let model = user::ActiveModel {
            id: NotSet,
            username: Set(username.to_string()),
            email: Set(email.to_string()),
            role: Set(role.to_string()),
            created_at: Set(Utc::now()),
        };
        Ok(model.insert(&self.db).await?)
    }

    pub async fn register_lease(&self, input: NewLease) -> Result<vm_lease::Model, StoreError> {
        let now = Utc::now();
        let model = vm_lease::ActiveModel {
            id: NotSet,
            project_id: Set(input.project_id),
            name: Set(input.name),
            recipient_email: Set(input.recipient_email),
            expires_at: Set(input.expires_at),
            account_id: Set(input.account_id),
            hostname: Set(input.hostname),
            ip_address: Set(input.ip_address),
            status: Set(LeaseStatus::Active),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(model.insert(&self.db).await?)
    }

    /// Takes a lease out of scanning. The row is kept for history.
    pub async fn decommission_lease(&self, lease_id: i32) -> Result<u64, StoreError> {
        let result = vm_lease::Entity::update_many()
            .col_expr(vm_lease::Column::Status, Expr::value(LeaseStatus::Decommissioned))
            .col_expr(vm_lease::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(vm_lease::Column::Id.eq(lease_id))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

fn to_vm_lease(lease: vm_lease::Model, project: Option<project::Model>) -> Result<VmLease, StoreError> {
    let project = project.ok_or_else(|| {
        StoreError::Corrupt(format!(
            "lease {} references missing project {}",
            lease.id, lease.project_id
        ))
    })?;
    Ok(VmLease {
        id: lease.id,
        project_id: lease.project_id,
        project_name: project.name,
        name: lease.name,
        recipient_email: lease.recipient_email,
        expires_at: lease.expires_at,
        account_id: lease.account_id,
        hostname: lease.hostname,
        ip_address: lease.ip_address,
    })
}

#[async_trait]
impl LeaseStore for SeaOrmLeaseStore {
    async fn list_active_vm_leases(&self) -> Result<Vec<VmLease>, StoreError> {
        let rows = vm_lease::Entity::find()
            .filter(vm_lease::Column::Status.eq(LeaseStatus::Active))
            .find_also_related(project::Entity)
            .order_by_asc(vm_lease::Column::Id)
            .all(&self.db)
            .await?;

        rows.into_iter()
            .map(|(lease, project)| to_vm_lease(lease, project))
            .collect()
    }

    async fn get_vm_lease(&self, lease_id: i32) -> Result<VmLease, StoreError> {
        let (lease, project) = vm_lease::Entity::find_by_id(lease_id)
            .filter(vm_lease::Column::Status.eq(LeaseStatus::Active))
            .find_also_related(project::Entity)
            .one(&self.db)
            .await?
            .ok_or(StoreError::LeaseNotFound(lease_id))?;
        to_vm_lease(lease, project)
    }

    async fn get_notification_records(
        &self,
        lease_id: i32,
        class: RecipientClass,
        window_start: DateTime<Utc>,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        Ok(notification_record::Entity::find()
            .filter(notification_record::Column::VmLeaseId.eq(lease_id))
            .filter(notification_record::Column::RecipientClass.eq(class))
            .filter(notification_record::Column::WindowStart.eq(window_start))
            .order_by_asc(notification_record::Column::Id)
            .all(&self.db)
            .await?)
    }

    async fn write_notification_record(
        &self,
        record: NewNotificationRecord,
    ) -> Result<NotificationRecord, StoreError> {
        let now = Utc::now();
        let model = notification_record::ActiveModel {
            id: NotSet,
            vm_lease_id: Set(record.vm_lease_id),
            recipient_class: Set(record.recipient_class),
            expiry_class: Set(record.expiry_class),
            window_start: Set(record.window_start),
            outcome: Set(NotificationOutcome::Pending),
            failure_reason: Set(None),
            attempt_count: Set(0),
            message_id: Set(None),
            attempted_at: Set(record.attempted_at),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(model.insert(&self.db).await?)
    }

    async fn update_notification_record(
        &self,
        id: i32,
        update: RecordUpdate,
    ) -> Result<NotificationRecord, StoreError> {
        let existing = notification_record::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(StoreError::RecordNotFound(id))?;

        let mut active_model = existing.into_active_model();
        active_model.outcome = Set(update.outcome);
        active_model.attempt_count = Set(update.attempt_count);
        active_model.failure_reason = Set(update.failure_reason);
        active_model.message_id = Set(update.message_id);
        active_model.attempted_at = Set(update.attempted_at);
        active_model.updated_at = Set(Utc::now());
        Ok(active_model.update(&self.db).await?)
    }

    async fn list_retryable_records(
        &self,
        max_attempts: i32,
        attempted_before: DateTime<Utc>,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        Ok(notification_record::Entity::find()
            .filter(notification_record::Column::Outcome.eq(NotificationOutcome::Failed))
            .filter(notification_record::Column::AttemptCount.lt(max_attempts))
            .filter(notification_record::Column::AttemptedAt.lt(attempted_before))
            .order_by_asc(notification_record::Column::Id)
            .all(&self.db)
            .await?)
    }

    async fn list_stale_pending_records(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        Ok(notification_record::Entity::find()
            .filter(notification_record::Column::Outcome.eq(NotificationOutcome::Pending))
            .filter(notification_record::Column::AttemptedAt.lt(older_than))
            .order_by_asc(notification_record::Column::Id)
            .all(&self.db)
            .await?)
    }

    async fn list_admin_recipients(&self) -> Result<Vec<String>, StoreError> {
        let admins = user::Entity::find()
            .filter(user::Column::Role.eq(user::ROLE_ADMIN))
            .order_by_asc(user::Column::Id)
            .all(&self.db)
            .await?;
        Ok(admins.into_iter().map(|u| u.email).collect())
    }

    async fn apply_renewal(&self, renewal: NewRenewal) -> Result<RenewalEvent, StoreError> {
        let txn = self.db.begin().await?;

        // Optimistic guard: only move the expiry we read.
        let result = vm_lease::Entity::update_many()
            .col_expr(vm_lease::Column::ExpiresAt, Expr::value(renewal.new_expiry))
            .col_expr(vm_lease::Column::UpdatedAt, Expr::value(renewal.applied_at))
            .filter(vm_lease::Column::Id.eq(renewal.vm_lease_id))
            .filter(vm_lease::Column::ExpiresAt.eq(renewal.expected_previous))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            let exists = vm_lease::Entity::find_by_id(renewal.vm_lease_id)
                .one(&txn)
                .await?
                .is_some();
            if let Err(rollback_err) = txn.rollback().await {
                warn!(lease_id = renewal.vm_lease_id, error = %rollback_err, "Error rolling back renewal transaction.");
            }
            return Err(if exists {
                StoreError::Conflict(format!(
                    "expiry of lease {} changed since it was read",
                    renewal.vm_lease_id
                ))
            } else {
                StoreError::LeaseNotFound(renewal.vm_lease_id)
            });
        }

        let event = renewal_event::ActiveModel {
            id: NotSet,
            vm_lease_id: Set(renewal.vm_lease_id),
            previous_expiry: Set(renewal.expected_previous),
            new_expiry: Set(renewal.new_expiry),
            period_months: Set(renewal.period_months),
            actor: Set(renewal.actor),
            created_at: Set(renewal.applied_at),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        debug!(lease_id = event.vm_lease_id, new_expiry = %event.new_expiry, "Renewal applied.");
        Ok(event)
    }
}
