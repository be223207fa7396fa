pub mod audit_log;
pub mod notification_record;
pub mod project;
pub mod renewal_event;
pub mod user;
pub mod vm_lease;

pub mod prelude {
    pub use super::audit_log::Model as AuditLogModel;

    pub use super::notification_record::Model as NotificationRecordModel;

    pub use super::project::Model as ProjectModel;

    pub use super::renewal_event::Model as RenewalEventModel;

    pub use super::user::Model as UserModel;

    pub use super::vm_lease::Model as VmLeaseModel;
}
