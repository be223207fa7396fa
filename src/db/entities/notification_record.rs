use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::{ExpiryClass, NotificationOutcome, RecipientClass};

/// One row per (lease, recipient class, window start). The triple carries a
/// unique index, see `db::schema`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub vm_lease_id: i32,
    pub recipient_class: RecipientClass,
    pub expiry_class: ExpiryClass,
    pub window_start: ChronoDateTimeUtc,
    pub outcome: NotificationOutcome,
    #[sea_orm(column_type = "Text", nullable)]
    pub failure_reason: Option<String>,
    pub attempt_count: i32,
    pub message_id: Option<String>,
    pub attempted_at: ChronoDateTimeUtc,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::vm_lease::Entity",
        from = "Column::VmLeaseId",
        to = "super::vm_lease::Column::Id",
        on_delete = "Restrict",
        on_update = "Cascade"
    )]
    VmLease,
}

impl Related<super::vm_lease::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VmLease.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
