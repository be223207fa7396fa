use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::LeaseStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vm_leases")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub project_id: i32,
    pub name: String,
    pub recipient_email: String,
    pub expires_at: ChronoDateTimeUtc,
    pub account_id: Option<String>,
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    pub status: LeaseStatus,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id",
        on_delete = "Restrict",
        on_update = "Cascade"
    )]
    Project,
    #[sea_orm(has_many = "super::notification_record::Entity")]
    NotificationRecord,
    #[sea_orm(has_many = "super::renewal_event::Entity")]
    RenewalEvent,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl Related<super::notification_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::NotificationRecord.def()
    }
}

impl Related<super::renewal_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RenewalEvent.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
