use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Immutable once written.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "renewal_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub vm_lease_id: i32,
    pub previous_expiry: ChronoDateTimeUtc,
    pub new_expiry: ChronoDateTimeUtc,
    pub period_months: Option<i32>,
    pub actor: String,
    pub created_at: ChronoDateTimeUtc,
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
