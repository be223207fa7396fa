use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "projects")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::vm_lease::Entity")]
    VmLease,
}

impl Related<super::vm_lease::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VmLease.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
