use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, Schema, sea_query::Index};
use tracing::info;

use crate::db::entities::{audit_log, notification_record, project, renewal_event, user, vm_lease};

pub const NOTIFICATION_WINDOW_INDEX: &str = "uq_notification_records_window";

/// Creates the tables and the notification window index when they are missing.
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    create_table(db, &schema, project::Entity).await?;
    create_table(db, &schema, user::Entity).await?;
    create_table(db, &schema, vm_lease::Entity).await?;
    create_table(db, &schema, notification_record::Entity).await?;
    create_table(db, &schema, renewal_event::Entity).await?;
    create_table(db, &schema, audit_log::Entity).await?;

    // At most one record per (lease, recipient class, window). Concurrent
    // invocations race on this index instead of on an application check.
    let window_index = Index::create()
        .if_not_exists()
        .name(NOTIFICATION_WINDOW_INDEX)
        .table(notification_record::Entity)
        .col(notification_record::Column::VmLeaseId)
        .col(notification_record::Column::RecipientClass)
        .col(notification_record::Column::WindowStart)
        .unique()
        .to_owned();
    db.execute(backend.build(&window_index)).await?;

    info!("Database schema is ready.");
    Ok(())
}

async fn create_table<E: EntityTrait>(
    db: &DatabaseConnection,
    schema: &Schema,
    entity: E,
) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    db.execute(backend.build(&stmt)).await?;
    Ok(())
}
