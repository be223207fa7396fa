//! Persistence for leases, notification history and renewals.
//!
//! The expiry engine depends only on [`store::LeaseStore`]; the sea-orm
//! backed implementation lives in [`sea_orm_store`].

pub mod entities;
pub mod enums;
pub mod models;
pub mod schema;
pub mod sea_orm_store;
pub mod store;

pub use sea_orm_store::SeaOrmLeaseStore;
pub use store::{LeaseStore, StoreError};
