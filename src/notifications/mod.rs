pub mod models;
pub mod senders;
pub mod templates;
