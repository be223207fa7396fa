pub mod audit;
pub mod db;
pub mod expiry;
pub mod notifications;
pub mod server;
pub mod version;
pub mod web;

#[cfg(test)]
mod testing;
