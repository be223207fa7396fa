pub mod expiry_routes;
pub mod lease_routes;
