pub mod error;
pub mod identity;
pub mod policy;
pub mod security;
pub mod server;
pub mod service;
pub mod store;
