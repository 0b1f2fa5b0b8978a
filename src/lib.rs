pub mod config;
pub mod error;
pub mod filter;
pub mod query;
pub mod session;
