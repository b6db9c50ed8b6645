//! CLI commands

pub mod banner;
pub mod cache;
pub mod fetch;
pub mod patterns;
pub mod reports;
pub mod scan;
pub mod version;
