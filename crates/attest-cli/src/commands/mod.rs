//! CLI command implementations

pub mod admin;
pub mod common;
pub mod init;
pub mod query;
pub mod reconcile;
pub mod submit;
