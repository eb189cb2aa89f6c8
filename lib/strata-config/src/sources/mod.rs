//! Refreshing configuration providers.

pub mod blob;
pub mod sql;
