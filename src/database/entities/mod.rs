//! Catalog entities

pub mod audit_log;
pub mod deleted_tag;
pub mod dirty_tag;
pub mod section;
pub mod tag;
