//! Small utilities shared across the crate

pub mod counter;
pub mod paths;
