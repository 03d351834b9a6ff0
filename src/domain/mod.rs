//! Core data types: tags, sections, assets, converter labels

pub mod asset;
pub mod resolver;
pub mod section;
pub mod tag;
