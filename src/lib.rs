//! Virtual Transport System core
//!
//! An asynchronous, content-addressable asset catalog and loader:
//! - a durable section/tag catalog kept in SQLite,
//! - a one-shot startup reconciliation pass against the live file system,
//! - a pooled async blob loader feeding pluggable asset resolvers,
//! - an in-memory shared asset cache with at-most-once install semantics.
//!
//! Callers describe named sections (search roots + glob filters + a
//! converter label), register resolvers for those labels, then request
//! assets by tag or by section filter expression. All request delivery is
//! asynchronous; the catalog is the source of truth.

pub mod blob_loader;
pub mod collector;
pub mod config;
pub mod database;
pub mod domain;
pub mod shared;
pub mod vts;

pub use config::{RuntimeMode, VtsConfig};
pub use domain::asset::{asset_cast, Asset, AssetData, Buffer, RawAsset};
pub use domain::resolver::ConverterKind;
pub use domain::section::{MatchMode, Section, SectionQuery};
pub use domain::tag::Tag;
pub use shared::counter::{PendingCounter, PendingGuard};
pub use vts::{AssetResolver, AssetResolvers, Request, Vts, VtsError, VtsResult};
