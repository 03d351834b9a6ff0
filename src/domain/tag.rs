//! Tag - the durable identity of one loadable unit of content

use crate::config::Aliases;
use crate::shared::paths;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one loadable unit of content.
///
/// The guid uniquely and permanently identifies a logical asset across
/// renames; `vts_name` is the storage-resolvable path in configured alias
/// form (`$(Assets)/shaders/default.fx`). Two tags are equal only when
/// all fields match; ordering is guid-byte-major so tags work as ordered
/// map keys.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Tag {
	// guid first: derived ordering compares it before the name fields
	pub guid: Uuid,
	pub name: String,
	pub vts_name: String,
	pub section_name: String,
}

impl Tag {
	pub fn new(
		guid: Uuid,
		name: impl Into<String>,
		vts_name: impl Into<String>,
		section_name: impl Into<String>,
	) -> Self {
		Self {
			guid,
			name: name.into(),
			vts_name: vts_name.into(),
			section_name: section_name.into(),
		}
	}

	/// A tag minted without a guid (nil) identifies nothing.
	pub fn is_valid(&self) -> bool {
		!self.guid.is_nil()
	}

	/// Expand the alias-form path to a real filesystem path.
	pub fn resolve_vts(&self, aliases: &Aliases) -> String {
		paths::expand_aliases(&self.vts_name, aliases)
	}
}

impl std::fmt::Display for Tag {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}@{} [{}]", self.section_name, self.name, self.guid)
	}
}
