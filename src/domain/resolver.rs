//! Converter labels
//!
//! Each section names the resolver that turns its raw bytes into typed
//! assets. The label is typed at the API boundary and stored as plain
//! text in the catalog; the resolver registry itself lives with the
//! orchestrator in [`crate::vts`].

use serde::{Deserialize, Serialize};

/// A resolver label, e.g. `"SHADER"` or `"JSON"`.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ConverterKind(String);

impl ConverterKind {
	pub fn new(label: impl Into<String>) -> Self {
		Self(label.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl From<&str> for ConverterKind {
	fn from(label: &str) -> Self {
		Self(label.to_string())
	}
}

impl From<String> for ConverterKind {
	fn from(label: String) -> Self {
		Self(label)
	}
}

impl std::fmt::Display for ConverterKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}
