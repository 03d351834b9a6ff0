//! VTS configuration
//!
//! An explicit configuration struct handed to [`crate::Vts::new`]. No
//! global state: thread sizing, path aliases and the section list all
//! travel through here. Loadable from TOML for tooling that keeps its
//! setup on disk.

use crate::domain::section::Section;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// How the VTS behaves over its lifetime.
///
/// `Optimum` is the runtime-game mode: dirty buffers are flushed back to
/// disk at shutdown. `Diagnostic` opens the catalog without reconciling
/// or flushing. `Reset` deletes the catalog file and rebuilds it, then
/// behaves as `Optimum`.
#[derive(
	Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RuntimeMode {
	#[default]
	Optimum,
	Diagnostic,
	Reset,
}

/// Worker pool sizing. A value of 0 means "pick from core count".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
	/// Section-scanning tasks used only while the entries collector runs.
	pub collector: usize,
	/// Concurrent file reads in the blob loader.
	pub blob: usize,
	/// Concurrent resolver/conversion tasks.
	pub converters: usize,
	/// Concurrent cache-hit callback deliveries.
	pub request: usize,
}

impl ThreadConfig {
	/// Resolve a configured pool size, defaulting 0 to core count − 1.
	pub fn effective(configured: usize) -> usize {
		if configured > 0 {
			return configured;
		}
		std::thread::available_parallelism()
			.map(|n| n.get().saturating_sub(1))
			.unwrap_or(1)
			.max(1)
	}
}

/// Path alias table. Section paths and tag names may embed
/// `$(Alias)`-style placeholders which are expanded against this map
/// before any disk access.
pub type Aliases = BTreeMap<String, String>;

/// Complete VTS configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VtsConfig {
	/// Catalog file location, alias-form (e.g. `$(Data)/vts.sqlite`).
	pub database_path: String,

	#[serde(default)]
	pub runtime_mode: RuntimeMode,

	#[serde(default)]
	pub aliases: Aliases,

	/// The configured sections. The entries collector reconciles these
	/// against the catalog at startup.
	#[serde(default)]
	pub sections: Vec<Section>,

	#[serde(default)]
	pub threads: ThreadConfig,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("IO error reading config: {0}")]
	Io(#[from] std::io::Error),
	#[error("Invalid config file: {0}")]
	Parse(#[from] toml::de::Error),
}

impl VtsConfig {
	/// Load a configuration from a TOML file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let contents = std::fs::read_to_string(path)?;
		Ok(toml::from_str(&contents)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_sections_from_toml() {
		let config: VtsConfig = toml::from_str(
			r#"
			database_path = "$(Data)/vts.sqlite"
			runtime_mode = "optimum"

			[aliases]
			Data = "/tmp/data"

			[[sections]]
			name = "Shaders"
			path = ["$(Data)/shaders"]
			filters = ["*.fx"]
			converters = "SHADER"
			read_only = true
			"#,
		)
		.unwrap();

		assert_eq!(config.sections.len(), 1);
		assert_eq!(config.sections[0].name, "Shaders");
		assert!(config.sections[0].read_only);
		assert!(config.sections[0].recursive);
		assert_eq!(config.runtime_mode, RuntimeMode::Optimum);
	}

	#[test]
	fn thread_sizing_defaults_to_cores() {
		assert!(ThreadConfig::effective(0) >= 1);
		assert_eq!(ThreadConfig::effective(3), 3);
	}
}
