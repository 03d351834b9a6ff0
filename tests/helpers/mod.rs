#![allow(dead_code)]

//! Shared fixtures for the integration tests: a temp content tree plus
//! configuration builders that keep everything under a `$(Root)` alias.

use std::sync::Arc;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;
use vts_core::config::ThreadConfig;
use vts_core::{Asset, AssetResolvers, RawAsset, RuntimeMode, Section, VtsConfig};

/// Route log output through the test harness, honoring `RUST_LOG`.
/// Safe to call from every test; only the first call installs.
pub fn init_logging() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

pub struct Fixture {
	pub dir: TempDir,
}

impl Fixture {
	pub fn new() -> Self {
		init_logging();
		Self {
			dir: TempDir::new().expect("temp dir"),
		}
	}

	pub fn write(&self, relative: &str, contents: &[u8]) {
		let path = self.dir.path().join(relative);
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent).expect("fixture dirs");
		}
		std::fs::write(path, contents).expect("fixture file");
	}

	pub fn remove(&self, relative: &str) {
		std::fs::remove_file(self.dir.path().join(relative)).expect("fixture remove");
	}

	pub fn read(&self, relative: &str) -> Vec<u8> {
		std::fs::read(self.dir.path().join(relative)).expect("fixture read")
	}

	pub fn exists(&self, relative: &str) -> bool {
		self.dir.path().join(relative).exists()
	}

	/// Configuration rooted at the fixture directory via `$(Root)`.
	pub fn config(&self, sections: Vec<Section>) -> VtsConfig {
		VtsConfig {
			database_path: "$(Root)/catalog.sqlite".to_string(),
			runtime_mode: RuntimeMode::Optimum,
			aliases: [("Root".to_string(), self.dir.path().display().to_string())]
				.into_iter()
				.collect(),
			sections,
			threads: ThreadConfig::default(),
		}
	}
}

/// A section whose roots live under `$(Root)` and whose tags resolve
/// through the raw pass-through resolver.
pub fn section(name: &str, roots: &[&str], filters: &[&str]) -> Section {
	Section {
		name: name.to_string(),
		path: roots.iter().map(|root| format!("$(Root)/{root}")).collect(),
		filters: filters.iter().map(|filter| filter.to_string()).collect(),
		converters: "RAW".into(),
		read_only: false,
		recursive: true,
	}
}

/// Registry with only the raw pass-through resolver.
pub fn raw_resolvers() -> AssetResolvers {
	AssetResolvers::new().register("RAW", Arc::new(|buffer, tag, _vts| {
		let asset: Arc<dyn Asset> = RawAsset::new(tag.clone(), buffer);
		Some(asset)
	}))
}
