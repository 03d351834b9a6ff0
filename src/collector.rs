//! Section entries collector
//!
//! One-shot startup pass that brings the durable tag catalog into
//! agreement with the live file system: validates configured section
//! paths, diffs the section descriptors against catalog rows, enumerates
//! every Section×Path root concurrently, then reconciles found files
//! against tag rows under a single transaction. Guids of vanished files
//! are parked in `deleted_tags`; a file reappearing at the identical
//! resolved path recovers its old guid.

use crate::config::{Aliases, ThreadConfig};
use crate::database::{entities, Database, SESSION_START};
use crate::domain::section::Section;
use crate::shared::paths;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sea_orm::{
	ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait,
	QueryFilter, QueryOrder, TransactionTrait,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

/// Below this row count the whole deleted-tags table is snapshotted into
/// memory instead of being queried per new file.
const DELETED_SNAPSHOT_LIMIT: u64 = 1000;

/// Collector failures. All of these abort startup.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
	#[error("{0} tags left in the dirty table; previous session did not flush")]
	DirtyTagsRemain(u64),
	#[error("sections [{0}] have no valid search path; fix the configuration")]
	InvalidSections(String),
	#[error("tag '{0}' vanished from the catalog during reconciliation")]
	MissingTagRow(String),
	#[error("database error: {0}")]
	Database(#[from] sea_orm::DbErr),
	#[error("enumeration task failed: {0}")]
	Join(#[from] tokio::task::JoinError),
}

/// What a collector run changed, for logging and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct CollectorSummary {
	pub new_sections: usize,
	pub deleted_sections: usize,
	pub changed_sections: usize,
	pub new_tags: usize,
	pub deleted_tags: usize,
}

/// Run the full reconciliation pass. Called once from VTS construction.
pub(crate) async fn collect_entries(
	database: &Database,
	sections: &[Section],
	aliases: &Aliases,
	threads: ThreadConfig,
) -> Result<CollectorSummary, CollectorError> {
	let mut summary = CollectorSummary::default();

	let valid_sections = {
		let txn = database.conn().begin().await?;

		entities::audit_log::Entity::delete_many().exec(&txn).await?;
		Database::audit(&txn, SESSION_START, "VTS started").await?;

		let dirty_count = entities::dirty_tag::Entity::find().count(&txn).await?;
		if dirty_count > 0 {
			warn!(dirty_count, "dirty tags left over from a previous session");
			return Err(CollectorError::DirtyTagsRemain(dirty_count));
		}

		let valid_sections = validate_sections(sections, aliases)?;
		diff_sections(&txn, &valid_sections, &mut summary).await?;

		txn.commit().await?;
		valid_sections
	};

	Database::audit(
		database.conn(),
		"INFO",
		format!(
			"VTS update sections - new: {}, deleted: {}, changed: {}",
			summary.new_sections, summary.deleted_sections, summary.changed_sections
		),
	)
	.await?;

	let found = enumerate_sections(&valid_sections, aliases, threads).await?;
	reconcile_tags(database, found, &mut summary).await?;

	Database::audit(
		database.conn(),
		"INFO",
		format!(
			"VTS update tags - new: {}, deleted: {}",
			summary.new_tags, summary.deleted_tags
		),
	)
	.await?;

	Ok(summary)
}

/// Drop search paths that resolve to nothing on disk. Losing a single
/// path is recoverable; losing a whole section is fatal because callers
/// depend on the configured section set.
fn validate_sections(
	sections: &[Section],
	aliases: &Aliases,
) -> Result<Vec<Section>, CollectorError> {
	let mut valid = Vec::with_capacity(sections.len());
	let mut invalid_names = Vec::new();

	for section in sections {
		let mut verified_paths = Vec::with_capacity(section.path.len());
		for path in &section.path {
			let expanded = paths::expand_aliases(path, aliases);
			let candidate = Path::new(&expanded);
			let usable = candidate.is_dir()
				|| candidate.is_file()
				|| (candidate.extension().is_none()
					&& std::fs::create_dir_all(candidate).is_ok());
			if usable {
				verified_paths.push(path.clone());
			} else {
				warn!(
					section = %section.name,
					path = %path,
					expanded = %expanded,
					"search path is not valid, skipping"
				);
			}
		}

		if verified_paths.is_empty() {
			invalid_names.push(section.name.clone());
		} else {
			let mut verified = section.clone();
			verified.path = verified_paths;
			valid.push(verified);
		}
	}

	if !invalid_names.is_empty() {
		return Err(CollectorError::InvalidSections(invalid_names.join(", ")));
	}

	Ok(valid)
}

/// Diff configured section descriptors against catalog rows: insert new
/// ones, delete vanished ones (and their tags), update changed ones in
/// place.
async fn diff_sections(
	txn: &sea_orm::DatabaseTransaction,
	configured: &[Section],
	summary: &mut CollectorSummary,
) -> Result<(), CollectorError> {
	let existing: BTreeMap<String, Section> = entities::section::Entity::find()
		.order_by_asc(entities::section::Column::Name)
		.all(txn)
		.await?
		.into_iter()
		.map(|model| (model.name.clone(), model.into()))
		.collect();

	let configured: BTreeMap<&str, &Section> = configured
		.iter()
		.map(|section| (section.name.as_str(), section))
		.collect();

	for (name, section) in &configured {
		match existing.get(*name) {
			None => {
				entities::section::ActiveModel::from(*section).insert(txn).await?;
				summary.new_sections += 1;
			}
			Some(row) => {
				// recursive alone does not count as a change
				let changed = row.path != section.path
					|| row.filters != section.filters
					|| row.converters != section.converters
					|| row.read_only != section.read_only;
				if changed {
					let mut update = entities::section::ActiveModel::from(*section);
					update.name = sea_orm::ActiveValue::Unchanged(section.name.clone());
					update.update(txn).await?;
					summary.changed_sections += 1;
				}
			}
		}
	}

	for name in existing.keys() {
		if !configured.contains_key(name.as_str()) {
			entities::tag::Entity::delete_many()
				.filter(entities::tag::Column::Section.eq(name))
				.exec(txn)
				.await?;
			entities::section::Entity::delete_by_id(name).exec(txn).await?;
			summary.deleted_sections += 1;
		}
	}

	Ok(())
}

type FoundEntries = BTreeMap<(String, String), Vec<String>>;

/// Enumerate every Section×Path root concurrently. Results are keyed by
/// (section name, configured root) with sorted alias-form file names.
async fn enumerate_sections(
	sections: &[Section],
	aliases: &Aliases,
	threads: ThreadConfig,
) -> Result<FoundEntries, CollectorError> {
	let limit = Arc::new(Semaphore::new(ThreadConfig::effective(threads.collector)));
	let mut handles = Vec::new();

	for section in sections {
		let globs = Arc::new(build_globset(&section.filters, &section.name));

		for root in &section.path {
			let limit = limit.clone();
			let globs = globs.clone();
			let section_name = section.name.clone();
			let root = root.clone();
			let expanded = paths::expand_aliases(&root, aliases);
			let recursive = section.recursive;

			handles.push(tokio::spawn(async move {
				let _permit = limit.acquire_owned().await;
				let files = tokio::task::spawn_blocking(move || {
					enumerate_root(&expanded, &root, recursive, &globs)
				})
				.await?;
				Ok::<_, CollectorError>(((section_name, files.0), files.1))
			}));
		}
	}

	let mut found = FoundEntries::new();
	for handle in handles {
		let ((section_name, root), files) = handle.await??;
		found
			.entry((section_name, root))
			.or_default()
			.extend(files);
	}
	for files in found.values_mut() {
		files.sort();
	}

	Ok(found)
}

/// Walk one root, returning the configured root and the matching files
/// re-rooted onto it (alias form preserved).
fn enumerate_root(
	expanded: &str,
	configured_root: &str,
	recursive: bool,
	globs: &GlobSet,
) -> (String, Vec<String>) {
	let root_path = Path::new(expanded);

	if root_path.is_file() {
		let matched = globs.is_match(expanded);
		let files = if matched {
			vec![paths::normalize(configured_root)]
		} else {
			Vec::new()
		};
		return (configured_root.to_string(), files);
	}

	let max_depth = if recursive { usize::MAX } else { 1 };
	let mut files = Vec::new();

	for entry in walkdir::WalkDir::new(root_path)
		.max_depth(max_depth)
		.follow_links(false)
		.into_iter()
		.filter_map(|entry| entry.ok())
	{
		if !entry.file_type().is_file() {
			continue;
		}
		let full = paths::normalize(&entry.path().display().to_string());
		if !globs.is_match(&full) {
			continue;
		}
		let normalized_root = paths::normalize(expanded);
		if let Some(relative) = full.strip_prefix(&normalized_root) {
			let vts_name =
				paths::normalize(&format!("{}/{}", configured_root, relative.trim_start_matches('/')));
			files.push(vts_name);
		}
	}

	(configured_root.to_string(), files)
}

fn build_globset(filters: &[String], section_name: &str) -> GlobSet {
	let mut builder = GlobSetBuilder::new();
	for filter in filters {
		match Glob::new(filter) {
			Ok(glob) => {
				builder.add(glob);
			}
			Err(e) => {
				warn!(section = section_name, filter = %filter, "invalid filter glob: {e}");
			}
		}
	}
	builder.build().unwrap_or_else(|_| GlobSet::empty())
}

/// Reconcile found files against tag rows, one transaction for the whole
/// batch. Any failure rolls everything back and aborts startup.
async fn reconcile_tags(
	database: &Database,
	found: FoundEntries,
	summary: &mut CollectorSummary,
) -> Result<(), CollectorError> {
	let txn = database.conn().begin().await?;

	for ((section_name, root), files) in found {
		let on_disk: BTreeSet<String> = files.into_iter().collect();
		let in_catalog: BTreeSet<String> = entities::tag::Entity::find()
			.filter(entities::tag::Column::Section.eq(&section_name))
			.filter(entities::tag::Column::Vts.like(format!("%{root}%")))
			.order_by_asc(entities::tag::Column::Vts)
			.all(&txn)
			.await?
			.into_iter()
			.map(|model| model.vts)
			.collect();

		let new_tags: Vec<&String> = on_disk.difference(&in_catalog).collect();
		let vanished: Vec<&String> = in_catalog.difference(&on_disk).collect();
		if new_tags.is_empty() && vanished.is_empty() {
			continue;
		}

		// small deleted tables are cheaper to scan in memory than to
		// query once per new file
		let deleted_count = entities::deleted_tag::Entity::find().count(&txn).await?;
		let mut snapshot = if deleted_count > 0 && deleted_count < DELETED_SNAPSHOT_LIMIT {
			Some(entities::deleted_tag::Entity::find().all(&txn).await?)
		} else {
			None
		};

		for vts_name in new_tags {
			let recovered = recover_guid(&txn, vts_name, deleted_count, &mut snapshot).await?;
			if let Some(guid) = recovered {
				entities::deleted_tag::Entity::delete_by_id(guid).exec(&txn).await?;
			}

			let stem = Path::new(vts_name)
				.file_stem()
				.map(|s| s.to_string_lossy().into_owned())
				.unwrap_or_default();

			entities::tag::ActiveModel {
				guid: Set(recovered.unwrap_or_else(Uuid::new_v4)),
				name: Set(stem),
				vts: Set(vts_name.clone()),
				section: Set(section_name.clone()),
			}
			.insert(&txn)
			.await?;
			summary.new_tags += 1;
		}

		for vts_name in vanished {
			let existing = entities::tag::Entity::find()
				.filter(entities::tag::Column::Section.eq(&section_name))
				.filter(entities::tag::Column::Vts.eq(vts_name.as_str()))
				.one(&txn)
				.await?
				.ok_or_else(|| CollectorError::MissingTagRow(vts_name.clone()))?;

			entities::tag::Entity::delete_by_id(existing.guid).exec(&txn).await?;
			entities::deleted_tag::ActiveModel {
				guid: Set(existing.guid),
				name: Set(existing.name),
				vts: Set(existing.vts),
				section: Set(existing.section),
			}
			.insert(&txn)
			.await?;
			summary.deleted_tags += 1;
		}
	}

	txn.commit().await?;

	if summary.new_tags > 0 || summary.deleted_tags > 0 {
		info!(
			new_tags = summary.new_tags,
			deleted_tags = summary.deleted_tags,
			"catalog reconciled against disk"
		);
	}

	Ok(())
}

/// Look up a previously deleted guid for the identical resolved path.
async fn recover_guid(
	txn: &sea_orm::DatabaseTransaction,
	vts_name: &str,
	deleted_count: u64,
	snapshot: &mut Option<Vec<entities::deleted_tag::Model>>,
) -> Result<Option<Uuid>, CollectorError> {
	if deleted_count == 0 {
		return Ok(None);
	}

	match snapshot {
		Some(rows) => {
			if let Some(index) = rows.iter().position(|row| row.vts == vts_name) {
				return Ok(Some(rows.remove(index).guid));
			}
			Ok(None)
		}
		None => Ok(entities::deleted_tag::Entity::find()
			.filter(entities::deleted_tag::Column::Vts.eq(vts_name))
			.one(txn)
			.await?
			.map(|row| row.guid)),
	}
}
