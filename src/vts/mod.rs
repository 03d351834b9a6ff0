//! The VTS orchestrator
//!
//! [`Vts`] wires the catalog, the entries collector, the blob loader and
//! the asset cache together behind one handle. Construction reconciles
//! the catalog against disk; after that every lookup answers from the
//! catalog and every blob request flows load -> resolve -> install ->
//! deliver, with the cache guaranteeing at most one install per tag.

use crate::blob_loader::{BlobLoader, BlobLoaderError, ConvertInput, Convertor};
use crate::collector::{self, CollectorError};
use crate::config::{Aliases, RuntimeMode, ThreadConfig, VtsConfig};
use crate::database::{entities, Database, SESSION_END};
use crate::domain::asset::{Asset, Buffer};
use crate::domain::resolver::ConverterKind;
use crate::domain::section::{MatchMode, SectionQuery};
use crate::domain::tag::Tag;
use crate::shared::counter::{PendingCounter, PendingGuard};
use crate::shared::paths;
use futures::FutureExt;
use sea_orm::{
	ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait,
	QueryFilter, TransactionTrait,
};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

mod query;

/// How long an orderly shutdown waits for in-flight loads to drain.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

/// Delivers one installed asset to the requester. Called from a pooled
/// task, never from the caller's own task.
pub type BlobAssetCallback = Arc<dyn Fn(Arc<dyn Asset>) + Send + Sync>;

/// Turns loaded bytes into a typed asset for one converter label.
/// Returning `None` means the bytes were not usable; the request is
/// dropped after logging.
pub type AssetResolver =
	Arc<dyn Fn(Buffer, &Tag, &Vts) -> Option<Arc<dyn Asset>> + Send + Sync>;

/// Registry mapping converter labels to resolvers. Populated before
/// construction; not mutated afterwards.
#[derive(Default, Clone)]
pub struct AssetResolvers {
	map: BTreeMap<ConverterKind, AssetResolver>,
}

impl AssetResolvers {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(mut self, kind: impl Into<ConverterKind>, resolver: AssetResolver) -> Self {
		self.map.insert(kind.into(), resolver);
		self
	}

	pub fn find(&self, kind: &ConverterKind) -> Option<AssetResolver> {
		self.map.get(kind).cloned()
	}
}

/// How [`Vts::update_asset_data`] treats a tag with no cached asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
	/// Only update an already-cached asset.
	UpdateOnly,
	/// Install the asset (and its catalog row) if it is not cached yet.
	Add,
}

#[derive(Debug, thiserror::Error)]
pub enum VtsError {
	#[error("collector failed: {0}")]
	Collector(#[from] CollectorError),
	#[error("database error: {0}")]
	Database(#[from] sea_orm::DbErr),
	#[error("blob loader error: {0}")]
	BlobLoader(#[from] BlobLoaderError),
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
	#[error("unknown section '{0}'")]
	UnknownSection(String),
}

pub type VtsResult<T> = Result<T, VtsError>;

#[derive(Default)]
struct AssetCache {
	assets: BTreeMap<Tag, Arc<dyn Asset>>,
	overrides: BTreeMap<Tag, Arc<dyn Asset>>,
}

struct VtsInner {
	runtime_mode: RuntimeMode,
	aliases: Aliases,
	resolvers: AssetResolvers,
	cache: Mutex<AssetCache>,
	database: Database,
	blob_loader: BlobLoader,
	request_limit: Arc<Semaphore>,
}

/// Handle to the virtual transport system. Cheap to clone; all clones
/// share the same catalog, cache and loader.
#[derive(Clone)]
pub struct Vts {
	inner: Arc<VtsInner>,
}

impl Vts {
	/// Open the catalog, run migrations and (outside diagnostic mode)
	/// reconcile it against disk. Returns only once the system is ready
	/// to serve requests.
	pub async fn new(config: VtsConfig, resolvers: AssetResolvers) -> VtsResult<Self> {
		let reset = config.runtime_mode == RuntimeMode::Reset;
		let runtime_mode = if reset {
			RuntimeMode::Optimum
		} else {
			config.runtime_mode
		};

		let database_path = paths::expand_aliases(&config.database_path, &config.aliases);
		let database = Database::open(Path::new(&database_path), reset).await?;
		database.migrate().await?;

		let blob_loader = BlobLoader::new(
			config.threads,
			Some(Arc::new(|file_name: &str, message: &str| {
				warn!(file = file_name, "blob load failed: {message}");
			})),
		);

		if runtime_mode != RuntimeMode::Diagnostic {
			let summary = collector::collect_entries(
				&database,
				&config.sections,
				&config.aliases,
				config.threads,
			)
			.await?;
			info!(
				new_tags = summary.new_tags,
				deleted_tags = summary.deleted_tags,
				"VTS ready"
			);
		} else {
			info!("VTS ready (diagnostic, catalog not reconciled)");
		}

		Ok(Self {
			inner: Arc::new(VtsInner {
				runtime_mode,
				aliases: config.aliases,
				resolvers,
				cache: Mutex::new(AssetCache::default()),
				database,
				blob_loader,
				request_limit: Arc::new(Semaphore::new(ThreadConfig::effective(
					config.threads.request,
				))),
			}),
		})
	}

	fn conn(&self) -> &sea_orm::DatabaseConnection {
		self.inner.database.conn()
	}

	/// Resolve section filter expressions to the tags they match.
	///
	/// Like and Exact aggregate matches across every root; Override walks
	/// the roots most-recently-registered first and yields the first root
	/// holding exactly one match.
	pub async fn get_tags(&self, queries: &[SectionQuery]) -> VtsResult<Vec<Tag>> {
		let mut tags = Vec::new();

		for section_query in queries {
			let Some(section) =
				entities::section::Entity::find_by_id(&section_query.name)
					.one(self.conn())
					.await?
			else {
				debug!(section = %section_query.name, "query names an unknown section");
				continue;
			};

			for root in section.paths().iter().rev() {
				let found = query::tags_for_root(
					self.conn(),
					&section_query.name,
					root,
					&section_query.filter,
					section_query.match_mode,
				)
				.await?;

				match section_query.match_mode {
					MatchMode::Like | MatchMode::Exact => tags.extend(found),
					MatchMode::Override => {
						if found.len() == 1 {
							tags.extend(found);
							break;
						}
					}
				}
			}
		}

		Ok(tags)
	}

	/// First tag matching the expression, if any.
	pub async fn get_tag(&self, section_query: &SectionQuery) -> VtsResult<Option<Tag>> {
		Ok(self
			.get_tags(std::slice::from_ref(section_query))
			.await?
			.into_iter()
			.next())
	}

	pub async fn get_num_tags(&self, section_query: &SectionQuery) -> VtsResult<usize> {
		Ok(self.get_tags(std::slice::from_ref(section_query)).await?.len())
	}

	/// Whether a section of that name exists in the catalog.
	pub async fn is_section_valid(&self, section_name: &str) -> VtsResult<bool> {
		Ok(entities::section::Entity::find_by_id(section_name)
			.one(self.conn())
			.await?
			.is_some())
	}

	/// Request the assets behind `tags`, delivering each through
	/// `callback` as it becomes available.
	///
	/// The optional `counter` is incremented by `tags.len()` before any
	/// dispatch and decremented exactly once per tag, on success and on
	/// every failure path. Cache hits are delivered from the request pool
	/// rather than inline.
	pub fn request_blob(
		&self,
		tags: &[Tag],
		callback: BlobAssetCallback,
		counter: Option<Arc<PendingCounter>>,
	) -> VtsResult<()> {
		if let Some(counter) = &counter {
			counter.add(tags.len());
		}

		let mut file_names = Vec::new();
		let mut convertors: Vec<Convertor> = Vec::new();

		for tag in tags {
			if let Some(asset) = self.find_asset(tag) {
				self.deliver_cached(asset, callback.clone(), counter.clone());
				continue;
			}

			let file_name = tag.resolve_vts(&self.inner.aliases);
			let vts = self.clone();
			let tag = tag.clone();
			let callback = callback.clone();
			let counter = counter.clone();

			let convertor: Convertor = Arc::new(move |input: ConvertInput| {
				let vts = vts.clone();
				let tag = tag.clone();
				let callback = callback.clone();
				let counter = counter.clone();
				async move { vts.on_blob_loaded(input, tag, callback, counter).await }
					.boxed()
			});

			file_names.push(file_name);
			convertors.push(convertor);
		}

		if !file_names.is_empty() {
			self.inner.blob_loader.add_task(file_names, convertors)?;
		}

		Ok(())
	}

	/// Resolve a filter expression and request everything it matches.
	/// Returns how many tags were dispatched.
	pub async fn request_section(
		&self,
		section_query: &SectionQuery,
		callback: BlobAssetCallback,
		counter: Option<Arc<PendingCounter>>,
	) -> VtsResult<usize> {
		let tags = self.get_tags(std::slice::from_ref(section_query)).await?;
		self.request_blob(&tags, callback, counter)?;
		Ok(tags.len())
	}

	fn deliver_cached(
		&self,
		asset: Arc<dyn Asset>,
		callback: BlobAssetCallback,
		counter: Option<Arc<PendingCounter>>,
	) {
		let guard = PendingGuard::new(counter);
		let request_limit = self.inner.request_limit.clone();

		tokio::spawn(async move {
			let _guard = guard;
			let _permit = request_limit.acquire_owned().await;
			if catch_unwind(AssertUnwindSafe(|| callback(asset))).is_err() {
				warn!("asset callback panicked");
			}
		});
	}

	/// Resolve loaded bytes into an asset and install it. Runs on the
	/// conversion pool; the counter settles once whatever happens here.
	async fn on_blob_loaded(
		&self,
		input: ConvertInput,
		tag: Tag,
		callback: BlobAssetCallback,
		counter: Option<Arc<PendingCounter>>,
	) -> Result<(), String> {
		let _guard = PendingGuard::new(counter);

		let buffer = match input {
			Ok(buffer) => buffer,
			Err(message) => {
				debug!(%tag, "skipping resolve, load failed: {message}");
				return Ok(());
			}
		};

		// another in-flight request may have installed it meanwhile
		if let Some(existing) = self.find_asset(&tag) {
			callback(existing);
			return Ok(());
		}

		let kind = match self.get_resolver_type(&tag).await {
			Ok(Some(kind)) => kind,
			Ok(None) => return Err(format!("tag '{tag}' belongs to no known section")),
			Err(e) => return Err(e.to_string()),
		};

		let Some(resolver) = self.inner.resolvers.find(&kind) else {
			error!(%tag, kind = %kind, "no resolver registered for converter label");
			debug_assert!(false, "missing resolver is a configuration error");
			return Err(format!("no resolver registered for '{kind}'"));
		};

		// resolve outside the cache lock; resolvers may be slow or
		// re-enter the VTS
		let Some(asset) = resolver(buffer, &tag, self) else {
			return Err(format!("resolver produced no asset for '{tag}'"));
		};

		// first writer wins; later resolutions of the same tag are dropped
		let installed = {
			let mut cache = lock_cache(&self.inner.cache);
			cache.assets.entry(tag).or_insert(asset).clone()
		};

		callback(installed);
		Ok(())
	}

	/// Request `tags` and wait for every delivery. Failed tags are simply
	/// absent from the result.
	pub async fn load_assets(&self, tags: &[Tag]) -> VtsResult<Vec<Arc<dyn Asset>>> {
		let counter = PendingCounter::new();
		let collected = Arc::new(Mutex::new(Vec::with_capacity(tags.len())));

		let sink = collected.clone();
		let callback: BlobAssetCallback = Arc::new(move |asset| {
			lock_vec(&sink).push(asset);
		});

		self.request_blob(tags, callback, Some(counter.clone()))?;
		counter.wait_zero().await;

		let mut assets = lock_vec(&collected);
		Ok(std::mem::take(&mut *assets))
	}

	/// Cached asset for `tag`, override layer first.
	pub fn find_asset(&self, tag: &Tag) -> Option<Arc<dyn Asset>> {
		let cache = lock_cache(&self.inner.cache);
		cache
			.overrides
			.get(tag)
			.or_else(|| cache.assets.get(tag))
			.cloned()
	}

	/// Mint a tag for a file that does not exist yet, rooted at the
	/// section's first search path. A guid parked in the deleted table
	/// for the same resolved path is recovered; otherwise a fresh one is
	/// generated.
	pub async fn generate_tag(&self, section_query: &SectionQuery) -> VtsResult<Tag> {
		let Some(section) = entities::section::Entity::find_by_id(&section_query.name)
			.one(self.conn())
			.await?
		else {
			return Err(VtsError::UnknownSection(section_query.name.clone()));
		};

		let root = section
			.paths()
			.into_iter()
			.next()
			.ok_or_else(|| VtsError::UnknownSection(section_query.name.clone()))?;
		let vts_name = paths::normalize(&format!("{}/{}", root, section_query.filter));
		let name = Path::new(&section_query.filter)
			.file_stem()
			.map(|stem| stem.to_string_lossy().into_owned())
			.unwrap_or_else(|| section_query.filter.clone());

		let txn = self.conn().begin().await?;
		let recovered = entities::deleted_tag::Entity::find()
			.filter(entities::deleted_tag::Column::Vts.eq(vts_name.as_str()))
			.one(&txn)
			.await?;
		let guid = match recovered {
			Some(row) => {
				entities::deleted_tag::Entity::delete_by_id(row.guid)
					.exec(&txn)
					.await?;
				row.guid
			}
			None => uuid::Uuid::new_v4(),
		};
		txn.commit().await?;

		Ok(Tag::new(guid, name, vts_name, section_query.name.clone()))
	}

	/// Existing tag for the expression, or a freshly minted one.
	pub async fn assure_tag(&self, section_query: &SectionQuery) -> VtsResult<Tag> {
		if let Some(tag) = self.get_tag(section_query).await? {
			return Ok(tag);
		}
		self.generate_tag(section_query).await
	}

	/// Shadow a cached asset. Lookups see the override until it is
	/// cleared; the base asset stays installed underneath.
	pub fn add_override(&self, asset: Arc<dyn Asset>) {
		let tag = asset.tag().clone();
		let mut cache = lock_cache(&self.inner.cache);
		if !cache.assets.contains_key(&tag) {
			warn!(%tag, "override added for a tag with no base asset");
			debug_assert!(false, "override target is not cached");
		}
		cache.overrides.insert(tag, asset);
	}

	/// Evict `tags` from both cache layers. Callers still holding
	/// references keep their assets alive.
	pub fn clear_assets(&self, tags: &[Tag]) {
		let mut cache = lock_cache(&self.inner.cache);
		for tag in tags {
			cache.assets.remove(tag);
			cache.overrides.remove(tag);
		}
	}

	/// Register in-memory assets that have no backing file yet: persist
	/// their tag rows in one transaction, then install them. Returns
	/// false (with nothing installed) if any row could not be written.
	pub async fn attach_transient_blob(&self, assets: &[Arc<dyn Asset>]) -> bool {
		let result: Result<(), sea_orm::DbErr> = async {
			let txn = self.conn().begin().await?;
			for asset in assets {
				entities::tag::ActiveModel::from(asset.tag()).insert(&txn).await?;
			}
			txn.commit().await
		}
		.await;

		if let Err(e) = result {
			warn!("could not persist transient blobs: {e}");
			return false;
		}

		let mut cache = lock_cache(&self.inner.cache);
		for asset in assets {
			cache.assets.insert(asset.tag().clone(), asset.clone());
		}
		true
	}

	/// Replace (or, with [`Request::Add`], install) the content behind a
	/// tag and mark it dirty so an orderly shutdown flushes it to disk.
	/// Read-only sections reject the update.
	pub async fn update_asset_data(&self, asset: Arc<dyn Asset>, request: Request) -> bool {
		let tag = asset.tag().clone();

		let read_only = match self.section_read_only(&tag.section_name).await {
			Ok(read_only) => read_only,
			Err(e) => {
				warn!(%tag, "could not check section: {e}");
				return false;
			}
		};
		if read_only {
			warn!(%tag, "section is read only, update rejected");
			return false;
		}

		let result: Result<bool, sea_orm::DbErr> = async {
			match self.find_asset(&tag) {
				Some(existing) => {
					self.mark_dirty(&tag).await?;
					existing.replace_buffer(asset.buffer());
					Ok(true)
				}
				None if request == Request::Add => {
					let txn = self.conn().begin().await?;
					entities::tag::ActiveModel::from(&tag).insert(&txn).await?;
					entities::dirty_tag::ActiveModel {
						guid: Set(tag.guid),
					}
					.insert(&txn)
					.await?;
					txn.commit().await?;

					let mut cache = lock_cache(&self.inner.cache);
					cache.assets.insert(tag.clone(), asset.clone());
					Ok(true)
				}
				None => {
					warn!(%tag, "update-only request for an uncached asset");
					Ok(false)
				}
			}
		}
		.await;

		match result {
			Ok(updated) => updated,
			Err(e) => {
				warn!(%tag, "asset update failed: {e}");
				false
			}
		}
	}

	async fn mark_dirty(&self, tag: &Tag) -> Result<(), sea_orm::DbErr> {
		let already = entities::dirty_tag::Entity::find_by_id(tag.guid)
			.one(self.conn())
			.await?;
		if already.is_none() {
			entities::dirty_tag::ActiveModel {
				guid: Set(tag.guid),
			}
			.insert(self.conn())
			.await?;
		}
		Ok(())
	}

	async fn section_read_only(&self, section_name: &str) -> VtsResult<bool> {
		let section = entities::section::Entity::find_by_id(section_name)
			.one(self.conn())
			.await?
			.ok_or_else(|| VtsError::UnknownSection(section_name.to_string()))?;
		Ok(section.read_only)
	}

	/// The converter label behind a tag's section, if the section exists.
	pub async fn get_resolver_type(&self, tag: &Tag) -> VtsResult<Option<ConverterKind>> {
		Ok(entities::section::Entity::find_by_id(&tag.section_name)
			.one(self.conn())
			.await?
			.map(|section| ConverterKind::from(section.converters)))
	}

	/// Number of files still moving through the loader.
	pub fn pending_blobs(&self) -> usize {
		self.inner.blob_loader.pending()
	}

	/// Orderly shutdown: drain in-flight loads, then (in optimum mode)
	/// flush every dirty buffer back to its file and clear the dirty
	/// table. The session end marker is the last thing written.
	pub async fn shutdown(&self) -> VtsResult<()> {
		self.inner.blob_loader.wait_idle(SHUTDOWN_DRAIN).await;

		if self.inner.runtime_mode == RuntimeMode::Optimum {
			self.flush_dirty().await?;
		}

		Database::audit(self.conn(), SESSION_END, "VTS ended").await?;
		info!("VTS shut down");
		Ok(())
	}

	async fn flush_dirty(&self) -> VtsResult<()> {
		let dirty = entities::dirty_tag::Entity::find().all(self.conn()).await?;
		let dirty_count = dirty.len();
		let mut flushed = 0usize;

		for row in dirty {
			let Some(tag_row) = entities::tag::Entity::find_by_id(row.guid)
				.one(self.conn())
				.await?
			else {
				warn!(guid = %row.guid, "dirty guid has no tag row, skipping");
				continue;
			};
			let tag = Tag::from(tag_row);

			let Some(asset) = self.find_asset(&tag) else {
				warn!(%tag, "dirty tag has no cached asset, skipping");
				continue;
			};

			let mut file_name = tag.resolve_vts(&self.inner.aliases);
			if Path::new(&file_name).extension().is_none() {
				if let Some(extension) =
					self.section_extension(&tag.section_name).await?
				{
					file_name.push_str(&extension);
				}
			}

			match self.inner.blob_loader.save(&asset.buffer(), &file_name) {
				Ok(()) => flushed += 1,
				Err(e) => warn!(%tag, file = %file_name, "dirty flush failed: {e}"),
			}
		}

		entities::dirty_tag::Entity::delete_many()
			.exec(self.conn())
			.await?;

		if dirty_count > 0 {
			info!(flushed, dirty = dirty_count, "dirty buffers flushed");
		}
		Ok(())
	}

	/// Recover a file extension for tags minted without one (`"*.pak"`
	/// yields `".pak"`). Only sections with a single filter qualify;
	/// with several the choice would be ambiguous and the name is left
	/// alone.
	async fn section_extension(&self, section_name: &str) -> VtsResult<Option<String>> {
		let Some(section) = entities::section::Entity::find_by_id(section_name)
			.one(self.conn())
			.await?
		else {
			return Ok(None);
		};

		let filters = section.filter_list();
		let [filter] = filters.as_slice() else {
			return Ok(None);
		};
		Ok(filter.rfind('.').map(|dot| filter[dot..].to_string()))
	}

	/// Count of tags parked in the deleted table. Diagnostic use.
	pub async fn deleted_tag_count(&self) -> VtsResult<u64> {
		Ok(entities::deleted_tag::Entity::find()
			.count(self.conn())
			.await?)
	}
}

fn lock_cache(cache: &Mutex<AssetCache>) -> std::sync::MutexGuard<'_, AssetCache> {
	cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock_vec<T>(vec: &Mutex<Vec<T>>) -> std::sync::MutexGuard<'_, Vec<T>> {
	vec.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
