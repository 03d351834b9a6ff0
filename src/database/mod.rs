//! Durable catalog over SQLite using SeaORM
//!
//! The catalog is the source of truth for sections, tags, and the
//! dirty/deleted crash-recovery markers. Multi-table mutations always go
//! through an explicit transaction so partial updates are never
//! observable.

use sea_orm::{
	ActiveModelTrait, ActiveValue::Set, ConnectOptions, ConnectionTrait,
	Database as SeaDatabase, DatabaseConnection, DbErr,
};
use sea_orm_migration::MigratorTrait;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod entities;
pub mod migration;

/// Audit marker written when a session begins.
pub const SESSION_START: &str = "SESSION_START";
/// Audit marker written when a session ends cleanly.
pub const SESSION_END: &str = "SESSION_END";

/// Catalog database wrapper.
pub struct Database {
	conn: DatabaseConnection,
}

impl Database {
	/// Open the catalog at `path`, creating it if needed. With `reset`
	/// the existing file is deleted first so the catalog rebuilds from
	/// scratch.
	pub async fn open(path: &Path, reset: bool) -> Result<Self, DbErr> {
		if reset {
			Self::remove_catalog_files(path)?;
			info!("Reset catalog at {:?}", path);
		}

		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)
				.map_err(|e| DbErr::Custom(format!("Failed to create directory: {}", e)))?;
		}

		let db_url = format!("sqlite://{}?mode=rwc", path.display());

		let mut opt = ConnectOptions::new(db_url);
		opt.max_connections(10)
			.min_connections(1)
			.connect_timeout(Duration::from_secs(8))
			.idle_timeout(Duration::from_secs(8))
			.sqlx_logging(false); // We'll use tracing instead

		let conn = SeaDatabase::connect(opt).await?;

		info!("Opened catalog at {:?}", path);

		Ok(Self { conn })
	}

	/// Delete the catalog file and its WAL/SHM sidecars. The sidecars
	/// carry unflushed state from the previous session and must go with
	/// the main file.
	fn remove_catalog_files(path: &Path) -> Result<(), DbErr> {
		let base = path.display().to_string();
		for target in [base.clone(), format!("{base}-wal"), format!("{base}-shm")] {
			let target = Path::new(&target);
			if target.exists() {
				std::fs::remove_file(target).map_err(|e| {
					DbErr::Custom(format!(
						"Failed to reset catalog {}: {}",
						target.display(),
						e
					))
				})?;
			}
		}
		Ok(())
	}

	/// Run migrations
	pub async fn migrate(&self) -> Result<(), DbErr> {
		migration::Migrator::up(&self.conn, None).await?;
		Ok(())
	}

	/// Get the database connection
	pub fn conn(&self) -> &DatabaseConnection {
		&self.conn
	}

	/// Append an audit row (session markers, reconcile summaries).
	pub async fn audit<C: ConnectionTrait>(
		conn: &C,
		level: &str,
		message: impl Into<String>,
	) -> Result<(), DbErr> {
		entities::audit_log::ActiveModel {
			level: Set(level.to_string()),
			message: Set(message.into()),
			created_at: Set(chrono::Utc::now()),
			..Default::default()
		}
		.insert(conn)
		.await?;
		Ok(())
	}
}
