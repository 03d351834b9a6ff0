//! Asynchronous byte-level load/save, decoupled from asset semantics
//!
//! The loader reads raw bytes on a bounded I/O task set and hands every
//! result to a second, separately bounded conversion task, so conversion
//! cost never blocks file reads. Converter failures are reported through
//! the error callback and never propagate; the outstanding-work counter
//! decrements exactly once per file on every path.

use crate::config::ThreadConfig;
use crate::domain::asset::Buffer;
use crate::shared::counter::{PendingCounter, PendingGuard};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error};

/// What a convertor receives: the file bytes, or the read failure
/// message. Convertors must settle their own bookkeeping on both.
pub type ConvertInput = Result<Buffer, String>;

/// Outcome of a conversion; an `Err` is routed to the error callback.
pub type ConvertFuture = BoxFuture<'static, Result<(), String>>;

/// Converts one file's bytes. Shared when a single convertor serves a
/// whole batch.
pub type Convertor = Arc<dyn Fn(ConvertInput) -> ConvertFuture + Send + Sync>;

/// `(file_name, message)` per-file failure report.
pub type ErrorCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum BlobLoaderError {
	#[error(
		"file names and convertors did not match: {file_names} files, {convertors} convertors"
	)]
	ArityMismatch { file_names: usize, convertors: usize },
}

/// Async blob load/save worker layer.
pub struct BlobLoader {
	error_callback: ErrorCallback,
	counter: Arc<PendingCounter>,
	io_limit: Arc<Semaphore>,
	convert_limit: Arc<Semaphore>,
}

impl BlobLoader {
	pub fn new(threads: ThreadConfig, error_callback: Option<ErrorCallback>) -> Self {
		Self {
			error_callback: error_callback.unwrap_or_else(|| Arc::new(|_, _| {})),
			counter: PendingCounter::new(),
			io_limit: Arc::new(Semaphore::new(ThreadConfig::effective(threads.blob))),
			convert_limit: Arc::new(Semaphore::new(ThreadConfig::effective(
				threads.converters,
			))),
		}
	}

	/// Queue `file_names` for loading, pairing each with its convertor.
	///
	/// The lists must have equal length, or exactly one convertor may be
	/// shared across every file. The outstanding counter is incremented
	/// before any dispatch.
	pub fn add_task(
		&self,
		file_names: Vec<String>,
		convertors: Vec<Convertor>,
	) -> Result<(), BlobLoaderError> {
		let shared = convertors.len() == 1 && !file_names.is_empty();
		if file_names.len() != convertors.len() && !shared {
			error!(
				file_names = file_names.len(),
				convertors = convertors.len(),
				"file names and convertors must pair up"
			);
			return Err(BlobLoaderError::ArityMismatch {
				file_names: file_names.len(),
				convertors: convertors.len(),
			});
		}

		self.counter.add(file_names.len());

		for (index, file_name) in file_names.into_iter().enumerate() {
			let convertor = if shared {
				convertors[0].clone()
			} else {
				convertors[index].clone()
			};
			self.spawn_load(file_name, convertor);
		}

		Ok(())
	}

	fn spawn_load(&self, file_name: String, convertor: Convertor) {
		let guard = PendingGuard::new(Some(self.counter.clone()));
		let io_limit = self.io_limit.clone();
		let convert_limit = self.convert_limit.clone();
		let error_callback = self.error_callback.clone();

		tokio::spawn(async move {
			let guard = guard;

			let read_result = {
				let _permit = io_limit.acquire_owned().await;
				tokio::fs::read(&file_name).await
			};

			let input = match read_result {
				Ok(bytes) => Ok(Buffer::from(bytes)),
				Err(e) => {
					let message = format!("failed to read: {e}");
					error_callback(&file_name, &message);
					Err(message)
				}
			};

			// Conversion may be expensive; hand it to the secondary task
			// set so it never occupies an I/O slot. The guard travels
			// with it and settles the counter whatever happens inside.
			tokio::spawn(async move {
				let _guard = guard;
				let _permit = convert_limit.acquire_owned().await;

				match std::panic::AssertUnwindSafe(convertor(input))
					.catch_unwind()
					.await
				{
					Ok(Ok(())) => {}
					Ok(Err(message)) => error_callback(&file_name, &message),
					Err(_) => {
						error_callback(&file_name, "convertor panicked");
						debug!("convertor for '{file_name}' panicked");
					}
				}
			});
		});
	}

	/// Synchronous pass-through write.
	pub fn save(&self, buffer: &Buffer, file_name: &str) -> std::io::Result<()> {
		if let Some(parent) = Path::new(file_name).parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(file_name, buffer)
	}

	/// Number of files still in flight.
	pub fn pending(&self) -> usize {
		self.counter.count()
	}

	/// Bounded drain of outstanding work. On expiry this logs and
	/// debug-asserts rather than hanging forever; a stuck counter is a
	/// programming error, not a normal condition.
	pub async fn wait_idle(&self, timeout: Duration) -> bool {
		let drained = self.counter.wait_zero_timeout(timeout).await;
		if !drained {
			error!(
				pending = self.counter.count(),
				"blob loader did not drain within {:?}", timeout
			);
			debug_assert!(false, "blob loader drain timed out");
		}
		drained
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use tempfile::TempDir;

	fn loader_with_errors() -> (BlobLoader, Arc<AtomicUsize>) {
		let errors = Arc::new(AtomicUsize::new(0));
		let errors_seen = errors.clone();
		let loader = BlobLoader::new(
			ThreadConfig::default(),
			Some(Arc::new(move |_, _| {
				errors_seen.fetch_add(1, Ordering::SeqCst);
			})),
		);
		(loader, errors)
	}

	fn ok_convertor(seen: Arc<AtomicUsize>) -> Convertor {
		Arc::new(move |input| {
			let seen = seen.clone();
			async move {
				if input.is_ok() {
					seen.fetch_add(1, Ordering::SeqCst);
				}
				Ok(())
			}
			.boxed()
		})
	}

	#[tokio::test]
	async fn loads_files_and_counts_down() {
		let dir = TempDir::new().unwrap();
		let file = dir.path().join("blob.bin");
		std::fs::write(&file, b"payload").unwrap();

		let (loader, errors) = loader_with_errors();
		let seen = Arc::new(AtomicUsize::new(0));

		loader
			.add_task(
				vec![file.display().to_string()],
				vec![ok_convertor(seen.clone())],
			)
			.unwrap();

		assert!(loader.wait_idle(Duration::from_secs(5)).await);
		assert_eq!(seen.load(Ordering::SeqCst), 1);
		assert_eq!(errors.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn missing_file_reports_error_and_still_counts_down() {
		let (loader, errors) = loader_with_errors();
		let seen = Arc::new(AtomicUsize::new(0));

		loader
			.add_task(
				vec!["/nonexistent/blob.bin".to_string()],
				vec![ok_convertor(seen.clone())],
			)
			.unwrap();

		assert!(loader.wait_idle(Duration::from_secs(5)).await);
		assert_eq!(seen.load(Ordering::SeqCst), 0);
		assert_eq!(errors.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn convertor_failure_is_isolated() {
		let dir = TempDir::new().unwrap();
		let good = dir.path().join("good.bin");
		let bad = dir.path().join("bad.bin");
		std::fs::write(&good, b"ok").unwrap();
		std::fs::write(&bad, b"broken").unwrap();

		let (loader, errors) = loader_with_errors();
		let seen = Arc::new(AtomicUsize::new(0));

		let failing: Convertor =
			Arc::new(|_| async { Err("did not convert".to_string()) }.boxed());

		loader
			.add_task(
				vec![bad.display().to_string(), good.display().to_string()],
				vec![failing, ok_convertor(seen.clone())],
			)
			.unwrap();

		assert!(loader.wait_idle(Duration::from_secs(5)).await);
		assert_eq!(seen.load(Ordering::SeqCst), 1);
		assert_eq!(errors.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn single_convertor_shared_across_batch() {
		let dir = TempDir::new().unwrap();
		let mut files = Vec::new();
		for i in 0..4 {
			let file = dir.path().join(format!("blob{i}.bin"));
			std::fs::write(&file, b"x").unwrap();
			files.push(file.display().to_string());
		}

		let (loader, _) = loader_with_errors();
		let seen = Arc::new(AtomicUsize::new(0));

		loader
			.add_task(files, vec![ok_convertor(seen.clone())])
			.unwrap();

		assert!(loader.wait_idle(Duration::from_secs(5)).await);
		assert_eq!(seen.load(Ordering::SeqCst), 4);
	}

	#[tokio::test]
	async fn arity_mismatch_is_rejected() {
		let (loader, _) = loader_with_errors();
		let seen = Arc::new(AtomicUsize::new(0));
		let result = loader.add_task(
			vec!["a".into(), "b".into()],
			vec![
				ok_convertor(seen.clone()),
				ok_convertor(seen.clone()),
				ok_convertor(seen),
			],
		);
		assert!(matches!(
			result,
			Err(BlobLoaderError::ArityMismatch { .. })
		));
		assert_eq!(loader.pending(), 0);
	}

	#[tokio::test]
	async fn save_writes_through() {
		let dir = TempDir::new().unwrap();
		let file = dir.path().join("nested/out.bin");

		let (loader, _) = loader_with_errors();
		let buffer = Buffer::from(&b"written back"[..]);
		loader.save(&buffer, &file.display().to_string()).unwrap();

		assert_eq!(std::fs::read(&file).unwrap(), b"written back");
	}
}
