//! Completion counting for in-flight requests
//!
//! [`PendingCounter`] is the mechanism callers use to detect "all N
//! requested tags have completed": it is incremented by the request count
//! up front and decremented exactly once per item, on every success and
//! failure path. Waiters park on a watch channel instead of poll-sleeping.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Counter of outstanding work items with awaitable drain.
#[derive(Debug)]
pub struct PendingCounter {
	tx: watch::Sender<usize>,
}

impl Default for PendingCounter {
	fn default() -> Self {
		Self {
			tx: watch::channel(0).0,
		}
	}
}

impl PendingCounter {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Add `n` outstanding items before dispatching them.
	pub fn add(&self, n: usize) {
		if n > 0 {
			self.tx.send_modify(|count| *count += n);
		}
	}

	/// Complete one item. Must be balanced against a prior [`add`].
	///
	/// [`add`]: PendingCounter::add
	pub fn decrement(&self) {
		self.tx.send_modify(|count| {
			debug_assert!(*count > 0, "pending counter decremented below zero");
			*count = count.saturating_sub(1);
		});
	}

	pub fn count(&self) -> usize {
		*self.tx.borrow()
	}

	/// Wait until every outstanding item has completed.
	pub async fn wait_zero(&self) {
		let mut rx = self.tx.subscribe();
		// Sender lives in self, so wait_for cannot fail.
		let _ = rx.wait_for(|count| *count == 0).await;
	}

	/// Bounded drain. Returns false if the counter did not reach zero
	/// within `timeout`.
	pub async fn wait_zero_timeout(&self, timeout: Duration) -> bool {
		tokio::time::timeout(timeout, self.wait_zero()).await.is_ok()
	}
}

/// Drop guard that decrements a counter exactly once, on any exit path
/// of the task holding it, including panics unwinding through a task
/// boundary.
#[derive(Debug)]
pub struct PendingGuard {
	counter: Option<Arc<PendingCounter>>,
}

impl PendingGuard {
	pub fn new(counter: Option<Arc<PendingCounter>>) -> Self {
		Self { counter }
	}
}

impl Drop for PendingGuard {
	fn drop(&mut self) {
		if let Some(counter) = self.counter.take() {
			counter.decrement();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn drains_to_zero() {
		let counter = PendingCounter::new();
		counter.add(3);
		assert_eq!(counter.count(), 3);

		for _ in 0..3 {
			let counter = counter.clone();
			tokio::spawn(async move {
				let _guard = PendingGuard::new(Some(counter));
			});
		}

		assert!(counter.wait_zero_timeout(Duration::from_secs(1)).await);
		assert_eq!(counter.count(), 0);
	}

	#[tokio::test]
	async fn timeout_reports_stuck_counter() {
		let counter = PendingCounter::new();
		counter.add(1);
		assert!(!counter.wait_zero_timeout(Duration::from_millis(50)).await);
	}

	#[tokio::test]
	async fn guard_decrements_on_panic() {
		let counter = PendingCounter::new();
		counter.add(1);

		let inner = counter.clone();
		let handle = tokio::spawn(async move {
			let _guard = PendingGuard::new(Some(inner));
			panic!("converter blew up");
		});
		assert!(handle.await.is_err());

		assert!(counter.wait_zero_timeout(Duration::from_secs(1)).await);
	}

	#[tokio::test]
	async fn wait_zero_on_idle_counter_returns_immediately() {
		let counter = PendingCounter::new();
		counter.wait_zero().await;
	}
}
