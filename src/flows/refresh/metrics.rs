// std
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

/// Lock-free refresh counters kept per [`crate::flows::TokenManager`].
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	successes: AtomicU64,
	failures: AtomicU64,
	retained: AtomicU64,
}
impl RefreshMetrics {
	/// Copies the current counter values.
	pub fn snapshot(&self) -> RefreshSnapshot {
		RefreshSnapshot {
			attempts: self.attempts.load(Relaxed),
			successes: self.successes.load(Relaxed),
			failures: self.failures.load(Relaxed),
			retained_refresh_tokens: self.retained.load(Relaxed),
		}
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Relaxed);
	}

	pub(crate) fn record_success(&self, rotated: bool) {
		self.successes.fetch_add(1, Relaxed);

		if !rotated {
			self.retained.fetch_add(1, Relaxed);
		}
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Relaxed);
	}
}

/// Point-in-time view of [`RefreshMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefreshSnapshot {
	/// Refresh grants sent to the provider.
	pub attempts: u64,
	/// Refreshes whose new access token was persisted.
	pub successes: u64,
	/// Refreshes that failed at the provider, transport, or store.
	pub failures: u64,
	/// Successful refreshes where the provider did not rotate the refresh token.
	pub retained_refresh_tokens: u64,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn retention_is_counted_only_for_successes_without_rotation() {
		let metrics = RefreshMetrics::default();

		metrics.record_attempt();
		metrics.record_success(false);
		metrics.record_attempt();
		metrics.record_success(true);
		metrics.record_attempt();
		metrics.record_failure();

		assert_eq!(
			metrics.snapshot(),
			RefreshSnapshot { attempts: 3, successes: 2, failures: 1, retained_refresh_tokens: 1 }
		);
	}
}
