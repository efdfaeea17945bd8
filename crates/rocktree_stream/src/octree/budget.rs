//! Per-sync request limits.
//!
//! Keeps a single camera jump from flooding the fetch queue: the coordinator
//! issues at most this many new requests per `sync`, most urgent first.

use serde::Deserialize;

/// Rate limits for new fetch requests per `sync`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RequestBudget {
	/// Maximum new bulk/planetoid requests per sync (0 = unlimited).
	pub max_metadata_requests: usize,
	/// Maximum new node-data requests per sync (0 = unlimited).
	pub max_data_requests: usize,
}

impl RequestBudget {
	pub const DEFAULT: Self = Self {
		max_metadata_requests: 16,
		max_data_requests: 32,
	};

	/// Unlimited budget for testing or bulk prefetch.
	pub const UNLIMITED: Self = Self {
		max_metadata_requests: 0,
		max_data_requests: 0,
	};

	#[inline]
	pub fn can_request_metadata(&self, issued: usize) -> bool {
		self.max_metadata_requests == 0 || issued < self.max_metadata_requests
	}

	#[inline]
	pub fn can_request_data(&self, issued: usize) -> bool {
		self.max_data_requests == 0 || issued < self.max_data_requests
	}
}

impl Default for RequestBudget {
	fn default() -> Self {
		Self::DEFAULT
	}
}

/// Requests issued during one sync.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestStats {
	pub metadata_issued: usize,
	pub data_issued: usize,
	/// Candidates left for a later sync because the budget ran out.
	pub deferred: usize,
}

impl RequestStats {
	#[inline]
	pub fn total_issued(&self) -> usize {
		self.metadata_issued + self.data_issued
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_budget() {
		let budget = RequestBudget::default();
		assert_eq!(budget.max_metadata_requests, 16);
		assert_eq!(budget.max_data_requests, 32);
	}

	#[test]
	fn test_can_request_data() {
		let budget = RequestBudget {
			max_data_requests: 3,
			..Default::default()
		};
		assert!(budget.can_request_data(0));
		assert!(budget.can_request_data(2));
		assert!(!budget.can_request_data(3));
	}

	#[test]
	fn test_unlimited_budget_always_allows() {
		let budget = RequestBudget::UNLIMITED;
		assert!(budget.can_request_metadata(10_000));
		assert!(budget.can_request_data(10_000));
	}

	#[test]
	fn test_budget_from_toml() {
		let budget: RequestBudget = toml::from_str("max_data_requests = 4").unwrap();
		assert_eq!(budget.max_data_requests, 4);
		assert_eq!(budget.max_metadata_requests, 16);
	}

	#[test]
	fn test_stats_total() {
		let stats = RequestStats {
			metadata_issued: 2,
			data_issued: 5,
			deferred: 1,
		};
		assert_eq!(stats.total_issued(), 7);
	}
}
