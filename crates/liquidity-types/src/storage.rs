//! Storage-related types for the ledger.

use std::str::FromStr;

/// Storage namespaces used by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Recorded liquidity operations, keyed by operation id.
	Operations,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Operations => "operations",
		}
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"operations" => Ok(Self::Operations),
			_ => Err(()),
		}
	}
}
