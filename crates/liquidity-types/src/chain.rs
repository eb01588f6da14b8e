//! Execution environment types.
//!
//! On-chain, every call runs inside a transaction that either commits all of its
//! state changes or none, and no other transaction's writes interleave with it.
//! The ledger reproduces that boundary explicitly through
//! [`ExecutionEnvironment::transact`].

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors raised by an execution environment.
#[derive(Debug, Error)]
pub enum ChainError {
	/// The snapshot id is unknown or was already released.
	#[error("Unknown snapshot: {0}")]
	UnknownSnapshot(SnapshotId),
	/// A native value transfer could not be covered by the sender's balance.
	#[error("Insufficient native balance for {account}: have {available}, need {required}")]
	InsufficientValue {
		account: Address,
		available: U256,
		required: U256,
	},
	/// Backend-specific failure.
	#[error("Environment error: {0}")]
	Backend(String),
}

/// Identifier of a state snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotId(pub u64);

impl fmt::Display for SnapshotId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Work run inside [`ExecutionEnvironment::transact`]. Resolves to `true` to
/// keep its effects.
pub type Transaction<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

/// The transactional context a ledger call executes in.
#[async_trait]
pub trait ExecutionEnvironment: Send + Sync {
	/// Chain id used for EIP-712 domains.
	fn chain_id(&self) -> u64;

	/// Current block timestamp in seconds.
	async fn timestamp(&self) -> Result<u64, ChainError>;

	/// Runs `body` as one transaction and returns whether it was committed.
	///
	/// Effects of `body` are kept when it resolves to `true` and rolled back
	/// otherwise. Reads and writes from outside `body` wait until it is
	/// settled, so a rollback only ever undoes writes made by `body`. Calling
	/// `transact` from inside `body` nests.
	async fn transact<'a>(&'a self, body: Transaction<'a>) -> Result<bool, ChainError>;

	/// Native (ETH) balance of `account`.
	async fn native_balance(&self, account: Address) -> Result<U256, ChainError>;

	/// Moves native value between accounts, as `msg.value` does for payable calls.
	async fn transfer_value(
		&self,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<(), ChainError>;
}
