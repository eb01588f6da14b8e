//! Common types for the liquidity ledger.
//!
//! This crate holds the data model shared by every component: liquidity
//! operations, permit authorizations and their verifier, the execution
//! environment abstraction, and EIP-712 helpers.

/// Execution environment abstraction (timestamps, transactions, native value).
pub mod chain;
/// Liquidity operation parameters, results and records.
pub mod operation;
/// ERC-2612 permit types and verification.
pub mod permit;
/// Registry trait for pluggable implementations.
pub mod registry;
/// Redacting string wrapper for secrets.
pub mod secret_string;
/// Storage namespaces.
pub mod storage;
/// EIP-712 hashing helpers.
pub mod utils;

pub use alloy_primitives::{Address, B256, U256};
pub use chain::{ChainError, ExecutionEnvironment, SnapshotId, Transaction};
pub use operation::*;
pub use permit::{
	permit_digest, verify_permit, PermitAuthorization, PermitDomain, PermitError, PermitMessage,
	PermitSignature,
};
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use storage::StorageKey;
