//! Core of the liquidity ledger.
//!
//! [`LiquidityLedger`] forwards add-liquidity calls to an AMM router on behalf
//! of callers, counts and records every successful add, and relays
//! permit-authorized removals. Each call is all-or-nothing: it runs inside a
//! transaction of the execution environment that is rolled back on any failure.

use liquidity_router::RouterError;
use liquidity_storage::StorageError;
use liquidity_token::TokenError;
use liquidity_types::{AssetAmount, ChainError, PermitError};
use std::fmt;
use thiserror::Error;

pub mod builder;
pub mod ledger;
pub mod state;

pub use builder::{BuilderError, LedgerBuilder, LedgerComponents, LedgerFactories};
pub use ledger::LiquidityLedger;
pub use state::{AddStage, AddStageTracker, StageError};

/// Coarse classification of a rejected operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
	InvalidParameters,
	TransferFailed,
	ApprovalFailed,
	SlippageExceeded,
	DeadlineExpired,
	InvalidSignature,
	ExpiredAuthorization,
	InsufficientLiquidity,
	/// Environment, storage or unclassified router failures.
	Internal,
}

impl fmt::Display for FailureKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
	/// Input rejected before any external call was made.
	#[error("Invalid parameters: {0}")]
	InvalidParameters(String),
	#[error("Token error: {0}")]
	Token(#[from] TokenError),
	#[error("Router error: {0}")]
	Router(#[from] RouterError),
	#[error("Permit error: {0}")]
	Permit(#[from] PermitError),
	#[error("Environment error: {0}")]
	Environment(#[from] ChainError),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Stage error: {0}")]
	Stage(#[from] StageError),
}

impl LedgerError {
	/// Maps the error onto the failure taxonomy callers act on.
	pub fn kind(&self) -> FailureKind {
		match self {
			LedgerError::InvalidParameters(_) => FailureKind::InvalidParameters,
			LedgerError::Token(err) => token_kind(err),
			LedgerError::Router(err) => match err {
				RouterError::DeadlineExpired(_) => FailureKind::DeadlineExpired,
				RouterError::ExpiredAuthorization(_) => FailureKind::ExpiredAuthorization,
				RouterError::SlippageExceeded(_) => FailureKind::SlippageExceeded,
				RouterError::InvalidSignature(_) => FailureKind::InvalidSignature,
				RouterError::InsufficientLiquidity(_) => FailureKind::InsufficientLiquidity,
				RouterError::TransferFailed(_) => FailureKind::TransferFailed,
				RouterError::Token(err) => token_kind(err),
				RouterError::Environment(err) => chain_kind(err),
				RouterError::Reverted(_) => FailureKind::Internal,
			},
			LedgerError::Permit(PermitError::Expired { .. }) => FailureKind::ExpiredAuthorization,
			LedgerError::Permit(PermitError::InvalidSignature(_)) => FailureKind::InvalidSignature,
			LedgerError::Environment(err) => chain_kind(err),
			LedgerError::Storage(_) | LedgerError::Stage(_) => FailureKind::Internal,
		}
	}
}

fn token_kind(err: &TokenError) -> FailureKind {
	match err {
		TokenError::InsufficientAllowance { .. }
		| TokenError::InsufficientBalance { .. }
		| TokenError::TransferRejected { .. } => FailureKind::TransferFailed,
		TokenError::ApprovalFailed { .. } => FailureKind::ApprovalFailed,
		TokenError::ExpiredAuthorization { .. } => FailureKind::ExpiredAuthorization,
		TokenError::InvalidSignature(_) => FailureKind::InvalidSignature,
		TokenError::UnknownToken(_) | TokenError::PermitUnsupported(_) => {
			FailureKind::InvalidParameters
		},
		TokenError::Environment(err) => chain_kind(err),
		TokenError::AlreadyDeployed(_) => FailureKind::Internal,
	}
}

/// Missing native value is a failed transfer; anything else is internal.
fn chain_kind(err: &ChainError) -> FailureKind {
	match err {
		ChainError::InsufficientValue { .. } => FailureKind::TransferFailed,
		ChainError::UnknownSnapshot(_) | ChainError::Backend(_) => FailureKind::Internal,
	}
}

/// A failed ledger call.
///
/// Nothing the call did persists. `unconsumed` lists the inputs the caller
/// still holds, which is all of them.
#[derive(Debug, Error)]
#[error("{kind} failure: {error}", kind = .error.kind())]
pub struct RejectedOperation {
	#[source]
	pub error: LedgerError,
	pub unconsumed: Vec<AssetAmount>,
}

impl RejectedOperation {
	pub fn new(error: LedgerError, unconsumed: Vec<AssetAmount>) -> Self {
		Self { error, unconsumed }
	}

	pub fn kind(&self) -> FailureKind {
		self.error.kind()
	}
}
