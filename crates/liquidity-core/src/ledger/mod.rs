//! The liquidity ledger.
//!
//! Holds the router binding, the operation counter and the operation log.
//! Entry points live in [`add`] and [`remove`]; this module owns construction,
//! queries and the transaction boundary they share.
//!
//! Queries take the same lock as the entry points, so a record written inside
//! a transaction is never visible before its operation is committed and
//! counted.

use crate::LedgerError;
use liquidity_router::RouterGateway;
use liquidity_storage::{StorageError, StorageService};
use liquidity_token::TokenGateway;
use liquidity_types::{Address, ChainError, ExecutionEnvironment, LiquidityOperation, StorageKey};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

pub mod add;
pub mod remove;

/// Deadline offset used when none is configured.
pub const DEFAULT_DEADLINE_SECONDS: u64 = 600;

/// Mutable ledger state. Only touched while the call lock is held.
#[derive(Debug, Default)]
struct LedgerState {
	liquidity_count: u64,
}

/// How a transactional call ended.
pub(crate) enum Settled<T> {
	Committed(T),
	/// The call failed and its effects were rolled back.
	Reverted(LedgerError),
	/// The call succeeded but the environment could not keep its effects.
	CommitFailed(LedgerError),
}

impl<T> Settled<T> {
	pub(crate) fn into_result(self) -> Result<T, LedgerError> {
		match self {
			Settled::Committed(value) => Ok(value),
			Settled::Reverted(err) | Settled::CommitFailed(err) => Err(err),
		}
	}
}

/// Forwards liquidity operations to the router and keeps the operation log.
pub struct LiquidityLedger {
	/// Account the ledger holds funds under during a call.
	address: Address,
	router: RouterGateway,
	/// Token gateway whose custodian is `address`.
	tokens: TokenGateway,
	environment: Arc<dyn ExecutionEnvironment>,
	storage: Arc<StorageService>,
	default_deadline_seconds: u64,
	/// Serializes calls, like transactions in a block.
	state: Mutex<LedgerState>,
}

impl LiquidityLedger {
	/// Creates a ledger with a zero operation count.
	pub fn new(
		address: Address,
		router: RouterGateway,
		tokens: TokenGateway,
		environment: Arc<dyn ExecutionEnvironment>,
		storage: Arc<StorageService>,
	) -> Result<Self, LedgerError> {
		if router.address() == Address::ZERO {
			return Err(LedgerError::InvalidParameters(
				"router address cannot be zero".into(),
			));
		}
		if address == Address::ZERO {
			return Err(LedgerError::InvalidParameters(
				"ledger address cannot be zero".into(),
			));
		}
		if tokens.custodian() != address {
			return Err(LedgerError::InvalidParameters(format!(
				"token gateway acts for {}, not the ledger {}",
				tokens.custodian(),
				address
			)));
		}

		Ok(Self {
			address,
			router,
			tokens,
			environment,
			storage,
			default_deadline_seconds: DEFAULT_DEADLINE_SECONDS,
			state: Mutex::new(LedgerState::default()),
		})
	}

	pub fn with_default_deadline(mut self, seconds: u64) -> Self {
		self.default_deadline_seconds = seconds;
		self
	}

	/// The ledger's own account.
	pub fn address(&self) -> Address {
		self.address
	}

	/// The router every call is forwarded to.
	pub fn uniswap_router(&self) -> Address {
		self.router.address()
	}

	/// Number of successful adds so far.
	pub async fn liquidity_count(&self) -> u64 {
		self.state.lock().await.liquidity_count
	}

	/// A deadline `default_deadline_seconds` from the environment's clock.
	pub async fn default_deadline(&self) -> Result<u64, LedgerError> {
		let now = self.environment.timestamp().await?;
		Ok(now.saturating_add(self.default_deadline_seconds))
	}

	/// Looks up a recorded operation by id.
	pub async fn operation(&self, operation_id: u64) -> Result<Option<LiquidityOperation>, LedgerError> {
		let state = self.state.lock().await;
		if operation_id == 0 || operation_id > state.liquidity_count {
			return Ok(None);
		}
		match self
			.storage
			.retrieve(StorageKey::Operations.as_str(), &operation_id.to_string())
			.await
		{
			Ok(operation) => Ok(Some(operation)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	/// All recorded operations in id order.
	pub async fn operations(&self) -> Result<Vec<LiquidityOperation>, LedgerError> {
		let state = self.state.lock().await;
		let count = state.liquidity_count;
		let mut operations = Vec::with_capacity(count as usize);
		for operation_id in 1..=count {
			let operation = self
				.storage
				.retrieve(StorageKey::Operations.as_str(), &operation_id.to_string())
				.await?;
			operations.push(operation);
		}
		Ok(operations)
	}

	/// Persists a new operation record. Records are never overwritten.
	async fn record(&self, operation: &LiquidityOperation) -> Result<(), LedgerError> {
		self.storage
			.insert(
				StorageKey::Operations.as_str(),
				&operation.operation_id.to_string(),
				operation,
			)
			.await?;
		Ok(())
	}

	/// Runs `call` as one transaction of the environment, keeping its effects
	/// only if it succeeds.
	async fn atomically<T, F>(&self, call: F) -> Settled<T>
	where
		T: Send,
		F: Future<Output = Result<T, LedgerError>> + Send,
	{
		let mut outcome = None;
		let committed = self
			.environment
			.transact(Box::pin(async {
				let result = call.await;
				let keep = result.is_ok();
				outcome = Some(result);
				keep
			}))
			.await;

		match (committed, outcome) {
			(Ok(true), Some(Ok(value))) => Settled::Committed(value),
			(Ok(_), Some(Err(err))) => Settled::Reverted(err),
			(Err(env_err), Some(Err(err))) => {
				tracing::error!(error = %env_err, "Failed to roll back transaction");
				Settled::Reverted(err)
			},
			(Err(env_err), Some(Ok(_))) => Settled::CommitFailed(env_err.into()),
			(Err(env_err), None) => Settled::Reverted(env_err.into()),
			(Ok(_), _) => Settled::Reverted(
				ChainError::Backend("transaction settled without running".into()).into(),
			),
		}
	}
}
