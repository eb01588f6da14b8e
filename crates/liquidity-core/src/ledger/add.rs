//! Add-liquidity entry points.

use super::{LedgerState, LiquidityLedger, Settled};
use crate::state::{AddStage, AddStageTracker};
use crate::{LedgerError, RejectedOperation};
use liquidity_types::{
	AddLiquidityEthParams, AddLiquidityParams, Address, AssetAmount, LiquidityMinted,
	LiquidityOperation, OperationOutcome, StorageKey, U256,
};
use tracing::instrument;

fn invalid(reason: impl Into<String>) -> LedgerError {
	LedgerError::InvalidParameters(reason.into())
}

/// The deadline must lie strictly after `now`.
fn check_deadline(deadline: u64, now: u64) -> Result<(), LedgerError> {
	if deadline <= now {
		return Err(invalid(format!(
			"deadline {} is not in the future (now {})",
			deadline, now
		)));
	}
	Ok(())
}

fn check_amounts(label: &str, desired: U256, min: U256) -> Result<(), LedgerError> {
	if desired.is_zero() {
		return Err(invalid(format!("{}_desired must be positive", label)));
	}
	if min > desired {
		return Err(invalid(format!(
			"{}_min {} exceeds {}_desired {}",
			label, min, label, desired
		)));
	}
	Ok(())
}

pub(crate) fn validate_add(params: &AddLiquidityParams, now: u64) -> Result<(), LedgerError> {
	if params.token_a == Address::ZERO || params.token_b == Address::ZERO {
		return Err(invalid("token addresses cannot be zero"));
	}
	if params.token_a == params.token_b {
		return Err(invalid("token_a and token_b must differ"));
	}
	check_amounts("amount_a", params.amount_a_desired, params.amount_a_min)?;
	check_amounts("amount_b", params.amount_b_desired, params.amount_b_min)?;
	if params.recipient == Address::ZERO {
		return Err(invalid("recipient cannot be zero"));
	}
	check_deadline(params.deadline, now)
}

pub(crate) fn validate_add_eth(
	params: &AddLiquidityEthParams,
	value: U256,
	weth: Address,
	now: u64,
) -> Result<(), LedgerError> {
	if params.token == Address::ZERO {
		return Err(invalid("token address cannot be zero"));
	}
	if params.token == weth {
		return Err(invalid("token cannot be WETH itself"));
	}
	check_amounts("amount_token", params.amount_token_desired, params.amount_token_min)?;
	check_amounts("amount_eth", value, params.amount_eth_min)?;
	if params.recipient == Address::ZERO {
		return Err(invalid("recipient cannot be zero"));
	}
	check_deadline(params.deadline, now)
}

impl LiquidityLedger {
	/// Adds liquidity for a token pair on behalf of `caller`.
	///
	/// Pulls both desired amounts from the caller, approves them to the router
	/// and forwards the call. Whatever the router leaves unused goes back to
	/// the caller, the router allowance is cleared, and the operation is
	/// recorded under the next operation id. On failure nothing persists.
	#[instrument(skip_all, fields(caller = %caller, token_a = %params.token_a, token_b = %params.token_b))]
	pub async fn handle_add_liquidity(
		&self,
		caller: Address,
		params: AddLiquidityParams,
	) -> Result<LiquidityMinted, RejectedOperation> {
		let mut state = self.state.lock().await;
		self.add_locked(&mut state, caller, &params)
			.await
			.map_err(|error| {
				tracing::warn!(kind = %error.kind(), error = %error, "Add liquidity rejected");
				RejectedOperation::new(
					error,
					vec![
						AssetAmount::token(params.token_a, params.amount_a_desired),
						AssetAmount::token(params.token_b, params.amount_b_desired),
					],
				)
			})
	}

	/// Adds liquidity for a token/ETH pair; `value` is the ETH attached.
	#[instrument(skip_all, fields(caller = %caller, token = %params.token, value = %value))]
	pub async fn handle_add_liquidity_eth(
		&self,
		caller: Address,
		params: AddLiquidityEthParams,
		value: U256,
	) -> Result<LiquidityMinted, RejectedOperation> {
		let mut state = self.state.lock().await;
		self.add_eth_locked(&mut state, caller, &params, value)
			.await
			.map_err(|error| {
				tracing::warn!(kind = %error.kind(), error = %error, "Add ETH liquidity rejected");
				RejectedOperation::new(
					error,
					vec![
						AssetAmount::token(params.token, params.amount_token_desired),
						AssetAmount::native(value),
					],
				)
			})
	}

	async fn add_locked(
		&self,
		state: &mut LedgerState,
		caller: Address,
		params: &AddLiquidityParams,
	) -> Result<LiquidityMinted, LedgerError> {
		let now = self.environment.timestamp().await?;
		validate_add(params, now)?;

		let operation_id = state.liquidity_count + 1;
		let mut tracker = AddStageTracker::new();
		let settled = self
			.atomically(self.execute_add(&mut tracker, operation_id, caller, params, now))
			.await;
		let minted = self
			.finish_add(state, &mut tracker, operation_id, settled)
			.await?;

		tracing::info!(
			operation_id,
			amount_a = %minted.amount_a,
			amount_b = %minted.amount_b,
			liquidity = %minted.liquidity,
			"Liquidity added"
		);
		Ok(minted)
	}

	async fn add_eth_locked(
		&self,
		state: &mut LedgerState,
		caller: Address,
		params: &AddLiquidityEthParams,
		value: U256,
	) -> Result<LiquidityMinted, LedgerError> {
		let now = self.environment.timestamp().await?;
		validate_add_eth(params, value, self.router.weth(), now)?;

		let operation_id = state.liquidity_count + 1;
		let mut tracker = AddStageTracker::new();
		let settled = self
			.atomically(self.execute_add_eth(&mut tracker, operation_id, caller, params, value, now))
			.await;
		let minted = self
			.finish_add(state, &mut tracker, operation_id, settled)
			.await?;

		tracing::info!(
			operation_id,
			amount_token = %minted.amount_a,
			amount_eth = %minted.amount_b,
			liquidity = %minted.liquidity,
			"ETH liquidity added"
		);
		Ok(minted)
	}

	async fn execute_add(
		&self,
		tracker: &mut AddStageTracker,
		operation_id: u64,
		caller: Address,
		params: &AddLiquidityParams,
		now: u64,
	) -> Result<LiquidityMinted, LedgerError> {
		let router = self.router.address();
		self.tokens
			.pull_and_approve(params.token_a, caller, params.amount_a_desired, router)
			.await?;
		self.tokens
			.pull_and_approve(params.token_b, caller, params.amount_b_desired, router)
			.await?;
		tracker.advance(AddStage::TokensPulled)?;

		let minted = self.router.add_liquidity(self.address, params).await?;
		tracker.advance(AddStage::RouterInvoked)?;

		self.return_unused(params.token_a, caller, params.amount_a_desired, minted.amount_a)
			.await?;
		self.return_unused(params.token_b, caller, params.amount_b_desired, minted.amount_b)
			.await?;

		self.record(&LiquidityOperation {
			operation_id,
			token_a: params.token_a,
			token_b: params.token_b,
			amount_a: minted.amount_a,
			amount_b: minted.amount_b,
			liquidity: minted.liquidity,
			recipient: params.recipient,
			caller,
			timestamp: now,
			outcome: OperationOutcome::Success,
		})
		.await?;

		Ok(minted)
	}

	async fn execute_add_eth(
		&self,
		tracker: &mut AddStageTracker,
		operation_id: u64,
		caller: Address,
		params: &AddLiquidityEthParams,
		value: U256,
		now: u64,
	) -> Result<LiquidityMinted, LedgerError> {
		let router = self.router.address();
		self.environment
			.transfer_value(caller, self.address, value)
			.await?;
		self.tokens
			.pull_and_approve(params.token, caller, params.amount_token_desired, router)
			.await?;
		tracker.advance(AddStage::TokensPulled)?;

		let minted = self
			.router
			.add_liquidity_eth(self.address, params, value)
			.await?;
		tracker.advance(AddStage::RouterInvoked)?;

		self.return_unused(params.token, caller, params.amount_token_desired, minted.amount_a)
			.await?;
		let unused_eth = value.saturating_sub(minted.amount_b);
		if !unused_eth.is_zero() {
			self.environment
				.transfer_value(self.address, caller, unused_eth)
				.await?;
		}

		self.record(&LiquidityOperation {
			operation_id,
			token_a: params.token,
			token_b: self.router.weth(),
			amount_a: minted.amount_a,
			amount_b: minted.amount_b,
			liquidity: minted.liquidity,
			recipient: params.recipient,
			caller,
			timestamp: now,
			outcome: OperationOutcome::Success,
		})
		.await?;

		Ok(minted)
	}

	/// Refunds what the router did not take and clears its allowance.
	async fn return_unused(
		&self,
		token: Address,
		caller: Address,
		desired: U256,
		used: U256,
	) -> Result<(), LedgerError> {
		self.tokens
			.refund(token, caller, desired.saturating_sub(used))
			.await?;
		self.tokens.revoke(token, self.router.address()).await?;
		Ok(())
	}

	/// Counts a committed add. A failed one is marked failed, and its record
	/// is dropped if the environment could not commit it.
	async fn finish_add(
		&self,
		state: &mut LedgerState,
		tracker: &mut AddStageTracker,
		operation_id: u64,
		settled: Settled<LiquidityMinted>,
	) -> Result<LiquidityMinted, LedgerError> {
		let err = match settled {
			Settled::Committed(minted) => {
				tracker.advance(AddStage::Recorded)?;
				state.liquidity_count = operation_id;
				return Ok(minted);
			},
			Settled::Reverted(err) => err,
			Settled::CommitFailed(err) => {
				if let Err(remove_err) = self
					.storage
					.remove(StorageKey::Operations.as_str(), &operation_id.to_string())
					.await
				{
					tracing::error!(
						operation_id,
						error = %remove_err,
						"Failed to drop record of uncommitted operation"
					);
				}
				err
			},
		};

		let stage = tracker.fail();
		tracing::debug!(stage = ?stage, error = %err, "Add failed, rolled back");
		Err(err)
	}
}
