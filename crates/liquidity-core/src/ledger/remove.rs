//! Permit-authorized removal.
//!
//! The LP owner signs an ERC-2612 permit for the router off-chain; anyone can
//! then submit the removal. The ledger checks the authorization against the
//! pair's current nonce before forwarding, and the pair checks it again when
//! the router presents it.

use super::LiquidityLedger;
use crate::{LedgerError, RejectedOperation};
use liquidity_types::{
	verify_permit, Address, AssetAmount, LiquidityRemoved, PermitMessage, RemoveLiquidityParams,
};
use tracing::instrument;

pub(crate) fn validate_remove(
	owner: Address,
	params: &RemoveLiquidityParams,
	weth: Address,
) -> Result<(), LedgerError> {
	let invalid = |reason: &str| Err(LedgerError::InvalidParameters(reason.to_string()));

	if owner == Address::ZERO {
		return invalid("owner cannot be zero");
	}
	if params.token == Address::ZERO || params.token == weth {
		return invalid("token must be a non-zero, non-WETH address");
	}
	if params.liquidity.is_zero() {
		return invalid("liquidity must be positive");
	}
	// Removals always carry slippage bounds.
	if params.amount_token_min.is_zero() || params.amount_eth_min.is_zero() {
		return invalid("removal minimums must be non-zero");
	}
	if params.recipient == Address::ZERO {
		return invalid("recipient cannot be zero");
	}
	Ok(())
}

impl LiquidityLedger {
	/// Removes `owner`'s liquidity from the `token`/WETH pair using a permit.
	///
	/// `caller` is whoever submits the call and may differ from `owner`. The
	/// permit must name the router as spender and cover `liquidity` (or
	/// `U256::MAX` with `approve_max`). Removals do not change the operation
	/// count.
	#[instrument(skip_all, fields(caller = %caller, owner = %owner, token = %params.token))]
	pub async fn handle_remove_liquidity_with_permit(
		&self,
		caller: Address,
		owner: Address,
		params: RemoveLiquidityParams,
	) -> Result<LiquidityRemoved, RejectedOperation> {
		let _guard = self.state.lock().await;
		self.remove_locked(owner, &params).await.map_err(|error| {
			tracing::warn!(kind = %error.kind(), error = %error, "Remove liquidity rejected");
			RejectedOperation::new(
				error,
				vec![AssetAmount::liquidity(params.token, params.liquidity)],
			)
		})
	}

	async fn remove_locked(
		&self,
		owner: Address,
		params: &RemoveLiquidityParams,
	) -> Result<LiquidityRemoved, LedgerError> {
		validate_remove(owner, params, self.router.weth())?;

		let removed = self
			.atomically(self.execute_remove(owner, params))
			.await
			.into_result()?;

		tracing::info!(
			liquidity = %params.liquidity,
			amount_token = %removed.amount_token,
			amount_eth = %removed.amount_eth,
			"Liquidity removed"
		);
		Ok(removed)
	}

	async fn execute_remove(
		&self,
		owner: Address,
		params: &RemoveLiquidityParams,
	) -> Result<LiquidityRemoved, LedgerError> {
		let pair = self
			.router
			.pair_for(params.token, self.router.weth())
			.await?
			.ok_or_else(|| {
				LedgerError::InvalidParameters(format!("no {}/WETH pair exists", params.token))
			})?;

		let domain = self.tokens.permit_domain(pair).await?;
		let nonce = self.tokens.get_permit_nonce(pair, owner).await?;
		let message = PermitMessage {
			owner,
			spender: self.router.address(),
			value: params.permit_value(),
			nonce,
			deadline: params.deadline,
		};
		let now = self.environment.timestamp().await?;
		verify_permit(&domain, &message, &params.signature, now)?;
		tracing::debug!(pair = %pair, nonce = %nonce, "Permit verified");

		Ok(self
			.router
			.remove_liquidity_eth_with_permit(owner, params)
			.await?)
	}
}
