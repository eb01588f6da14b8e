//! AMM router access for the liquidity ledger.
//!
//! The router is an external contract; this crate only describes the calls the
//! ledger makes and turns raw revert data into typed errors. Backends implement
//! [`RouterInterface`], and [`RouterGateway`] is the boundary the ledger talks to.

use async_trait::async_trait;
use liquidity_token::TokenError;
use liquidity_types::{
	Address, AddLiquidityEthParams, AddLiquidityParams, ChainError, LiquidityMinted,
	LiquidityRemoved, RemoveLiquidityParams, U256,
};
use std::sync::Arc;
use thiserror::Error;

/// Revert data encoding and classification.
pub mod abi;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
}

/// Errors that can occur during router calls.
#[derive(Debug, Error)]
pub enum RouterError {
	/// The router's own deadline check failed.
	#[error("Router deadline expired: {0}")]
	DeadlineExpired(String),
	/// The pair rejected an expired permit.
	#[error("Authorization expired: {0}")]
	ExpiredAuthorization(String),
	/// Executed amounts fell below the caller's minimums.
	#[error("Slippage exceeded: {0}")]
	SlippageExceeded(String),
	/// The pair rejected the permit signature.
	#[error("Invalid signature: {0}")]
	InvalidSignature(String),
	/// The pool cannot mint or burn the requested liquidity.
	#[error("Insufficient liquidity: {0}")]
	InsufficientLiquidity(String),
	/// A token transfer inside the router failed.
	#[error("Transfer failed: {0}")]
	TransferFailed(String),
	/// Token failure that did not surface as revert data.
	#[error("Token error: {0}")]
	Token(#[from] TokenError),
	/// Failure in the underlying execution environment.
	#[error("Environment error: {0}")]
	Environment(#[from] ChainError),
	/// Revert data that could not be classified.
	#[error("Reverted: 0x{}", hex::encode(.0))]
	Reverted(Vec<u8>),
}

/// The Uniswap V2 router surface consumed by the ledger.
///
/// `caller` plays the role of `msg.sender`. Failures raised by the contract
/// itself are reported as [`RouterError::Reverted`] with the raw revert data.
#[async_trait]
pub trait RouterInterface: Send + Sync {
	/// Address of the router contract.
	fn address(&self) -> Address;

	/// Address of the wrapped native token used for ETH pairs.
	fn weth(&self) -> Address;

	/// Pair contract of `token_a`/`token_b`, if one has been created.
	async fn pair_for(
		&self,
		token_a: Address,
		token_b: Address,
	) -> Result<Option<Address>, RouterError>;

	/// `addLiquidity`. The router pulls both tokens from `caller`.
	async fn add_liquidity(
		&self,
		caller: Address,
		params: &AddLiquidityParams,
	) -> Result<LiquidityMinted, RouterError>;

	/// `addLiquidityETH` with `value` attached. The returned `amount_b` is the
	/// ETH used; the rest of `value` is sent back to `caller`.
	async fn add_liquidity_eth(
		&self,
		caller: Address,
		params: &AddLiquidityEthParams,
		value: U256,
	) -> Result<LiquidityMinted, RouterError>;

	/// `removeLiquidityETHWithPermit`. `caller` must be the LP owner who signed
	/// the permit.
	async fn remove_liquidity_eth_with_permit(
		&self,
		caller: Address,
		params: &RemoveLiquidityParams,
	) -> Result<LiquidityRemoved, RouterError>;
}

/// Typed boundary around a router backend.
///
/// Performs no checks of its own. Every failure coming out of the backend is
/// passed through [`abi::decode_revert`] so the ledger only sees classified
/// errors or genuinely unknown revert data.
#[derive(Clone)]
pub struct RouterGateway {
	backend: Arc<dyn RouterInterface>,
}

impl RouterGateway {
	pub fn new(backend: Arc<dyn RouterInterface>) -> Self {
		Self { backend }
	}

	pub fn address(&self) -> Address {
		self.backend.address()
	}

	pub fn weth(&self) -> Address {
		self.backend.weth()
	}

	pub async fn pair_for(
		&self,
		token_a: Address,
		token_b: Address,
	) -> Result<Option<Address>, RouterError> {
		self.backend
			.pair_for(token_a, token_b)
			.await
			.map_err(classify)
	}

	pub async fn add_liquidity(
		&self,
		caller: Address,
		params: &AddLiquidityParams,
	) -> Result<LiquidityMinted, RouterError> {
		let minted = self
			.backend
			.add_liquidity(caller, params)
			.await
			.map_err(classify)?;

		tracing::debug!(
			token_a = %params.token_a,
			token_b = %params.token_b,
			amount_a = %minted.amount_a,
			amount_b = %minted.amount_b,
			liquidity = %minted.liquidity,
			"Router added liquidity"
		);
		Ok(minted)
	}

	pub async fn add_liquidity_eth(
		&self,
		caller: Address,
		params: &AddLiquidityEthParams,
		value: U256,
	) -> Result<LiquidityMinted, RouterError> {
		let minted = self
			.backend
			.add_liquidity_eth(caller, params, value)
			.await
			.map_err(classify)?;

		tracing::debug!(
			token = %params.token,
			amount_token = %minted.amount_a,
			amount_eth = %minted.amount_b,
			liquidity = %minted.liquidity,
			"Router added ETH liquidity"
		);
		Ok(minted)
	}

	pub async fn remove_liquidity_eth_with_permit(
		&self,
		caller: Address,
		params: &RemoveLiquidityParams,
	) -> Result<LiquidityRemoved, RouterError> {
		let removed = self
			.backend
			.remove_liquidity_eth_with_permit(caller, params)
			.await
			.map_err(classify)?;

		tracing::debug!(
			token = %params.token,
			liquidity = %params.liquidity,
			amount_token = %removed.amount_token,
			amount_eth = %removed.amount_eth,
			"Router removed liquidity"
		);
		Ok(removed)
	}
}

fn classify(err: RouterError) -> RouterError {
	match err {
		RouterError::Reverted(data) => abi::decode_revert(&data),
		other => other,
	}
}
