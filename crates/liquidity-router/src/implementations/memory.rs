//! Uniswap V2 shaped router over [`MemoryChain`].
//!
//! Pairs are ordinary permit-capable tokens on the chain (their LP token) whose
//! own balances of the two pooled tokens are the reserves. Pair addresses are
//! derived with CREATE2 from the router address, so whether a pair exists is
//! part of chain state and rolls back with it.
//!
//! Contract failures are raised as ABI-encoded revert data, the same reasons
//! and custom errors a deployed router and OpenZeppelin tokens would produce.

use crate::abi::{
	self, ERC20InsufficientAllowance, ERC20InsufficientBalance, INSUFFICIENT_A_AMOUNT,
	INSUFFICIENT_B_AMOUNT, INSUFFICIENT_LIQUIDITY_BURNED, INSUFFICIENT_LIQUIDITY_MINTED,
	INVALID_SIGNATURE, PAIR_EXPIRED, ROUTER_EXPIRED, TRANSFER_FROM_FAILED,
};
use crate::{RouterError, RouterInterface};
use alloy_primitives::{b256, keccak256, B256};
use alloy_sol_types::SolError;
use async_trait::async_trait;
use liquidity_token::implementations::memory::{MemoryChain, TokenMetadata};
use liquidity_token::{TokenError, TokenGateway, TokenInterface};
use liquidity_types::{
	AddLiquidityEthParams, AddLiquidityParams, Address, ExecutionEnvironment, LiquidityMinted,
	LiquidityRemoved, PermitAuthorization, PermitMessage, RemoveLiquidityParams, U256,
};
use std::sync::Arc;

/// LP tokens locked forever on the first mint of every pair.
pub const MINIMUM_LIQUIDITY: u64 = 1_000;

/// Uniswap V2 pair init code hash.
const PAIR_INIT_CODE_HASH: B256 =
	b256!("96e8ac4277198ff8b6f785478aa9a39f403cb768dd02cbee326c3e7da348845f");

/// Name every pair token reports, and therefore its permit domain name.
pub const PAIR_TOKEN_NAME: &str = "Uniswap V2";

fn revert(reason: &str) -> RouterError {
	RouterError::Reverted(abi::revert_reason(reason))
}

/// Re-raises a token failure the way the token contract would revert.
fn token_revert(err: TokenError) -> RouterError {
	match err {
		TokenError::InsufficientAllowance {
			spender,
			allowance,
			needed,
			..
		} => RouterError::Reverted(
			ERC20InsufficientAllowance {
				spender,
				allowance,
				needed,
			}
			.abi_encode(),
		),
		TokenError::InsufficientBalance {
			account,
			balance,
			needed,
			..
		} => RouterError::Reverted(
			ERC20InsufficientBalance {
				sender: account,
				balance,
				needed,
			}
			.abi_encode(),
		),
		TokenError::TransferRejected { .. } => revert(TRANSFER_FROM_FAILED),
		other => RouterError::Token(other),
	}
}

/// Re-raises a pair permit failure with the pair's revert reasons.
fn permit_revert(err: TokenError) -> RouterError {
	match err {
		TokenError::ExpiredAuthorization { .. } => revert(PAIR_EXPIRED),
		TokenError::InvalidSignature(_) => revert(INVALID_SIGNATURE),
		other => token_revert(other),
	}
}

/// Babylonian square root, rounding down.
fn sqrt(y: U256) -> U256 {
	if y > U256::from(3u8) {
		let mut z = y;
		let mut x = y / U256::from(2u8) + U256::from(1u8);
		while x < z {
			z = x;
			x = (y / x + x) / U256::from(2u8);
		}
		z
	} else if !y.is_zero() {
		U256::from(1u8)
	} else {
		U256::ZERO
	}
}

fn mul(a: U256, b: U256) -> Result<U256, RouterError> {
	a.checked_mul(b).ok_or_else(|| revert("ds-math-mul-overflow"))
}

/// `amount_a * reserve_b / reserve_a`
fn quote(amount_a: U256, reserve_a: U256, reserve_b: U256) -> Result<U256, RouterError> {
	if amount_a.is_zero() {
		return Err(revert("UniswapV2Library: INSUFFICIENT_AMOUNT"));
	}
	if reserve_a.is_zero() || reserve_b.is_zero() {
		return Err(revert("UniswapV2Library: INSUFFICIENT_LIQUIDITY"));
	}
	Ok(mul(amount_a, reserve_b)? / reserve_a)
}

struct Deposit {
	pair: Address,
	amount_a: U256,
	amount_b: U256,
	reserve_a: U256,
	reserve_b: U256,
}

/// In-memory Uniswap V2 router.
pub struct MemoryRouter {
	address: Address,
	weth: Address,
	chain: Arc<MemoryChain>,
	/// Token calls made with the router as `msg.sender`.
	tokens: TokenGateway,
}

impl MemoryRouter {
	/// Creates a router at `address`, deploying WETH at `weth` if needed.
	pub async fn deploy(
		chain: Arc<MemoryChain>,
		address: Address,
		weth: Address,
	) -> Result<Self, RouterError> {
		if !chain.is_deployed(weth).await {
			chain
				.deploy_token(weth, TokenMetadata::new("Wrapped Ether", "WETH", 18))
				.await?;
		}

		Ok(Self {
			address,
			weth,
			tokens: TokenGateway::new(chain.clone(), address),
			chain,
		})
	}

	/// CREATE2 address of the pair for two tokens, regardless of whether it
	/// has been created.
	pub fn pair_address(&self, token_a: Address, token_b: Address) -> Result<Address, RouterError> {
		if token_a == token_b {
			return Err(revert("UniswapV2Library: IDENTICAL_ADDRESSES"));
		}
		let (token0, token1) = if token_a < token_b {
			(token_a, token_b)
		} else {
			(token_b, token_a)
		};
		if token0 == Address::ZERO {
			return Err(revert("UniswapV2Library: ZERO_ADDRESS"));
		}

		let mut packed = [0u8; 40];
		packed[..20].copy_from_slice(token0.as_slice());
		packed[20..].copy_from_slice(token1.as_slice());
		Ok(self.address.create2(keccak256(packed), PAIR_INIT_CODE_HASH))
	}

	/// Pooled balances of `token_a` and `token_b` held by `pair`.
	pub async fn reserves(
		&self,
		pair: Address,
		token_a: Address,
		token_b: Address,
	) -> Result<(U256, U256), RouterError> {
		let reserve_a = self.chain.balance_of(token_a, pair).await?;
		let reserve_b = self.chain.balance_of(token_b, pair).await?;
		Ok((reserve_a, reserve_b))
	}

	async fn ensure(&self, deadline: u64) -> Result<(), RouterError> {
		if self.chain.timestamp().await? > deadline {
			return Err(revert(ROUTER_EXPIRED));
		}
		Ok(())
	}

	async fn create_pair_if_missing(
		&self,
		token_a: Address,
		token_b: Address,
	) -> Result<Address, RouterError> {
		let pair = self.pair_address(token_a, token_b)?;
		if !self.chain.is_deployed(pair).await {
			self.chain
				.deploy_token(pair, TokenMetadata::new(PAIR_TOKEN_NAME, "UNI-V2", 18).with_permit())
				.await?;
			tracing::debug!(pair = %pair, token_a = %token_a, token_b = %token_b, "Created pair");
		}
		Ok(pair)
	}

	/// Picks the amounts to deposit so the pool ratio is preserved.
	async fn optimal_deposit(
		&self,
		token_a: Address,
		token_b: Address,
		amount_a_desired: U256,
		amount_b_desired: U256,
		amount_a_min: U256,
		amount_b_min: U256,
	) -> Result<Deposit, RouterError> {
		let pair = self.create_pair_if_missing(token_a, token_b).await?;
		let (reserve_a, reserve_b) = self.reserves(pair, token_a, token_b).await?;

		let (amount_a, amount_b) = if reserve_a.is_zero() && reserve_b.is_zero() {
			(amount_a_desired, amount_b_desired)
		} else {
			let amount_b_optimal = quote(amount_a_desired, reserve_a, reserve_b)?;
			if amount_b_optimal <= amount_b_desired {
				if amount_b_optimal < amount_b_min {
					return Err(revert(INSUFFICIENT_B_AMOUNT));
				}
				(amount_a_desired, amount_b_optimal)
			} else {
				let amount_a_optimal = quote(amount_b_desired, reserve_b, reserve_a)?;
				if amount_a_optimal < amount_a_min {
					return Err(revert(INSUFFICIENT_A_AMOUNT));
				}
				(amount_a_optimal, amount_b_desired)
			}
		};

		Ok(Deposit {
			pair,
			amount_a,
			amount_b,
			reserve_a,
			reserve_b,
		})
	}

	/// Mints LP tokens for a deposit that has already reached the pair.
	async fn mint(&self, deposit: &Deposit, to: Address) -> Result<U256, RouterError> {
		let pair = deposit.pair;
		let total_supply = self.chain.total_supply(pair).await?;

		let liquidity = if total_supply.is_zero() {
			let root = sqrt(mul(deposit.amount_a, deposit.amount_b)?);
			let minimum = U256::from(MINIMUM_LIQUIDITY);
			if root <= minimum {
				return Err(revert(INSUFFICIENT_LIQUIDITY_MINTED));
			}
			self.chain.mint(pair, Address::ZERO, minimum).await?;
			root - minimum
		} else {
			let by_a = mul(deposit.amount_a, total_supply)? / deposit.reserve_a;
			let by_b = mul(deposit.amount_b, total_supply)? / deposit.reserve_b;
			by_a.min(by_b)
		};

		if liquidity.is_zero() {
			return Err(revert(INSUFFICIENT_LIQUIDITY_MINTED));
		}
		self.chain.mint(pair, to, liquidity).await?;
		Ok(liquidity)
	}

	/// Sends `amount` of `token` out of `pair`.
	async fn pair_transfer(
		&self,
		pair: Address,
		token: Address,
		to: Address,
		amount: U256,
	) -> Result<(), RouterError> {
		let sent = self
			.chain
			.transfer(token, pair, to, amount)
			.await
			.map_err(token_revert)?;
		if !sent {
			return Err(revert("UniswapV2: TRANSFER_FAILED"));
		}
		Ok(())
	}

	/// Burns the LP tokens the pair holds and pays out both sides to `to`.
	async fn burn(
		&self,
		pair: Address,
		token: Address,
		to: Address,
	) -> Result<(U256, U256), RouterError> {
		let (balance_token, balance_weth) = self.reserves(pair, token, self.weth).await?;
		let liquidity = self.chain.balance_of(pair, pair).await?;
		let total_supply = self.chain.total_supply(pair).await?;

		let amount_token = mul(liquidity, balance_token)? / total_supply;
		let amount_weth = mul(liquidity, balance_weth)? / total_supply;
		if amount_token.is_zero() || amount_weth.is_zero() {
			return Err(revert(INSUFFICIENT_LIQUIDITY_BURNED));
		}

		self.chain.burn(pair, pair, liquidity).await?;
		self.pair_transfer(pair, token, to, amount_token).await?;
		self.pair_transfer(pair, self.weth, to, amount_weth).await?;
		Ok((amount_token, amount_weth))
	}
}

#[async_trait]
impl RouterInterface for MemoryRouter {
	fn address(&self) -> Address {
		self.address
	}

	fn weth(&self) -> Address {
		self.weth
	}

	async fn pair_for(
		&self,
		token_a: Address,
		token_b: Address,
	) -> Result<Option<Address>, RouterError> {
		let pair = self.pair_address(token_a, token_b)?;
		Ok(self.chain.is_deployed(pair).await.then_some(pair))
	}

	async fn add_liquidity(
		&self,
		caller: Address,
		params: &AddLiquidityParams,
	) -> Result<LiquidityMinted, RouterError> {
		self.ensure(params.deadline).await?;
		let deposit = self
			.optimal_deposit(
				params.token_a,
				params.token_b,
				params.amount_a_desired,
				params.amount_b_desired,
				params.amount_a_min,
				params.amount_b_min,
			)
			.await?;

		self.tokens
			.transfer_from(params.token_a, caller, deposit.pair, deposit.amount_a)
			.await
			.map_err(token_revert)?;
		self.tokens
			.transfer_from(params.token_b, caller, deposit.pair, deposit.amount_b)
			.await
			.map_err(token_revert)?;
		let liquidity = self.mint(&deposit, params.recipient).await?;

		Ok(LiquidityMinted {
			amount_a: deposit.amount_a,
			amount_b: deposit.amount_b,
			liquidity,
		})
	}

	async fn add_liquidity_eth(
		&self,
		caller: Address,
		params: &AddLiquidityEthParams,
		value: U256,
	) -> Result<LiquidityMinted, RouterError> {
		// msg.value arrives with the call.
		self.chain.transfer_value(caller, self.address, value).await?;
		self.ensure(params.deadline).await?;

		let deposit = self
			.optimal_deposit(
				params.token,
				self.weth,
				params.amount_token_desired,
				value,
				params.amount_token_min,
				params.amount_eth_min,
			)
			.await?;

		self.tokens
			.transfer_from(params.token, caller, deposit.pair, deposit.amount_a)
			.await
			.map_err(token_revert)?;

		// WETH.deposit() followed by a transfer to the pair.
		self.chain
			.transfer_value(self.address, self.weth, deposit.amount_b)
			.await?;
		self.chain
			.mint(self.weth, deposit.pair, deposit.amount_b)
			.await?;

		let liquidity = self.mint(&deposit, params.recipient).await?;

		if value > deposit.amount_b {
			self.chain
				.transfer_value(self.address, caller, value - deposit.amount_b)
				.await?;
		}

		Ok(LiquidityMinted {
			amount_a: deposit.amount_a,
			amount_b: deposit.amount_b,
			liquidity,
		})
	}

	async fn remove_liquidity_eth_with_permit(
		&self,
		caller: Address,
		params: &RemoveLiquidityParams,
	) -> Result<LiquidityRemoved, RouterError> {
		let pair = self.pair_address(params.token, self.weth)?;
		if !self.chain.is_deployed(pair).await {
			// Calling into an address without code reverts with no data.
			return Err(RouterError::Reverted(Vec::new()));
		}

		let nonce = self
			.tokens
			.get_permit_nonce(pair, caller)
			.await
			.map_err(permit_revert)?;
		let authorization = PermitAuthorization {
			message: PermitMessage {
				owner: caller,
				spender: self.address,
				value: params.permit_value(),
				nonce,
				deadline: params.deadline,
			},
			signature: params.signature,
		};
		self.tokens
			.apply_permit(pair, &authorization)
			.await
			.map_err(permit_revert)?;

		self.ensure(params.deadline).await?;
		self.tokens
			.transfer_from(pair, caller, pair, params.liquidity)
			.await
			.map_err(token_revert)?;
		let (amount_token, amount_eth) = self.burn(pair, params.token, self.address).await?;

		if amount_token < params.amount_token_min {
			return Err(revert(INSUFFICIENT_A_AMOUNT));
		}
		if amount_eth < params.amount_eth_min {
			return Err(revert(INSUFFICIENT_B_AMOUNT));
		}

		self.tokens
			.transfer(params.token, params.recipient, amount_token)
			.await
			.map_err(token_revert)?;

		// WETH.withdraw() followed by sending the ETH on.
		self.chain
			.burn(self.weth, self.address, amount_eth)
			.await?;
		self.chain
			.transfer_value(self.weth, self.address, amount_eth)
			.await?;
		self.chain
			.transfer_value(self.address, params.recipient, amount_eth)
			.await?;

		Ok(LiquidityRemoved {
			amount_token,
			amount_eth,
		})
	}
}
