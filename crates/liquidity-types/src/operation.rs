//! Liquidity operation types.
//!
//! Parameter structs mirror the Uniswap V2 router entry points the ledger
//! forwards to; [`LiquidityOperation`] is the immutable record the ledger keeps
//! for every successful add.

use crate::PermitSignature;
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parameters of an ERC-20/ERC-20 add-liquidity call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLiquidityParams {
	pub token_a: Address,
	pub token_b: Address,
	pub amount_a_desired: U256,
	pub amount_b_desired: U256,
	pub amount_a_min: U256,
	pub amount_b_min: U256,
	/// Receiver of the minted LP tokens.
	pub recipient: Address,
	/// Unix timestamp after which the call must be rejected.
	pub deadline: u64,
}

/// Parameters of an ERC-20/ETH add-liquidity call.
///
/// The desired ETH amount is the value attached to the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLiquidityEthParams {
	pub token: Address,
	pub amount_token_desired: U256,
	pub amount_token_min: U256,
	pub amount_eth_min: U256,
	pub recipient: Address,
	pub deadline: u64,
}

/// Parameters of `removeLiquidityETHWithPermit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLiquidityParams {
	/// The ERC-20 side of the token/WETH pair.
	pub token: Address,
	/// LP tokens to burn.
	pub liquidity: U256,
	pub amount_token_min: U256,
	pub amount_eth_min: U256,
	pub recipient: Address,
	pub deadline: u64,
	/// Whether the permit was signed for `U256::MAX` instead of `liquidity`.
	pub approve_max: bool,
	/// Owner signature over the pair's permit.
	pub signature: PermitSignature,
}

impl RemoveLiquidityParams {
	/// Value the owner must have signed in the permit.
	pub fn permit_value(&self) -> U256 {
		if self.approve_max {
			U256::MAX
		} else {
			self.liquidity
		}
	}
}

/// Amounts reported by the router after adding liquidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityMinted {
	pub amount_a: U256,
	pub amount_b: U256,
	pub liquidity: U256,
}

/// Amounts reported by the router after removing liquidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityRemoved {
	pub amount_token: U256,
	pub amount_eth: U256,
}

/// Final state of a recorded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationOutcome {
	Success,
	Reverted,
}

/// Immutable record of one successful add-liquidity call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityOperation {
	/// Monotonic id, equal to `liquidityCount` right after the add.
	pub operation_id: u64,
	pub token_a: Address,
	pub token_b: Address,
	/// Amount of `token_a` the router actually used.
	pub amount_a: U256,
	/// Amount of `token_b` the router actually used.
	pub amount_b: U256,
	/// LP tokens minted to `recipient`.
	pub liquidity: U256,
	pub recipient: Address,
	pub caller: Address,
	pub timestamp: u64,
	pub outcome: OperationOutcome,
}

/// An asset held or moved by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
	Native,
	Token(Address),
	/// LP tokens of the `token`/WETH pair.
	Liquidity(Address),
}

impl fmt::Display for Asset {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Asset::Native => write!(f, "ETH"),
			Asset::Token(address) => write!(f, "{}", address),
			Asset::Liquidity(token) => write!(f, "LP({}/WETH)", token),
		}
	}
}

/// An amount of a specific asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetAmount {
	pub asset: Asset,
	pub amount: U256,
}

impl AssetAmount {
	pub fn token(token: Address, amount: U256) -> Self {
		Self {
			asset: Asset::Token(token),
			amount,
		}
	}

	pub fn native(amount: U256) -> Self {
		Self {
			asset: Asset::Native,
			amount,
		}
	}

	pub fn liquidity(token: Address, amount: U256) -> Self {
		Self {
			asset: Asset::Liquidity(token),
			amount,
		}
	}
}
