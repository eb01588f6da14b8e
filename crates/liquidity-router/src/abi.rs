//! Router revert data.
//!
//! Uniswap V2 contracts revert with `Error(string)` reasons, while OpenZeppelin
//! tokens use custom errors. Both are decoded into [`RouterError`] variants;
//! anything else is kept verbatim.

use crate::RouterError;
use alloy_sol_types::{sol, Revert, SolError};

sol! {
	error ERC20InsufficientBalance(address sender, uint256 balance, uint256 needed);
	error ERC20InsufficientAllowance(address spender, uint256 allowance, uint256 needed);
	error ERC2612ExpiredSignature(uint256 deadline);
	error ERC2612InvalidSigner(address signer, address owner);
}

pub const ROUTER_EXPIRED: &str = "UniswapV2Router: EXPIRED";
pub const PAIR_EXPIRED: &str = "UniswapV2: EXPIRED";
pub const INVALID_SIGNATURE: &str = "UniswapV2: INVALID_SIGNATURE";
pub const INSUFFICIENT_A_AMOUNT: &str = "UniswapV2Router: INSUFFICIENT_A_AMOUNT";
pub const INSUFFICIENT_B_AMOUNT: &str = "UniswapV2Router: INSUFFICIENT_B_AMOUNT";
pub const INSUFFICIENT_LIQUIDITY_MINTED: &str = "UniswapV2: INSUFFICIENT_LIQUIDITY_MINTED";
pub const INSUFFICIENT_LIQUIDITY_BURNED: &str = "UniswapV2: INSUFFICIENT_LIQUIDITY_BURNED";
pub const TRANSFER_FROM_FAILED: &str = "TransferHelper: TRANSFER_FROM_FAILED";

/// ABI-encodes `Error(reason)`.
pub fn revert_reason(reason: &str) -> Vec<u8> {
	Revert {
		reason: reason.to_string(),
	}
	.abi_encode()
}

/// Classifies raw revert data.
pub fn decode_revert(data: &[u8]) -> RouterError {
	if let Ok(revert) = Revert::abi_decode(data, true) {
		return classify_reason(&revert.reason).unwrap_or_else(|| RouterError::Reverted(data.to_vec()));
	}
	if let Ok(err) = ERC2612ExpiredSignature::abi_decode(data, true) {
		return RouterError::ExpiredAuthorization(format!("permit deadline {}", err.deadline));
	}
	if let Ok(err) = ERC2612InvalidSigner::abi_decode(data, true) {
		return RouterError::InvalidSignature(format!(
			"signer {} is not owner {}",
			err.signer, err.owner
		));
	}
	if let Ok(err) = ERC20InsufficientAllowance::abi_decode(data, true) {
		return RouterError::TransferFailed(format!(
			"allowance of {} is {}, needs {}",
			err.spender, err.allowance, err.needed
		));
	}
	if let Ok(err) = ERC20InsufficientBalance::abi_decode(data, true) {
		return RouterError::TransferFailed(format!(
			"balance of {} is {}, needs {}",
			err.sender, err.balance, err.needed
		));
	}
	RouterError::Reverted(data.to_vec())
}

fn classify_reason(reason: &str) -> Option<RouterError> {
	let reason_owned = reason.to_string();
	if reason.ends_with("Router: EXPIRED") {
		Some(RouterError::DeadlineExpired(reason_owned))
	} else if reason.ends_with(": EXPIRED") {
		Some(RouterError::ExpiredAuthorization(reason_owned))
	} else if reason.ends_with("INVALID_SIGNATURE") {
		Some(RouterError::InvalidSignature(reason_owned))
	} else if reason.contains("INSUFFICIENT_LIQUIDITY") {
		Some(RouterError::InsufficientLiquidity(reason_owned))
	} else if reason.contains("INSUFFICIENT_") && reason.ends_with("AMOUNT") {
		Some(RouterError::SlippageExceeded(reason_owned))
	} else if reason.ends_with("TRANSFER_FAILED") || reason.ends_with("TRANSFER_FROM_FAILED") {
		Some(RouterError::TransferFailed(reason_owned))
	} else {
		None
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{Address, U256};

	#[test]
	fn test_reason_strings() {
		assert!(matches!(
			decode_revert(&revert_reason(ROUTER_EXPIRED)),
			RouterError::DeadlineExpired(_)
		));
		assert!(matches!(
			decode_revert(&revert_reason(PAIR_EXPIRED)),
			RouterError::ExpiredAuthorization(_)
		));
		assert!(matches!(
			decode_revert(&revert_reason(INVALID_SIGNATURE)),
			RouterError::InvalidSignature(_)
		));
		assert!(matches!(
			decode_revert(&revert_reason(INSUFFICIENT_B_AMOUNT)),
			RouterError::SlippageExceeded(_)
		));
		assert!(matches!(
			decode_revert(&revert_reason("UniswapV2Router: INSUFFICIENT_ETH_AMOUNT")),
			RouterError::SlippageExceeded(_)
		));
		assert!(matches!(
			decode_revert(&revert_reason(INSUFFICIENT_LIQUIDITY_MINTED)),
			RouterError::InsufficientLiquidity(_)
		));
		assert!(matches!(
			decode_revert(&revert_reason(TRANSFER_FROM_FAILED)),
			RouterError::TransferFailed(_)
		));
	}

	#[test]
	fn test_custom_errors() {
		let expired = ERC2612ExpiredSignature {
			deadline: U256::from(10u64),
		}
		.abi_encode();
		assert!(matches!(
			decode_revert(&expired),
			RouterError::ExpiredAuthorization(_)
		));

		let signer = ERC2612InvalidSigner {
			signer: Address::repeat_byte(1),
			owner: Address::repeat_byte(2),
		}
		.abi_encode();
		assert!(matches!(
			decode_revert(&signer),
			RouterError::InvalidSignature(_)
		));

		let allowance = ERC20InsufficientAllowance {
			spender: Address::repeat_byte(1),
			allowance: U256::ZERO,
			needed: U256::from(5u64),
		}
		.abi_encode();
		assert!(matches!(
			decode_revert(&allowance),
			RouterError::TransferFailed(_)
		));
	}

	#[test]
	fn test_unknown_data_stays_raw() {
		let raw = vec![0xde, 0xad, 0xbe, 0xef];
		match decode_revert(&raw) {
			RouterError::Reverted(data) => assert_eq!(data, raw),
			other => panic!("unexpected {:?}", other),
		}

		let unknown_reason = revert_reason("ds-math-sub-underflow");
		match decode_revert(&unknown_reason) {
			RouterError::Reverted(data) => assert_eq!(data, unknown_reason),
			other => panic!("unexpected {:?}", other),
		}

		assert!(matches!(decode_revert(&[]), RouterError::Reverted(data) if data.is_empty()));
	}
}
