//! ERC-2612 permit types and the stateless permit verifier.
//!
//! A permit binds `(owner, spender, value, nonce, deadline)` to a token's EIP-712
//! domain. Verification is a pure function over `(domain, message, signature, now)`;
//! nonce bookkeeping belongs to the token that applies the permit.

use crate::utils::{
	compute_domain_hash, compute_final_digest, Eip712AbiEncoder, PERMIT_TYPE, PERMIT_VERSION,
};
use alloy_primitives::{b256, keccak256, Address, PrimitiveSignature, B256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound for the `s` component of a non-malleable secp256k1 signature (n / 2).
const SECP256K1_HALF_ORDER: B256 =
	b256!("7fffffffffffffffffffffffffffffff5d576e7357a4501ddfe92f46681b20a0");

/// Errors produced while verifying a permit authorization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermitError {
	/// The authorization deadline has passed.
	#[error("Authorization expired at {deadline} (now {now})")]
	Expired { deadline: u64, now: u64 },
	/// The signature is malformed or was not produced by the owner.
	#[error("Invalid signature: {0}")]
	InvalidSignature(String),
}

/// EIP-712 domain of a permit-capable token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitDomain {
	/// Token name as returned by `name()`.
	pub name: String,
	/// Domain version, `"1"` for every token the ledger supports.
	pub version: String,
	/// Chain the token lives on.
	pub chain_id: u64,
	/// The token contract itself.
	pub verifying_contract: Address,
}

impl PermitDomain {
	/// Creates a domain with the standard `"1"` version.
	pub fn new(name: impl Into<String>, chain_id: u64, verifying_contract: Address) -> Self {
		Self {
			name: name.into(),
			version: PERMIT_VERSION.to_string(),
			chain_id,
			verifying_contract,
		}
	}

	/// Returns the domain separator (`DOMAIN_SEPARATOR()` on-chain).
	pub fn separator(&self) -> B256 {
		compute_domain_hash(
			&self.name,
			&self.version,
			self.chain_id,
			&self.verifying_contract,
		)
	}
}

/// The `Permit` struct that gets signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitMessage {
	pub owner: Address,
	pub spender: Address,
	pub value: U256,
	pub nonce: U256,
	pub deadline: u64,
}

impl PermitMessage {
	/// keccak256(abi.encode(PERMIT_TYPEHASH, owner, spender, value, nonce, deadline))
	pub fn struct_hash(&self) -> B256 {
		let mut enc = Eip712AbiEncoder::new();
		enc.push_b256(&keccak256(PERMIT_TYPE.as_bytes()));
		enc.push_address(&self.owner);
		enc.push_address(&self.spender);
		enc.push_u256(self.value);
		enc.push_u256(self.nonce);
		enc.push_u256(U256::from(self.deadline));
		keccak256(enc.finish())
	}
}

/// Signature in the `(v, r, s)` form consumed by `permit(...)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitSignature {
	/// Recovery id offset by 27.
	pub v: u8,
	pub r: B256,
	pub s: B256,
}

impl PermitSignature {
	/// Splits a recoverable signature into `(v, r, s)`.
	pub fn from_signature(signature: &PrimitiveSignature) -> Self {
		Self {
			v: 27 + u8::from(signature.v()),
			r: B256::from(signature.r().to_be_bytes::<32>()),
			s: B256::from(signature.s().to_be_bytes::<32>()),
		}
	}

	/// Rebuilds a recoverable signature, rejecting malformed or malleable input.
	pub fn to_signature(&self) -> Result<PrimitiveSignature, PermitError> {
		let y_parity = match self.v {
			27 => false,
			28 => true,
			other => {
				return Err(PermitError::InvalidSignature(format!(
					"v must be 27 or 28, got {}",
					other
				)))
			},
		};
		if self.r == B256::ZERO || self.s == B256::ZERO {
			return Err(PermitError::InvalidSignature(
				"r and s must be non-zero".into(),
			));
		}
		if self.s > SECP256K1_HALF_ORDER {
			return Err(PermitError::InvalidSignature(
				"s is in the upper half order".into(),
			));
		}
		Ok(PrimitiveSignature::new(
			U256::from_be_bytes(self.r.0),
			U256::from_be_bytes(self.s.0),
			y_parity,
		))
	}
}

/// A signed permit as produced by the owner off-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitAuthorization {
	pub message: PermitMessage,
	pub signature: PermitSignature,
}

/// Computes the digest the owner signs for `message` under `domain`.
pub fn permit_digest(domain: &PermitDomain, message: &PermitMessage) -> B256 {
	compute_final_digest(&domain.separator(), &message.struct_hash())
}

/// Verifies a permit signature and returns the recovered owner.
///
/// The deadline is checked first, so an expired authorization is reported as
/// [`PermitError::Expired`] whether or not its signature is valid. The nonce in
/// `message` must be the token's current nonce for the owner; a stale nonce
/// produces a different digest and therefore a signer mismatch.
pub fn verify_permit(
	domain: &PermitDomain,
	message: &PermitMessage,
	signature: &PermitSignature,
	now: u64,
) -> Result<Address, PermitError> {
	if now > message.deadline {
		return Err(PermitError::Expired {
			deadline: message.deadline,
			now,
		});
	}

	let recoverable = signature.to_signature()?;
	let digest = permit_digest(domain, message);
	let recovered = recoverable
		.recover_address_from_prehash(&digest)
		.map_err(|e| PermitError::InvalidSignature(e.to_string()))?;

	if recovered == Address::ZERO || recovered != message.owner {
		return Err(PermitError::InvalidSignature(format!(
			"recovered signer {} does not match owner {}",
			recovered, message.owner
		)));
	}

	Ok(recovered)
}
