//! Token access for the liquidity ledger.
//!
//! [`TokenInterface`] is the ERC-20 (and ERC-2612) surface the ledger consumes.
//! [`TokenGateway`] wraps a backend on behalf of one custodian account, the
//! address that acts as `msg.sender` for every call the gateway makes.

use async_trait::async_trait;
use liquidity_types::{
	Address, ChainError, PermitAuthorization, PermitDomain, PermitError, PermitSignature, U256,
};
use std::sync::Arc;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
}

/// Errors that can occur during token operations.
#[derive(Debug, Error)]
pub enum TokenError {
	/// No token is deployed at the address.
	#[error("Unknown token: {0}")]
	UnknownToken(Address),
	/// A token is already deployed at the address.
	#[error("Token already deployed at {0}")]
	AlreadyDeployed(Address),
	/// `transferFrom` exceeded the spender's allowance.
	#[error("Insufficient allowance on {token}: {spender} may spend {allowance} of {owner}, needs {needed}")]
	InsufficientAllowance {
		token: Address,
		owner: Address,
		spender: Address,
		allowance: U256,
		needed: U256,
	},
	/// A transfer exceeded the sender's balance.
	#[error("Insufficient balance on {token}: {account} holds {balance}, needs {needed}")]
	InsufficientBalance {
		token: Address,
		account: Address,
		balance: U256,
		needed: U256,
	},
	/// The token returned `false` from a transfer.
	#[error("Transfer of {token} returned false")]
	TransferRejected { token: Address },
	/// The token returned `false` from `approve`.
	#[error("Approval of {spender} on {token} failed")]
	ApprovalFailed { token: Address, spender: Address },
	/// The token does not implement ERC-2612.
	#[error("Token {0} does not support permit")]
	PermitUnsupported(Address),
	/// The permit deadline has passed.
	#[error("Permit expired at {deadline} (now {now})")]
	ExpiredAuthorization { deadline: u64, now: u64 },
	/// The permit signature does not belong to the owner at the current nonce.
	#[error("Invalid permit signature: {0}")]
	InvalidSignature(String),
	/// Failure in the underlying execution environment.
	#[error("Environment error: {0}")]
	Environment(#[from] ChainError),
}

impl From<PermitError> for TokenError {
	fn from(err: PermitError) -> Self {
		match err {
			PermitError::Expired { deadline, now } => {
				TokenError::ExpiredAuthorization { deadline, now }
			},
			PermitError::InvalidSignature(reason) => TokenError::InvalidSignature(reason),
		}
	}
}

/// The ERC-20 surface consumed by the ledger.
///
/// Every state-changing method takes the calling account explicitly; it plays
/// the role of `msg.sender`. `Ok(false)` mirrors a token that returns `false`
/// instead of reverting.
#[async_trait]
pub trait TokenInterface: Send + Sync {
	/// `name()`, which is also the EIP-712 domain name for permit tokens.
	async fn name(&self, token: Address) -> Result<String, TokenError>;

	async fn balance_of(&self, token: Address, account: Address) -> Result<U256, TokenError>;

	async fn allowance(
		&self,
		token: Address,
		owner: Address,
		spender: Address,
	) -> Result<U256, TokenError>;

	async fn approve(
		&self,
		token: Address,
		caller: Address,
		spender: Address,
		amount: U256,
	) -> Result<bool, TokenError>;

	async fn transfer(
		&self,
		token: Address,
		caller: Address,
		to: Address,
		amount: U256,
	) -> Result<bool, TokenError>;

	async fn transfer_from(
		&self,
		token: Address,
		caller: Address,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<bool, TokenError>;

	/// Current permit nonce of `owner`.
	async fn nonces(&self, token: Address, owner: Address) -> Result<U256, TokenError> {
		let _ = owner;
		Err(TokenError::PermitUnsupported(token))
	}

	/// EIP-712 domain the token verifies permits under.
	async fn permit_domain(&self, token: Address) -> Result<PermitDomain, TokenError> {
		Err(TokenError::PermitUnsupported(token))
	}

	/// Applies a signed permit as an approval and consumes the owner's nonce.
	async fn permit(
		&self,
		token: Address,
		owner: Address,
		spender: Address,
		value: U256,
		deadline: u64,
		signature: &PermitSignature,
	) -> Result<(), TokenError> {
		let _ = (owner, spender, value, deadline, signature);
		Err(TokenError::PermitUnsupported(token))
	}
}

/// Token operations performed on behalf of a single custodian account.
///
/// The ledger holds a gateway whose custodian is the ledger's own address: it
/// pulls user funds into that address, approves the router from it and refunds
/// from it.
#[derive(Clone)]
pub struct TokenGateway {
	backend: Arc<dyn TokenInterface>,
	custodian: Address,
}

impl TokenGateway {
	pub fn new(backend: Arc<dyn TokenInterface>, custodian: Address) -> Self {
		Self { backend, custodian }
	}

	/// The account this gateway acts as.
	pub fn custodian(&self) -> Address {
		self.custodian
	}

	/// Pulls `amount` of `token` from `owner` into the custodian and approves
	/// `spender` for exactly that amount.
	pub async fn pull_and_approve(
		&self,
		token: Address,
		owner: Address,
		amount: U256,
		spender: Address,
	) -> Result<(), TokenError> {
		self.transfer_from(token, owner, self.custodian, amount).await?;

		let approved = self
			.backend
			.approve(token, self.custodian, spender, amount)
			.await?;
		if !approved {
			return Err(TokenError::ApprovalFailed { token, spender });
		}

		tracing::debug!(
			token = %token,
			owner = %owner,
			spender = %spender,
			amount = %amount,
			"Pulled and approved"
		);
		Ok(())
	}

	/// Moves `amount` from `from` to `to` using the custodian's allowance.
	pub async fn transfer_from(
		&self,
		token: Address,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<(), TokenError> {
		let transferred = self
			.backend
			.transfer_from(token, self.custodian, from, to, amount)
			.await?;
		if !transferred {
			return Err(TokenError::TransferRejected { token });
		}
		Ok(())
	}

	/// Sends `amount` of the custodian's own balance to `to`.
	pub async fn transfer(&self, token: Address, to: Address, amount: U256) -> Result<(), TokenError> {
		let transferred = self
			.backend
			.transfer(token, self.custodian, to, amount)
			.await?;
		if !transferred {
			return Err(TokenError::TransferRejected { token });
		}
		Ok(())
	}

	/// Returns unused funds to `to`. Zero amounts are a no-op.
	pub async fn refund(&self, token: Address, to: Address, amount: U256) -> Result<(), TokenError> {
		if amount.is_zero() {
			return Ok(());
		}
		self.transfer(token, to, amount).await?;
		tracing::debug!(token = %token, to = %to, amount = %amount, "Refunded unused amount");
		Ok(())
	}

	/// Clears whatever allowance the custodian still grants `spender`.
	pub async fn revoke(&self, token: Address, spender: Address) -> Result<(), TokenError> {
		let remaining = self.allowance(token, spender).await?;
		if remaining.is_zero() {
			return Ok(());
		}

		let approved = self
			.backend
			.approve(token, self.custodian, spender, U256::ZERO)
			.await?;
		if !approved {
			return Err(TokenError::ApprovalFailed { token, spender });
		}
		Ok(())
	}

	/// Read-only nonce lookup used to build permit messages.
	pub async fn get_permit_nonce(&self, token: Address, owner: Address) -> Result<U256, TokenError> {
		self.backend.nonces(token, owner).await
	}

	pub async fn permit_domain(&self, token: Address) -> Result<PermitDomain, TokenError> {
		self.backend.permit_domain(token).await
	}

	/// Presents a signed permit to `token`.
	///
	/// The token re-verifies the signature against its current nonce, so a
	/// replayed authorization fails here even if it verified earlier.
	pub async fn apply_permit(
		&self,
		token: Address,
		authorization: &PermitAuthorization,
	) -> Result<(), TokenError> {
		let message = &authorization.message;
		self.backend
			.permit(
				token,
				message.owner,
				message.spender,
				message.value,
				message.deadline,
				&authorization.signature,
			)
			.await?;

		tracing::debug!(
			token = %token,
			owner = %message.owner,
			spender = %message.spender,
			nonce = %message.nonce,
			"Applied permit"
		);
		Ok(())
	}

	pub async fn balance_of(&self, token: Address, account: Address) -> Result<U256, TokenError> {
		self.backend.balance_of(token, account).await
	}

	/// Allowance the custodian grants `spender`.
	pub async fn allowance(&self, token: Address, spender: Address) -> Result<U256, TokenError> {
		self.backend.allowance(token, self.custodian, spender).await
	}
}
