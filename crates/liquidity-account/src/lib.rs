//! Account management for the liquidity ledger.
//!
//! Accounts hold signing keys. The ledger itself never signs anything; accounts
//! are used off-chain by token owners to produce EIP-712 permit signatures that
//! the removal flow later presents to the router.

use alloy_primitives::{PrimitiveSignature, B256};
use async_trait::async_trait;
use liquidity_types::{
	permit_digest, Address, ImplementationRegistry, PermitAuthorization, PermitDomain,
	PermitMessage, PermitSignature,
};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	/// Error that occurs when signing operations fail.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// Error that occurs when a cryptographic key is invalid or malformed.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	/// The account was asked to sign on behalf of another address.
	#[error("Account {account} cannot sign for owner {owner}")]
	OwnerMismatch { account: Address, owner: Address },
}

/// Trait defining the interface for account implementations.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Retrieves the address associated with this account.
	async fn address(&self) -> Result<Address, AccountError>;

	/// Signs a 32-byte prehash without any message prefix.
	async fn sign_hash(&self, hash: &B256) -> Result<PrimitiveSignature, AccountError>;
}

/// Type alias for account factory functions.
pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

/// Registry trait for account implementations.
pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

/// Get all registered account implementations.
pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Service that manages account operations.
pub struct AccountService {
	/// The underlying account implementation.
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	/// Creates a new AccountService with the specified implementation.
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	/// Retrieves the address associated with the managed account.
	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.implementation.address().await
	}

	/// Signs an ERC-2612 permit for `message` under `domain`.
	///
	/// The message owner must be this account: a permit is only meaningful when
	/// signed by the holder whose allowance it grants.
	pub async fn sign_permit(
		&self,
		domain: &PermitDomain,
		message: PermitMessage,
	) -> Result<PermitAuthorization, AccountError> {
		let account = self.get_address().await?;
		if account != message.owner {
			return Err(AccountError::OwnerMismatch {
				account,
				owner: message.owner,
			});
		}

		let digest = permit_digest(domain, &message);
		let signature = self.implementation.sign_hash(&digest).await?;

		tracing::debug!(
			owner = %message.owner,
			spender = %message.spender,
			token = %domain.verifying_contract,
			nonce = %message.nonce,
			deadline = message.deadline,
			"Signed permit"
		);

		Ok(PermitAuthorization {
			message,
			signature: PermitSignature::from_signature(&signature),
		})
	}
}
