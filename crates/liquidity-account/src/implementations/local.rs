//! Local private-key account.
//!
//! Keeps a secp256k1 key in process memory. Intended for development, tests and
//! scripted permit signing; production keys belong in a remote signer.

use crate::{AccountError, AccountFactory, AccountInterface, AccountRegistry};
use alloy_primitives::{PrimitiveSignature, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use liquidity_types::{Address, ImplementationRegistry, SecretString};

/// Account backed by an in-memory private key.
pub struct LocalWallet {
	signer: PrivateKeySigner,
}

impl LocalWallet {
	/// Parses a hex private key (with or without `0x`).
	pub fn new(private_key: &SecretString) -> Result<Self, AccountError> {
		let signer = private_key
			.with_exposed(|key| key.trim().parse::<PrivateKeySigner>())
			.map_err(|e| AccountError::InvalidKey(e.to_string()))?;
		Ok(Self { signer })
	}

	/// Generates a fresh random key.
	pub fn random() -> Self {
		Self {
			signer: PrivateKeySigner::random(),
		}
	}
}

#[async_trait]
impl AccountInterface for LocalWallet {
	async fn address(&self) -> Result<Address, AccountError> {
		Ok(self.signer.address())
	}

	async fn sign_hash(&self, hash: &B256) -> Result<PrimitiveSignature, AccountError> {
		self.signer
			.sign_hash_sync(hash)
			.map_err(|e| AccountError::SigningFailed(e.to_string()))
	}
}

/// Factory function to create a local account from configuration.
///
/// Configuration parameters:
/// - `private_key`: hex-encoded secp256k1 key
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	let key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.ok_or_else(|| AccountError::InvalidKey("private_key is required".into()))?;

	Ok(Box::new(LocalWallet::new(&SecretString::from(key))?))
}

/// Registry for the local account implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = AccountFactory;

	fn factory() -> Self::Factory {
		create_account
	}
}

impl AccountRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::AccountService;
	use alloy_primitives::{address, U256};
	use liquidity_types::{verify_permit, PermitDomain, PermitError, PermitMessage};

	const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
	const ANVIL_ADDRESS: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

	fn service() -> AccountService {
		let config: toml::Value = toml::from_str(&format!("private_key = \"{}\"", ANVIL_KEY)).unwrap();
		AccountService::new(create_account(&config).unwrap())
	}

	fn message(owner: Address) -> PermitMessage {
		PermitMessage {
			owner,
			spender: address!("7a250d5630B4cF539739dF2C5dAcb4c659F2488D"),
			value: U256::from(10u64).pow(U256::from(18u64)),
			nonce: U256::ZERO,
			deadline: 1_700_000_600,
		}
	}

	#[tokio::test]
	async fn test_address_from_configured_key() {
		assert_eq!(service().get_address().await.unwrap(), ANVIL_ADDRESS);
	}

	#[tokio::test]
	async fn test_missing_key_is_rejected() {
		let config: toml::Value = toml::from_str("other = 1").unwrap();
		assert!(matches!(
			create_account(&config),
			Err(AccountError::InvalidKey(_))
		));
	}

	#[tokio::test]
	async fn test_signed_permit_verifies() {
		let domain = PermitDomain::new("Uniswap V2", 1, Address::repeat_byte(0xa4));
		let auth = service()
			.sign_permit(&domain, message(ANVIL_ADDRESS))
			.await
			.unwrap();

		assert!(auth.signature.v == 27 || auth.signature.v == 28);
		let recovered =
			verify_permit(&domain, &auth.message, &auth.signature, 1_700_000_000).unwrap();
		assert_eq!(recovered, ANVIL_ADDRESS);
	}

	#[tokio::test]
	async fn test_signature_is_bound_to_nonce_and_domain() {
		let domain = PermitDomain::new("Uniswap V2", 1, Address::repeat_byte(0xa4));
		let auth = service()
			.sign_permit(&domain, message(ANVIL_ADDRESS))
			.await
			.unwrap();

		let mut next_nonce = auth.message;
		next_nonce.nonce = U256::from(1u64);
		assert!(matches!(
			verify_permit(&domain, &next_nonce, &auth.signature, 1_700_000_000),
			Err(PermitError::InvalidSignature(_))
		));

		let other_chain = PermitDomain::new("Uniswap V2", 5, Address::repeat_byte(0xa4));
		assert!(matches!(
			verify_permit(&other_chain, &auth.message, &auth.signature, 1_700_000_000),
			Err(PermitError::InvalidSignature(_))
		));
	}

	#[tokio::test]
	async fn test_refuses_to_sign_for_other_owner() {
		let domain = PermitDomain::new("Dai Stablecoin", 1, Address::repeat_byte(0x6b));
		let stranger = Address::repeat_byte(0x42);
		let err = service()
			.sign_permit(&domain, message(stranger))
			.await
			.unwrap_err();
		assert!(matches!(err, AccountError::OwnerMismatch { .. }));
	}

	#[tokio::test]
	async fn test_random_wallets_are_distinct() {
		let a = LocalWallet::random().address().await.unwrap();
		let b = LocalWallet::random().address().await.unwrap();
		assert_ne!(a, b);
	}
}
