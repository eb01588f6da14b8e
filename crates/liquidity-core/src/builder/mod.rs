//! Builder for constructing a ledger from configuration.
//!
//! Storage and account backends are created through factory functions keyed by
//! the implementation names used in the config file. The chain, token and
//! router backends are passed in directly since they describe the world the
//! ledger runs against rather than the ledger itself.

use crate::ledger::LiquidityLedger;
use liquidity_account::{AccountFactory, AccountInterface, AccountService};
use liquidity_config::Config;
use liquidity_router::{RouterGateway, RouterInterface};
use liquidity_storage::{StorageFactory, StorageInterface, StorageService};
use liquidity_token::{TokenGateway, TokenInterface};
use liquidity_types::ExecutionEnvironment;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during ledger construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for the configurable components.
pub struct LedgerFactories<SF, AF> {
	pub storage_factories: HashMap<String, SF>,
	pub account_factories: HashMap<String, AF>,
}

impl LedgerFactories<StorageFactory, AccountFactory> {
	/// Factories for every built-in implementation.
	pub fn registered() -> Self {
		Self {
			storage_factories: liquidity_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			account_factories: liquidity_account::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}
}

/// Everything a running ledger needs.
pub struct LedgerComponents {
	pub ledger: Arc<LiquidityLedger>,
	/// The configured account, used to sign permits.
	pub account: Arc<AccountService>,
}

/// Builder for constructing a LiquidityLedger with pluggable implementations.
pub struct LedgerBuilder {
	config: Config,
}

impl LedgerBuilder {
	/// Creates a new LedgerBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the ledger and its account.
	///
	/// Fails if the backends do not match the configuration: the router must
	/// sit at the configured address with the configured WETH, and the
	/// environment must run the configured chain.
	pub async fn build<SF, AF>(
		self,
		factories: LedgerFactories<SF, AF>,
		environment: Arc<dyn ExecutionEnvironment>,
		tokens: Arc<dyn TokenInterface>,
		router: Arc<dyn RouterInterface>,
	) -> Result<LedgerComponents, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, liquidity_storage::StorageError>,
		AF: Fn(&toml::Value) -> Result<Box<dyn AccountInterface>, liquidity_account::AccountError>,
	{
		let config = &self.config;

		if environment.chain_id() != config.ledger.chain_id {
			return Err(BuilderError::Config(format!(
				"Environment runs chain {}, configuration expects {}",
				environment.chain_id(),
				config.ledger.chain_id
			)));
		}
		if router.address() != config.router.address {
			return Err(BuilderError::Config(format!(
				"Router backend is at {}, configuration expects {}",
				router.address(),
				config.router.address
			)));
		}
		if router.weth() != config.router.weth {
			return Err(BuilderError::Config(format!(
				"Router uses WETH {}, configuration expects {}",
				router.weth(),
				config.router.weth
			)));
		}

		let storage = build_primary(
			"storage",
			&config.storage.primary,
			&config.storage.implementations,
			&factories.storage_factories,
		)?;
		let account = build_primary(
			"account",
			&config.account.primary,
			&config.account.implementations,
			&factories.account_factories,
		)?;

		let account = AccountService::new(account);
		let signer = account
			.get_address()
			.await
			.map_err(|e| BuilderError::Config(format!("Account unavailable: {}", e)))?;

		let ledger = LiquidityLedger::new(
			config.ledger.address,
			RouterGateway::new(router),
			TokenGateway::new(tokens, config.ledger.address),
			environment,
			Arc::new(StorageService::new(storage)),
		)
		.map_err(|e| BuilderError::Config(e.to_string()))?
		.with_default_deadline(config.ledger.default_deadline_seconds);

		tracing::info!(
			ledger = %config.ledger.address,
			router = %config.router.address,
			chain_id = config.ledger.chain_id,
			account = %signer,
			"Ledger ready"
		);

		Ok(LedgerComponents {
			ledger: Arc::new(ledger),
			account: Arc::new(account),
		})
	}
}

/// Creates every configured implementation that has a factory and returns the
/// primary one.
fn build_primary<T, E, F>(
	component: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<Box<T>, BuilderError>
where
	T: ?Sized,
	E: Display,
	F: Fn(&toml::Value) -> Result<Box<T>, E>,
{
	let mut built = HashMap::new();
	for (name, config) in implementations {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "No factory registered");
			continue;
		};
		match factory(config) {
			Ok(implementation) => {
				tracing::info!(component, implementation = %name, enabled = %(name == primary), "Loaded");
				built.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	built
		.remove(primary)
		.ok_or_else(|| BuilderError::MissingComponent(format!("{} '{}'", component, primary)))
}
