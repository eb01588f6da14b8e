//! In-memory EVM-like chain.
//!
//! Holds ERC-20 balances, allowances and permit nonces for any number of
//! tokens, native balances, and a block timestamp. [`ExecutionEnvironment::transact`]
//! runs a body against a snapshot while holding the block lock; every other
//! entry point takes the same lock unless it is called from inside the running
//! transaction, so a rollback only ever undoes that transaction's own writes.

use crate::{TokenError, TokenInterface};
use async_trait::async_trait;
use liquidity_types::{
	verify_permit, Address, ChainError, ExecutionEnvironment, PermitDomain, PermitMessage,
	PermitSignature, SnapshotId, Transaction, U256,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, MutexGuard, RwLock};

static NEXT_CHAIN_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
	/// Instance id of the chain whose transaction the current task is running.
	static ACTIVE_CHAIN: u64;
}

/// How a token reacts to calls. Non-standard tokens return `false` instead of
/// reverting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenBehavior {
	#[default]
	Standard,
	/// `approve` returns `false` for non-zero amounts.
	ApproveReturnsFalse,
	/// `transfer` and `transferFrom` return `false` without moving funds.
	TransferReturnsFalse,
}

/// Static metadata of a deployed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
	pub name: String,
	pub symbol: String,
	pub decimals: u8,
	/// Whether the token implements ERC-2612 `permit`.
	pub permit: bool,
}

impl TokenMetadata {
	pub fn new(name: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
		Self {
			name: name.into(),
			symbol: symbol.into(),
			decimals,
			permit: false,
		}
	}

	pub fn with_permit(mut self) -> Self {
		self.permit = true;
		self
	}
}

#[derive(Debug, Clone)]
struct TokenState {
	metadata: TokenMetadata,
	behavior: TokenBehavior,
	total_supply: U256,
	balances: HashMap<Address, U256>,
	allowances: HashMap<(Address, Address), U256>,
	nonces: HashMap<Address, U256>,
}

impl TokenState {
	fn balance(&self, account: &Address) -> U256 {
		self.balances.get(account).copied().unwrap_or_default()
	}

	fn allowance(&self, owner: &Address, spender: &Address) -> U256 {
		self.allowances
			.get(&(*owner, *spender))
			.copied()
			.unwrap_or_default()
	}

	fn move_balance(
		&mut self,
		token: Address,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<(), TokenError> {
		let balance = self.balance(&from);
		if balance < amount {
			return Err(TokenError::InsufficientBalance {
				token,
				account: from,
				balance,
				needed: amount,
			});
		}
		self.balances.insert(from, balance - amount);
		*self.balances.entry(to).or_default() += amount;
		Ok(())
	}
}

#[derive(Debug, Clone, Default)]
struct ChainState {
	tokens: HashMap<Address, TokenState>,
	native: HashMap<Address, U256>,
	timestamp: u64,
}

impl ChainState {
	fn token(&self, token: &Address) -> Result<&TokenState, TokenError> {
		self.tokens
			.get(token)
			.ok_or(TokenError::UnknownToken(*token))
	}

	fn token_mut(&mut self, token: &Address) -> Result<&mut TokenState, TokenError> {
		self.tokens
			.get_mut(token)
			.ok_or(TokenError::UnknownToken(*token))
	}
}

#[derive(Debug, Default)]
struct SnapshotStack {
	next_id: u64,
	entries: Vec<(SnapshotId, ChainState)>,
}

impl SnapshotStack {
	fn position(&self, id: SnapshotId) -> Result<usize, ChainError> {
		self.entries
			.iter()
			.position(|(entry, _)| *entry == id)
			.ok_or(ChainError::UnknownSnapshot(id))
	}
}

/// In-memory chain implementing both the token surface and the execution
/// environment.
pub struct MemoryChain {
	chain_id: u64,
	/// Distinguishes this chain's transactions from other chains'.
	instance: u64,
	/// Held by the running transaction, and briefly by every call made outside it.
	block: Mutex<()>,
	/// Current state protected by a read-write lock.
	state: RwLock<ChainState>,
	/// Saved states, oldest first. Always locked before `state`.
	snapshots: Mutex<SnapshotStack>,
}

impl MemoryChain {
	/// Creates an empty chain with the clock at `timestamp`.
	pub fn new(chain_id: u64, timestamp: u64) -> Self {
		Self {
			chain_id,
			instance: NEXT_CHAIN_ID.fetch_add(1, Ordering::Relaxed),
			block: Mutex::new(()),
			state: RwLock::new(ChainState {
				timestamp,
				..Default::default()
			}),
			snapshots: Mutex::new(SnapshotStack::default()),
		}
	}

	/// Deploys a token at `address` with zero supply.
	pub async fn deploy_token(
		&self,
		address: Address,
		metadata: TokenMetadata,
	) -> Result<(), TokenError> {
		let _block = self.enter().await;
		let mut state = self.state.write().await;
		if state.tokens.contains_key(&address) {
			return Err(TokenError::AlreadyDeployed(address));
		}

		tracing::debug!(token = %address, symbol = %metadata.symbol, "Deployed token");
		state.tokens.insert(
			address,
			TokenState {
				metadata,
				behavior: TokenBehavior::Standard,
				total_supply: U256::ZERO,
				balances: HashMap::new(),
				allowances: HashMap::new(),
				nonces: HashMap::new(),
			},
		);
		Ok(())
	}

	pub async fn is_deployed(&self, token: Address) -> bool {
		let _block = self.enter().await;
		self.state.read().await.tokens.contains_key(&token)
	}

	pub async fn set_behavior(
		&self,
		token: Address,
		behavior: TokenBehavior,
	) -> Result<(), TokenError> {
		let _block = self.enter().await;
		self.state.write().await.token_mut(&token)?.behavior = behavior;
		Ok(())
	}

	/// Creates `amount` new tokens for `to`.
	pub async fn mint(&self, token: Address, to: Address, amount: U256) -> Result<(), TokenError> {
		let _block = self.enter().await;
		let mut state = self.state.write().await;
		let entry = state.token_mut(&token)?;
		entry.total_supply += amount;
		*entry.balances.entry(to).or_default() += amount;
		Ok(())
	}

	/// Destroys `amount` tokens held by `from`.
	pub async fn burn(&self, token: Address, from: Address, amount: U256) -> Result<(), TokenError> {
		let _block = self.enter().await;
		let mut state = self.state.write().await;
		let entry = state.token_mut(&token)?;
		let balance = entry.balance(&from);
		if balance < amount {
			return Err(TokenError::InsufficientBalance {
				token,
				account: from,
				balance,
				needed: amount,
			});
		}
		entry.balances.insert(from, balance - amount);
		entry.total_supply -= amount;
		Ok(())
	}

	pub async fn total_supply(&self, token: Address) -> Result<U256, TokenError> {
		let _block = self.enter().await;
		Ok(self.state.read().await.token(&token)?.total_supply)
	}

	pub async fn set_native_balance(&self, account: Address, amount: U256) {
		let _block = self.enter().await;
		self.state.write().await.native.insert(account, amount);
	}

	pub async fn advance_time(&self, seconds: u64) {
		let _block = self.enter().await;
		let mut state = self.state.write().await;
		state.timestamp = state.timestamp.saturating_add(seconds);
	}

	/// Number of snapshots currently held.
	pub async fn snapshot_depth(&self) -> usize {
		self.snapshots.lock().await.entries.len()
	}

	fn in_transaction(&self) -> bool {
		ACTIVE_CHAIN
			.try_with(|active| *active == self.instance)
			.unwrap_or(false)
	}

	/// Waits for the running transaction unless the caller is part of it.
	async fn enter(&self) -> Option<MutexGuard<'_, ()>> {
		if self.in_transaction() {
			None
		} else {
			Some(self.block.lock().await)
		}
	}

	async fn snapshot(&self) -> SnapshotId {
		let mut snapshots = self.snapshots.lock().await;
		let state = self.state.read().await.clone();
		snapshots.next_id += 1;
		let id = SnapshotId(snapshots.next_id);
		snapshots.entries.push((id, state));
		id
	}

	/// Restores the state captured by `id`, discarding it and any later snapshots.
	async fn revert_to(&self, id: SnapshotId) -> Result<(), ChainError> {
		let mut snapshots = self.snapshots.lock().await;
		let position = snapshots.position(id)?;
		let mut discarded = snapshots.entries.split_off(position);
		let (_, saved) = discarded.remove(0);
		*self.state.write().await = saved;
		tracing::debug!(snapshot = %id, "Reverted to snapshot");
		Ok(())
	}

	/// Releases `id` and any later snapshots, keeping the current state.
	async fn commit(&self, id: SnapshotId) -> Result<(), ChainError> {
		let mut snapshots = self.snapshots.lock().await;
		let position = snapshots.position(id)?;
		snapshots.entries.truncate(position);
		Ok(())
	}

	async fn run_snapshotted(&self, body: Transaction<'_>) -> Result<bool, ChainError> {
		let id = self.snapshot().await;
		let keep = body.await;
		if keep {
			self.commit(id).await?;
		} else {
			self.revert_to(id).await?;
		}
		Ok(keep)
	}
}

#[async_trait]
impl TokenInterface for MemoryChain {
	async fn name(&self, token: Address) -> Result<String, TokenError> {
		let _block = self.enter().await;
		Ok(self.state.read().await.token(&token)?.metadata.name.clone())
	}

	async fn balance_of(&self, token: Address, account: Address) -> Result<U256, TokenError> {
		let _block = self.enter().await;
		Ok(self.state.read().await.token(&token)?.balance(&account))
	}

	async fn allowance(
		&self,
		token: Address,
		owner: Address,
		spender: Address,
	) -> Result<U256, TokenError> {
		let _block = self.enter().await;
		Ok(self
			.state
			.read()
			.await
			.token(&token)?
			.allowance(&owner, &spender))
	}

	async fn approve(
		&self,
		token: Address,
		caller: Address,
		spender: Address,
		amount: U256,
	) -> Result<bool, TokenError> {
		let _block = self.enter().await;
		let mut state = self.state.write().await;
		let entry = state.token_mut(&token)?;
		if entry.behavior == TokenBehavior::ApproveReturnsFalse && !amount.is_zero() {
			return Ok(false);
		}
		entry.allowances.insert((caller, spender), amount);
		Ok(true)
	}

	async fn transfer(
		&self,
		token: Address,
		caller: Address,
		to: Address,
		amount: U256,
	) -> Result<bool, TokenError> {
		let _block = self.enter().await;
		let mut state = self.state.write().await;
		let entry = state.token_mut(&token)?;
		if entry.behavior == TokenBehavior::TransferReturnsFalse {
			return Ok(false);
		}
		entry.move_balance(token, caller, to, amount)?;
		Ok(true)
	}

	async fn transfer_from(
		&self,
		token: Address,
		caller: Address,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<bool, TokenError> {
		let _block = self.enter().await;
		let mut state = self.state.write().await;
		let entry = state.token_mut(&token)?;
		if entry.behavior == TokenBehavior::TransferReturnsFalse {
			return Ok(false);
		}

		let allowance = entry.allowance(&from, &caller);
		if allowance < amount {
			return Err(TokenError::InsufficientAllowance {
				token,
				owner: from,
				spender: caller,
				allowance,
				needed: amount,
			});
		}
		entry.move_balance(token, from, to, amount)?;
		// Infinite approvals are never decremented.
		if allowance != U256::MAX {
			entry.allowances.insert((from, caller), allowance - amount);
		}
		Ok(true)
	}

	async fn nonces(&self, token: Address, owner: Address) -> Result<U256, TokenError> {
		let _block = self.enter().await;
		let state = self.state.read().await;
		let entry = state.token(&token)?;
		if !entry.metadata.permit {
			return Err(TokenError::PermitUnsupported(token));
		}
		Ok(entry.nonces.get(&owner).copied().unwrap_or_default())
	}

	async fn permit_domain(&self, token: Address) -> Result<PermitDomain, TokenError> {
		let _block = self.enter().await;
		let state = self.state.read().await;
		let entry = state.token(&token)?;
		if !entry.metadata.permit {
			return Err(TokenError::PermitUnsupported(token));
		}
		Ok(PermitDomain::new(
			entry.metadata.name.clone(),
			self.chain_id,
			token,
		))
	}

	async fn permit(
		&self,
		token: Address,
		owner: Address,
		spender: Address,
		value: U256,
		deadline: u64,
		signature: &PermitSignature,
	) -> Result<(), TokenError> {
		let _block = self.enter().await;
		let mut state = self.state.write().await;
		let now = state.timestamp;
		let chain_id = self.chain_id;
		let entry = state.token_mut(&token)?;
		if !entry.metadata.permit {
			return Err(TokenError::PermitUnsupported(token));
		}

		let nonce = entry.nonces.get(&owner).copied().unwrap_or_default();
		let domain = PermitDomain::new(entry.metadata.name.clone(), chain_id, token);
		let message = PermitMessage {
			owner,
			spender,
			value,
			nonce,
			deadline,
		};
		verify_permit(&domain, &message, signature, now)?;

		entry.nonces.insert(owner, nonce + U256::from(1u64));
		entry.allowances.insert((owner, spender), value);
		Ok(())
	}
}

#[async_trait]
impl ExecutionEnvironment for MemoryChain {
	fn chain_id(&self) -> u64 {
		self.chain_id
	}

	async fn timestamp(&self) -> Result<u64, ChainError> {
		let _block = self.enter().await;
		Ok(self.state.read().await.timestamp)
	}

	async fn transact<'a>(&'a self, body: Transaction<'a>) -> Result<bool, ChainError> {
		if self.in_transaction() {
			return self.run_snapshotted(body).await;
		}
		let _block = self.block.lock().await;
		ACTIVE_CHAIN
			.scope(self.instance, self.run_snapshotted(body))
			.await
	}

	async fn native_balance(&self, account: Address) -> Result<U256, ChainError> {
		let _block = self.enter().await;
		Ok(self
			.state
			.read()
			.await
			.native
			.get(&account)
			.copied()
			.unwrap_or_default())
	}

	async fn transfer_value(
		&self,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<(), ChainError> {
		let _block = self.enter().await;
		let mut state = self.state.write().await;
		let available = state.native.get(&from).copied().unwrap_or_default();
		if available < amount {
			return Err(ChainError::InsufficientValue {
				account: from,
				available,
				required: amount,
			});
		}
		state.native.insert(from, available - amount);
		*state.native.entry(to).or_default() += amount;
		Ok(())
	}
}
