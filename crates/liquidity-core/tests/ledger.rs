//! End-to-end ledger behavior against the in-memory chain and router.

use liquidity_account::AccountService;
use liquidity_config::Config;
use liquidity_core::{
	BuilderError, FailureKind, LedgerBuilder, LedgerFactories, LiquidityLedger, RejectedOperation,
};
use liquidity_router::implementations::memory::MemoryRouter;
use liquidity_router::RouterInterface;
use liquidity_token::implementations::memory::{MemoryChain, TokenBehavior, TokenMetadata};
use liquidity_token::TokenInterface;
use liquidity_types::{
	AddLiquidityEthParams, AddLiquidityParams, Address, AssetAmount, ChainError,
	ExecutionEnvironment, OperationOutcome, PermitMessage, PermitSignature, RemoveLiquidityParams,
	Transaction, B256, U256,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const NOW: u64 = 1_700_000_000;

const CONFIG: &str = r#"
[ledger]
address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
chain_id = 1

[router]
address = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D"
weth = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"

[account]
primary = "local"
[account.implementations.local]
private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"

[storage]
primary = "memory"
[storage.implementations.memory]
"#;

fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

fn e18(n: u64) -> U256 {
	U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
}

fn e6(n: u64) -> U256 {
	U256::from(n) * U256::from(1_000_000u64)
}

struct Harness {
	chain: Arc<MemoryChain>,
	router: Arc<MemoryRouter>,
	ledger: Arc<LiquidityLedger>,
	account: Arc<AccountService>,
	usdc: Address,
	dai: Address,
}

impl Harness {
	async fn new() -> Self {
		init_tracing();
		let config: Config = CONFIG.parse().unwrap();
		let chain = Arc::new(MemoryChain::new(1, NOW));

		let usdc = Address::repeat_byte(0xa0);
		let dai = Address::repeat_byte(0x6b);
		chain
			.deploy_token(usdc, TokenMetadata::new("USD Coin", "USDC", 6))
			.await
			.unwrap();
		chain
			.deploy_token(dai, TokenMetadata::new("Dai Stablecoin", "DAI", 18).with_permit())
			.await
			.unwrap();

		let router = Arc::new(
			MemoryRouter::deploy(chain.clone(), config.router.address, config.router.weth)
				.await
				.unwrap(),
		);
		let components = LedgerBuilder::new(config)
			.build(
				LedgerFactories::registered(),
				chain.clone(),
				chain.clone(),
				router.clone(),
			)
			.await
			.unwrap();

		Self {
			chain,
			router,
			ledger: components.ledger,
			account: components.account,
			usdc,
			dai,
		}
	}

	/// Mints `amount` to `owner` and approves the ledger for it.
	async fn fund(&self, token: Address, owner: Address, amount: U256) {
		self.chain.mint(token, owner, amount).await.unwrap();
		self.chain
			.approve(token, owner, self.ledger.address(), amount)
			.await
			.unwrap();
	}

	async fn balance(&self, token: Address, account: Address) -> U256 {
		self.chain.balance_of(token, account).await.unwrap()
	}

	fn add_params(&self, recipient: Address) -> AddLiquidityParams {
		AddLiquidityParams {
			token_a: self.usdc,
			token_b: self.dai,
			amount_a_desired: e6(100),
			amount_b_desired: e18(100),
			amount_a_min: e6(90),
			amount_b_min: e18(90),
			recipient,
			deadline: NOW + 600,
		}
	}

	fn eth_params(&self, recipient: Address) -> AddLiquidityEthParams {
		AddLiquidityEthParams {
			token: self.dai,
			amount_token_desired: e18(10),
			amount_token_min: e18(9),
			amount_eth_min: e18(1),
			recipient,
			deadline: NOW + 600,
		}
	}

	fn eth_pair(&self) -> Address {
		self.router
			.pair_address(self.dai, self.router.weth())
			.unwrap()
	}

	async fn sign_removal(&self, owner: Address, value: U256, deadline: u64) -> PermitSignature {
		let pair = self.eth_pair();
		let domain = self.chain.permit_domain(pair).await.unwrap();
		let nonce = self.chain.nonces(pair, owner).await.unwrap();
		self.account
			.sign_permit(
				&domain,
				PermitMessage {
					owner,
					spender: self.router.address(),
					value,
					nonce,
					deadline,
				},
			)
			.await
			.unwrap()
			.signature
	}

	/// Gives `owner` a DAI/WETH LP position through the ledger.
	async fn provide_eth_liquidity(&self, owner: Address) -> U256 {
		self.fund(self.dai, owner, e18(10)).await;
		self.chain.set_native_balance(owner, e18(5)).await;
		self.ledger
			.handle_add_liquidity_eth(owner, self.eth_params(owner), e18(1))
			.await
			.unwrap()
			.liquidity
	}
}

fn removal(token: Address, liquidity: U256, recipient: Address, signature: PermitSignature) -> RemoveLiquidityParams {
	RemoveLiquidityParams {
		token,
		liquidity,
		amount_token_min: U256::from(1u8),
		amount_eth_min: U256::from(1u8),
		recipient,
		deadline: NOW + 600,
		approve_max: false,
		signature,
	}
}

fn expect_kind<T: std::fmt::Debug>(result: Result<T, RejectedOperation>, kind: FailureKind) -> RejectedOperation {
	match result {
		Ok(value) => panic!("expected {:?}, got success {:?}", kind, value),
		Err(rejected) => {
			assert_eq!(rejected.kind(), kind, "unexpected error: {}", rejected.error);
			rejected
		},
	}
}

#[tokio::test]
async fn test_add_liquidity_records_operation() {
	let h = Harness::new().await;
	let user = Address::repeat_byte(0x11);
	let recipient = Address::repeat_byte(0x22);
	h.fund(h.usdc, user, e6(100)).await;
	h.fund(h.dai, user, e18(100)).await;

	assert_eq!(h.ledger.uniswap_router(), h.router.address());
	assert_eq!(h.ledger.liquidity_count().await, 0);

	let pair = h.router.pair_address(h.usdc, h.dai).unwrap();
	let minted = h
		.ledger
		.handle_add_liquidity(user, h.add_params(recipient))
		.await
		.unwrap();

	assert_eq!(h.ledger.liquidity_count().await, 1);
	assert!(minted.liquidity > U256::ZERO);
	assert_eq!(h.balance(pair, recipient).await, minted.liquidity);

	let operation = h.ledger.operation(1).await.unwrap().unwrap();
	assert_eq!(operation.operation_id, 1);
	assert_eq!(operation.amount_a, e6(100));
	assert_eq!(operation.amount_b, e18(100));
	assert_eq!(operation.liquidity, minted.liquidity);
	assert_eq!(operation.caller, user);
	assert_eq!(operation.recipient, recipient);
	assert_eq!(operation.timestamp, NOW);
	assert_eq!(operation.outcome, OperationOutcome::Success);
	assert!(h.ledger.operation(2).await.unwrap().is_none());
	assert!(h.ledger.operation(0).await.unwrap().is_none());

	// No custody or allowance outlives the call.
	let ledger = h.ledger.address();
	assert_eq!(h.balance(h.usdc, ledger).await, U256::ZERO);
	assert_eq!(h.balance(h.dai, ledger).await, U256::ZERO);
	assert_eq!(
		h.chain
			.allowance(h.dai, ledger, h.router.address())
			.await
			.unwrap(),
		U256::ZERO
	);
	assert_eq!(h.chain.snapshot_depth().await, 0);
}

#[tokio::test]
async fn test_unused_amounts_are_refunded() {
	let h = Harness::new().await;
	let user = Address::repeat_byte(0x11);
	h.fund(h.usdc, user, e6(200)).await;
	h.fund(h.dai, user, e18(250)).await;

	h.ledger
		.handle_add_liquidity(user, h.add_params(user))
		.await
		.unwrap();

	let mut generous = h.add_params(user);
	generous.amount_b_desired = e18(150);
	let minted = h
		.ledger
		.handle_add_liquidity(user, generous)
		.await
		.unwrap();

	assert_eq!(minted.amount_b, e18(100));
	assert_eq!(h.balance(h.dai, user).await, e18(50));
	assert_eq!(h.balance(h.dai, h.ledger.address()).await, U256::ZERO);
	assert_eq!(h.ledger.liquidity_count().await, 2);

	let ids: Vec<u64> = h
		.ledger
		.operations()
		.await
		.unwrap()
		.iter()
		.map(|op| op.operation_id)
		.collect();
	assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn test_min_above_desired_touches_nothing() {
	let h = Harness::new().await;
	let user = Address::repeat_byte(0x11);
	h.fund(h.usdc, user, e6(100)).await;
	h.fund(h.dai, user, e18(100)).await;

	let mut params = h.add_params(user);
	params.amount_a_min = e6(101);
	let rejected = expect_kind(
		h.ledger.handle_add_liquidity(user, params).await,
		FailureKind::InvalidParameters,
	);

	assert_eq!(
		rejected.unconsumed,
		vec![
			AssetAmount::token(h.usdc, e6(100)),
			AssetAmount::token(h.dai, e18(100)),
		]
	);
	assert_eq!(h.ledger.liquidity_count().await, 0);
	assert_eq!(h.balance(h.usdc, user).await, e6(100));
	assert!(h.router.pair_for(h.usdc, h.dai).await.unwrap().is_none());
}

#[tokio::test]
async fn test_past_deadline_is_invalid() {
	let h = Harness::new().await;
	let user = Address::repeat_byte(0x11);
	let mut params = h.add_params(user);
	params.deadline = NOW - 1;

	expect_kind(
		h.ledger.handle_add_liquidity(user, params).await,
		FailureKind::InvalidParameters,
	);

	h.fund(h.usdc, user, e6(100)).await;
	h.fund(h.dai, user, e18(100)).await;
	let mut params = h.add_params(user);
	params.deadline = NOW;
	expect_kind(
		h.ledger.handle_add_liquidity(user, params).await,
		FailureKind::InvalidParameters,
	);
	assert_eq!(h.balance(h.usdc, user).await, e6(100));

	params.deadline = NOW + 1;
	h.ledger.handle_add_liquidity(user, params).await.unwrap();
	assert_eq!(h.ledger.liquidity_count().await, 1);
}

#[tokio::test]
async fn test_transfer_failure_rolls_back_first_pull() {
	let h = Harness::new().await;
	let user = Address::repeat_byte(0x11);
	h.fund(h.usdc, user, e6(100)).await;
	// DAI balance without an approval for the ledger.
	h.chain.mint(h.dai, user, e18(100)).await.unwrap();

	expect_kind(
		h.ledger.handle_add_liquidity(user, h.add_params(user)).await,
		FailureKind::TransferFailed,
	);

	assert_eq!(h.balance(h.usdc, user).await, e6(100));
	assert_eq!(h.balance(h.usdc, h.ledger.address()).await, U256::ZERO);
	assert_eq!(
		h.chain
			.allowance(h.usdc, user, h.ledger.address())
			.await
			.unwrap(),
		e6(100)
	);
	assert_eq!(h.ledger.liquidity_count().await, 0);
	assert!(h.ledger.operations().await.unwrap().is_empty());
	assert_eq!(h.chain.snapshot_depth().await, 0);
}

#[tokio::test]
async fn test_false_approval_is_reported() {
	let h = Harness::new().await;
	let user = Address::repeat_byte(0x11);
	h.fund(h.usdc, user, e6(100)).await;
	h.fund(h.dai, user, e18(100)).await;
	h.chain
		.set_behavior(h.dai, TokenBehavior::ApproveReturnsFalse)
		.await
		.unwrap();

	expect_kind(
		h.ledger.handle_add_liquidity(user, h.add_params(user)).await,
		FailureKind::ApprovalFailed,
	);
	assert_eq!(h.balance(h.usdc, user).await, e6(100));
	assert_eq!(h.balance(h.dai, user).await, e18(100));
	assert_eq!(h.ledger.liquidity_count().await, 0);
}

#[tokio::test]
async fn test_slippage_leaves_count_and_balances() {
	let h = Harness::new().await;
	let user = Address::repeat_byte(0x11);
	h.fund(h.usdc, user, e6(300)).await;
	h.fund(h.dai, user, e18(300)).await;
	h.ledger
		.handle_add_liquidity(user, h.add_params(user))
		.await
		.unwrap();

	let usdc_before = h.balance(h.usdc, user).await;
	let dai_before = h.balance(h.dai, user).await;

	let mut skewed = h.add_params(user);
	skewed.amount_b_desired = e18(50);
	skewed.amount_b_min = e18(50);
	expect_kind(
		h.ledger.handle_add_liquidity(user, skewed).await,
		FailureKind::SlippageExceeded,
	);

	assert_eq!(h.ledger.liquidity_count().await, 1);
	assert_eq!(h.balance(h.usdc, user).await, usdc_before);
	assert_eq!(h.balance(h.dai, user).await, dai_before);
	assert_eq!(h.ledger.operations().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_eth_liquidity_refunds_unused_value() {
	let h = Harness::new().await;
	let user = Address::repeat_byte(0x11);
	h.fund(h.dai, user, e18(20)).await;
	h.chain.set_native_balance(user, e18(5)).await;

	h.ledger
		.handle_add_liquidity_eth(user, h.eth_params(user), e18(1))
		.await
		.unwrap();

	let minted = h
		.ledger
		.handle_add_liquidity_eth(user, h.eth_params(user), e18(2))
		.await
		.unwrap();
	assert_eq!(minted.amount_b, e18(1));
	assert_eq!(h.chain.native_balance(user).await.unwrap(), e18(3));
	assert_eq!(
		h.chain.native_balance(h.ledger.address()).await.unwrap(),
		U256::ZERO
	);

	let operation = h.ledger.operation(2).await.unwrap().unwrap();
	assert_eq!(operation.token_b, h.router.weth());
	assert_eq!(operation.amount_b, e18(1));
	assert_eq!(h.ledger.liquidity_count().await, 2);
}

#[tokio::test]
async fn test_eth_without_value_balance_fails() {
	let h = Harness::new().await;
	let user = Address::repeat_byte(0x11);
	h.fund(h.dai, user, e18(10)).await;

	let rejected = expect_kind(
		h.ledger
			.handle_add_liquidity_eth(user, h.eth_params(user), e18(1))
			.await,
		FailureKind::TransferFailed,
	);
	assert!(rejected.unconsumed.contains(&AssetAmount::native(e18(1))));
	assert_eq!(h.balance(h.dai, user).await, e18(10));
}

#[tokio::test]
async fn test_remove_with_permit_through_relayer() {
	let h = Harness::new().await;
	let owner = h.account.get_address().await.unwrap();
	let relayer = Address::repeat_byte(0x99);
	let liquidity = h.provide_eth_liquidity(owner).await;
	let native_before = h.chain.native_balance(owner).await.unwrap();
	let dai_before = h.balance(h.dai, owner).await;

	let signature = h.sign_removal(owner, liquidity, NOW + 600).await;
	let removed = h
		.ledger
		.handle_remove_liquidity_with_permit(
			relayer,
			owner,
			removal(h.dai, liquidity, owner, signature),
		)
		.await
		.unwrap();

	assert!(removed.amount_token > U256::ZERO);
	assert!(removed.amount_eth > U256::ZERO);
	assert_eq!(h.balance(h.eth_pair(), owner).await, U256::ZERO);
	assert_eq!(h.balance(h.dai, owner).await, dai_before + removed.amount_token);
	assert_eq!(
		h.chain.native_balance(owner).await.unwrap(),
		native_before + removed.amount_eth
	);
	// Removals are not counted.
	assert_eq!(h.ledger.liquidity_count().await, 1);
}

#[tokio::test]
async fn test_permit_replay_fails() {
	let h = Harness::new().await;
	let owner = h.account.get_address().await.unwrap();
	let liquidity = h.provide_eth_liquidity(owner).await;
	let half = liquidity / U256::from(2u8);

	let signature = h.sign_removal(owner, half, NOW + 600).await;
	let params = removal(h.dai, half, owner, signature);
	h.ledger
		.handle_remove_liquidity_with_permit(owner, owner, params)
		.await
		.unwrap();

	let rejected = expect_kind(
		h.ledger
			.handle_remove_liquidity_with_permit(owner, owner, params)
			.await,
		FailureKind::InvalidSignature,
	);
	assert_eq!(
		rejected.unconsumed,
		vec![AssetAmount::liquidity(h.dai, half)]
	);
	assert_eq!(h.balance(h.eth_pair(), owner).await, liquidity - half);
	assert_eq!(
		h.chain.nonces(h.eth_pair(), owner).await.unwrap(),
		U256::from(1u8)
	);
}

#[tokio::test]
async fn test_expired_permit_regardless_of_signature() {
	let h = Harness::new().await;
	let owner = h.account.get_address().await.unwrap();
	let liquidity = h.provide_eth_liquidity(owner).await;

	let mut params = removal(h.dai, liquidity, owner, h.sign_removal(owner, liquidity, NOW + 10).await);
	params.deadline = NOW + 10;
	h.chain.advance_time(11).await;
	expect_kind(
		h.ledger
			.handle_remove_liquidity_with_permit(owner, owner, params)
			.await,
		FailureKind::ExpiredAuthorization,
	);

	params.signature = PermitSignature {
		v: 0,
		r: B256::ZERO,
		s: B256::ZERO,
	};
	expect_kind(
		h.ledger
			.handle_remove_liquidity_with_permit(owner, owner, params)
			.await,
		FailureKind::ExpiredAuthorization,
	);

	assert_eq!(h.chain.nonces(h.eth_pair(), owner).await.unwrap(), U256::ZERO);
	assert_eq!(h.balance(h.eth_pair(), owner).await, liquidity);
}

#[tokio::test]
async fn test_permit_must_cover_exact_liquidity() {
	let h = Harness::new().await;
	let owner = h.account.get_address().await.unwrap();
	let liquidity = h.provide_eth_liquidity(owner).await;

	let signature = h.sign_removal(owner, liquidity, NOW + 600).await;
	let short = removal(h.dai, liquidity - U256::from(1u8), owner, signature);
	expect_kind(
		h.ledger
			.handle_remove_liquidity_with_permit(owner, owner, short)
			.await,
		FailureKind::InvalidSignature,
	);

	// A max-value permit covers any amount.
	let signature = h.sign_removal(owner, U256::MAX, NOW + 600).await;
	let mut max = removal(h.dai, liquidity - U256::from(1u8), owner, signature);
	max.approve_max = true;
	h.ledger
		.handle_remove_liquidity_with_permit(owner, owner, max)
		.await
		.unwrap();
	assert_eq!(h.balance(h.eth_pair(), owner).await, U256::from(1u8));
}

#[tokio::test]
async fn test_zero_removal_minimums_rejected() {
	let h = Harness::new().await;
	let owner = h.account.get_address().await.unwrap();
	let liquidity = h.provide_eth_liquidity(owner).await;

	let mut params = removal(
		h.dai,
		liquidity,
		owner,
		h.sign_removal(owner, liquidity, NOW + 600).await,
	);
	params.amount_eth_min = U256::ZERO;
	expect_kind(
		h.ledger
			.handle_remove_liquidity_with_permit(owner, owner, params)
			.await,
		FailureKind::InvalidParameters,
	);
}

#[tokio::test]
async fn test_remove_slippage_keeps_nonce() {
	let h = Harness::new().await;
	let owner = h.account.get_address().await.unwrap();
	let liquidity = h.provide_eth_liquidity(owner).await;

	let mut params = removal(
		h.dai,
		liquidity,
		owner,
		h.sign_removal(owner, liquidity, NOW + 600).await,
	);
	params.amount_eth_min = e18(1_000);
	expect_kind(
		h.ledger
			.handle_remove_liquidity_with_permit(owner, owner, params)
			.await,
		FailureKind::SlippageExceeded,
	);

	// The pair consumed the permit before the check failed; the revert undoes it.
	assert_eq!(h.chain.nonces(h.eth_pair(), owner).await.unwrap(), U256::ZERO);
	assert_eq!(h.balance(h.eth_pair(), owner).await, liquidity);
}

#[tokio::test]
async fn test_concurrent_adds_count_exactly() {
	let h = Harness::new().await;
	let users: Vec<Address> = (1..=8u8).map(Address::repeat_byte).collect();
	for user in &users {
		h.fund(h.usdc, *user, e6(100)).await;
		h.fund(h.dai, *user, e18(100)).await;
	}

	let mut handles = Vec::new();
	for user in users {
		let ledger = h.ledger.clone();
		let params = h.add_params(user);
		handles.push(tokio::spawn(async move {
			ledger.handle_add_liquidity(user, params).await
		}));
	}
	for handle in handles {
		handle.await.unwrap().unwrap();
	}

	assert_eq!(h.ledger.liquidity_count().await, 8);
	let mut ids: Vec<u64> = h
		.ledger
		.operations()
		.await
		.unwrap()
		.into_iter()
		.map(|op| op.operation_id)
		.collect();
	ids.sort_unstable();
	assert_eq!(ids, (1..=8).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_builder_rejects_mismatched_backends() {
	let config: Config = CONFIG.parse().unwrap();
	let chain = Arc::new(MemoryChain::new(5, NOW));
	let router = Arc::new(
		MemoryRouter::deploy(chain.clone(), config.router.address, config.router.weth)
			.await
			.unwrap(),
	);

	let result = LedgerBuilder::new(config)
		.build(LedgerFactories::registered(), chain.clone(), chain.clone(), router)
		.await;
	assert!(matches!(result, Err(BuilderError::Config(message)) if message.contains("chain 5")));
}

#[tokio::test]
async fn test_default_deadline_follows_clock() {
	let h = Harness::new().await;
	assert_eq!(h.ledger.default_deadline().await.unwrap(), NOW + 600);
	h.chain.advance_time(100).await;
	assert_eq!(h.ledger.default_deadline().await.unwrap(), NOW + 700);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_outside_transfers_survive_failed_adds() {
	let h = Harness::new().await;
	let user = Address::repeat_byte(0x11);
	let alice = Address::repeat_byte(0xa1);
	let bob = Address::repeat_byte(0xb0);
	h.fund(h.usdc, user, e6(100)).await;
	// DAI balance without an approval, so every add reverts after pulling USDC.
	h.chain.mint(h.dai, user, e18(100)).await.unwrap();
	h.chain.mint(h.usdc, alice, e6(50)).await.unwrap();

	let chain = h.chain.clone();
	let usdc = h.usdc;
	let bystander = tokio::spawn(async move {
		for _ in 0..50 {
			assert!(chain.transfer(usdc, alice, bob, e6(1)).await.unwrap());
			tokio::task::yield_now().await;
		}
	});

	let mut adds = Vec::new();
	for _ in 0..20 {
		let ledger = h.ledger.clone();
		let params = h.add_params(user);
		adds.push(tokio::spawn(async move {
			ledger.handle_add_liquidity(user, params).await
		}));
	}
	for add in adds {
		let rejected = add.await.unwrap().unwrap_err();
		assert_eq!(rejected.kind(), FailureKind::TransferFailed);
	}
	bystander.await.unwrap();

	assert_eq!(h.balance(h.usdc, bob).await, e6(50));
	assert_eq!(h.balance(h.usdc, alice).await, U256::ZERO);
	assert_eq!(h.balance(h.usdc, user).await, e6(100));
	assert_eq!(h.ledger.liquidity_count().await, 0);
	assert_eq!(h.chain.snapshot_depth().await, 0);
}

#[tokio::test]
async fn test_second_ledger_keeps_adds_when_first_reverts() {
	let h = Harness::new().await;
	let mut config: Config = CONFIG.parse().unwrap();
	config.ledger.address = Address::repeat_byte(0x5e);
	let other = LedgerBuilder::new(config)
		.build(
			LedgerFactories::registered(),
			h.chain.clone(),
			h.chain.clone(),
			h.router.clone(),
		)
		.await
		.unwrap()
		.ledger;

	let user = Address::repeat_byte(0x11);
	let failing = Address::repeat_byte(0x12);
	h.chain.mint(h.usdc, user, e6(100)).await.unwrap();
	h.chain.mint(h.dai, user, e18(100)).await.unwrap();
	h.chain
		.approve(h.usdc, user, other.address(), e6(100))
		.await
		.unwrap();
	h.chain
		.approve(h.dai, user, other.address(), e18(100))
		.await
		.unwrap();
	h.fund(h.usdc, failing, e6(100)).await;

	let (kept, reverted) = tokio::join!(
		other.handle_add_liquidity(user, h.add_params(user)),
		h.ledger.handle_add_liquidity(failing, h.add_params(failing)),
	);
	let minted = kept.unwrap();
	assert_eq!(
		reverted.unwrap_err().kind(),
		FailureKind::TransferFailed
	);

	let pair = h.router.pair_address(h.usdc, h.dai).unwrap();
	assert_eq!(h.balance(pair, user).await, minted.liquidity);
	assert_eq!(other.liquidity_count().await, 1);
	assert_eq!(h.ledger.liquidity_count().await, 0);
	assert_eq!(h.balance(h.usdc, failing).await, e6(100));
}

/// Runs every transaction on the chain but refuses to commit it.
struct RefusingEnvironment {
	chain: Arc<MemoryChain>,
}

#[async_trait::async_trait]
impl ExecutionEnvironment for RefusingEnvironment {
	fn chain_id(&self) -> u64 {
		self.chain.chain_id()
	}

	async fn timestamp(&self) -> Result<u64, ChainError> {
		self.chain.timestamp().await
	}

	async fn transact<'a>(&'a self, body: Transaction<'a>) -> Result<bool, ChainError> {
		self.chain
			.transact(Box::pin(async move {
				body.await;
				false
			}))
			.await?;
		Err(ChainError::Backend("commit refused".into()))
	}

	async fn native_balance(&self, account: Address) -> Result<U256, ChainError> {
		self.chain.native_balance(account).await
	}

	async fn transfer_value(&self, from: Address, to: Address, amount: U256) -> Result<(), ChainError> {
		self.chain.transfer_value(from, to, amount).await
	}
}

#[tokio::test]
async fn test_refused_commit_leaves_no_record() {
	let h = Harness::new().await;
	let config: Config = CONFIG.parse().unwrap();
	let ledger = LedgerBuilder::new(config)
		.build(
			LedgerFactories::registered(),
			Arc::new(RefusingEnvironment {
				chain: h.chain.clone(),
			}),
			h.chain.clone(),
			h.router.clone(),
		)
		.await
		.unwrap()
		.ledger;

	let user = Address::repeat_byte(0x11);
	h.fund(h.usdc, user, e6(100)).await;
	h.fund(h.dai, user, e18(100)).await;

	expect_kind(
		ledger.handle_add_liquidity(user, h.add_params(user)).await,
		FailureKind::Internal,
	);
	assert_eq!(ledger.liquidity_count().await, 0);
	assert!(ledger.operation(1).await.unwrap().is_none());
	assert!(ledger.operations().await.unwrap().is_empty());
	assert_eq!(h.balance(h.usdc, user).await, e6(100));
}
