//! Executor tests against a scripted in-process chain.
//!
//! Run with: cargo test --test executor

use std::{
    collections::BTreeMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use alloy_core::{
    json_abi::JsonAbi,
    primitives::{Address, B256, Bytes, address},
};
use badger_deploy::{
    ArtifactSource, BadgerConfig, ChainClient, ConfirmationPolicy, ConstructorArg,
    ContractArtifact, CreationReceipt, DeployError, DeployerAccount, DeployerBuilder,
    DeploymentOutcome, DeploymentStep, Executor, FileRecordStore, InMemoryRecordStore,
    NetworkConfig, NetworkProfile, Planner, RecordKey, RecordStore,
};
use tempdir::TempDir;
use tokio_util::sync::CancellationToken;

const ANVIL_KEY_0: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

const BADGE_SIGNER: &str = "0x28CeE427fCD58e5EF1cE4C93F877b621E2Db66df";
const BADGE_ROOT: &str = "0x51ea83562bdc7cdc587c6376a68642520256257a9d1a52d17c09131a3aeff8e9";

const BADGE_ABI: &str = r#"[
    {
        "type": "constructor",
        "stateMutability": "nonpayable",
        "inputs": [
            { "name": "signer", "type": "address", "internalType": "address" },
            { "name": "threshold", "type": "uint256", "internalType": "uint256" },
            { "name": "root", "type": "bytes32", "internalType": "bytes32" }
        ]
    }
]"#;

/// How the scripted chain answers receipt queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReceiptMode {
    Mined,
    Pending,
    Reverted,
}

/// A chain that deploys every creation instantly at a predictable address.
struct ScriptedChain {
    chain_id: u64,
    mode: ReceiptMode,
    /// Address handed to the next creation, instead of a counter-derived one.
    fixed_address: Option<Address>,
    submissions: AtomicUsize,
    receipt_polls: AtomicUsize,
    head: AtomicU64,
    /// Reject every creation, as a node would on insufficient funds.
    reject_submissions: AtomicBool,
    /// Fail `eth_getCode`, as an unreachable endpoint would.
    fail_code_lookup: AtomicBool,
    code: Mutex<BTreeMap<Address, Bytes>>,
    created: Mutex<BTreeMap<B256, Address>>,
}

impl ScriptedChain {
    fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            mode: ReceiptMode::Mined,
            fixed_address: None,
            submissions: AtomicUsize::new(0),
            receipt_polls: AtomicUsize::new(0),
            head: AtomicU64::new(1),
            reject_submissions: AtomicBool::new(false),
            fail_code_lookup: AtomicBool::new(false),
            code: Mutex::new(BTreeMap::new()),
            created: Mutex::new(BTreeMap::new()),
        }
    }

    fn with_mode(mut self, mode: ReceiptMode) -> Self {
        self.mode = mode;
        self
    }

    fn with_address(mut self, address: Address) -> Self {
        self.fixed_address = Some(address);
        self
    }

    fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    /// Forget all deployed code, as after a chain reset.
    fn reset_code(&self) {
        self.code.lock().unwrap().clear();
    }
}

impl ChainClient for ScriptedChain {
    async fn chain_id(&self) -> anyhow::Result<u64> {
        Ok(self.chain_id)
    }

    async fn code_at(&self, address: Address) -> anyhow::Result<Bytes> {
        anyhow::ensure!(
            !self.fail_code_lookup.load(Ordering::SeqCst),
            "connection refused"
        );
        Ok(self
            .code
            .lock()
            .unwrap()
            .get(&address)
            .cloned()
            .unwrap_or_default())
    }

    async fn submit_creation(
        &self,
        _deployer: &DeployerAccount,
        chain_id: u64,
        creation_code: &Bytes,
    ) -> anyhow::Result<B256> {
        anyhow::ensure!(chain_id == self.chain_id, "wrong chain id {chain_id}");
        anyhow::ensure!(!creation_code.is_empty(), "empty creation code");
        anyhow::ensure!(
            !self.reject_submissions.load(Ordering::SeqCst),
            "insufficient funds for gas * price + value"
        );

        let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        let transaction_hash = B256::with_last_byte(n as u8);
        let address = self
            .fixed_address
            .unwrap_or_else(|| Address::with_last_byte(0xa0 + n as u8));

        if self.mode == ReceiptMode::Mined {
            self.code
                .lock()
                .unwrap()
                .insert(address, Bytes::from_static(&[0x60, 0x80]));
        }
        self.created.lock().unwrap().insert(transaction_hash, address);

        Ok(transaction_hash)
    }

    async fn receipt(&self, transaction_hash: B256) -> anyhow::Result<Option<CreationReceipt>> {
        self.receipt_polls.fetch_add(1, Ordering::SeqCst);

        let address = self.created.lock().unwrap().get(&transaction_hash).copied();
        Ok(match self.mode {
            ReceiptMode::Pending => None,
            ReceiptMode::Reverted => Some(CreationReceipt {
                transaction_hash,
                contract_address: None,
                block_number: 1,
                success: false,
            }),
            ReceiptMode::Mined => Some(CreationReceipt {
                transaction_hash,
                contract_address: address,
                block_number: 1,
                success: true,
            }),
        })
    }

    async fn block_number(&self) -> anyhow::Result<u64> {
        Ok(self.head.fetch_add(1, Ordering::SeqCst))
    }
}

/// Initialize tracing for tests (idempotent).
fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}

fn config() -> BadgerConfig {
    let mut config = BadgerConfig::default();
    config.networks.insert(
        "testnet".to_string(),
        NetworkConfig {
            url: "http://localhost:8545".to_string(),
            chain_id: 5,
            accounts: vec![ANVIL_KEY_0.to_string()],
            confirmations: None,
            timeout_secs: None,
            poll_interval_ms: None,
        },
    );
    config
}

fn artifacts(bytecode: &'static [u8]) -> BTreeMap<String, ContractArtifact> {
    let abi: JsonAbi = serde_json::from_str(BADGE_ABI).expect("valid abi");
    BTreeMap::from([(
        "BadgeContract".to_string(),
        ContractArtifact {
            name: "BadgeContract".to_string(),
            abi,
            bytecode: Bytes::from_static(bytecode),
        },
    )])
}

fn badge_args(threshold: i64) -> Vec<ConstructorArg> {
    vec![
        ConstructorArg::Text(BADGE_SIGNER.to_string()),
        ConstructorArg::Integer(threshold),
        ConstructorArg::Text(BADGE_ROOT.to_string()),
    ]
}

fn profile(config: &BadgerConfig) -> NetworkProfile {
    Planner::new(config)
        .plan("testnet", "deployer")
        .expect("Failed to plan")
}

/// Plan and execute one deployment of `BadgeContract` on `testnet`.
async fn deploy(
    chain: &ScriptedChain,
    store: &impl RecordStore,
    bytecode: &'static [u8],
    args: &[ConstructorArg],
) -> Result<DeploymentOutcome, DeployError> {
    init_test_tracing();

    let config = config();
    let planner = Planner::new(&config);
    let profile = profile(&config);
    let artifact = artifacts(bytecode).load("BadgeContract")?;
    let request = planner.request(&artifact, args, &profile)?;

    Executor::new(chain, store)
        .ensure_deployed(&request, &profile)
        .await
}

const BYTECODE: &[u8] = &[0x60, 0x80, 0x60, 0x40, 0x52];
const OTHER_BYTECODE: &[u8] = &[0x60, 0x80, 0x60, 0x40, 0x52, 0x00];

#[tokio::test]
async fn test_deploys_badge_contract_on_testnet() {
    let temp_dir = TempDir::new("badger-test").expect("Failed to create temp dir");
    let deployed = address!("abc0000000000000000000000000000000000001");
    let chain = ScriptedChain::new(5).with_address(deployed);
    let store = FileRecordStore::new(temp_dir.path().join("deployments"));

    let outcome = deploy(&chain, &store, BYTECODE, &badge_args(5))
        .await
        .expect("Failed to deploy");

    assert_eq!(outcome.address, deployed);
    assert!(!outcome.reused);
    assert_eq!(chain.submissions(), 1);

    let record = store
        .get(&RecordKey::new("BadgeContract", "testnet"))
        .expect("Failed to read store")
        .expect("record written");
    assert_eq!(record.address, deployed);
    assert_eq!(record.chain_id, 5);
    assert_eq!(record.transaction_hash, outcome.transaction_hash);
    assert_eq!(
        record.args,
        vec![
            BADGE_SIGNER.to_string(),
            "5".to_string(),
            BADGE_ROOT.to_string()
        ]
    );
    assert_eq!(store.chain_id("testnet").expect("chain id"), Some(5));
}

#[tokio::test]
async fn test_identical_request_is_deployed_once() {
    let chain = ScriptedChain::new(5);
    let store = InMemoryRecordStore::new();

    let first = deploy(&chain, &store, BYTECODE, &badge_args(5))
        .await
        .expect("first deploy");
    let second = deploy(&chain, &store, BYTECODE, &badge_args(5))
        .await
        .expect("second deploy");

    assert_eq!(first.address, second.address);
    assert_eq!(first.transaction_hash, second.transaction_hash);
    assert!(second.reused);
    assert_eq!(chain.submissions(), 1);
}

#[tokio::test]
async fn test_changed_arguments_redeploy() {
    let chain = ScriptedChain::new(5);
    let store = InMemoryRecordStore::new();

    let first = deploy(&chain, &store, BYTECODE, &badge_args(5))
        .await
        .expect("first deploy");
    let second = deploy(&chain, &store, BYTECODE, &badge_args(6))
        .await
        .expect("second deploy");

    assert_ne!(first.address, second.address);
    assert!(!second.reused);
    assert_eq!(chain.submissions(), 2);

    let record = store
        .get(&RecordKey::new("BadgeContract", "testnet"))
        .expect("get")
        .expect("record written");
    assert_eq!(record.address, second.address);
    assert_eq!(record.args[1], "6");
}

#[tokio::test]
async fn test_changed_bytecode_redeploys() {
    let chain = ScriptedChain::new(5);
    let store = InMemoryRecordStore::new();

    deploy(&chain, &store, BYTECODE, &badge_args(5))
        .await
        .expect("first deploy");
    let second = deploy(&chain, &store, OTHER_BYTECODE, &badge_args(5))
        .await
        .expect("second deploy");

    assert!(!second.reused);
    assert_eq!(chain.submissions(), 2);
}

#[tokio::test]
async fn test_equivalent_argument_spellings_are_reused() {
    let chain = ScriptedChain::new(5);
    let store = InMemoryRecordStore::new();

    deploy(&chain, &store, BYTECODE, &badge_args(5))
        .await
        .expect("first deploy");

    let respelled = vec![
        ConstructorArg::Text(BADGE_SIGNER.to_lowercase()),
        ConstructorArg::Text("5".to_string()),
        ConstructorArg::Text(BADGE_ROOT.to_uppercase().replacen("0X", "0x", 1)),
    ];
    let second = deploy(&chain, &store, BYTECODE, &respelled)
        .await
        .expect("second deploy");

    assert!(second.reused);
    assert_eq!(chain.submissions(), 1);
}

#[tokio::test]
async fn test_stale_record_redeploys() {
    let chain = ScriptedChain::new(5);
    let store = InMemoryRecordStore::new();

    deploy(&chain, &store, BYTECODE, &badge_args(5))
        .await
        .expect("first deploy");
    chain.reset_code();

    let second = deploy(&chain, &store, BYTECODE, &badge_args(5))
        .await
        .expect("second deploy");

    assert!(!second.reused);
    assert_eq!(chain.submissions(), 2);
}

#[tokio::test]
async fn test_force_redeploys_identical_request() {
    let config = config();
    let planner = Planner::new(&config);
    let profile = profile(&config);
    let artifact = artifacts(BYTECODE).load("BadgeContract").expect("artifact");
    let request = planner
        .request(&artifact, &badge_args(5), &profile)
        .expect("request");

    let chain = ScriptedChain::new(5);
    let store = InMemoryRecordStore::new();
    let executor = Executor::new(&chain, &store);

    executor
        .ensure_deployed(&request, &profile)
        .await
        .expect("first deploy");
    let forced = Executor::new(&chain, &store)
        .force(true)
        .ensure_deployed(&request, &profile)
        .await
        .expect("forced deploy");

    assert!(!forced.reused);
    assert_eq!(chain.submissions(), 2);
}

#[tokio::test]
async fn test_argument_mismatch_fails_before_submission() {
    let chain = ScriptedChain::new(5);
    let store = InMemoryRecordStore::new();

    let err = deploy(&chain, &store, BYTECODE, &badge_args(5)[..2])
        .await
        .unwrap_err();

    match err {
        DeployError::ArgumentMismatch { contract, reason } => {
            assert_eq!(contract, "BadgeContract");
            assert!(reason.contains("expected 3"), "{reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(chain.submissions(), 0);
    assert!(store.list("testnet").expect("list").is_empty());
}

#[tokio::test]
async fn test_unknown_network_fails_with_configuration_error() {
    let deployer = DeployerBuilder::new("mainnet")
        .config(config())
        .contract("BadgeContract")
        .args(badge_args(5))
        .build()
        .expect("Failed to build deployer");

    let err = deployer.plan(&artifacts(BYTECODE)).unwrap_err();
    assert!(matches!(err, DeployError::Configuration(_)), "{err}");
}

#[tokio::test]
async fn test_chain_id_mismatch_fails_before_submission() {
    let chain = ScriptedChain::new(1);
    let store = InMemoryRecordStore::new();

    let err = deploy(&chain, &store, BYTECODE, &badge_args(5))
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Configuration(_)), "{err}");
    assert_eq!(chain.submissions(), 0);
}

#[tokio::test]
async fn test_reverted_creation_is_not_recorded() {
    let chain = ScriptedChain::new(5).with_mode(ReceiptMode::Reverted);
    let store = InMemoryRecordStore::new();

    let err = deploy(&chain, &store, BYTECODE, &badge_args(5))
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            DeployError::Deployment {
                step: DeploymentStep::Confirmation,
                ..
            }
        ),
        "{err}"
    );
    assert!(store.list("testnet").expect("list").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pending_creation_times_out() {
    let config = config();
    let planner = Planner::new(&config);
    let profile = profile(&config);
    let artifact = artifacts(BYTECODE).load("BadgeContract").expect("artifact");
    let request = planner
        .request(&artifact, &badge_args(5), &profile)
        .expect("request");

    let chain = ScriptedChain::new(5).with_mode(ReceiptMode::Pending);
    let store = InMemoryRecordStore::new();

    let err = Executor::new(&chain, &store)
        .with_policy(ConfirmationPolicy {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            confirmations: 1,
        })
        .ensure_deployed(&request, &profile)
        .await
        .unwrap_err();

    match err {
        DeployError::Timeout {
            transaction_hash,
            timeout,
        } => {
            assert_eq!(transaction_hash, B256::with_last_byte(1));
            assert_eq!(timeout, Duration::from_secs(10));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(chain.receipt_polls.load(Ordering::SeqCst) >= 10);
    assert!(store.list("testnet").expect("list").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_confirmation_is_not_recorded() {
    let config = config();
    let planner = Planner::new(&config);
    let profile = profile(&config);
    let artifact = artifacts(BYTECODE).load("BadgeContract").expect("artifact");
    let request = planner
        .request(&artifact, &badge_args(5), &profile)
        .expect("request");

    let chain = ScriptedChain::new(5).with_mode(ReceiptMode::Pending);
    let store = InMemoryRecordStore::new();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let err = Executor::new(&chain, &store)
        .with_cancellation(cancel)
        .ensure_deployed(&request, &profile)
        .await
        .unwrap_err();

    assert!(
        matches!(err, DeployError::Cancelled { transaction_hash } if transaction_hash == Some(B256::with_last_byte(1))),
        "{err}"
    );
    assert_eq!(chain.submissions(), 1);
    assert!(store.list("testnet").expect("list").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_required_confirmations() {
    let config = config();
    let planner = Planner::new(&config);
    let profile = profile(&config);
    let artifact = artifacts(BYTECODE).load("BadgeContract").expect("artifact");
    let request = planner
        .request(&artifact, &badge_args(5), &profile)
        .expect("request");

    let chain = ScriptedChain::new(5);
    let store = InMemoryRecordStore::new();

    Executor::new(&chain, &store)
        .with_policy(ConfirmationPolicy {
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            confirmations: 3,
        })
        .ensure_deployed(&request, &profile)
        .await
        .expect("Failed to deploy");

    // Head starts at the inclusion block and advances one block per query.
    assert_eq!(chain.head.load(Ordering::SeqCst), 4);
    assert_eq!(chain.receipt_polls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_cancelled_before_submission_sends_nothing() {
    init_test_tracing();

    let config = config();
    let planner = Planner::new(&config);
    let profile = profile(&config);
    let artifact = artifacts(BYTECODE).load("BadgeContract").expect("artifact");
    let request = planner
        .request(&artifact, &badge_args(5), &profile)
        .expect("request");

    let chain = ScriptedChain::new(5);
    let store = InMemoryRecordStore::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = Executor::new(&chain, &store)
        .with_cancellation(cancel)
        .ensure_deployed(&request, &profile)
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            DeployError::Cancelled {
                transaction_hash: None
            }
        ),
        "{err}"
    );
    assert_eq!(chain.submissions(), 0);
    assert!(store.list("testnet").expect("list").is_empty());
}

#[tokio::test]
async fn test_rejected_submission_is_not_recorded() {
    let chain = ScriptedChain::new(5);
    chain.reject_submissions.store(true, Ordering::SeqCst);
    let store = InMemoryRecordStore::new();

    let err = deploy(&chain, &store, BYTECODE, &badge_args(5))
        .await
        .unwrap_err();

    match &err {
        DeployError::Deployment {
            step: DeploymentStep::Submission,
            source,
        } => assert!(source.to_string().contains("insufficient funds"), "{source}"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(chain.submissions(), 0);
    assert!(store.list("testnet").expect("list").is_empty());
}

#[tokio::test]
async fn test_failed_code_lookup_is_a_preflight_error() {
    let chain = ScriptedChain::new(5);
    let store = InMemoryRecordStore::new();

    deploy(&chain, &store, BYTECODE, &badge_args(5))
        .await
        .expect("first deploy");
    chain.fail_code_lookup.store(true, Ordering::SeqCst);

    let err = deploy(&chain, &store, BYTECODE, &badge_args(5))
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            DeployError::Deployment {
                step: DeploymentStep::Preflight,
                ..
            }
        ),
        "{err}"
    );
    assert_eq!(chain.submissions(), 1);
}
