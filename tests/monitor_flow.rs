use alloy_primitives::{Address, B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wallet_sentinel::gateway::MessagingGateway;
use wallet_sentinel::ledger::{Direction, Ledger, WalletAddress};
use wallet_sentinel::monitor::WalletMonitor;
use wallet_sentinel::network::{NetworkDescriptor, NetworkSet, builtin_networks};
use wallet_sentinel::notify::Notifier;
use wallet_sentinel::registry::{MonitorRegistry, StartOutcome};
use wallet_sentinel::rpc::{BlockData, ChainReader, ReceiptData, TxData};

const WALLET: &str = "0xd8da6bf26964af9d7eed9e03e53415d37aa96045";
const OTHER: &str = "0x00000000219ab540356cbb839cbe05303d7705fa";

#[derive(Default)]
struct MockState {
    height: u64,
    blocks: HashMap<u64, BlockData>,
    receipts: HashMap<B256, ReceiptData>,
    fail_receipts: bool,
}

/// In-memory chain: blocks are appended by tests, reads behave like a node.
#[derive(Default)]
struct MockChain {
    state: Mutex<MockState>,
}

impl MockChain {
    fn new() -> Arc<Self> {
        Arc::new(MockChain::default())
    }

    /// Append a block holding the given transactions and return its height.
    fn push_block(&self, transactions: Vec<(TxData, ReceiptData)>) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.height += 1;
        let height = state.height;

        let mut bodies = Vec::new();
        for (tx, receipt) in transactions {
            state.receipts.insert(tx.hash, receipt);
            bodies.push(tx);
        }
        state.blocks.insert(
            height,
            BlockData {
                number: height,
                timestamp_secs: 1_700_000_000 + height,
                transactions: bodies,
            },
        );
        height
    }

    fn set_fail_receipts(&self, fail: bool) {
        self.state.lock().unwrap().fail_receipts = fail;
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn current_block_height(&self) -> Result<u64> {
        Ok(self.state.lock().unwrap().height)
    }

    async fn block_with_transactions(&self, height: u64) -> Result<Option<BlockData>> {
        Ok(self.state.lock().unwrap().blocks.get(&height).cloned())
    }

    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<TxData>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .blocks
            .values()
            .flat_map(|b| b.transactions.iter())
            .find(|tx| tx.hash == hash)
            .cloned())
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptData>> {
        let state = self.state.lock().unwrap();
        if state.fail_receipts {
            anyhow::bail!("receipt endpoint down");
        }
        Ok(state.receipts.get(&hash).cloned())
    }

    async fn native_balance(&self, _address: Address) -> Result<U256> {
        Ok(U256::from(10u64).pow(U256::from(18u64)))
    }
}

#[derive(Default)]
struct CaptureGateway {
    messages: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl MessagingGateway for CaptureGateway {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<()> {
        self.messages
            .lock()
            .unwrap()
            .push((recipient.to_string(), text.to_string()));
        Ok(())
    }
}

fn ethereum() -> NetworkDescriptor {
    builtin_networks()
        .into_iter()
        .find(|n| n.key == "ethereum")
        .unwrap()
}

fn transfer(from: &str, to: &str, seed: u8) -> (TxData, ReceiptData) {
    (
        TxData {
            hash: B256::repeat_byte(seed),
            from: Address::from_str(from).unwrap(),
            to: Some(Address::from_str(to).unwrap()),
            value: U256::from(10u64).pow(U256::from(18u64)),
            gas_price: Some(20_000_000_000),
        },
        ReceiptData {
            gas_used: 21_000,
            effective_gas_price: 20_000_000_000,
        },
    )
}

struct Fixture {
    chain: Arc<MockChain>,
    ledger: Arc<Ledger>,
    gateway: Arc<CaptureGateway>,
    monitor: WalletMonitor,
    wallet: WalletAddress,
}

fn fixture(user: &str) -> Fixture {
    let chain = MockChain::new();
    let ledger = Arc::new(Ledger::new());
    let gateway = Arc::new(CaptureGateway::default());
    let notifier = Arc::new(Notifier::new(
        Arc::clone(&gateway) as Arc<dyn MessagingGateway>
    ));
    let wallet = WalletAddress::parse(WALLET).unwrap();
    let monitor = WalletMonitor::new(
        user.to_string(),
        wallet,
        ethereum(),
        Arc::clone(&chain) as Arc<dyn ChainReader>,
        Arc::clone(&ledger),
        notifier,
    );

    Fixture {
        chain,
        ledger,
        gateway,
        monitor,
        wallet,
    }
}

#[tokio::test]
async fn first_tick_pins_cursor_to_current_height() {
    let f = fixture("alice");
    f.chain.push_block(vec![]);
    f.chain.push_block(vec![]);

    f.monitor.tick().await.unwrap();

    assert_eq!(f.ledger.cursor("alice", "ethereum", &f.wallet).await, Some(2));
    assert!(f.ledger.transactions("alice").await.is_empty());
}

#[tokio::test]
async fn tick_records_classifies_and_notifies() {
    let f = fixture("alice");
    f.monitor.tick().await.unwrap(); // cursor pinned at 0

    f.chain.push_block(vec![transfer(OTHER, WALLET, 0x11)]);
    f.monitor.tick().await.unwrap();

    let transactions = f.ledger.transactions("alice").await;
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].direction, Direction::Received);
    assert_eq!(transactions[0].block_number, 1);
    assert_eq!(f.ledger.cursor("alice", "ethereum", &f.wallet).await, Some(1));

    let messages = f.gateway.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "alice");
    assert!(messages[0].1.contains("received"));
    assert!(messages[0].1.contains("https://etherscan.io/tx/"));
}

#[tokio::test]
async fn replaying_a_block_does_not_duplicate_records() {
    let f = fixture("alice");
    f.monitor.tick().await.unwrap();

    f.chain.push_block(vec![transfer(OTHER, WALLET, 0x22)]);
    f.monitor.tick().await.unwrap();
    assert_eq!(f.ledger.transactions("alice").await.len(), 1);

    // Simulate crash recovery: rewind the cursor and poll again.
    f.ledger.set_cursor("alice", "ethereum", &f.wallet, 0).await;
    f.monitor.tick().await.unwrap();

    assert_eq!(f.ledger.transactions("alice").await.len(), 1);
    assert_eq!(f.gateway.messages.lock().unwrap().len(), 1);
    assert_eq!(f.ledger.cursor("alice", "ethereum", &f.wallet).await, Some(1));
}

#[tokio::test]
async fn transient_read_failure_leaves_cursor_behind() {
    let f = fixture("alice");
    f.monitor.tick().await.unwrap();

    f.chain.push_block(vec![transfer(WALLET, OTHER, 0x33)]);
    f.chain.set_fail_receipts(true);

    assert!(f.monitor.tick().await.is_err());
    assert_eq!(f.ledger.cursor("alice", "ethereum", &f.wallet).await, Some(0));
    assert!(f.ledger.transactions("alice").await.is_empty());

    // Next tick recovers and picks the block up exactly once.
    f.chain.set_fail_receipts(false);
    f.monitor.tick().await.unwrap();

    let transactions = f.ledger.transactions("alice").await;
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].direction, Direction::Sent);
    assert_eq!(f.ledger.cursor("alice", "ethereum", &f.wallet).await, Some(1));
}

#[tokio::test]
async fn cursor_only_advances_past_fully_processed_blocks() {
    let f = fixture("alice");
    f.monitor.tick().await.unwrap();

    f.chain.push_block(vec![]);
    f.chain.push_block(vec![transfer(OTHER, WALLET, 0x44)]);

    // Receipts are down: block 1 (empty) processes, block 2 aborts the tick.
    f.chain.set_fail_receipts(true);
    assert!(f.monitor.tick().await.is_err());
    assert_eq!(f.ledger.cursor("alice", "ethereum", &f.wallet).await, Some(1));

    f.chain.set_fail_receipts(false);
    f.monitor.tick().await.unwrap();
    assert_eq!(f.ledger.cursor("alice", "ethereum", &f.wallet).await, Some(2));
    assert_eq!(f.ledger.transactions("alice").await.len(), 1);
}

#[tokio::test]
async fn both_tracked_wallets_of_one_transfer_get_their_own_record() {
    let chain = MockChain::new();
    let ledger = Arc::new(Ledger::new());
    let gateway = Arc::new(CaptureGateway::default());
    let notifier = Arc::new(Notifier::new(
        Arc::clone(&gateway) as Arc<dyn MessagingGateway>
    ));

    let sender_wallet = WalletAddress::parse(WALLET).unwrap();
    let receiver_wallet = WalletAddress::parse(OTHER).unwrap();
    let sender_monitor = WalletMonitor::new(
        "alice".to_string(),
        sender_wallet,
        ethereum(),
        Arc::clone(&chain) as Arc<dyn ChainReader>,
        Arc::clone(&ledger),
        Arc::clone(&notifier),
    );
    let receiver_monitor = WalletMonitor::new(
        "alice".to_string(),
        receiver_wallet,
        ethereum(),
        Arc::clone(&chain) as Arc<dyn ChainReader>,
        Arc::clone(&ledger),
        notifier,
    );

    sender_monitor.tick().await.unwrap();
    receiver_monitor.tick().await.unwrap();

    chain.push_block(vec![transfer(WALLET, OTHER, 0x55)]);
    sender_monitor.tick().await.unwrap();
    receiver_monitor.tick().await.unwrap();

    let transactions = ledger.transactions("alice").await;
    assert_eq!(transactions.len(), 2);
    let directions: Vec<Direction> = transactions.iter().map(|t| t.direction).collect();
    assert!(directions.contains(&Direction::Sent));
    assert!(directions.contains(&Direction::Received));
    assert_eq!(gateway.messages.lock().unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn registry_enforces_one_task_per_tuple() {
    let chain = MockChain::new();
    let ledger = Arc::new(Ledger::new());
    let notifier = Arc::new(Notifier::new(
        Arc::new(CaptureGateway::default()) as Arc<dyn MessagingGateway>
    ));
    let mut readers: HashMap<String, Arc<dyn ChainReader>> = HashMap::new();
    readers.insert("ethereum".to_string(), Arc::clone(&chain) as Arc<dyn ChainReader>);
    let networks = NetworkSet::from_keys(&["ethereum".to_string()], builtin_networks()).unwrap();

    let registry = MonitorRegistry::new(
        Arc::clone(&ledger),
        notifier,
        readers,
        networks,
        Duration::from_millis(20),
    );

    let wallet = WalletAddress::parse(WALLET).unwrap();
    assert_eq!(
        registry.start("alice", wallet, "ethereum").await.unwrap(),
        StartOutcome::Started
    );
    assert_eq!(
        registry.start("alice", wallet, "ethereum").await.unwrap(),
        StartOutcome::AlreadyRunning
    );
    assert_eq!(registry.active_for_user("alice").await, 1);

    // Same wallet on another user is an independent tuple.
    assert_eq!(
        registry.start("bob", wallet, "ethereum").await.unwrap(),
        StartOutcome::Started
    );

    assert_eq!(registry.stop_all("alice").await, 1);
    assert_eq!(registry.stop_all("alice").await, 0);

    // After a stop the tuple can be started again, and stopped singly.
    assert_eq!(
        registry.start("alice", wallet, "ethereum").await.unwrap(),
        StartOutcome::Started
    );
    assert!(registry.stop("alice", &wallet, "ethereum").await);
    assert!(!registry.stop("alice", &wallet, "ethereum").await);

    registry.stop_all("bob").await;
}

#[tokio::test(flavor = "multi_thread")]
async fn spawned_monitor_observes_new_blocks() {
    let chain = MockChain::new();
    let ledger = Arc::new(Ledger::new());
    let gateway = Arc::new(CaptureGateway::default());
    let notifier = Arc::new(Notifier::new(
        Arc::clone(&gateway) as Arc<dyn MessagingGateway>
    ));
    let mut readers: HashMap<String, Arc<dyn ChainReader>> = HashMap::new();
    readers.insert("ethereum".to_string(), Arc::clone(&chain) as Arc<dyn ChainReader>);
    let networks = NetworkSet::from_keys(&["ethereum".to_string()], builtin_networks()).unwrap();

    let registry = MonitorRegistry::new(
        Arc::clone(&ledger),
        notifier,
        readers,
        networks,
        Duration::from_millis(20),
    );

    let wallet = WalletAddress::parse(WALLET).unwrap();
    registry.start("alice", wallet, "ethereum").await.unwrap();

    // Let the first tick pin the cursor, then feed a block.
    tokio::time::sleep(Duration::from_millis(60)).await;
    chain.push_block(vec![transfer(OTHER, WALLET, 0x66)]);
    tokio::time::sleep(Duration::from_millis(120)).await;

    let transactions = ledger.transactions("alice").await;
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].direction, Direction::Received);
    assert_eq!(gateway.messages.lock().unwrap().len(), 1);

    assert_eq!(registry.stop_all("alice").await, 1);
}
