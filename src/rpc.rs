use alloy::consensus::BlockHeader as _;
use alloy::consensus::Transaction as _;
use alloy::network::TransactionResponse as _;
use alloy::providers::fillers::FillProvider;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::BlockNumberOrTag;
use alloy_primitives::{Address, B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

type AlloyFullProvider = FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::GasFiller,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::BlobGasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::NonceFiller,
                    alloy::providers::fillers::ChainIdFiller,
                >,
            >,
        >,
    >,
    alloy::providers::RootProvider,
>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A block with full transaction bodies, reduced to what monitoring needs.
#[derive(Debug, Clone)]
pub struct BlockData {
    pub number: u64,
    pub timestamp_secs: u64,
    pub transactions: Vec<TxData>,
}

#[derive(Debug, Clone)]
pub struct TxData {
    pub hash: B256,
    pub from: Address,
    /// None for contract-creation transactions.
    pub to: Option<Address>,
    pub value: U256,
    pub gas_price: Option<u128>,
}

#[derive(Debug, Clone)]
pub struct ReceiptData {
    pub gas_used: u64,
    pub effective_gas_price: u128,
}

/// Read-only view of one chain. Every call can fail transiently; callers
/// treat failures as "retry on the next tick", never as fatal.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn current_block_height(&self) -> Result<u64>;

    /// Block at `height` with full transaction bodies. `None` when the node
    /// does not (yet) serve that height.
    async fn block_with_transactions(&self, height: u64) -> Result<Option<BlockData>>;

    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<TxData>>;

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptData>>;

    async fn native_balance(&self, address: Address) -> Result<U256>;
}

/// JSON-RPC chain reader. Holds one provider per configured URL and rotates
/// to the next on error so a single flaky endpoint does not stall a monitor.
#[derive(Clone)]
pub struct RpcClient {
    providers: Vec<AlloyFullProvider>,
    urls: Vec<String>,
    current_provider: Arc<AtomicUsize>,
    max_retries: usize,
}

impl RpcClient {
    pub fn new(rpc_urls: &[String]) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(anyhow::anyhow!("At least one RPC URL must be provided"));
        }

        let mut providers = Vec::new();
        for url in rpc_urls {
            let parsed_url = url
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid RPC URL: {}", url))?;
            let provider: AlloyFullProvider = ProviderBuilder::new().connect_http(parsed_url);
            providers.push(provider);
        }

        Ok(RpcClient {
            providers,
            urls: rpc_urls.to_vec(),
            current_provider: Arc::new(AtomicUsize::new(0)),
            max_retries: 3,
        })
    }

    fn get_provider(&self) -> &AlloyFullProvider {
        let index = self.current_provider.load(Ordering::Relaxed) % self.providers.len();
        &self.providers[index]
    }

    pub fn get_current_url(&self) -> &str {
        let index = self.current_provider.load(Ordering::Relaxed) % self.urls.len();
        &self.urls[index]
    }

    pub fn rotate_provider(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.providers.len();
        self.current_provider.store(next, Ordering::Relaxed);

        if self.providers.len() > 1 {
            debug!("Rotating to RPC provider #{}", next);
        }
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }

    fn handle_error(&self, error_str: &str) {
        let current_url = self.get_current_url();
        warn!(
            "RPC error on {}: {}, rotating provider",
            current_url, error_str
        );
        self.rotate_provider();
    }

    fn handle_timeout(&self) -> anyhow::Error {
        let current_url = self.get_current_url();
        warn!(
            "Request timeout after {} seconds on {}, rotating provider",
            REQUEST_TIMEOUT.as_secs(),
            current_url
        );
        self.rotate_provider();
        anyhow::anyhow!(
            "Request timeout after {} seconds",
            REQUEST_TIMEOUT.as_secs()
        )
    }

    fn convert_block(block: alloy::rpc::types::Block) -> BlockData {
        let number = block.header.number();
        let timestamp_secs = block.header.timestamp();
        let transactions = block
            .transactions
            .into_transactions()
            .map(Self::convert_transaction)
            .collect();

        BlockData {
            number,
            timestamp_secs,
            transactions,
        }
    }

    fn convert_transaction(tx: alloy::rpc::types::Transaction) -> TxData {
        TxData {
            hash: tx.tx_hash(),
            from: tx.from(),
            to: tx.to(),
            value: tx.value(),
            gas_price: alloy::network::TransactionResponse::gas_price(&tx),
        }
    }
}

#[async_trait]
impl ChainReader for RpcClient {
    async fn current_block_height(&self) -> Result<u64> {
        let client = self.clone();
        Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            async move {
                let provider = client.get_provider();
                match timeout(REQUEST_TIMEOUT, provider.get_block_number()).await {
                    Ok(Ok(block_number)) => Ok(block_number),
                    Ok(Err(e)) => {
                        client.handle_error(&e.to_string());
                        Err(anyhow::anyhow!("{}", e))
                    }
                    Err(_) => Err(client.handle_timeout()),
                }
            }
        })
        .await
    }

    async fn block_with_transactions(&self, height: u64) -> Result<Option<BlockData>> {
        let client = self.clone();
        Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            async move {
                let provider = client.get_provider();
                let future = provider
                    .get_block_by_number(BlockNumberOrTag::Number(height))
                    .full();

                match timeout(REQUEST_TIMEOUT, future).await {
                    Ok(Ok(block)) => Ok(block.map(Self::convert_block)),
                    Ok(Err(e)) => {
                        client.handle_error(&e.to_string());
                        Err(anyhow::anyhow!("{}", e))
                    }
                    Err(_) => Err(client.handle_timeout()),
                }
            }
        })
        .await
    }

    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<TxData>> {
        let client = self.clone();
        Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            async move {
                let provider = client.get_provider();
                match timeout(REQUEST_TIMEOUT, provider.get_transaction_by_hash(hash)).await {
                    Ok(Ok(tx)) => Ok(tx.map(Self::convert_transaction)),
                    Ok(Err(e)) => {
                        client.handle_error(&e.to_string());
                        Err(anyhow::anyhow!("{}", e))
                    }
                    Err(_) => Err(client.handle_timeout()),
                }
            }
        })
        .await
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptData>> {
        let client = self.clone();
        Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            async move {
                let provider = client.get_provider();
                match timeout(REQUEST_TIMEOUT, provider.get_transaction_receipt(hash)).await {
                    Ok(Ok(receipt)) => Ok(receipt.map(|r| ReceiptData {
                        gas_used: r.gas_used,
                        effective_gas_price: r.effective_gas_price,
                    })),
                    Ok(Err(e)) => {
                        client.handle_error(&e.to_string());
                        Err(anyhow::anyhow!("{}", e))
                    }
                    Err(_) => Err(client.handle_timeout()),
                }
            }
        })
        .await
    }

    async fn native_balance(&self, address: Address) -> Result<U256> {
        let client = self.clone();
        Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            async move {
                let provider = client.get_provider();
                match timeout(REQUEST_TIMEOUT, provider.get_balance(address)).await {
                    Ok(Ok(balance)) => Ok(balance),
                    Ok(Err(e)) => {
                        client.handle_error(&e.to_string());
                        Err(anyhow::anyhow!("{}", e))
                    }
                    Err(_) => Err(client.handle_timeout()),
                }
            }
        })
        .await
    }
}
