//! In-memory L1 and L2 chains for running the batch submitter end to end.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use alloy::consensus::{Transaction, TxEnvelope};
use alloy::eips::Decodable2718;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use batch_submitter_batch_encoder::{AppendSequencerBatchParams, EncodedBatch};
use batch_submitter_contract_interface::{CommittedElements, L1Client, L2BlockSource};
use batch_submitter_service::{
    BatchSubmitter, FailureKind, SequencerDriver, SequencerDriverConfig, SubmitterTelemetry,
};
use batch_submitter_tx_manager::{Confirmation, TxManager, TxManagerConfig};
use batch_submitter_types::{
    L2Block, L2Transaction, QueueOrigin, SignedTx, SubmissionRange, TxReceipt,
};

pub const CTC_ADDRESS: Address = Address::repeat_byte(0xcc);
pub const L1_CHAIN_ID: u64 = 31_337;
pub const GWEI: u128 = 1_000_000_000;
const OPERATOR_KEY: &str = "0x7726827caac94a7f9e1b160f7ea819f172f7b6f9d2a97f992c38edeab82d4110";

/// When the fake L1 includes broadcast transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningPolicy {
    /// Every valid transaction is mined as soon as it is broadcast.
    Immediately,
    /// Only the n-th broadcast (1-based) for the current nonce is mined.
    OnAttempt(usize),
    Never,
}

/// A broadcast seen by the fake L1.
#[derive(Debug, Clone)]
pub struct Broadcast {
    pub hash: TxHash,
    pub nonce: u64,
    pub gas_price: u128,
    pub calldata_len: usize,
}

/// Batch appended to the fake canonical transaction chain.
#[derive(Debug, Clone)]
pub struct AppendedBatch {
    pub block_number: u64,
    pub params: AppendSequencerBatchParams,
}

#[derive(Debug)]
struct L1State {
    mining: MiningPolicy,
    gas_price: u128,
    balance: U256,
    block_number: u64,
    nonce: u64,
    attempts_for_nonce: usize,
    total_elements: u64,
    broadcasts: Vec<Broadcast>,
    receipts: HashMap<TxHash, TxReceipt>,
    batches: Vec<AppendedBatch>,
}

/// L1 node with a canonical transaction chain that accepts batches from a single operator.
#[derive(Debug)]
pub struct FakeL1 {
    state: Mutex<L1State>,
}

impl FakeL1 {
    pub fn new(total_elements: u64) -> Self {
        Self {
            state: Mutex::new(L1State {
                mining: MiningPolicy::Immediately,
                gas_price: 10 * GWEI,
                balance: U256::from(10_u128 * GWEI * GWEI),
                block_number: 1_000,
                nonce: 0,
                attempts_for_nonce: 0,
                total_elements,
                broadcasts: Vec::new(),
                receipts: HashMap::new(),
                batches: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, L1State> {
        self.state.lock().unwrap()
    }

    pub fn set_mining(&self, mining: MiningPolicy) {
        self.state().mining = mining;
    }

    pub fn committed_elements(&self) -> u64 {
        self.state().total_elements
    }

    pub fn broadcasts(&self) -> Vec<Broadcast> {
        self.state().broadcasts.clone()
    }

    pub fn batches(&self) -> Vec<AppendedBatch> {
        self.state().batches.clone()
    }

    pub fn mine_empty_blocks(&self, count: u64) {
        self.state().block_number += count;
    }
}

impl L1State {
    fn should_mine(&self) -> bool {
        match self.mining {
            MiningPolicy::Immediately => true,
            MiningPolicy::OnAttempt(n) => self.attempts_for_nonce == n,
            MiningPolicy::Never => false,
        }
    }

    /// Applies the batch like the contract would: it must continue exactly where the chain ends.
    fn mine(&mut self, hash: TxHash, envelope: &TxEnvelope) {
        self.block_number += 1;
        self.nonce += 1;
        self.attempts_for_nonce = 0;

        let params = AppendSequencerBatchParams::decode_calldata(envelope.input()).ok();
        let success = match params {
            Some(params) if params.should_start_at_element == self.total_elements => {
                self.total_elements += params.total_elements_to_append;
                self.batches.push(AppendedBatch {
                    block_number: self.block_number,
                    params,
                });
                true
            }
            _ => false,
        };
        let receipt = TxReceipt {
            tx_hash: hash,
            block_number: self.block_number,
            gas_used: 21_000 + 16 * envelope.input().len() as u64,
            success,
        };
        self.receipts.insert(hash, receipt);
    }
}

#[async_trait::async_trait]
impl L1Client for FakeL1 {
    async fn balance_at(&self, _address: Address) -> anyhow::Result<U256> {
        Ok(self.state().balance)
    }

    async fn nonce_at(&self, _address: Address) -> anyhow::Result<u64> {
        Ok(self.state().nonce)
    }

    async fn suggest_gas_price(&self) -> anyhow::Result<u128> {
        Ok(self.state().gas_price)
    }

    async fn estimate_gas_limit(&self, request: TransactionRequest) -> anyhow::Result<u64> {
        let input_len = request.input.input().map_or(0, |input| input.len());
        Ok(21_000 + 16 * input_len as u64)
    }

    async fn send_signed_transaction(&self, tx: &SignedTx) -> anyhow::Result<TxHash> {
        let mut raw: &[u8] = &tx.raw;
        let envelope = TxEnvelope::decode_2718(&mut raw)
            .map_err(|err| anyhow::anyhow!("malformed raw transaction: {err}"))?;
        anyhow::ensure!(*envelope.tx_hash() == tx.hash, "transaction hash mismatch");
        anyhow::ensure!(envelope.to() == Some(CTC_ADDRESS), "unexpected recipient");
        anyhow::ensure!(envelope.chain_id() == Some(L1_CHAIN_ID), "wrong chain id");

        let mut state = self.state();
        anyhow::ensure!(
            envelope.nonce() == state.nonce,
            "nonce too low: expected {}, got {}",
            state.nonce,
            envelope.nonce()
        );
        state.attempts_for_nonce += 1;
        state.broadcasts.push(Broadcast {
            hash: tx.hash,
            nonce: envelope.nonce(),
            gas_price: envelope.gas_price().unwrap_or_default(),
            calldata_len: envelope.input().len(),
        });
        if state.should_mine() {
            state.mine(tx.hash, &envelope);
        }
        Ok(tx.hash)
    }

    async fn transaction_receipt(&self, hash: TxHash) -> anyhow::Result<Option<TxReceipt>> {
        Ok(self.state().receipts.get(&hash).cloned())
    }

    async fn latest_block_number(&self) -> anyhow::Result<u64> {
        Ok(self.state().block_number)
    }
}

#[async_trait::async_trait]
impl CommittedElements for FakeL1 {
    async fn total_elements(&self) -> anyhow::Result<u64> {
        Ok(self.state().total_elements)
    }
}

/// L2 node serving a fixed set of blocks.
#[derive(Debug, Default)]
pub struct FakeL2 {
    blocks: Mutex<BTreeMap<u64, L2Block>>,
}

impl FakeL2 {
    pub fn with_blocks(blocks: impl IntoIterator<Item = L2Block>) -> Self {
        let blocks = blocks.into_iter().map(|block| (block.number, block)).collect();
        Self {
            blocks: Mutex::new(blocks),
        }
    }

    /// Sequencer blocks `numbers` sharing a timestamp, each holding a `tx_len` byte transaction.
    pub fn sequencer_blocks(numbers: std::ops::Range<u64>, tx_len: usize) -> Self {
        Self::with_blocks(numbers.map(|number| sequencer_block(number, 1_700_000_000, tx_len)))
    }

    pub fn push_block(&self, block: L2Block) {
        self.blocks.lock().unwrap().insert(block.number, block);
    }
}

#[async_trait::async_trait]
impl L2BlockSource for FakeL2 {
    async fn head_block_number(&self) -> anyhow::Result<u64> {
        let blocks = self.blocks.lock().unwrap();
        Ok(blocks.last_key_value().map_or(0, |(number, _)| *number))
    }

    async fn block_by_number(&self, number: u64) -> anyhow::Result<L2Block> {
        self.blocks
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("block #{number} not found"))
    }
}

pub fn sequencer_block(number: u64, timestamp: u64, tx_len: usize) -> L2Block {
    L2Block {
        number,
        timestamp,
        transactions: vec![L2Transaction {
            queue_origin: QueueOrigin::Sequencer,
            l1_block_number: 900,
            raw: Bytes::from(vec![(number % 251) as u8; tx_len]),
        }],
    }
}

pub fn queue_block(number: u64, timestamp: u64, l1_block_number: u64) -> L2Block {
    L2Block {
        number,
        timestamp,
        transactions: vec![L2Transaction {
            queue_origin: QueueOrigin::L1,
            l1_block_number,
            raw: Bytes::new(),
        }],
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmedBatch {
    pub range: SubmissionRange,
    pub gas_price: u128,
    pub attempts: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct Recorded {
    balances: Vec<U256>,
    built: Vec<SubmissionRange>,
    signed_sizes: Vec<usize>,
    confirmed: Vec<ConfirmedBatch>,
    failures: Vec<FailureKind>,
}

/// Keeps everything the service reports so tests can inspect it.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    recorded: Mutex<Recorded>,
}

impl RecordingTelemetry {
    pub fn balance_reads(&self) -> usize {
        self.recorded.lock().unwrap().balances.len()
    }

    pub fn built(&self) -> Vec<SubmissionRange> {
        self.recorded.lock().unwrap().built.clone()
    }

    pub fn signed_sizes(&self) -> Vec<usize> {
        self.recorded.lock().unwrap().signed_sizes.clone()
    }

    pub fn confirmed(&self) -> Vec<ConfirmedBatch> {
        self.recorded.lock().unwrap().confirmed.clone()
    }

    pub fn failures(&self) -> Vec<FailureKind> {
        self.recorded.lock().unwrap().failures.clone()
    }
}

impl SubmitterTelemetry for RecordingTelemetry {
    fn record_balance(&self, balance: U256) {
        self.recorded.lock().unwrap().balances.push(balance);
    }

    fn record_batch_built(&self, batch: &EncodedBatch, _build_time: Duration) {
        self.recorded.lock().unwrap().built.push(batch.range);
    }

    fn record_batch_size(&self, size: usize) {
        self.recorded.lock().unwrap().signed_sizes.push(size);
    }

    fn record_confirmation(&self, batch: &EncodedBatch, confirmation: &Confirmation) {
        self.recorded.lock().unwrap().confirmed.push(ConfirmedBatch {
            range: batch.range,
            gas_price: confirmation.gas_price,
            attempts: confirmation.attempts,
            elapsed: confirmation.elapsed,
        });
    }

    fn record_failure(&self, kind: FailureKind) {
        self.recorded.lock().unwrap().failures.push(kind);
    }
}

/// Knobs of a [`Tester`] setup.
#[derive(Debug, Clone)]
pub struct TesterConfig {
    pub committed_elements: u64,
    pub block_offset: u64,
    pub max_tx_size: usize,
    pub prune_percent: u8,
    pub poll_interval: Duration,
    pub tx_manager: TxManagerConfig,
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            committed_elements: 0,
            block_offset: 0,
            max_tx_size: 90_000,
            prune_percent: 10,
            poll_interval: Duration::from_secs(15),
            tx_manager: TxManagerConfig {
                min_gas_price_gwei: 1,
                max_gas_price_gwei: 100,
                gas_price_multiplier: 1.5,
                resubmission_timeout: Duration::from_secs(60),
                receipt_query_interval: Duration::from_secs(5),
                confirmation_timeout: Duration::from_secs(300),
                num_confirmations: 1,
            },
        }
    }
}

/// Batch submitter wired to in-memory chains, signing with a fixed operator key.
#[derive(Debug)]
pub struct Tester {
    pub l1: Arc<FakeL1>,
    pub l2: Arc<FakeL2>,
    pub telemetry: Arc<RecordingTelemetry>,
    pub operator: Address,
    pub submitter: BatchSubmitter<SequencerDriver>,
}

impl Tester {
    pub fn setup(l2: FakeL2, config: TesterConfig) -> anyhow::Result<Self> {
        let signer: PrivateKeySigner = OPERATOR_KEY.parse()?;
        let operator = signer.address();
        let l1 = Arc::new(FakeL1::new(config.committed_elements));
        let l2 = Arc::new(l2);
        let telemetry = Arc::new(RecordingTelemetry::default());

        let driver = SequencerDriver::new(
            SequencerDriverConfig {
                name: "sequencer".to_owned(),
                ctc_address: CTC_ADDRESS,
                l1_chain_id: L1_CHAIN_ID,
                block_offset: config.block_offset,
                max_tx_size: config.max_tx_size,
                prune_percent: config.prune_percent,
                gas_limit_buffer_percent: 20,
            },
            signer,
            l1.clone(),
            l2.clone(),
            l1.clone(),
        );
        let tx_manager = TxManager::new(config.tx_manager, l1.clone());
        let submitter = BatchSubmitter::new(
            driver,
            l1.clone(),
            tx_manager,
            telemetry.clone(),
            config.poll_interval,
        );
        Ok(Self {
            l1,
            l2,
            telemetry,
            operator,
            submitter,
        })
    }
}
