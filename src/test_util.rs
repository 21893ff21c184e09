use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy::dyn_abi::DynSolValue;
use alloy::hex;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::sol_types::{Revert, SolError};
use serde_json::{json, Value};

use crate::config::PipelineConfig;
use crate::errors::{PipelineError, RpcError};
use crate::models::{CallRequest, ContractCall, SignedTransaction, TxnReceipt};
use crate::rpc::{ChainRpc, RpcConnector};
use crate::transaction::TxnPipeline;
use crate::utils::encode_function_call;

// Local blockchain (Hardhat) configurations
pub const CHAIN_ID: u64 = 1337;
pub const CONTRACT_ADDR: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
pub const GAS_WALLET_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
pub const GAS_WALLET_ADDRESS: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";
pub const OTHER_WALLET_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
pub const GROUP_CREATOR_REVERT: &str = "Only group creator can add members";

pub fn contract_call() -> ContractCall {
    contract_call_for(1)
}

pub fn contract_call_for(member_id: u64) -> ContractCall {
    ContractCall::new(
        "addMember(uint256,address)",
        CONTRACT_ADDR.parse().unwrap(),
        encode_function_call(
            "addMember(uint256,address)",
            &[
                DynSolValue::Uint(U256::from(member_id), 256),
                DynSolValue::Address(OTHER_WALLET_ADDRESS.parse().unwrap()),
            ],
        ),
    )
}

pub fn gas_wallet_address() -> Address {
    GAS_WALLET_ADDRESS.parse().unwrap()
}

#[derive(Debug, Default)]
pub struct MockChainState {
    pub alive: bool,
    // Never answer at all, like a node behind a black-holed route
    pub hang: bool,
    pub block_number: u64,
    pub gas_price: u128,
    pub mined_nonces: HashMap<Address, u64>,
    pub pool: Vec<SignedTransaction>,
    pub broadcasts: Vec<SignedTransaction>,
    pub receipts: HashMap<TxHash, TxnReceipt>,
    pub hold_receipts: bool,
    pub revert_reason: Option<String>,
    // Only calls with this calldata revert, all of them when unset
    pub revert_only_for: Option<Bytes>,
    pub revert_on_broadcast: BroadcastRevert,
    pub trace_supported: bool,
    pub simulation_supported: bool,
    pub receipt_sender_override: Option<Address>,
    pub view_result: Option<Bytes>,
    pub nonce_reads: usize,
}

/// How a reverting transaction is answered by `eth_sendRawTransaction`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum BroadcastRevert {
    /// Accepted, the revert only shows in the receipt (Besu, Geth)
    #[default]
    Accept,
    /// Mined with status 0 and reported as an error (Hardhat automine)
    MineAndReport,
    /// Rejected without being mined
    Reject,
}

/// In-memory node: mines every accepted transaction immediately unless receipts are held.
#[derive(Clone, Debug)]
pub struct MockChain {
    pub state: Arc<Mutex<MockChainState>>,
}

impl MockChain {
    pub fn live() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockChainState {
                alive: true,
                block_number: 100,
                trace_supported: true,
                simulation_supported: true,
                ..Default::default()
            })),
        }
    }

    pub fn dead() -> Self {
        let chain = Self::live();
        chain.state.lock().unwrap().alive = false;
        chain
    }

    pub fn hanging() -> Self {
        let chain = Self::live();
        chain.state.lock().unwrap().hang = true;
        chain
    }

    pub fn set_alive(&self, alive: bool) {
        self.state.lock().unwrap().alive = alive;
    }

    /// Mines whatever was held in the pool, in nonce order.
    pub fn mine_pending(&self) {
        let mut state = self.state.lock().unwrap();
        let mut pool = std::mem::take(&mut state.pool);
        pool.sort_by_key(|txn| txn.nonce());
        for txn in pool {
            mine(&mut state, &txn);
        }
    }

    pub fn broadcast_count(&self) -> usize {
        self.state.lock().unwrap().broadcasts.len()
    }

    pub fn receipt(&self, txn_hash: TxHash) -> Option<TxnReceipt> {
        self.state.lock().unwrap().receipts.get(&txn_hash).cloned()
    }

    fn check_alive(&self) -> Result<(), RpcError> {
        if self.state.lock().unwrap().alive {
            Ok(())
        } else {
            Err(RpcError::new("error sending request: connection refused"))
        }
    }
}

fn revert_for(state: &MockChainState, calldata: &Bytes) -> Option<String> {
    match &state.revert_only_for {
        Some(reverting) if reverting != calldata => None,
        _ => state.revert_reason.clone(),
    }
}

fn mine(state: &mut MockChainState, txn: &SignedTransaction) {
    let reverted = revert_for(state, &txn.transaction.call.calldata).is_some();
    state.block_number += 1;
    state.mined_nonces.insert(txn.from(), txn.nonce() + 1);

    let receipt = TxnReceipt {
        txn_hash: txn.txn_hash,
        block_number: state.block_number,
        status: !reverted,
        from: state.receipt_sender_override.unwrap_or(txn.signer),
        logs: vec![],
    };
    state.receipts.insert(txn.txn_hash, receipt);
}

fn pending_nonce(state: &MockChainState, address: Address) -> u64 {
    let mined = state.mined_nonces.get(&address).copied().unwrap_or_default();
    state
        .pool
        .iter()
        .filter(|txn| txn.from() == address)
        .map(|txn| txn.nonce() + 1)
        .fold(mined, u64::max)
}

fn revert_data(reason: &str) -> Bytes {
    Bytes::from(
        Revert {
            reason: reason.to_string(),
        }
        .abi_encode(),
    )
}

impl ChainRpc for MockChain {
    async fn block_number(&self) -> Result<u64, RpcError> {
        let hang = self.state.lock().unwrap().hang;
        if hang {
            std::future::pending::<()>().await;
        }
        self.check_alive()?;
        Ok(self.state.lock().unwrap().block_number)
    }

    async fn chain_id(&self) -> Result<u64, RpcError> {
        self.check_alive()?;
        Ok(CHAIN_ID)
    }

    async fn transaction_count(
        &self,
        address: Address,
        include_pending: bool,
    ) -> Result<u64, RpcError> {
        self.check_alive()?;
        let mut state = self.state.lock().unwrap();
        state.nonce_reads += 1;
        if include_pending {
            Ok(pending_nonce(&state, address))
        } else {
            Ok(state.mined_nonces.get(&address).copied().unwrap_or_default())
        }
    }

    async fn gas_price(&self) -> Result<u128, RpcError> {
        self.check_alive()?;
        Ok(self.state.lock().unwrap().gas_price)
    }

    async fn send_raw_transaction(
        &self,
        transaction: &SignedTransaction,
    ) -> Result<TxHash, RpcError> {
        self.check_alive()?;
        let mut state = self.state.lock().unwrap();

        let mined = state
            .mined_nonces
            .get(&transaction.signer)
            .copied()
            .unwrap_or_default();
        if transaction.nonce() < mined {
            return Err(RpcError::new("nonce too low").with_code(-32000));
        }

        if let Some(position) = state.pool.iter().position(|txn| {
            txn.signer == transaction.signer && txn.nonce() == transaction.nonce()
        }) {
            if transaction.transaction.gas_price <= state.pool[position].transaction.gas_price {
                return Err(
                    RpcError::new("replacement transaction underpriced").with_code(-32000)
                );
            }
            state.pool.remove(position);
        } else if transaction.nonce() > pending_nonce(&state, transaction.signer) {
            return Err(RpcError::new("Nonce too high").with_code(-32000));
        }

        if let Some(reason) = revert_for(&state, &transaction.transaction.call.calldata) {
            let error = RpcError::new(format!(
                "VM Exception while processing transaction: reverted with reason string '{}'",
                reason
            ))
            .with_code(-32603)
            .with_data(revert_data(&reason));
            match state.revert_on_broadcast {
                BroadcastRevert::Accept => {}
                BroadcastRevert::MineAndReport => {
                    state.broadcasts.push(transaction.clone());
                    mine(&mut state, transaction);
                    return Err(error);
                }
                BroadcastRevert::Reject => return Err(error),
            }
        }

        state.broadcasts.push(transaction.clone());
        if state.hold_receipts {
            state.pool.push(transaction.clone());
        } else {
            mine(&mut state, transaction);
        }

        Ok(transaction.txn_hash)
    }

    async fn transaction_receipt(&self, txn_hash: TxHash) -> Result<Option<TxnReceipt>, RpcError> {
        self.check_alive()?;
        Ok(self.state.lock().unwrap().receipts.get(&txn_hash).cloned())
    }

    async fn call(&self, request: &CallRequest) -> Result<Bytes, RpcError> {
        self.check_alive()?;
        let state = self.state.lock().unwrap();
        if !state.simulation_supported {
            return Err(RpcError::new("eth_call is disabled on this node").with_code(-32601));
        }

        match revert_for(&state, &request.input) {
            Some(reason) => Err(RpcError::new("execution reverted")
                .with_code(3)
                .with_data(revert_data(&reason))),
            None => Ok(state.view_result.clone().unwrap_or_default()),
        }
    }

    async fn trace_transaction(&self, txn_hash: TxHash) -> Result<Value, RpcError> {
        self.check_alive()?;
        let state = self.state.lock().unwrap();
        if !state.trace_supported {
            return Err(RpcError::new("Method not found").with_code(-32601));
        }

        let reason = state
            .broadcasts
            .iter()
            .find(|txn| txn.txn_hash == txn_hash)
            .and_then(|txn| revert_for(&state, &txn.transaction.call.calldata));
        Ok(match reason {
            Some(reason) => json!({
                "failed": true,
                "gas": 28_000,
                "returnValue": hex::encode(revert_data(&reason)),
                "structLogs": []
            }),
            None => json!({ "failed": false, "gas": 21_000, "returnValue": "", "structLogs": [] }),
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct MockConnector {
    pub chains: HashMap<String, MockChain>,
}

impl MockConnector {
    pub fn with(endpoints: &[(&str, MockChain)]) -> Self {
        Self {
            chains: endpoints
                .iter()
                .map(|(rpc_url, chain)| (rpc_url.to_string(), chain.clone()))
                .collect(),
        }
    }
}

impl RpcConnector for MockConnector {
    type Client = MockChain;

    fn connect(&self, rpc_url: &str) -> Result<MockChain, PipelineError> {
        self.chains
            .get(rpc_url)
            .cloned()
            .ok_or_else(|| PipelineError::InvalidRpcUrl(format!("Unknown endpoint {}", rpc_url)))
    }
}

pub fn test_config(rpc_urls: &[&str]) -> PipelineConfig {
    let mut config = PipelineConfig::new(
        rpc_urls.iter().map(|rpc_url| rpc_url.to_string()).collect(),
        GAS_WALLET_KEY.to_string(),
    );
    config.chain_id = Some(CHAIN_ID);
    config.probe_timeout_ms = 100;
    config.receipt_timeout_sec = 5;
    config.receipt_poll_interval_ms = 10;
    config
}

pub fn new_pipeline(
    config: PipelineConfig,
    endpoints: &[(&str, MockChain)],
) -> TxnPipeline<MockConnector> {
    TxnPipeline::new(config, MockConnector::with(endpoints)).unwrap()
}
