use alloy::primitives::{Address, Bytes, TxHash};
use alloy::rpc::types::Log;
use serde::Deserialize;

use crate::errors::PipelineError;

/// A resolved contract call: where to send it and the ABI-encoded calldata.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContractCall {
    /// Human readable function signature, only used for logging.
    pub label: String,
    pub contract_address: Address,
    pub calldata: Bytes,
}

impl ContractCall {
    pub fn new(label: impl Into<String>, contract_address: Address, calldata: Bytes) -> Self {
        Self {
            label: label.into(),
            contract_address,
            calldata,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PendingTransaction {
    pub id: String,
    pub call: ContractCall,
    pub from: Address,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub chain_id: Option<u64>,
    pub status: TxnStatus,
}

#[derive(Clone, Debug)]
pub struct SignedTransaction {
    pub transaction: PendingTransaction,
    /// EIP-2718 encoded bytes, as handed to `eth_sendRawTransaction`.
    pub raw: Bytes,
    pub txn_hash: TxHash,
    /// Address recovered from the signature.
    pub signer: Address,
}

impl SignedTransaction {
    pub fn nonce(&self) -> u64 {
        self.transaction.nonce
    }

    pub fn from(&self) -> Address {
        self.transaction.from
    }
}

#[derive(Clone, Debug)]
pub struct TxnReceipt {
    pub txn_hash: TxHash,
    pub block_number: u64,
    pub status: bool,
    /// Sender as reported by the node.
    pub from: Address,
    pub logs: Vec<Log>,
}

/// Parameters of an `eth_call`.
#[derive(Clone, Debug)]
pub struct CallRequest {
    pub from: Address,
    pub to: Address,
    pub input: Bytes,
    pub gas: Option<u64>,
    /// Block to execute against, latest when unset.
    pub block: Option<u64>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TxnStatus {
    Built,
    Signed,
    Broadcast,
    Pending,
    Confirmed,
    Reverted,
    TimedOut,
}

/// Outcome of an existence query against a view function.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TxnOutcome {
    pub id: String,
    pub txn_hash: TxHash,
    pub block_number: u64,
    pub nonce: u64,
    pub status: TxnStatus,
    pub logs: Vec<Log>,
}

/// Result of a sequential batch: everything before the first failure was confirmed.
#[derive(Debug)]
pub struct BatchOutcome {
    pub confirmed: Vec<TxnOutcome>,
    /// Index of the failing call within the batch, and why it failed.
    pub failure: Option<(usize, PipelineError)>,
    /// Calls after the failing one, never broadcast.
    pub not_sent: Vec<ContractCall>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeStatus {
    pub rpc_url: String,
    pub chain_id: u64,
    pub block_number: u64,
}

/// Where transaction nonces come from.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum NoncePolicy {
    /// One in-memory counter per signer, reconciled with the chain on first use and after a
    /// nonce error reported by the node.
    #[default]
    Managed,
    /// Read `eth_getTransactionCount` at the latest block before every build.
    Chain,
    /// Read `eth_getTransactionCount` including the pending pool before every build.
    ChainPending,
}
