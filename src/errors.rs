use alloy::primitives::{Address, Bytes, TxHash};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error. Error: {0}")]
    Configuration(String),
    #[error("Invalid RPC URL. Error: {0}")]
    InvalidRpcUrl(String),
    #[error("No RPC endpoint available. Error: {0}")]
    NoEndpointAvailable(String),
    #[error("Failed to build transaction. Error: {0}")]
    Build(String),
    #[error("Signer mismatch: expected {expected}, recovered {recovered}")]
    SignerMismatch { expected: Address, recovered: Address },
    #[error("Receipt of {txn_hash} reports sender {reported}, expected {expected}")]
    SenderMismatch {
        txn_hash: TxHash,
        expected: Address,
        reported: Address,
    },
    #[error("Transaction {txn_hash} reverted in block {block_number}: {reason}")]
    TransactionReverted {
        txn_hash: TxHash,
        block_number: u64,
        reason: String,
    },
    #[error("Timed out waiting for the receipt of {txn_hash}")]
    Timeout { txn_hash: TxHash },
    #[error("Nonce too low. Error: {0}")]
    NonceTooLow(String),
    #[error("Nonce too high. Error: {0}")]
    NonceTooHigh(String),
    #[error("Replacement transaction underpriced. Error: {0}")]
    ReplacementUnderpriced(String),
    #[error("Contract execution failed. Error: {0}")]
    ContractExecution(String),
    #[error("Network connectivity issue. Error: {0}")]
    NetworkConnectivity(String),
}

impl PipelineError {
    /// Internal inconsistencies that point at a library or configuration defect rather than
    /// a business-level rejection by the contract.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Configuration(_)
                | PipelineError::InvalidRpcUrl(_)
                | PipelineError::Build(_)
                | PipelineError::SignerMismatch { .. }
                | PipelineError::SenderMismatch { .. }
        )
    }
}

/// An error answered by (or on the way to) a JSON-RPC node.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct RpcError {
    pub code: Option<i64>,
    pub message: String,
    /// Revert payload attached to the error response, if the node sent one.
    pub data: Option<Bytes>,
}

impl RpcError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_data(mut self, data: Bytes) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_revert(&self) -> bool {
        self.data.is_some() || self.message.to_lowercase().contains("revert")
    }

    pub fn is_method_not_found(&self) -> bool {
        self.code == Some(-32601)
            || self.message.to_lowercase().contains("method not found")
            || self.message.to_lowercase().contains("not supported")
    }
}
