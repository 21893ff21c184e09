pub mod config;
pub(crate) mod constants;
pub mod endpoint;
pub(crate) mod errors;
pub(crate) mod models;
pub mod nonce;
pub mod rpc;
pub mod signer;
pub mod tracker;
pub(crate) mod transaction;
pub(crate) mod utils;

#[cfg(test)]
mod test_util;

pub use config::{ConfigManager, PipelineConfig};
pub use errors::{PipelineError, RpcError};
pub use models::{
    BatchOutcome, CallRequest, ContractCall, Lookup, NodeStatus, NoncePolicy, PendingTransaction,
    SignedTransaction, TxnOutcome, TxnReceipt, TxnStatus,
};
pub use rpc::{ChainRpc, HttpConnector, HttpRpcClient, RpcConnector};
pub use signer::TxnSigner;
pub use transaction::TxnPipeline;
pub use utils::{decode_revert_reason, encode_function_call, parse_send_error};
