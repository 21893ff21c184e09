use std::future::Future;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{BlockId, TransactionRequest};
use alloy::transports::http::{reqwest::Url, Client, Http};
use alloy::transports::{RpcError as TransportRpcError, TransportErrorKind};
use serde_json::{json, Value};

use crate::errors::{PipelineError, RpcError};
use crate::models::{CallRequest, SignedTransaction, TxnReceipt};
use crate::utils::verify_rpc_url;

/// The JSON-RPC surface the pipeline needs from a node.
pub trait ChainRpc: Send + Sync {
    /// Liveness probe, returns the latest block number.
    fn block_number(&self) -> impl Future<Output = Result<u64, RpcError>> + Send;

    fn chain_id(&self) -> impl Future<Output = Result<u64, RpcError>> + Send;

    fn transaction_count(
        &self,
        address: Address,
        include_pending: bool,
    ) -> impl Future<Output = Result<u64, RpcError>> + Send;

    fn gas_price(&self) -> impl Future<Output = Result<u128, RpcError>> + Send;

    fn send_raw_transaction(
        &self,
        transaction: &SignedTransaction,
    ) -> impl Future<Output = Result<TxHash, RpcError>> + Send;

    fn transaction_receipt(
        &self,
        txn_hash: TxHash,
    ) -> impl Future<Output = Result<Option<TxnReceipt>, RpcError>> + Send;

    fn call(&self, request: &CallRequest) -> impl Future<Output = Result<Bytes, RpcError>> + Send;

    /// `debug_traceTransaction`, nodes without the debug namespace answer with an error.
    fn trace_transaction(
        &self,
        txn_hash: TxHash,
    ) -> impl Future<Output = Result<Value, RpcError>> + Send;
}

/// Creates a client for a candidate endpoint URL.
pub trait RpcConnector: Send + Sync {
    type Client: ChainRpc;

    fn connect(&self, rpc_url: &str) -> Result<Self::Client, PipelineError>;
}

pub type HttpProvider = RootProvider<Http<Client>>;

#[derive(Clone, Debug)]
pub struct HttpRpcClient {
    pub rpc_url: String,
    provider: HttpProvider,
}

impl HttpRpcClient {
    pub fn new(rpc_url: &str) -> Result<Self, PipelineError> {
        verify_rpc_url(rpc_url)?;
        let url = Url::parse(rpc_url)
            .map_err(|err| PipelineError::InvalidRpcUrl(err.to_string()))?;

        Ok(Self {
            rpc_url: rpc_url.to_string(),
            provider: ProviderBuilder::new().on_http(url),
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct HttpConnector;

impl RpcConnector for HttpConnector {
    type Client = HttpRpcClient;

    fn connect(&self, rpc_url: &str) -> Result<HttpRpcClient, PipelineError> {
        HttpRpcClient::new(rpc_url)
    }
}

fn to_rpc_error(err: TransportRpcError<TransportErrorKind>) -> RpcError {
    match err.as_error_resp() {
        Some(payload) => {
            let rpc_error = RpcError::new(payload.message.to_string()).with_code(payload.code);
            match payload.as_revert_data() {
                Some(data) => rpc_error.with_data(data),
                None => rpc_error,
            }
        }
        None => RpcError::new(err.to_string()),
    }
}

impl ChainRpc for HttpRpcClient {
    async fn block_number(&self) -> Result<u64, RpcError> {
        self.provider.get_block_number().await.map_err(to_rpc_error)
    }

    async fn chain_id(&self) -> Result<u64, RpcError> {
        self.provider.get_chain_id().await.map_err(to_rpc_error)
    }

    async fn transaction_count(
        &self,
        address: Address,
        include_pending: bool,
    ) -> Result<u64, RpcError> {
        let request = self.provider.get_transaction_count(address);
        let request = if include_pending {
            request.pending()
        } else {
            request.latest()
        };
        request.await.map_err(to_rpc_error)
    }

    async fn gas_price(&self) -> Result<u128, RpcError> {
        self.provider.get_gas_price().await.map_err(to_rpc_error)
    }

    async fn send_raw_transaction(
        &self,
        transaction: &SignedTransaction,
    ) -> Result<TxHash, RpcError> {
        let pending_txn = self
            .provider
            .send_raw_transaction(&transaction.raw)
            .await
            .map_err(to_rpc_error)?;
        Ok(*pending_txn.tx_hash())
    }

    async fn transaction_receipt(&self, txn_hash: TxHash) -> Result<Option<TxnReceipt>, RpcError> {
        let receipt = self
            .provider
            .get_transaction_receipt(txn_hash)
            .await
            .map_err(to_rpc_error)?;

        Ok(receipt.map(|receipt| TxnReceipt {
            txn_hash: receipt.transaction_hash,
            block_number: receipt.block_number.unwrap_or_default(),
            status: receipt.status(),
            from: receipt.from,
            logs: receipt.inner.logs().to_vec(),
        }))
    }

    async fn call(&self, request: &CallRequest) -> Result<Bytes, RpcError> {
        let mut transaction_request = TransactionRequest::default()
            .with_from(request.from)
            .with_to(request.to)
            .with_input(request.input.clone());
        if let Some(gas) = request.gas {
            transaction_request = transaction_request.with_gas_limit(gas);
        }

        let block = request
            .block
            .map(BlockId::number)
            .unwrap_or_else(BlockId::latest);

        self.provider
            .call(&transaction_request)
            .block(block)
            .await
            .map_err(to_rpc_error)
    }

    async fn trace_transaction(&self, txn_hash: TxHash) -> Result<Value, RpcError> {
        self.provider
            .raw_request::<_, Value>(
                "debug_traceTransaction".into(),
                (
                    txn_hash,
                    json!({
                        "disableStorage": true,
                        "disableMemory": true,
                        "disableStack": true
                    }),
                ),
            )
            .await
            .map_err(to_rpc_error)
    }
}
