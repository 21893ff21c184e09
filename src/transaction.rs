use std::time::Duration;

use alloy::primitives::{Address, Bytes};
use log::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::endpoint::EndpointSelector;
use crate::errors::{PipelineError, RpcError};
use crate::models::{
    BatchOutcome, CallRequest, ContractCall, Lookup, NodeStatus, SignedTransaction, TxnOutcome,
    TxnReceipt,
};
use crate::nonce::NonceManager;
use crate::rpc::{ChainRpc, HttpConnector, RpcConnector};
use crate::signer::TxnSigner;
use crate::tracker;

/// Writes contract calls to the chain from the configured signer account.
///
/// The pipeline provides functionality to:
/// - Select a live RPC endpoint and keep using it
/// - Assign nonces without collisions between concurrent callers (with the default policy)
/// - Build, sign and verify the signer of every transaction before broadcasting it
/// - Wait for the receipt and turn reverts into a readable reason
///
/// It is built once at process start and shared by reference with every request handler.
///
/// # Example
/// ```no_run
/// use alloy::dyn_abi::DynSolValue;
/// use alloy::primitives::{Address, U256};
/// use besu_txn_pipeline::{encode_function_call, ContractCall, PipelineConfig, TxnPipeline};
///
/// # async fn run() -> Result<(), besu_txn_pipeline::PipelineError> {
/// let config = PipelineConfig::new(
///     vec!["http://127.0.0.1:8545".to_string()],
///     "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d".to_string(),
/// );
/// let pipeline = TxnPipeline::from_config(config)?;
///
/// let contract_address: Address = "0x5FbDB2315678afecb367f032d93F642f64180aa3".parse().unwrap();
/// let calldata = encode_function_call(
///     "addMember(uint256,address)",
///     &[DynSolValue::Uint(U256::from(1), 256), DynSolValue::Address(Address::ZERO)],
/// );
/// let outcome = pipeline
///     .send(ContractCall::new("addMember", contract_address, calldata))
///     .await?;
/// println!("{} mined in block {}", outcome.txn_hash, outcome.block_number);
/// # Ok(())
/// # }
/// ```
pub struct TxnPipeline<C: RpcConnector = HttpConnector> {
    config: PipelineConfig,
    selector: EndpointSelector<C>,
    signer: TxnSigner,
    nonce_manager: NonceManager,
}

impl TxnPipeline<HttpConnector> {
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        Self::new(config, HttpConnector)
    }
}

impl<C: RpcConnector> TxnPipeline<C> {
    /// Creates the pipeline. Nothing is contacted until the first request.
    ///
    /// # Errors
    /// * `PipelineError::Configuration` - If the key or the endpoint list is missing or invalid
    /// * `PipelineError::InvalidRpcUrl` - If an endpoint is not an http(s) URL
    pub fn new(config: PipelineConfig, connector: C) -> Result<Self, PipelineError> {
        config.validate()?;

        let signer = TxnSigner::new(
            config.private_key.as_deref().unwrap_or_default(),
            config.owner_address.as_deref(),
        )?;
        let selector = EndpointSelector::new(
            config.rpc_urls.clone(),
            config.shuffle_endpoints,
            config.probe_timeout(),
            connector,
        )?;
        let nonce_manager = NonceManager::new(config.nonce_policy);

        info!(
            "Transaction pipeline for {} over {} endpoint(s), nonce policy {:?}",
            signer.address(),
            config.rpc_urls.len(),
            config.nonce_policy
        );

        Ok(Self {
            config,
            selector,
            signer,
            nonce_manager,
        })
    }

    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    pub fn active_url(&self) -> Option<&str> {
        self.selector.active_url()
    }

    pub async fn select_live_endpoint(&self) -> Result<&str, PipelineError> {
        let endpoint = self.selector.select_live_endpoint().await?;
        Ok(endpoint.rpc_url.as_str())
    }

    /// Probes the endpoints if needed and reads the chain id and head of the selected node.
    pub async fn node_status(&self) -> Result<NodeStatus, PipelineError> {
        let endpoint = self.selector.select_live_endpoint().await?;
        let to_network_error = |err: RpcError| {
            PipelineError::NetworkConnectivity(format!(
                "Failed to read the status of {}. Error: {}",
                endpoint.rpc_url, err
            ))
        };

        Ok(NodeStatus {
            rpc_url: endpoint.rpc_url.clone(),
            chain_id: endpoint.client.chain_id().await.map_err(to_network_error)?,
            block_number: endpoint
                .client
                .block_number()
                .await
                .map_err(to_network_error)?,
        })
    }

    async fn client(&self) -> Result<&C::Client, PipelineError> {
        Ok(&self.selector.select_live_endpoint().await?.client)
    }

    /// Reads the gas price, takes a nonce and signs the call.
    ///
    /// # Errors
    /// * `PipelineError::NoEndpointAvailable` - If no endpoint answers
    /// * `PipelineError::NetworkConnectivity` - If the gas price or nonce can not be read
    /// * `PipelineError::Build` / `PipelineError::SignerMismatch` - See [`TxnSigner::build_and_sign`]
    pub async fn build_and_sign(
        &self,
        call: &ContractCall,
    ) -> Result<SignedTransaction, PipelineError> {
        let client = self.client().await?;

        // May legitimately be zero on a permissioned network
        let gas_price = client.gas_price().await.map_err(|err| {
            PipelineError::NetworkConnectivity(format!("Failed to get gas price. Error: {}", err))
        })?;

        let nonce = self
            .nonce_manager
            .acquire(client, self.signer.address())
            .await?;

        match self.signer.build_and_sign(
            call,
            nonce,
            gas_price,
            self.config.gas_limit,
            self.config.chain_id,
        ) {
            Ok(signed) => Ok(signed),
            Err(err) => {
                self.nonce_manager.release(nonce).await;
                Err(err)
            }
        }
    }

    /// Broadcasts `signed` and waits up to `receipt_timeout` for it to be mined.
    ///
    /// Every outcome hands the nonce back to the nonce manager: consumed when the node took
    /// the transaction, released when it never reached the chain.
    pub async fn submit_and_wait(
        &self,
        signed: &mut SignedTransaction,
        receipt_timeout: Duration,
    ) -> Result<TxnReceipt, PipelineError> {
        let client = self.client().await?;

        let result = tracker::submit_and_wait(
            client,
            signed,
            self.signer.address(),
            receipt_timeout,
            self.config.receipt_poll_interval(),
        )
        .await;

        let nonce = signed.nonce();
        match &result {
            Ok(_)
            | Err(
                PipelineError::Timeout { .. }
                | PipelineError::TransactionReverted { .. }
                | PipelineError::SenderMismatch { .. },
            ) => {
                self.nonce_manager.complete(nonce).await;
            }
            // Someone else used the nonce
            Err(PipelineError::NonceTooLow(_) | PipelineError::ReplacementUnderpriced(_)) => {
                self.nonce_manager.complete(nonce).await;
                self.nonce_manager.mark_stale().await;
            }
            Err(_) => {
                self.nonce_manager.release(nonce).await;
            }
        }

        result
    }

    /// Runs the whole pipeline with the configured receipt timeout.
    pub async fn send(&self, call: ContractCall) -> Result<TxnOutcome, PipelineError> {
        self.send_with_timeout(call, self.config.receipt_timeout()).await
    }

    pub async fn send_with_timeout(
        &self,
        call: ContractCall,
        receipt_timeout: Duration,
    ) -> Result<TxnOutcome, PipelineError> {
        info!("Submitting {} to {}", call.label, call.contract_address);

        let mut signed = self.build_and_sign(&call).await?;
        let receipt = self.submit_and_wait(&mut signed, receipt_timeout).await?;

        Ok(TxnOutcome {
            id: signed.transaction.id,
            txn_hash: receipt.txn_hash,
            block_number: receipt.block_number,
            nonce: signed.transaction.nonce,
            status: signed.transaction.status,
            logs: receipt.logs,
        })
    }

    /// Sends `calls` one after the other, each waiting for its receipt before the next one is
    /// built. Stops at the first failure; the remaining calls are returned unsent.
    pub async fn send_batch(&self, calls: Vec<ContractCall>) -> BatchOutcome {
        let total = calls.len();
        let mut confirmed = Vec::with_capacity(total);
        let mut calls = calls.into_iter();

        while let Some(call) = calls.next() {
            let index = confirmed.len();
            let label = call.label.clone();
            match self.send(call).await {
                Ok(outcome) => {
                    debug!("Batch call {}/{} ({}) confirmed", index + 1, total, label);
                    confirmed.push(outcome);
                }
                Err(err) => {
                    warn!(
                        "Batch stopped at call {}/{} ({}): {}",
                        index + 1,
                        total,
                        label,
                        err
                    );
                    return BatchOutcome {
                        confirmed,
                        failure: Some((index, err)),
                        not_sent: calls.collect(),
                    };
                }
            }
        }

        info!("Batch of {} call(s) confirmed", total);
        BatchOutcome {
            confirmed,
            failure: None,
            not_sent: vec![],
        }
    }

    /// Calls a view function from the signer account to find out whether a record exists.
    ///
    /// A revert or an empty answer means `NotFound`; only transport failures are errors.
    pub async fn lookup(&self, call: &ContractCall) -> Result<Lookup<Bytes>, PipelineError> {
        let client = self.client().await?;

        let request = CallRequest {
            from: self.signer.address(),
            to: call.contract_address,
            input: call.calldata.clone(),
            gas: None,
            block: None,
        };

        match client.call(&request).await {
            Ok(output) if output.is_empty() => Ok(Lookup::NotFound),
            Ok(output) => Ok(Lookup::Found(output)),
            Err(err) if err.is_revert() => {
                debug!("Lookup {} reverted: {}", call.label, err);
                Ok(Lookup::NotFound)
            }
            Err(err) => Err(PipelineError::NetworkConnectivity(format!(
                "Lookup {} failed. Error: {}",
                call.label, err
            ))),
        }
    }
}
