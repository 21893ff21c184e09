use std::time::Duration;

use log::{info, warn};
use rand::seq::SliceRandom;
use tokio::sync::OnceCell;
use tokio::time::timeout;

use crate::errors::PipelineError;
use crate::rpc::{ChainRpc, RpcConnector};

/// The endpoint that answered the liveness probe, along with its client.
#[derive(Debug)]
pub struct ActiveEndpoint<R> {
    pub rpc_url: String,
    pub client: R,
}

/// Picks the first configured RPC endpoint that answers a liveness probe.
///
/// The winner is cached for the lifetime of the selector. A node that goes offline after
/// being selected is not replaced; every following call fails until the process restarts.
pub struct EndpointSelector<C: RpcConnector> {
    candidates: Vec<String>,
    shuffle: bool,
    probe_timeout: Duration,
    connector: C,
    selected: OnceCell<ActiveEndpoint<C::Client>>,
}

impl<C: RpcConnector> EndpointSelector<C> {
    pub fn new(
        candidates: Vec<String>,
        shuffle: bool,
        probe_timeout: Duration,
        connector: C,
    ) -> Result<Self, PipelineError> {
        if candidates.is_empty() {
            return Err(PipelineError::Configuration(
                "No RPC endpoints configured".to_string(),
            ));
        }

        Ok(Self {
            candidates,
            shuffle,
            probe_timeout,
            connector,
            selected: OnceCell::new(),
        })
    }

    /// Returns the cached endpoint, probing the candidates on first use.
    pub async fn select_live_endpoint(&self) -> Result<&ActiveEndpoint<C::Client>, PipelineError> {
        self.selected.get_or_try_init(|| self.probe_candidates()).await
    }

    pub fn active_url(&self) -> Option<&str> {
        self.selected.get().map(|endpoint| endpoint.rpc_url.as_str())
    }

    async fn probe_candidates(&self) -> Result<ActiveEndpoint<C::Client>, PipelineError> {
        let mut candidates = self.candidates.clone();
        if self.shuffle {
            candidates.shuffle(&mut rand::thread_rng());
        }

        let mut failure_reason = String::new();
        for rpc_url in candidates {
            let client = match self.connector.connect(&rpc_url) {
                Ok(client) => client,
                Err(err) => {
                    warn!("Skipping RPC endpoint {}: {}", rpc_url, err);
                    failure_reason = format!("{}: {}", rpc_url, err);
                    continue;
                }
            };

            match timeout(self.probe_timeout, client.block_number()).await {
                Ok(Ok(block_number)) => {
                    info!(
                        "Connected to RPC endpoint {} at block {}",
                        rpc_url, block_number
                    );
                    return Ok(ActiveEndpoint { rpc_url, client });
                }
                Ok(Err(err)) => {
                    warn!("RPC endpoint {} failed the liveness probe: {}", rpc_url, err);
                    failure_reason = format!("{}: {}", rpc_url, err);
                }
                Err(_) => {
                    warn!(
                        "RPC endpoint {} did not answer within {:?}",
                        rpc_url, self.probe_timeout
                    );
                    failure_reason = format!("{}: probe timed out", rpc_url);
                }
            }
        }

        Err(PipelineError::NoEndpointAvailable(format!(
            "None of the {} configured endpoints answered. Last failure: {}",
            self.candidates.len(),
            failure_reason
        )))
    }
}
