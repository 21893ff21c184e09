use std::collections::BTreeSet;

use alloy::primitives::Address;
use log::{debug, info};
use tokio::sync::Mutex;

use crate::errors::PipelineError;
use crate::models::NoncePolicy;
use crate::rpc::ChainRpc;

#[derive(Debug, Default)]
struct NonceState {
    next_nonce: u64,
    sync: SyncMode,
    // Handed out and not yet resolved by a broadcast outcome
    outstanding: BTreeSet<u64>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum SyncMode {
    #[default]
    Forward,
    Exact,
    Synced,
}

/// Hands out nonces for the pipeline's single signer.
///
/// With [`NoncePolicy::Managed`] the counter lives in memory behind a mutex, so concurrent
/// callers always get distinct, increasing values. It is reconciled with the node's pending
/// transaction count on first use and whenever the node rejected a nonce, but never below a
/// nonce that is still held by a caller. The `Chain` policies read the count from the node
/// on every call and leave concurrent callers free to collide.
///
/// Every nonce taken with [`acquire`](Self::acquire) must be given back with either
/// [`complete`](Self::complete) (the node accepted it) or [`release`](Self::release)
/// (it never reached the chain).
#[derive(Debug)]
pub struct NonceManager {
    policy: NoncePolicy,
    state: Mutex<NonceState>,
}

impl NonceManager {
    pub fn new(policy: NoncePolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(NonceState::default()),
        }
    }

    pub fn policy(&self) -> NoncePolicy {
        self.policy
    }

    pub async fn acquire<R: ChainRpc>(
        &self,
        client: &R,
        address: Address,
    ) -> Result<u64, PipelineError> {
        match self.policy {
            NoncePolicy::Chain => read_chain_nonce(client, address, false).await,
            NoncePolicy::ChainPending => read_chain_nonce(client, address, true).await,
            NoncePolicy::Managed => {
                let mut state = self.state.lock().await;

                if state.sync != SyncMode::Synced {
                    let chain_nonce = read_chain_nonce(client, address, true).await?;
                    let floor = state
                        .outstanding
                        .last()
                        .map_or(0, |highest_held| highest_held + 1);
                    let next_nonce = match state.sync {
                        SyncMode::Exact => chain_nonce.max(floor),
                        _ => chain_nonce.max(state.next_nonce),
                    };
                    if next_nonce != state.next_nonce {
                        info!(
                            "Reconciled nonce of {} with the chain: {} -> {} (chain at {})",
                            address, state.next_nonce, next_nonce, chain_nonce
                        );
                    }
                    state.next_nonce = next_nonce;
                    state.sync = SyncMode::Synced;
                }

                let nonce = state.next_nonce;
                state.next_nonce += 1;
                state.outstanding.insert(nonce);
                debug!("Assigned nonce {} to {}", nonce, address);
                Ok(nonce)
            }
        }
    }

    /// The node took `nonce`: it is pending, mined, or was already used.
    pub async fn complete(&self, nonce: u64) {
        if self.policy == NoncePolicy::Managed {
            self.state.lock().await.outstanding.remove(&nonce);
        }
    }

    /// `nonce` never reached the chain. The highest nonce handed out is reused directly,
    /// anything lower leaves a gap that is closed from the chain once no caller holds a
    /// higher nonce.
    pub async fn release(&self, nonce: u64) {
        if self.policy != NoncePolicy::Managed {
            return;
        }

        let mut state = self.state.lock().await;
        state.outstanding.remove(&nonce);
        if nonce + 1 == state.next_nonce {
            debug!("Nonce {} released, handing it out again", nonce);
            state.next_nonce = nonce;
        } else if nonce < state.next_nonce {
            state.sync = SyncMode::Exact;
        }
    }

    /// The node reported `nonce too low`: catch up with the chain on the next acquire.
    pub async fn mark_stale(&self) {
        let mut state = self.state.lock().await;
        if state.sync == SyncMode::Synced {
            state.sync = SyncMode::Forward;
        }
    }
}

async fn read_chain_nonce<R: ChainRpc>(
    client: &R,
    address: Address,
    include_pending: bool,
) -> Result<u64, PipelineError> {
    client
        .transaction_count(address, include_pending)
        .await
        .map_err(|err| {
            PipelineError::NetworkConnectivity(format!(
                "Failed to get the transaction count of {}. Error: {}",
                address, err
            ))
        })
}
