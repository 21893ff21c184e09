use std::time::Duration;

use alloy::primitives::{Address, TxHash};
use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::time::{sleep, timeout};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::constants::{GENERIC_REVERT_REASON, RECEIPT_FETCH_BACKOFF_MS, RECEIPT_FETCH_RETRIES};
use crate::errors::PipelineError;
use crate::models::{CallRequest, SignedTransaction, TxnReceipt, TxnStatus};
use crate::rpc::ChainRpc;
use crate::utils::{decode_hex_revert_reason, decode_revert_reason, parse_send_error};

/// Broadcasts a signed transaction and waits for it to be mined.
///
/// The wait is bounded by `receipt_timeout`. A timeout only stops the local wait: the
/// transaction may still be mined afterwards. Nothing is retried here, the caller decides
/// whether to run the whole pipeline again with a fresh nonce.
///
/// Some nodes (Hardhat with automine) mine a reverting transaction and also answer the
/// broadcast with an error. The receipt is then looked up under the locally computed hash, so
/// the caller still gets `TransactionReverted` with the block it landed in.
///
/// # Errors
/// * `PipelineError::NonceTooLow` / `NonceTooHigh` / `ReplacementUnderpriced` - Rejected at broadcast
/// * `PipelineError::ContractExecution` - Rejected at broadcast as reverting, and not mined
/// * `PipelineError::Timeout` - No receipt within `receipt_timeout`
/// * `PipelineError::SenderMismatch` - The receipt names another sender than `expected_sender`
/// * `PipelineError::TransactionReverted` - Mined with status 0, with the best reason found
pub async fn submit_and_wait<R: ChainRpc>(
    client: &R,
    signed: &mut SignedTransaction,
    expected_sender: Address,
    receipt_timeout: Duration,
    poll_interval: Duration,
) -> Result<TxnReceipt, PipelineError> {
    let mut broadcast_reason = None;
    let receipt = match broadcast(client, signed).await {
        Ok(txn_hash) => {
            signed.transaction.status = TxnStatus::Pending;

            match timeout(
                receipt_timeout,
                poll_receipt(client, txn_hash, poll_interval),
            )
            .await
            {
                Ok(receipt) => receipt,
                Err(_) => {
                    signed.transaction.status = TxnStatus::TimedOut;
                    warn!(
                        "No receipt for transaction {} ({}) after {:?}, it may still be mined",
                        signed.transaction.id, txn_hash, receipt_timeout
                    );
                    return Err(PipelineError::Timeout { txn_hash });
                }
            }
        }
        Err(PipelineError::ContractExecution(reason)) => {
            match fetch_receipt(client, signed.txn_hash).await {
                Some(receipt) => {
                    debug!(
                        "Broadcast of {} reported a revert, but it was mined in block {}",
                        signed.txn_hash, receipt.block_number
                    );
                    signed.transaction.status = TxnStatus::Broadcast;
                    broadcast_reason = Some(reason);
                    receipt
                }
                None => return Err(PipelineError::ContractExecution(reason)),
            }
        }
        Err(err) => return Err(err),
    };
    let txn_hash = receipt.txn_hash;

    if receipt.from != expected_sender {
        error!(
            "Receipt of transaction {} reports sender {} instead of {}",
            txn_hash, receipt.from, expected_sender
        );
        return Err(PipelineError::SenderMismatch {
            txn_hash,
            expected: expected_sender,
            reported: receipt.from,
        });
    }

    if receipt.status {
        signed.transaction.status = TxnStatus::Confirmed;
        info!(
            "Transaction {} ({}) confirmed in block {}",
            txn_hash, signed.transaction.call.label, receipt.block_number
        );
        return Ok(receipt);
    }

    signed.transaction.status = TxnStatus::Reverted;
    let reason = match broadcast_reason {
        Some(reason) => revert_reason_from_message(&reason).unwrap_or(reason),
        None => diagnose_revert(client, signed, &receipt).await,
    };
    warn!(
        "Transaction {} ({}) reverted in block {}: {}",
        txn_hash, signed.transaction.call.label, receipt.block_number, reason
    );

    Err(PipelineError::TransactionReverted {
        txn_hash,
        block_number: receipt.block_number,
        reason,
    })
}

async fn broadcast<R: ChainRpc>(
    client: &R,
    signed: &mut SignedTransaction,
) -> Result<TxHash, PipelineError> {
    let txn_hash = client
        .send_raw_transaction(signed)
        .await
        .map_err(|err| {
            warn!(
                "Broadcast of transaction {} (nonce {}) rejected: {}",
                signed.transaction.id,
                signed.nonce(),
                err
            );
            parse_send_error(&err)
        })?;

    if txn_hash != signed.txn_hash {
        warn!(
            "Node returned hash {} for transaction {}, locally computed {}",
            txn_hash, signed.transaction.id, signed.txn_hash
        );
    }

    signed.transaction.status = TxnStatus::Broadcast;
    debug!(
        "Broadcast transaction {} as {} with nonce {}",
        signed.transaction.id,
        txn_hash,
        signed.nonce()
    );

    Ok(txn_hash)
}

async fn fetch_receipt<R: ChainRpc>(client: &R, txn_hash: TxHash) -> Option<TxnReceipt> {
    let receipt = Retry::spawn(
        ExponentialBackoff::from_millis(RECEIPT_FETCH_BACKOFF_MS)
            .map(jitter)
            .take(RECEIPT_FETCH_RETRIES),
        || client.transaction_receipt(txn_hash),
    )
    .await;

    receipt.unwrap_or_else(|err| {
        warn!("Failed to get the receipt of {}: {}", txn_hash, err);
        None
    })
}

async fn poll_receipt<R: ChainRpc>(
    client: &R,
    txn_hash: TxHash,
    poll_interval: Duration,
) -> TxnReceipt {
    loop {
        if let Some(receipt) = fetch_receipt(client, txn_hash).await {
            return receipt;
        }

        sleep(poll_interval).await;
    }
}

/// Best effort: a trace replay first, then a simulated call, then a generic message.
async fn diagnose_revert<R: ChainRpc>(
    client: &R,
    signed: &SignedTransaction,
    receipt: &TxnReceipt,
) -> String {
    match client.trace_transaction(receipt.txn_hash).await {
        Ok(trace) => {
            if let Some(reason) = revert_reason_from_trace(&trace) {
                return reason;
            }
        }
        Err(err) if err.is_method_not_found() => debug!(
            "Node does not expose debug_traceTransaction, simulating {} instead",
            receipt.txn_hash
        ),
        Err(err) => warn!(
            "Trace of {} failed, simulating instead: {}",
            receipt.txn_hash, err
        ),
    }

    let request = CallRequest {
        from: signed.from(),
        to: signed.transaction.call.contract_address,
        input: signed.transaction.call.calldata.clone(),
        gas: Some(signed.transaction.gas_limit),
        block: Some(receipt.block_number.saturating_sub(1)),
    };
    match client.call(&request).await {
        Ok(_) => debug!(
            "Simulation of {} succeeds against block {}",
            receipt.txn_hash,
            receipt.block_number.saturating_sub(1)
        ),
        Err(err) => {
            let reason = err
                .data
                .as_ref()
                .and_then(|data| decode_revert_reason(data))
                .or_else(|| revert_reason_from_message(&err.message));
            if let Some(reason) = reason {
                return reason;
            }
        }
    }

    GENERIC_REVERT_REASON.to_string()
}

fn revert_reason_from_trace(trace: &Value) -> Option<String> {
    if let Some(reason) = trace.get("revertReason").and_then(Value::as_str) {
        if !reason.is_empty() {
            return decode_hex_revert_reason(reason).or_else(|| Some(reason.to_string()));
        }
    }

    ["returnValue", "output"]
        .iter()
        .filter_map(|key| trace.get(*key).and_then(Value::as_str))
        .find_map(decode_hex_revert_reason)
}

fn revert_reason_from_message(message: &str) -> Option<String> {
    // Hardhat: "... reverted with reason string 'reason'"
    if let Some((_, rest)) = message.split_once("reverted with reason string '") {
        return rest.strip_suffix('\'').map(str::to_string);
    }

    // Geth: "execution reverted: reason"
    message
        .split_once("execution reverted: ")
        .map(|(_, reason)| reason.trim().to_string())
        .filter(|reason| !reason.is_empty())
}
