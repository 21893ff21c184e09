use alloy::dyn_abi::DynSolValue;
use alloy::hex;
use alloy::primitives::{keccak256, Bytes};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::{Panic, Revert, SolError};
use alloy::transports::http::reqwest::Url;

use crate::errors::{PipelineError, RpcError};

pub fn verify_rpc_url(rpc_url: &str) -> Result<(), PipelineError> {
    let url = Url::parse(rpc_url).map_err(|err| {
        PipelineError::InvalidRpcUrl(format!("Failed to parse the RPC {:?}: {}", rpc_url, err))
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(PipelineError::InvalidRpcUrl(format!(
            "Invalid RPC URL: {:?}. URL must start with http or https",
            rpc_url
        )));
    }
    Ok(())
}

pub fn verify_private_signer(private_key_hex: &str) -> Result<PrivateKeySigner, PipelineError> {
    private_key_hex
        .trim()
        .parse::<PrivateKeySigner>()
        .map_err(|err| PipelineError::Configuration(format!("Invalid signer private key: {}", err)))
}

// Calldata for a function given by its canonical signature, e.g. "safeMint(address,string,string)"
pub fn encode_function_call(signature: &str, args: &[DynSolValue]) -> Bytes {
    let function_selector = keccak256(signature.as_bytes());

    let mut txn_data = function_selector[..4].to_vec();
    if !args.is_empty() {
        txn_data.extend(DynSolValue::Tuple(args.to_vec()).abi_encode_params());
    }

    Bytes::from(txn_data)
}

/// Decodes `Error(string)` and `Panic(uint256)` payloads, or plain UTF-8 revert data.
///
/// Returns the bare reason, e.g. `Only group creator can add members`.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.is_empty() {
        return None;
    }

    if let Ok(revert) = Revert::abi_decode(data, true) {
        return Some(revert.reason);
    }
    if let Ok(panic) = Panic::abi_decode(data, true) {
        return Some(format!("Panic code {:#x}", panic.code));
    }

    std::str::from_utf8(data)
        .ok()
        .map(str::trim)
        .filter(|reason| !reason.is_empty() && !reason.chars().any(char::is_control))
        .map(str::to_string)
}

pub fn decode_hex_revert_reason(data: &str) -> Option<String> {
    let data = hex::decode(data.trim()).ok()?;
    decode_revert_reason(&data)
}

/// Maps the message of a rejected `eth_sendRawTransaction` (Geth, Besu and Hardhat wordings)
/// to a pipeline error.
pub fn parse_send_error(err: &RpcError) -> PipelineError {
    let error_message = err.message.to_lowercase();

    if error_message.contains("nonce too low") || error_message.contains("nonce_too_low") {
        PipelineError::NonceTooLow(err.message.clone())
    } else if error_message.contains("nonce too high")
        || error_message.contains("nonce_too_far_in_future")
    {
        PipelineError::NonceTooHigh(err.message.clone())
    } else if error_message.contains("replacement transaction underpriced")
        || error_message.contains("replacement_underpriced")
    {
        PipelineError::ReplacementUnderpriced(err.message.clone())
    } else if err.is_revert() {
        let reason = err
            .data
            .as_ref()
            .and_then(|data| decode_revert_reason(data))
            .unwrap_or_else(|| err.message.clone());
        PipelineError::ContractExecution(reason)
    } else {
        PipelineError::NetworkConnectivity(err.message.clone())
    }
}
