use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, U256};
use alloy::sol_types::{sol_data, SolType};
use besu_txn_pipeline::{
    encode_function_call, ContractCall, Lookup, PipelineConfig, PipelineError, TxnPipeline,
};
use env_logger::Env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // Hardhat/Besu dev node with Hardhat's second prefunded account (0x7099...79C8)
    let mut config = PipelineConfig::new(
        vec![
            "http://127.0.0.1:8546".to_string(),
            "http://127.0.0.1:8545".to_string(),
        ],
        "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d".to_string(),
    );
    config.chain_id = Some(1337);

    let pipeline = TxnPipeline::from_config(config)?;
    println!("Sending from {}", pipeline.signer_address());

    let contract_address: Address = "0x5FbDB2315678afecb367f032d93F642f64180aa3".parse()?;
    let member: Address = "0x56EC16763Ec62f4EAF9C7Cfa09E29DC557e97006".parse()?;
    let group_id = U256::from(1);

    let is_member = ContractCall::new(
        "isMember(uint256,address)",
        contract_address,
        encode_function_call(
            "isMember(uint256,address)",
            &[DynSolValue::Uint(group_id, 256), DynSolValue::Address(member)],
        ),
    );
    // `isMember` answers `false` rather than reverting, so the flag has to be decoded
    if let Lookup::Found(output) = pipeline.lookup(&is_member).await? {
        if sol_data::Bool::abi_decode(&output, true)? {
            println!("{} is already a member of group {}", member, group_id);
            return Ok(());
        }
    }

    let add_member = ContractCall::new(
        "addMember(uint256,address)",
        contract_address,
        encode_function_call(
            "addMember(uint256,address)",
            &[DynSolValue::Uint(group_id, 256), DynSolValue::Address(member)],
        ),
    );

    match pipeline.send(add_member).await {
        Ok(outcome) => println!(
            "Confirmed {} in block {} (nonce {})",
            outcome.txn_hash, outcome.block_number, outcome.nonce
        ),
        Err(PipelineError::TransactionReverted { reason, .. }) => {
            println!("Reverted: {}", reason)
        }
        Err(PipelineError::Timeout { txn_hash }) => {
            println!("Still pending after the timeout: {}", txn_hash)
        }
        Err(err) => return Err(err.into()),
    }

    Ok(())
}
