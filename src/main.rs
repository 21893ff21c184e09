use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::hex;
use alloy::primitives::Address;
use anyhow::{anyhow, bail, Context, Result};
use besu_txn_pipeline::{encode_function_call, ConfigManager, ContractCall, Lookup, TxnPipeline};
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::{error, info};

#[derive(Parser)]
#[command(version, about = "Submit contract calls to a Besu network and wait for them")]
struct Cli {
    /// Path to the pipeline configuration file, BESU_* variables override it
    #[clap(long, value_parser)]
    config_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the address transactions are sent from
    Address,
    /// Probe the configured endpoints and print the first live one with its chain id and head
    Probe,
    /// Send a state-changing contract call and wait for its receipt
    Send(CallArgs),
    /// Run a read-only contract call and print whether it found a record
    Lookup(CallArgs),
}

#[derive(Args)]
struct CallArgs {
    /// Contract address
    #[clap(long, value_parser)]
    to: Address,

    /// Canonical function signature, e.g. "addMember(uint256,address)"
    #[clap(long, value_parser)]
    signature: String,

    /// Function arguments, in order
    #[clap(long = "arg", value_parser)]
    args: Vec<String>,
}

impl CallArgs {
    fn contract_call(&self) -> Result<ContractCall> {
        let param_types = parse_param_types(&self.signature)?;
        if param_types.len() != self.args.len() {
            bail!(
                "{} expects {} argument(s), got {}",
                self.signature,
                param_types.len(),
                self.args.len()
            );
        }

        let values = param_types
            .iter()
            .zip(&self.args)
            .map(|(param_type, arg)| {
                param_type
                    .coerce_str(arg)
                    .with_context(|| format!("Invalid {} argument {:?}", param_type, arg))
            })
            .collect::<Result<Vec<DynSolValue>>>()?;

        Ok(ContractCall::new(
            self.signature.clone(),
            self.to,
            encode_function_call(&self.signature, &values),
        ))
    }
}

fn parse_param_types(signature: &str) -> Result<Vec<DynSolType>> {
    let params = signature
        .split_once('(')
        .and_then(|(_, rest)| rest.strip_suffix(')'))
        .ok_or_else(|| anyhow!("Malformed function signature {:?}", signature))?;
    if params.trim().is_empty() {
        return Ok(vec![]);
    }
    if params.contains('(') {
        bail!("Tuple parameters are not supported on the command line");
    }

    params
        .split(',')
        .map(|param| {
            DynSolType::parse(param.trim())
                .with_context(|| format!("Unknown parameter type {:?}", param))
        })
        .collect()
}

async fn run(cli: Cli) -> Result<()> {
    let config = ConfigManager::new(cli.config_file)
        .load_config()
        .context("Failed to load the pipeline configuration")?;
    let pipeline = TxnPipeline::from_config(config)?;

    match cli.command {
        Commands::Address => {
            println!("{}", pipeline.signer_address());
        }
        Commands::Probe => {
            let status = pipeline.node_status().await?;
            println!(
                "{} chain_id={} block={}",
                status.rpc_url, status.chain_id, status.block_number
            );
        }
        Commands::Send(args) => {
            let outcome = pipeline.send(args.contract_call()?).await?;
            info!(
                "Transaction {} confirmed in block {} with nonce {}",
                outcome.txn_hash, outcome.block_number, outcome.nonce
            );
            println!("{}", outcome.txn_hash);
        }
        Commands::Lookup(args) => match pipeline.lookup(&args.contract_call()?).await? {
            Lookup::Found(output) => println!("found 0x{}", hex::encode(output)),
            Lookup::NotFound => println!("not found"),
        },
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        error!("Error: {err:#}");
        std::process::exit(1);
    }

    Ok(())
}
