use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::signers::local::PrivateKeySigner;
use log::{debug, error, warn};

use crate::errors::PipelineError;
use crate::models::{ContractCall, PendingTransaction, SignedTransaction, TxnStatus};
use crate::utils::verify_private_signer;

/// The single account every transaction of the pipeline originates from.
///
/// The key material stays in memory. When an owner address is configured next to the key,
/// that address is the one transactions are expected to come from, and a key that does not
/// match it is caught before anything is broadcast.
#[derive(Clone, Debug)]
pub struct TxnSigner {
    signer: PrivateKeySigner,
    expected_address: Address,
}

impl TxnSigner {
    pub fn new(
        private_key_hex: &str,
        expected_address: Option<&str>,
    ) -> Result<Self, PipelineError> {
        let signer = verify_private_signer(private_key_hex)?;

        let expected_address = match expected_address.map(str::trim) {
            Some(address) if !address.is_empty() => address.parse::<Address>().map_err(|err| {
                PipelineError::Configuration(format!(
                    "Invalid owner address {:?}: {}",
                    address, err
                ))
            })?,
            _ => signer.address(),
        };

        Ok(Self {
            signer,
            expected_address,
        })
    }

    /// Address transactions are expected to originate from.
    pub fn address(&self) -> Address {
        self.expected_address
    }

    /// Address derived from the private key.
    pub fn key_address(&self) -> Address {
        self.signer.address()
    }

    pub fn build(
        &self,
        call: &ContractCall,
        nonce: u64,
        gas_price: u128,
        gas_limit: u64,
        chain_id: Option<u64>,
    ) -> Result<PendingTransaction, PipelineError> {
        if call.contract_address == Address::ZERO {
            return Err(PipelineError::Build(format!(
                "Missing contract address for {}",
                call.label
            )));
        }
        if call.calldata.is_empty() {
            return Err(PipelineError::Build(format!(
                "Empty calldata for {}",
                call.label
            )));
        }

        Ok(PendingTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            call: call.clone(),
            from: self.signer.address(),
            nonce,
            gas_limit,
            gas_price,
            chain_id,
            status: TxnStatus::Built,
        })
    }

    /// Builds and signs a transaction, then proves the signature belongs to the expected
    /// sender before it can be broadcast.
    ///
    /// # Errors
    /// * `PipelineError::Build` - If the call is malformed or signing fails
    /// * `PipelineError::SignerMismatch` - If the recovered signer is not the expected sender
    pub fn build_and_sign(
        &self,
        call: &ContractCall,
        nonce: u64,
        gas_price: u128,
        gas_limit: u64,
        chain_id: Option<u64>,
    ) -> Result<SignedTransaction, PipelineError> {
        let mut transaction = self.build(call, nonce, gas_price, gas_limit, chain_id)?;

        if transaction.from != self.expected_address {
            warn!(
                "Transaction {} was built with sender {}, overwriting with {}",
                transaction.id, transaction.from, self.expected_address
            );
            transaction.from = self.expected_address;
        }

        let mut legacy_txn = TxLegacy {
            chain_id: transaction.chain_id,
            nonce: transaction.nonce,
            gas_price: transaction.gas_price,
            gas_limit: transaction.gas_limit,
            to: TxKind::Call(transaction.call.contract_address),
            value: U256::ZERO,
            input: transaction.call.calldata.clone(),
        };

        let signature = self
            .signer
            .sign_transaction_sync(&mut legacy_txn)
            .map_err(|err| {
                PipelineError::Build(format!(
                    "Failed to sign transaction {}. Error: {}",
                    transaction.id, err
                ))
            })?;
        let signed_txn = legacy_txn.into_signed(signature);

        let recovered = signed_txn.recover_signer().map_err(|err| {
            PipelineError::Build(format!(
                "Failed to recover the signer of transaction {}. Error: {}",
                transaction.id, err
            ))
        })?;
        if recovered != transaction.from {
            error!(
                "Signer mismatch for transaction {} ({} on {}, nonce {}): expected {}, recovered {}",
                transaction.id,
                transaction.call.label,
                transaction.call.contract_address,
                transaction.nonce,
                transaction.from,
                recovered
            );
            return Err(PipelineError::SignerMismatch {
                expected: transaction.from,
                recovered,
            });
        }

        let envelope = TxEnvelope::from(signed_txn);
        let txn_hash = *envelope.tx_hash();
        transaction.status = TxnStatus::Signed;
        debug!(
            "Signed transaction {} ({}) with nonce {}",
            transaction.id, txn_hash, transaction.nonce
        );

        Ok(SignedTransaction {
            transaction,
            raw: Bytes::from(envelope.encoded_2718()),
            txn_hash,
            signer: recovered,
        })
    }
}
