// The network is gas-fee-free, so the limit only needs to be large enough for the heaviest call
pub(crate) const DEFAULT_GAS_LIMIT: u64 = 3_000_000;
pub(crate) const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;
// Batch minting has been observed to take up to this long to be mined
pub(crate) const DEFAULT_RECEIPT_TIMEOUT_SEC: u64 = 300;
pub(crate) const DEFAULT_RECEIPT_POLL_INTERVAL_MS: u64 = 200;

pub(crate) const RECEIPT_FETCH_RETRIES: usize = 3;
pub(crate) const RECEIPT_FETCH_BACKOFF_MS: u64 = 10;

pub(crate) const ENV_PREFIX: &str = "BESU";
pub(crate) const GENERIC_REVERT_REASON: &str = "Transaction reverted";
