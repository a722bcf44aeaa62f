//! Receipt polling and the silent-revert trapdoor.
//!
//! A bundler-dispatched user operation can fail while its carrier
//! transaction succeeds: the entry point catches the inner revert, emits a
//! `UserOperationEvent` with `success == false`, and the receipt reports
//! status 1. Trusting the receipt status alone silently drops those
//! failures, so every receipt is scanned for entry-point events before it
//! is handed back to the caller.

use std::time::Duration;

use alloy_primitives::{B256, Bytes};
use alloy_provider::Provider;
use alloy_rpc_types_eth::{Log, TransactionReceipt};
use alloy_sol_types::{Revert, SolError, SolEvent, sol};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::EngineError;

/// Delay between receipt polls.
pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

sol! {
    /// Entry-point event emitted once per user operation, successful or not.
    event UserOperationEvent(
        bytes32 indexed userOpHash,
        address indexed sender,
        address indexed paymaster,
        uint256 nonce,
        bool success,
        uint256 actualGasCost,
        uint256 actualGasUsed
    );

    /// Entry-point event carrying the inner revert payload of a failed
    /// user operation.
    event UserOperationRevertReason(
        bytes32 indexed userOpHash,
        address indexed sender,
        uint256 nonce,
        bytes revertReason
    );
}

/// Classified outcome of a user-operation scan over receipt logs.
enum OperationOutcome {
    /// No failed user operation found (including receipts with no
    /// entry-point events at all).
    Clean,
    /// A user operation failed and its revert payload decoded to a reason.
    Failed(String),
    /// A user operation failed with no usable revert payload.
    FailedNoReason,
}

/// An immutable, classified view of a mined transaction.
#[derive(Debug, Clone)]
pub struct Receipt {
    /// Hash of the mined transaction.
    pub transaction_hash: B256,
    /// Block the transaction landed in.
    pub block_number: Option<u64>,
    /// On-chain status flag of the carrier transaction.
    pub success: bool,
    /// All logs emitted by the transaction.
    pub logs: Vec<Log>,
    /// Decoded reason of a silently-reverted user operation, when one both
    /// failed and carried an `Error(string)` payload.
    pub revert_reason: Option<String>,
}

impl Receipt {
    /// Builds the classified view from an RPC receipt.
    #[must_use]
    pub fn from_rpc(receipt: &TransactionReceipt) -> Self {
        let logs = receipt.inner.logs().to_vec();
        let revert_reason = match scan_user_operations(&logs) {
            OperationOutcome::Failed(reason) => Some(reason),
            OperationOutcome::Clean | OperationOutcome::FailedNoReason => None,
        };
        Self {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            success: receipt.status(),
            logs,
            revert_reason,
        }
    }

    /// Maps this receipt to the engine's outcome classification.
    ///
    /// Status 0 is [`EngineError::Reverted`]. A successful carrier whose
    /// contained user operation failed is
    /// [`EngineError::SilentlyReverted`] with the decoded reason, or the
    /// no-reason variant when the entry point logged none.
    pub fn ensure_confirmed(&self) -> Result<(), EngineError> {
        if !self.success {
            return Err(EngineError::Reverted);
        }
        match scan_user_operations(&self.logs) {
            OperationOutcome::Clean => Ok(()),
            OperationOutcome::Failed(reason) => Err(EngineError::SilentlyReverted(reason)),
            OperationOutcome::FailedNoReason => Err(EngineError::SilentlyRevertedNoReason),
        }
    }
}

/// Polls for transaction receipts and classifies their outcome.
#[derive(Debug, Clone)]
pub struct ReceiptWatcher<P> {
    provider: P,
    poll_interval: Duration,
}

impl<P> ReceiptWatcher<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    /// Creates a watcher with the default one-second poll interval.
    #[must_use]
    pub const fn new(provider: P) -> Self {
        Self {
            provider,
            poll_interval: RECEIPT_POLL_INTERVAL,
        }
    }

    /// Overrides the poll interval (tests mostly).
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Polls until the transaction is mined, then classifies the receipt.
    ///
    /// A receipt that classifies as reverted or silently reverted is
    /// returned as the corresponding error. Cancellation between polls
    /// raises [`EngineError::PollingCancelled`], distinct from both
    /// not-found (which keeps polling) and node errors (which propagate
    /// immediately).
    pub async fn wait_for_receipt(
        &self,
        tx_hash: B256,
        cancel: &CancellationToken,
    ) -> Result<Receipt, EngineError> {
        loop {
            if let Some(receipt) = self.provider.get_transaction_receipt(tx_hash).await? {
                debug!(%tx_hash, status = receipt.status(), "transaction mined");
                let receipt = Receipt::from_rpc(&receipt);
                receipt.ensure_confirmed()?;
                return Ok(receipt);
            }
            trace!(%tx_hash, "receipt not yet available");
            tokio::select! {
                () = cancel.cancelled() => return Err(EngineError::PollingCancelled),
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

fn scan_user_operations(logs: &[Log]) -> OperationOutcome {
    for log in logs {
        if log.topic0() != Some(&UserOperationEvent::SIGNATURE_HASH) {
            continue;
        }
        let Ok(event) = UserOperationEvent::decode_log(&log.inner) else {
            continue;
        };
        if event.success {
            continue;
        }
        // The carrier succeeded but the inner operation did not. Look for
        // the revert payload emitted for the same operation hash.
        let reason = logs.iter().find_map(|candidate| {
            if candidate.topic0() != Some(&UserOperationRevertReason::SIGNATURE_HASH) {
                return None;
            }
            let decoded = UserOperationRevertReason::decode_log(&candidate.inner).ok()?;
            (decoded.userOpHash == event.userOpHash).then_some(decoded.revertReason.clone())
        });
        return match reason {
            Some(payload) if !payload.is_empty() => {
                OperationOutcome::Failed(decode_revert_payload(&payload))
            }
            _ => OperationOutcome::FailedNoReason,
        };
    }
    OperationOutcome::Clean
}

/// Renders a revert payload for humans: the `Error(string)` message when
/// the payload is one, the raw hex otherwise.
fn decode_revert_payload(payload: &Bytes) -> String {
    if payload.len() >= 4 && payload[..4] == Revert::SELECTOR {
        if let Ok(revert) = Revert::abi_decode(payload) {
            return revert.reason;
        }
    }
    payload.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_rpc::{JsonRpc, log_json, receipt_json};
    use alloy_primitives::{Address, U256, address, hex};
    use alloy_provider::RootProvider;
    use alloy_sol_types::SolValue;
    use serde_json::{Value, json};

    const TX_HASH: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";
    const OP_HASH: &str = "0x2222222222222222222222222222222222222222222222222222222222222222";
    const ENTRY_POINT: &str = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";

    fn watcher(server_uri: &str) -> ReceiptWatcher<RootProvider> {
        let url = server_uri.parse().unwrap();
        ReceiptWatcher::new(RootProvider::new_http(url))
            .with_poll_interval(Duration::from_millis(10))
    }

    fn topic_hash(hash: B256) -> String {
        format!("0x{}", hex::encode(hash))
    }

    fn address_topic(address: Address) -> String {
        format!(
            "0x{}",
            hex::encode(B256::left_padding_from(address.as_slice()))
        )
    }

    fn op_event_log(success: bool) -> Value {
        let sender = address!("4444444444444444444444444444444444444444");
        // Event data is the head/tail sequence of the non-indexed fields,
        // not a wrapped tuple.
        let data = (U256::from(1), success, U256::ZERO, U256::ZERO).abi_encode_params();
        log_json(
            ENTRY_POINT,
            json!([
                topic_hash(UserOperationEvent::SIGNATURE_HASH),
                OP_HASH,
                address_topic(sender),
                address_topic(Address::ZERO),
            ]),
            format!("0x{}", hex::encode(data)),
        )
    }

    fn revert_reason_log(reason: &str) -> Value {
        let sender = address!("4444444444444444444444444444444444444444");
        let payload = Revert {
            reason: reason.to_string(),
        }
        .abi_encode();
        let data = (U256::from(1), Bytes::from(payload)).abi_encode_params();
        log_json(
            ENTRY_POINT,
            json!([
                topic_hash(UserOperationRevertReason::SIGNATURE_HASH),
                OP_HASH,
                address_topic(sender),
            ]),
            format!("0x{}", hex::encode(data)),
        )
    }

    async fn classify(receipt: Value) -> Result<Receipt, EngineError> {
        let server = JsonRpc::new()
            .result("eth_getTransactionReceipt", receipt)
            .mount()
            .await;
        watcher(&server.uri())
            .wait_for_receipt(TX_HASH.parse().unwrap(), &CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn test_successful_receipt_passes_through() {
        let receipt = classify(receipt_json(TX_HASH, true, json!([])))
            .await
            .unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.block_number, Some(1));
        assert!(receipt.revert_reason.is_none());
    }

    #[tokio::test]
    async fn test_failed_status_is_reverted() {
        let err = classify(receipt_json(TX_HASH, false, json!([])))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Reverted));
    }

    #[tokio::test]
    async fn test_silent_revert_with_reason() {
        let logs = json!([op_event_log(false), revert_reason_log("out of tokens")]);
        let err = classify(receipt_json(TX_HASH, true, logs)).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "execution silently reverted: out of tokens"
        );
    }

    #[tokio::test]
    async fn test_silent_revert_without_reason_log() {
        let logs = json!([op_event_log(false)]);
        let err = classify(receipt_json(TX_HASH, true, logs)).await.unwrap_err();
        assert!(matches!(err, EngineError::SilentlyRevertedNoReason));
    }

    #[tokio::test]
    async fn test_successful_user_operation_is_not_a_revert() {
        let logs = json!([op_event_log(true)]);
        let receipt = classify(receipt_json(TX_HASH, true, logs)).await.unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.logs.len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_polling() {
        let server = JsonRpc::new()
            .result("eth_getTransactionReceipt", Value::Null)
            .mount()
            .await;
        let watcher = watcher(&server.uri());
        let cancel = CancellationToken::new();

        let pending = watcher.wait_for_receipt(TX_HASH.parse().unwrap(), &cancel);
        let canceller = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel.cancel();
        };
        let (outcome, ()) = tokio::join!(pending, canceller);
        assert!(matches!(outcome, Err(EngineError::PollingCancelled)));
    }
}
