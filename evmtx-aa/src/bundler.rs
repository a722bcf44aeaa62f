//! JSON-RPC client for ERC-4337 bundlers.

use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use alloy_rpc_client::RpcClient;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

use evmtx::EngineError;

use crate::userop::UserOperation;

/// Delay between operation-receipt polls.
pub const BUNDLER_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Gas limits returned by `eth_estimateUserOperationGas`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationGasEstimate {
    /// Bundler overhead gas.
    pub pre_verification_gas: U256,
    /// Gas for validation and deployment.
    pub verification_gas_limit: U256,
    /// Gas for the inner call.
    pub call_gas_limit: U256,
}

/// Subset of the bundler's operation receipt the engine consumes.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    /// Hash of the included user operation.
    pub user_op_hash: B256,
    /// Whether the wrapped call succeeded.
    pub success: bool,
    /// The base-layer receipt the operation was bundled into.
    pub receipt: CarrierReceipt,
}

/// The carrier transaction pointer inside a bundler receipt.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarrierReceipt {
    /// Base-layer transaction hash.
    pub transaction_hash: B256,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GasPriceTier {
    max_fee_per_gas: U256,
    max_priority_fee_per_gas: U256,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct GasPriceHint {
    fast: GasPriceTier,
}

/// Client for a bundler's user-operation RPC surface.
#[derive(Debug, Clone)]
pub struct BundlerClient {
    client: RpcClient,
    poll_interval: Duration,
}

impl BundlerClient {
    /// Connects to a bundler endpoint over HTTP.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            client: RpcClient::new_http(url),
            poll_interval: BUNDLER_POLL_INTERVAL,
        }
    }

    /// Overrides the receipt poll interval (tests mostly).
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Asks the bundler to simulate the operation and return its gas
    /// limits. The operation must carry the dummy signature.
    pub async fn estimate_user_operation_gas(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<UserOperationGasEstimate, EngineError> {
        self.client
            .request("eth_estimateUserOperationGas", (op, entry_point))
            .await
            .map_err(|err| EngineError::Bundler(err.to_string()))
    }

    /// Submits a signed operation, returning its operation hash.
    pub async fn send_user_operation(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<B256, EngineError> {
        self.client
            .request("eth_sendUserOperation", (op, entry_point))
            .await
            .map_err(|err| EngineError::Bundler(err.to_string()))
    }

    /// Fetches the bundler's receipt for an operation, if included yet.
    pub async fn get_user_operation_receipt(
        &self,
        op_hash: B256,
    ) -> Result<Option<UserOperationReceipt>, EngineError> {
        self.client
            .request("eth_getUserOperationReceipt", (op_hash,))
            .await
            .map_err(|err| EngineError::Bundler(err.to_string()))
    }

    /// Best-effort fee-pair hint from the bundler
    /// (`pimlico_getUserOperationGasPrice`). `None` when the bundler does
    /// not implement the method; callers fall back to node estimation.
    pub async fn gas_price_hint(&self) -> Option<(u128, u128)> {
        let hint: Result<GasPriceHint, _> = self
            .client
            .request_noparams("pimlico_getUserOperationGasPrice")
            .await;
        match hint {
            Ok(hint) => Some((
                hint.fast.max_fee_per_gas.saturating_to(),
                hint.fast.max_priority_fee_per_gas.saturating_to(),
            )),
            Err(err) => {
                debug!(error = %err, "bundler gas-price hint unavailable");
                None
            }
        }
    }

    /// Polls for the operation's receipt until the bundler reports the
    /// carrier transaction hash, or `cancel` fires between polls.
    pub async fn wait_for_transaction_hash(
        &self,
        op_hash: B256,
        cancel: &CancellationToken,
    ) -> Result<B256, EngineError> {
        loop {
            if let Some(receipt) = self.get_user_operation_receipt(op_hash).await? {
                debug!(%op_hash, success = receipt.success, "user operation included");
                return Ok(receipt.receipt.transaction_hash);
            }
            trace!(%op_hash, "user operation not yet included");
            tokio::select! {
                () = cancel.cancelled() => return Err(EngineError::PollingCancelled),
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
