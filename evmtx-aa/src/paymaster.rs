//! JSON-RPC client for sponsorship paymasters.

use alloy_primitives::{Address, Bytes};
use alloy_rpc_client::RpcClient;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use evmtx::EngineError;

use crate::userop::UserOperation;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Sponsorship {
    paymaster_and_data: Bytes,
}

/// Client for a paymaster's `pm_sponsorUserOperation` surface.
#[derive(Debug, Clone)]
pub struct PaymasterClient {
    client: RpcClient,
}

impl PaymasterClient {
    /// Connects to a paymaster endpoint over HTTP.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            client: RpcClient::new_http(url),
        }
    }

    /// Requests sponsorship for an operation, returning the
    /// paymaster-and-data bytes to install.
    ///
    /// Called twice per assembly: paymaster signatures cover the gas
    /// fields, so the pre-estimation grant is invalid once real gas
    /// numbers are in.
    pub async fn sponsor_user_operation(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<Bytes, EngineError> {
        let sponsorship: Sponsorship = self
            .client
            .request("pm_sponsorUserOperation", (op, entry_point))
            .await
            .map_err(|err| EngineError::Paymaster(err.to_string()))?;
        debug!(
            bytes = sponsorship.paymaster_and_data.len(),
            "operation sponsored"
        );
        Ok(sponsorship.paymaster_and_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_rpc::JsonRpc;
    use crate::userop::UserOperationDraft;
    use alloy_primitives::address;
    use serde_json::json;

    const ENTRY_POINT: Address = address!("5FF137D4b0FDCD49DcA30c7CF57E578a026d2789");

    #[tokio::test]
    async fn test_sponsorship_returns_paymaster_bytes() {
        let server = JsonRpc::new()
            .result(
                "pm_sponsorUserOperation",
                json!({ "paymasterAndData": "0xdeadbeef" }),
            )
            .mount()
            .await;

        let paymaster = PaymasterClient::new(server.uri().parse().unwrap());
        let op = UserOperationDraft::default().for_estimation();
        let data = paymaster
            .sponsor_user_operation(&op, ENTRY_POINT)
            .await
            .unwrap();
        assert_eq!(data, Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]));
    }

    #[tokio::test]
    async fn test_rejection_is_a_paymaster_error() {
        let server = JsonRpc::new()
            .error("pm_sponsorUserOperation", -32602, "policy rejected sender")
            .mount()
            .await;

        let paymaster = PaymasterClient::new(server.uri().parse().unwrap());
        let op = UserOperationDraft::default().for_estimation();
        let err = paymaster
            .sponsor_user_operation(&op, ENTRY_POINT)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Paymaster(_)));
        assert!(err.to_string().contains("policy rejected sender"));
    }
}
