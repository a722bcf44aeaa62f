//! Error taxonomy for the transaction engine.
//!
//! The split follows how callers should react:
//!
//! - [`UsageError`] — a malformed request; always local and immediate, never
//!   retried.
//! - [`EngineError::Rpc`] — the node rejected something; the node's message
//!   is surfaced verbatim.
//! - [`EngineError::Reverted`] / `SilentlyReverted*` — the transaction was
//!   included but the call failed.
//! - [`EngineError::PollingCancelled`] — explicit caller cancellation,
//!   distinct from "not yet found".
//! - [`EngineError::ProtocolMismatch`] — a smart-account self-check failed;
//!   an implementation assumption is wrong, never swallowed.
//!
//! Fee-estimation RPC failures are not represented here at all: estimation
//! degrades to a conservative fallback instead of erroring.

use alloy_primitives::Address;
use alloy_transport::TransportError;

/// A locally detectable misuse of the engine API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    /// The intent has no recipient at dispatch time.
    #[error("transaction recipient is not set")]
    MissingRecipient,

    /// A legacy gas price and EIP-1559 fee fields were both supplied.
    #[error("legacy gas price and EIP-1559 fee fields are mutually exclusive")]
    ConflictingFeeFields,

    /// The explicit sender does not match the signing account.
    #[error("explicit sender {explicit} does not match signer address {signer}")]
    SenderMismatch {
        /// Sender set on the intent.
        explicit: Address,
        /// Address of the account asked to sign.
        signer: Address,
    },

    /// The intent's chain ID is zero or differs from the chain the engine
    /// was built for.
    #[error("invalid or mismatched chain id")]
    InvalidChainId,

    /// Smart accounts take the ERC-4337 path, which does not exist on
    /// native-AA rollup chains.
    #[error("smart accounts are not supported on EIP-712 rollup chains")]
    SmartAccountOnRollup,

    /// A raw ECDSA signature was requested from a contract account.
    #[error("smart accounts cannot produce raw ECDSA signatures")]
    SmartAccountRawSignature,

    /// A rollup factory dependency is not a valid deployable bytecode.
    #[error("invalid factory dependency: {0}")]
    InvalidFactoryDependency(String),
}

/// Any failure surfaced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed request; never retried.
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// RPC transport failure or node rejection, surfaced verbatim.
    #[error(transparent)]
    Rpc(#[from] TransportError),

    /// Local signer failure.
    #[error(transparent)]
    Signer(#[from] alloy_signer::Error),

    /// A signed envelope could not be assembled.
    #[error("transaction build failed: {0}")]
    Build(String),

    /// Transaction included with a failure status.
    #[error("execution reverted.")]
    Reverted,

    /// The wrapped user-operation call reverted while the outer transaction
    /// succeeded, and a reason string was recovered.
    #[error("execution silently reverted: {0}")]
    SilentlyReverted(String),

    /// The wrapped user-operation call reverted without a reason string.
    #[error("execution silently reverted with no reason string")]
    SilentlyRevertedNoReason,

    /// Receipt polling was cancelled by the caller.
    #[error("receipt polling was cancelled")]
    PollingCancelled,

    /// A smart-account self-check failed; the contract does not behave the
    /// way this engine assumes.
    #[error("smart account protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// The bundler returned an unusable response or timed out.
    #[error("bundler error: {0}")]
    Bundler(String),

    /// The paymaster declined or returned an unusable response.
    #[error("paymaster error: {0}")]
    Paymaster(String),

    /// A node or contract returned bytes that do not decode as expected.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revert_message_is_exact() {
        assert_eq!(EngineError::Reverted.to_string(), "execution reverted.");
    }

    #[test]
    fn test_silent_revert_message_prefix() {
        let err = EngineError::SilentlyReverted("TRANSFER_FAILED".to_owned());
        assert_eq!(
            err.to_string(),
            "execution silently reverted: TRANSFER_FAILED"
        );
    }

    #[test]
    fn test_usage_error_converts() {
        let err: EngineError = UsageError::MissingRecipient.into();
        assert!(matches!(err, EngineError::Usage(_)));
    }
}
