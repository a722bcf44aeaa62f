#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! ERC-4337 smart accounts for the `evmtx` engine.
//!
//! Provides the [`SmartAccount`] engine behind the core crate's
//! [`SmartAccountApi`](evmtx::account::SmartAccountApi) seam:
//!
//! - counterfactual address derivation and atomic first-call deployment
//! - two-pass user-operation assembly with paymaster sponsorship
//! - bundler submission with cancellable receipt polling
//! - ERC-1271 message signing with a structured-message probe and
//!   self-validation
//! - session keys and admin delegation via signed permission requests
//!
//! # Modules
//!
//! - [`userop`] - the v0.6 wire format, packing, and hashing
//! - [`bundler`] - the bundler RPC client
//! - [`paymaster`] - the sponsorship RPC client
//! - [`engine`] - the account engine itself
//! - [`permissions`] - session-key and admin permission requests

pub mod bundler;
pub mod engine;
pub mod paymaster;
pub mod permissions;
pub mod userop;

#[cfg(test)]
pub(crate) mod test_rpc;

pub use bundler::{BundlerClient, UserOperationGasEstimate, UserOperationReceipt};
pub use engine::{ENTRY_POINT_V06, SmartAccount, SmartAccountOptions};
pub use paymaster::PaymasterClient;
pub use permissions::{AdminStatus, SessionPermissionGrant};
pub use userop::{UserOperation, UserOperationDraft};
