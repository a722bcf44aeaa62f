#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Transaction execution engine for EVM chains.
//!
//! This crate takes a caller-built [`TransactionIntent`] through validation,
//! fee estimation, signing, broadcast, and receipt confirmation, across
//! chains whose fee and envelope rules differ.
//!
//! # Features
//!
//! - **Three account models**: local keys, delegated external wallets, and
//!   ERC-4337 smart accounts behind one [`AccountHandle`]
//! - **Chain-aware pricing**: legacy, EIP-1559, and rollup
//!   (`zks_estimateFee`) formulas selected by a static chain profile table,
//!   with graceful degradation to the legacy gas price
//! - **EIP-712 rollup envelopes**: type-`0x71` transactions with native
//!   paymasters and factory dependencies
//! - **Silent-revert detection**: receipts are scanned for failed
//!   entry-point user operations instead of trusting the status flag
//!
//! # Architecture
//!
//! - [`intent`] - the mutable transaction request and its builder
//! - [`chains`] - chain classification table
//! - [`account`] - the three account kinds and their capability traits
//! - [`fees`] - fee quoting and gas estimation
//! - [`dispatch`] - the validate/fill/price/submit state machine
//! - [`receipt`] - receipt polling and outcome classification
//! - [`rollup`] - EIP-712 structured rollup transactions
//!
//! Smart-account construction (counterfactual addresses, bundlers,
//! paymasters, session keys) lives in the companion `evmtx-aa` crate, which
//! plugs in through [`account::SmartAccountApi`].

pub mod account;
pub mod chains;
pub mod dispatch;
pub mod error;
pub mod fees;
pub mod intent;
pub mod receipt;
pub mod rollup;

#[cfg(test)]
pub(crate) mod test_rpc;

pub use account::{
    AccountHandle, DelegatedAccount, HashSigner, KeyAccount, RemoteWallet, SmartAccountApi,
};
pub use chains::{ChainFlavor, ChainId, ChainProfile};
pub use dispatch::DispatchRouter;
pub use error::{EngineError, UsageError};
pub use fees::{FeeEstimator, FeeQuote};
pub use intent::{RollupOptions, TransactionIntent};
pub use receipt::{Receipt, ReceiptWatcher};
pub use rollup::RollupTransaction;
