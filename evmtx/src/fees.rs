//! Fee quoting and gas estimation.
//!
//! Three incompatible pricing formulas live here and are never mixed: the
//! legacy single gas price, the EIP-1559 pair, and the rollup pair sourced
//! from `zks_estimateFee`. Which formula applies is decided by the
//! [`ChainProfile`] classification table, not by inline chain-id branching.
//!
//! Estimation failures degrade: any RPC failure during pair estimation
//! falls back to `(gas_price, gas_price)` with a warning rather than
//! failing the caller. The log line distinguishes a node rejection (the
//! chain likely does not support the method) from a transport failure.

use alloy_primitives::U256;
use alloy_provider::Provider;
use alloy_rpc_types_eth::{BlockId, TransactionRequest};
use alloy_transport::{TransportError, TransportErrorKind};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::account::AccountHandle;
use crate::chains::ChainProfile;
use crate::error::EngineError;
use crate::intent::TransactionIntent;

/// Buffer applied to estimated prices against drift between estimation and
/// inclusion (~11%).
pub const FEE_BUMP: (u128, u128) = (10, 9);

/// Larger buffer for rollup estimates, reflecting higher uncertainty (2x).
pub const ROLLUP_FEE_BUMP: (u128, u128) = (10, 5);

/// Priority fee assumed when the node offers no suggestion.
const DEFAULT_PRIORITY_FEE: u128 = 2;

/// A chain-appropriate fee quote, computed per dispatch and never persisted.
///
/// Exactly one pricing formula is representable at a time; the "legacy gas
/// price and EIP-1559 pair both set" state cannot exist past pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeQuote {
    /// Single legacy gas price.
    Legacy {
        /// Gas price in wei.
        gas_price: u128,
    },
    /// Standard EIP-1559 pair.
    Eip1559 {
        /// Maximum total fee per gas in wei.
        max_fee_per_gas: u128,
        /// Maximum priority fee per gas in wei.
        max_priority_fee_per_gas: u128,
    },
    /// Same shape as [`FeeQuote::Eip1559`], but sourced from the rollup's
    /// own fee-estimation RPC and bumped harder.
    Rollup {
        /// Maximum total fee per gas in wei.
        max_fee_per_gas: u128,
        /// Maximum priority fee per gas in wei.
        max_priority_fee_per_gas: u128,
    },
}

impl FeeQuote {
    /// The worst-case price per unit of gas under this quote.
    #[must_use]
    pub const fn max_cost_per_gas(&self) -> u128 {
        match self {
            Self::Legacy { gas_price } => *gas_price,
            Self::Eip1559 {
                max_fee_per_gas, ..
            }
            | Self::Rollup {
                max_fee_per_gas, ..
            } => *max_fee_per_gas,
        }
    }

    /// The quote as a `(max_fee, max_priority_fee)` pair; a legacy quote
    /// collapses to `(gas_price, gas_price)`.
    #[must_use]
    pub const fn as_pair(&self) -> (u128, u128) {
        match self {
            Self::Legacy { gas_price } => (*gas_price, *gas_price),
            Self::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            }
            | Self::Rollup {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => (*max_fee_per_gas, *max_priority_fee_per_gas),
        }
    }
}

/// Fee object returned by the rollup's `zks_estimateFee` method.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RollupFee {
    /// Estimated gas limit for the call.
    pub gas_limit: U256,
    /// Per-byte gas-data limit.
    pub gas_per_pubdata_limit: U256,
    /// Suggested maximum fee per gas.
    pub max_fee_per_gas: U256,
    /// Suggested maximum priority fee per gas.
    pub max_priority_fee_per_gas: U256,
}

/// Computes chain-appropriate fee quotes and gas limits from live network
/// state.
#[derive(Debug, Clone)]
pub struct FeeEstimator<P> {
    provider: P,
    profile: ChainProfile,
}

impl<P> FeeEstimator<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    /// Creates an estimator for one chain.
    #[must_use]
    pub const fn new(provider: P, profile: ChainProfile) -> Self {
        Self { provider, profile }
    }

    /// Reads the node's current gas price, bumped by ~11% when `bump` is
    /// set.
    pub async fn gas_price(&self, bump: bool) -> Result<u128, EngineError> {
        let price = self.provider.get_gas_price().await?;
        Ok(if bump {
            bump_value(price, FEE_BUMP)
        } else {
            price
        })
    }

    /// Computes the `(max_fee, max_priority_fee)` pair for this chain.
    ///
    /// Zero-priority-fee chains return `(gas_price, gas_price)`. Rollup
    /// chains read `zks_estimateFee` and bump both fields by
    /// [`ROLLUP_FEE_BUMP`]. Any RPC failure degrades to
    /// `(gas_price, gas_price)`.
    pub async fn fee_pair(&self, bump: bool) -> Result<(u128, u128), EngineError> {
        self.fee_pair_for(None, bump).await
    }

    /// Produces the final [`FeeQuote`] for an intent.
    ///
    /// A legacy gas price on the intent wins outright; any EIP-1559 fields
    /// also present are dropped at this point (defense against
    /// partially-populated requests). Otherwise explicit EIP-1559 fields
    /// are honored and missing ones estimated.
    pub async fn quote(
        &self,
        intent: &TransactionIntent,
        bump: bool,
    ) -> Result<FeeQuote, EngineError> {
        if let Some(gas_price) = intent.gas_price() {
            if intent.max_fee_per_gas().is_some() || intent.max_priority_fee_per_gas().is_some() {
                debug!("legacy gas price set; ignoring EIP-1559 fields on the intent");
            }
            return Ok(FeeQuote::Legacy { gas_price });
        }

        let (max_fee, max_priority) = match (
            intent.max_fee_per_gas(),
            intent.max_priority_fee_per_gas(),
        ) {
            (Some(max_fee), Some(max_priority)) => (max_fee, max_priority),
            (explicit_fee, explicit_priority) => {
                let (estimated_fee, estimated_priority) =
                    self.fee_pair_for(Some(intent), bump).await?;
                (
                    explicit_fee.unwrap_or(estimated_fee),
                    explicit_priority.unwrap_or(estimated_priority),
                )
            }
        };

        Ok(if self.profile.is_rollup() {
            FeeQuote::Rollup {
                max_fee_per_gas: max_fee,
                max_priority_fee_per_gas: max_priority,
            }
        } else {
            FeeQuote::Eip1559 {
                max_fee_per_gas: max_fee,
                max_priority_fee_per_gas: max_priority,
            }
        })
    }

    /// Estimates the gas limit for an intent.
    ///
    /// Rollup chains take the `zks_estimateFee` limit with a 2x safety
    /// multiplier. Smart accounts estimate the *wrapped* call through the
    /// bundler — a materially different number from the raw call's.
    pub async fn gas_limit(
        &self,
        intent: &TransactionIntent,
        account: &AccountHandle,
    ) -> Result<u64, EngineError> {
        if self.profile.is_rollup() {
            let fee = self.rollup_fee(Some(intent)).await?;
            let limit = bump_value(fee.gas_limit.saturating_to::<u128>(), ROLLUP_FEE_BUMP);
            return Ok(u64::try_from(limit).unwrap_or(u64::MAX));
        }

        match account {
            AccountHandle::Smart(api) => api.estimate_intent_gas(intent).await,
            AccountHandle::Key(_) | AccountHandle::Delegated(_) => {
                let request = call_request(intent);
                Ok(self.provider.estimate_gas(request).await?)
            }
        }
    }

    /// Reads the rollup fee object for an intent (or an empty probe call).
    pub async fn rollup_fee(
        &self,
        intent: Option<&TransactionIntent>,
    ) -> Result<RollupFee, EngineError> {
        Ok(self.try_rollup_fee(intent).await?)
    }

    /// Estimated worst-case gas spend in wei: `gas_limit * max_cost_per_gas`.
    ///
    /// Uses the intent's own gas limit and fee fields when present, so an
    /// intent with both set is priced without touching the network.
    pub async fn estimate_gas_cost(&self, intent: &TransactionIntent) -> Result<U256, EngineError> {
        let limit = match intent.gas_limit() {
            Some(limit) => limit,
            None => {
                let request = call_request(intent);
                self.provider.estimate_gas(request).await?
            }
        };
        let per_gas = self.quote(intent, false).await?.max_cost_per_gas();
        Ok(U256::from(limit) * U256::from(per_gas))
    }

    /// Estimated worst-case total wei spend: gas cost plus the transferred
    /// value. `estimate_total_cost - estimate_gas_cost == intent.value()`
    /// always holds exactly.
    pub async fn estimate_total_cost(
        &self,
        intent: &TransactionIntent,
    ) -> Result<U256, EngineError> {
        Ok(self.estimate_gas_cost(intent).await? + intent.value())
    }

    async fn fee_pair_for(
        &self,
        intent: Option<&TransactionIntent>,
        bump: bool,
    ) -> Result<(u128, u128), EngineError> {
        if self.profile.zero_priority_fee() {
            let gas_price = self.gas_price(bump).await?;
            return Ok((gas_price, gas_price));
        }

        let attempt = if self.profile.is_rollup() {
            self.try_rollup_fee(intent).await.map(|fee| {
                (
                    bump_value(fee.max_fee_per_gas.saturating_to::<u128>(), ROLLUP_FEE_BUMP),
                    bump_value(
                        fee.max_priority_fee_per_gas.saturating_to::<u128>(),
                        ROLLUP_FEE_BUMP,
                    ),
                )
            })
        } else {
            self.try_eip1559_pair(bump).await
        };

        match attempt {
            Ok(pair) => Ok(pair),
            Err(err) => {
                if let Some(resp) = err.as_error_resp() {
                    warn!(
                        code = resp.code,
                        message = %resp.message,
                        "node rejected fee-pair estimation; falling back to legacy gas price"
                    );
                } else {
                    warn!(
                        error = %err,
                        "fee-pair estimation transport failure; falling back to legacy gas price"
                    );
                }
                let gas_price = self.gas_price(bump).await?;
                Ok((gas_price, gas_price))
            }
        }
    }

    async fn try_eip1559_pair(&self, bump: bool) -> Result<(u128, u128), TransportError> {
        let block = self.provider.get_block(BlockId::latest()).await?;
        let base_fee = block
            .and_then(|block| block.header.base_fee_per_gas)
            .ok_or_else(|| TransportErrorKind::custom_str("latest block carries no base fee"))?;

        let suggested = self
            .provider
            .get_max_priority_fee_per_gas()
            .await
            .unwrap_or(DEFAULT_PRIORITY_FEE);

        let mut max_priority = bump_value(suggested, FEE_BUMP);
        let mut max_fee = 2 * u128::from(base_fee) + max_priority;
        if bump {
            max_priority = bump_value(max_priority, FEE_BUMP);
            max_fee = bump_value(max_fee, FEE_BUMP);
        }
        Ok((max_fee, max_priority))
    }

    async fn try_rollup_fee(
        &self,
        intent: Option<&TransactionIntent>,
    ) -> Result<RollupFee, TransportError> {
        let request = intent.map(call_request).unwrap_or_default();
        self.provider
            .raw_request("zks_estimateFee".into(), (request,))
            .await
    }
}

fn call_request(intent: &TransactionIntent) -> TransactionRequest {
    let mut request = TransactionRequest::default()
        .value(intent.value())
        .input(intent.data().into());
    if let Some(from) = intent.from() {
        request = request.from(from);
    }
    if let Some(to) = intent.to() {
        request = request.to(to);
    }
    request
}

const fn bump_value(value: u128, (numerator, denominator): (u128, u128)) -> u128 {
    value * numerator / denominator
}
