//! The mutable transaction request and its builder API.
//!
//! A [`TransactionIntent`] is created with a chain ID, mutated through
//! chained setters, and consumed read-only by the fee estimator, the
//! dispatch router, and the signer. Setters never validate: a half-built
//! intent can be inspected and logged freely, and all checks are
//! centralized in [`DispatchRouter`](crate::dispatch::DispatchRouter).

use alloy_primitives::{Address, Bytes, U256};

use crate::chains::ChainId;

/// Rollup-specific extension fields carried by a [`TransactionIntent`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollupOptions {
    /// Paymaster contract address.
    pub paymaster: Option<Address>,
    /// Paymaster input bytes.
    pub paymaster_input: Bytes,
    /// Per-byte gas-data limit; engine default applied when unset.
    pub gas_per_pubdata: Option<u64>,
    /// Factory dependency bytecodes deployed alongside the transaction.
    pub factory_deps: Vec<Bytes>,
}

impl RollupOptions {
    /// Whether a paymaster is actually usable: a non-zero address together
    /// with non-empty input bytes.
    #[must_use]
    pub fn paymaster_configured(&self) -> bool {
        self.paymaster.is_some_and(|p| p != Address::ZERO) && !self.paymaster_input.is_empty()
    }
}

/// A high-level request to call an address with a payload.
///
/// The chain ID is fixed at construction; everything else is settable.
/// Legacy gas price and the EIP-1559 pair may both be written here, but the
/// dispatch router rejects an intent that carries both at send time.
#[derive(Debug, Clone)]
pub struct TransactionIntent {
    chain_id: ChainId,
    from: Option<Address>,
    to: Option<Address>,
    value: Option<U256>,
    data: Option<Bytes>,
    gas_limit: Option<u64>,
    gas_price: Option<u128>,
    max_fee_per_gas: Option<u128>,
    max_priority_fee_per_gas: Option<u128>,
    nonce: Option<u64>,
    rollup: Option<RollupOptions>,
}

impl TransactionIntent {
    /// Creates an empty intent bound to a chain.
    #[must_use]
    pub const fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            from: None,
            to: None,
            value: None,
            data: None,
            gas_limit: None,
            gas_price: None,
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            nonce: None,
            rollup: None,
        }
    }

    /// Sets the sender. Optional; defaults to the signer's address at
    /// dispatch, and must match it when set.
    #[must_use]
    pub const fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    /// Sets the recipient. Required at dispatch time.
    #[must_use]
    pub const fn with_to(mut self, to: Address) -> Self {
        self.to = Some(to);
        self
    }

    /// Sets the native token value.
    #[must_use]
    pub const fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }

    /// Sets the call payload.
    #[must_use]
    pub fn with_data(mut self, data: Bytes) -> Self {
        self.data = Some(data);
        self
    }

    /// Sets the gas limit, skipping estimation at dispatch.
    #[must_use]
    pub const fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    /// Sets a legacy gas price.
    #[must_use]
    pub const fn with_gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = Some(gas_price);
        self
    }

    /// Sets the EIP-1559 max fee per gas.
    #[must_use]
    pub const fn with_max_fee_per_gas(mut self, max_fee_per_gas: u128) -> Self {
        self.max_fee_per_gas = Some(max_fee_per_gas);
        self
    }

    /// Sets the EIP-1559 max priority fee per gas.
    #[must_use]
    pub const fn with_max_priority_fee_per_gas(mut self, max_priority_fee_per_gas: u128) -> Self {
        self.max_priority_fee_per_gas = Some(max_priority_fee_per_gas);
        self
    }

    /// Sets an explicit nonce, skipping the fresh-nonce lookup at dispatch.
    #[must_use]
    pub const fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Sets the rollup extension block.
    #[must_use]
    pub fn with_rollup_options(mut self, rollup: RollupOptions) -> Self {
        self.rollup = Some(rollup);
        self
    }

    /// The chain this intent is bound to.
    #[must_use]
    pub const fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Explicit sender, if set.
    #[must_use]
    pub const fn from(&self) -> Option<Address> {
        self.from
    }

    /// Recipient, if set.
    #[must_use]
    pub const fn to(&self) -> Option<Address> {
        self.to
    }

    /// Native token value; zero when unset.
    #[must_use]
    pub fn value(&self) -> U256 {
        self.value.unwrap_or(U256::ZERO)
    }

    /// Call payload; empty when unset.
    #[must_use]
    pub fn data(&self) -> Bytes {
        self.data.clone().unwrap_or_default()
    }

    /// Gas limit, if set.
    #[must_use]
    pub const fn gas_limit(&self) -> Option<u64> {
        self.gas_limit
    }

    /// Legacy gas price, if set.
    #[must_use]
    pub const fn gas_price(&self) -> Option<u128> {
        self.gas_price
    }

    /// EIP-1559 max fee per gas, if set.
    #[must_use]
    pub const fn max_fee_per_gas(&self) -> Option<u128> {
        self.max_fee_per_gas
    }

    /// EIP-1559 max priority fee per gas, if set.
    #[must_use]
    pub const fn max_priority_fee_per_gas(&self) -> Option<u128> {
        self.max_priority_fee_per_gas
    }

    /// Explicit nonce, if set.
    #[must_use]
    pub const fn nonce(&self) -> Option<u64> {
        self.nonce
    }

    /// Rollup extension block, if set.
    #[must_use]
    pub const fn rollup(&self) -> Option<&RollupOptions> {
        self.rollup.as_ref()
    }

    /// Whether the rollup extension names a usable paymaster.
    #[must_use]
    pub fn rollup_paymaster_configured(&self) -> bool {
        self.rollup.as_ref().is_some_and(RollupOptions::paymaster_configured)
    }

    pub(crate) const fn set_from(&mut self, from: Address) {
        self.from = Some(from);
    }

    pub(crate) const fn set_gas_limit(&mut self, gas_limit: u64) {
        self.gas_limit = Some(gas_limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const TO: Address = address!("742d35Cc6634C0532925a3b844Bc9e7595f4e123");

    #[test]
    fn test_chained_setters() {
        let intent = TransactionIntent::new(1)
            .with_to(TO)
            .with_value(U256::from(42))
            .with_gas_limit(21_000)
            .with_nonce(7);

        assert_eq!(intent.chain_id(), 1);
        assert_eq!(intent.to(), Some(TO));
        assert_eq!(intent.value(), U256::from(42));
        assert_eq!(intent.gas_limit(), Some(21_000));
        assert_eq!(intent.nonce(), Some(7));
    }

    #[test]
    fn test_defaults_when_unset() {
        let intent = TransactionIntent::new(1);
        assert_eq!(intent.value(), U256::ZERO);
        assert!(intent.data().is_empty());
        assert!(intent.to().is_none());
    }

    #[test]
    fn test_setters_never_validate() {
        // Both fee representations can coexist on the builder; the conflict
        // is only rejected at dispatch.
        let intent = TransactionIntent::new(1)
            .with_gas_price(10)
            .with_max_fee_per_gas(20);
        assert_eq!(intent.gas_price(), Some(10));
        assert_eq!(intent.max_fee_per_gas(), Some(20));
        // And a half-built intent is inspectable.
        let _ = format!("{intent:?}");
    }

    #[test]
    fn test_paymaster_configured_requires_address_and_input() {
        let empty = RollupOptions::default();
        assert!(!empty.paymaster_configured());

        let address_only = RollupOptions {
            paymaster: Some(TO),
            ..RollupOptions::default()
        };
        assert!(!address_only.paymaster_configured());

        let zero_address = RollupOptions {
            paymaster: Some(Address::ZERO),
            paymaster_input: Bytes::from_static(&[1, 2, 3]),
            ..RollupOptions::default()
        };
        assert!(!zero_address.paymaster_configured());

        let usable = RollupOptions {
            paymaster: Some(TO),
            paymaster_input: Bytes::from_static(&[1, 2, 3]),
            ..RollupOptions::default()
        };
        assert!(usable.paymaster_configured());
    }
}
