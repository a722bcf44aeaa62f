//! Chain classification for fee-model selection.
//!
//! Chain-id-keyed fee behavior is represented as data rather than inline
//! branching: chains that reject non-zero priority fees and rollups with
//! their own fee-estimation RPC are listed in tables here, so supporting a
//! new chain is additive.

use serde::{Deserialize, Serialize};

/// An EIP-155 chain ID (e.g., 1 for Ethereum Mainnet, 324 for ZkSync Era).
pub type ChainId = u64;

/// Celo Mainnet chain ID.
pub const CELO_MAINNET: ChainId = 42220;

/// Celo Alfajores (testnet) chain ID.
pub const CELO_ALFAJORES: ChainId = 44787;

/// Celo Baklava (testnet) chain ID.
pub const CELO_BAKLAVA: ChainId = 62320;

/// ZkSync Era Mainnet chain ID.
pub const ZKSYNC_ERA_MAINNET: ChainId = 324;

/// ZkSync Era Sepolia (testnet) chain ID.
pub const ZKSYNC_ERA_SEPOLIA: ChainId = 300;

/// Abstract Mainnet chain ID.
pub const ABSTRACT_MAINNET: ChainId = 2741;

/// Abstract Sepolia (testnet) chain ID.
pub const ABSTRACT_TESTNET: ChainId = 11124;

/// Chains known to reject transactions carrying a non-zero priority fee.
///
/// Fee-pair estimation for these chains returns `(gas_price, gas_price)`
/// instead of the EIP-1559 formulas.
pub const ZERO_PRIORITY_FEE_CHAINS: &[ChainId] = &[CELO_MAINNET, CELO_ALFAJORES, CELO_BAKLAVA];

/// Rollups that price transactions through `zks_estimateFee` and accept
/// EIP-712 structured (type `0x71`) transactions.
pub const EIP712_ROLLUP_CHAINS: &[ChainId] = &[
    ZKSYNC_ERA_MAINNET,
    ZKSYNC_ERA_SEPOLIA,
    ABSTRACT_MAINNET,
    ABSTRACT_TESTNET,
];

/// How a chain prices and accepts transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChainFlavor {
    /// Standard EIP-1559 chain.
    Standard,
    /// EIP-1559 chain that rejects non-zero priority fees.
    ZeroPriorityFee,
    /// Rollup with its own fee-estimation RPC and EIP-712 transactions.
    Rollup,
}

/// A chain ID paired with its fee-behavior classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainProfile {
    /// EIP-155 chain ID.
    pub chain_id: ChainId,
    /// Fee-behavior classification.
    pub flavor: ChainFlavor,
}

impl ChainProfile {
    /// Creates a profile with an explicit flavor, for chains not in the
    /// built-in tables.
    #[must_use]
    pub const fn new(chain_id: ChainId, flavor: ChainFlavor) -> Self {
        Self { chain_id, flavor }
    }

    /// Classifies a chain ID against the built-in tables.
    #[must_use]
    pub fn for_chain(chain_id: ChainId) -> Self {
        let flavor = if EIP712_ROLLUP_CHAINS.contains(&chain_id) {
            ChainFlavor::Rollup
        } else if ZERO_PRIORITY_FEE_CHAINS.contains(&chain_id) {
            ChainFlavor::ZeroPriorityFee
        } else {
            ChainFlavor::Standard
        };
        Self { chain_id, flavor }
    }

    /// Whether this chain takes the EIP-712 rollup transaction path.
    #[must_use]
    pub const fn is_rollup(&self) -> bool {
        matches!(self.flavor, ChainFlavor::Rollup)
    }

    /// Whether fee-pair estimation must collapse to `(gas_price, gas_price)`.
    #[must_use]
    pub const fn zero_priority_fee(&self) -> bool {
        matches!(self.flavor, ChainFlavor::ZeroPriorityFee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollup_chains_classified() {
        for id in EIP712_ROLLUP_CHAINS {
            assert_eq!(ChainProfile::for_chain(*id).flavor, ChainFlavor::Rollup);
        }
    }

    #[test]
    fn test_zero_priority_chains_classified() {
        for id in ZERO_PRIORITY_FEE_CHAINS {
            assert_eq!(
                ChainProfile::for_chain(*id).flavor,
                ChainFlavor::ZeroPriorityFee
            );
        }
    }

    #[test]
    fn test_unknown_chain_is_standard() {
        assert_eq!(ChainProfile::for_chain(1).flavor, ChainFlavor::Standard);
        assert_eq!(ChainProfile::for_chain(8453).flavor, ChainFlavor::Standard);
    }

    #[test]
    fn test_explicit_profile_overrides_tables() {
        let profile = ChainProfile::new(999_999, ChainFlavor::Rollup);
        assert!(profile.is_rollup());
    }
}
