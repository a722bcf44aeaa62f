//! ERC-4337 v0.6 user operations: wire format, packing, and hashing.
//!
//! Assembly is split across two value types. [`UserOperationDraft`] has no
//! signature field at all; the only ways out of it are
//! [`UserOperationDraft::for_estimation`], which installs the fixed dummy
//! signature, and [`UserOperationDraft::into_signed`], which installs a
//! real one. The dummy can therefore never end up in a submitted copy by
//! forgetting to overwrite a field.

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use alloy_sol_types::SolValue;
use serde::Serialize;

use evmtx::ChainId;

/// Byte length of an ECDSA signature as smart-account wallets expect it.
pub const SIGNATURE_LENGTH: usize = 65;

/// The deterministic placeholder signature used during gas estimation.
///
/// All-ones `r || s` with a valid recovery byte: structurally parseable by
/// validation code, maximal in cost, and meaningless on-chain.
#[must_use]
pub fn dummy_signature() -> Bytes {
    let mut signature = [0xff_u8; SIGNATURE_LENGTH];
    signature[SIGNATURE_LENGTH - 1] = 0x1c;
    Bytes::from(signature.to_vec())
}

/// A user operation still being assembled: everything but the signature.
#[derive(Debug, Clone, Default)]
pub struct UserOperationDraft {
    /// The smart account address.
    pub sender: Address,
    /// Entry-point nonce: random 192-bit key in the high bits, on-chain
    /// sequence in the low 64.
    pub nonce: U256,
    /// Factory address plus create-account calldata; empty once deployed.
    pub init_code: Bytes,
    /// The encoded execute call.
    pub call_data: Bytes,
    /// Gas for the inner call.
    pub call_gas_limit: U256,
    /// Gas for signature validation and (if any) deployment.
    pub verification_gas_limit: U256,
    /// Gas paid to the bundler for calldata and overhead.
    pub pre_verification_gas: U256,
    /// EIP-1559 max fee per gas.
    pub max_fee_per_gas: U256,
    /// EIP-1559 max priority fee per gas.
    pub max_priority_fee_per_gas: U256,
    /// Paymaster address plus its validation payload; empty when unsponsored.
    pub paymaster_and_data: Bytes,
}

impl UserOperationDraft {
    /// A throwaway copy carrying the dummy signature, for bundler gas
    /// estimation and paymaster sponsorship requests only.
    #[must_use]
    pub fn for_estimation(&self) -> UserOperation {
        self.clone().with_signature(dummy_signature())
    }

    /// Consumes the draft into the final, submittable operation.
    #[must_use]
    pub fn into_signed(self, signature: Bytes) -> UserOperation {
        self.with_signature(signature)
    }

    /// The entry point's canonical operation hash: the packed fields are
    /// ABI-encoded and hashed, then bound to the entry point and chain.
    #[must_use]
    pub fn hash(&self, entry_point: Address, chain_id: ChainId) -> B256 {
        let packed = (
            self.sender,
            self.nonce,
            keccak256(&self.init_code),
            keccak256(&self.call_data),
            self.call_gas_limit,
            self.verification_gas_limit,
            self.pre_verification_gas,
            self.max_fee_per_gas,
            self.max_priority_fee_per_gas,
            keccak256(&self.paymaster_and_data),
        )
            .abi_encode();
        let bound = (keccak256(packed), entry_point, U256::from(chain_id)).abi_encode();
        keccak256(bound)
    }

    fn with_signature(self, signature: Bytes) -> UserOperation {
        UserOperation {
            sender: self.sender,
            nonce: self.nonce,
            init_code: self.init_code,
            call_data: self.call_data,
            call_gas_limit: self.call_gas_limit,
            verification_gas_limit: self.verification_gas_limit,
            pre_verification_gas: self.pre_verification_gas,
            max_fee_per_gas: self.max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
            paymaster_and_data: self.paymaster_and_data,
            signature,
        }
    }
}

/// A complete v0.6 user operation in bundler wire format: camelCase keys,
/// hex quantities, hex byte strings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    /// The smart account address.
    pub sender: Address,
    /// Entry-point nonce.
    pub nonce: U256,
    /// Deployment init code, empty for deployed accounts.
    pub init_code: Bytes,
    /// The encoded execute call.
    pub call_data: Bytes,
    /// Gas for the inner call.
    pub call_gas_limit: U256,
    /// Gas for validation and deployment.
    pub verification_gas_limit: U256,
    /// Bundler overhead gas.
    pub pre_verification_gas: U256,
    /// EIP-1559 max fee per gas.
    pub max_fee_per_gas: U256,
    /// EIP-1559 max priority fee per gas.
    pub max_priority_fee_per_gas: U256,
    /// Paymaster address and payload, empty when unsponsored.
    pub paymaster_and_data: Bytes,
    /// Dummy signature in estimation copies, the admin's signature in
    /// submitted ones.
    pub signature: Bytes,
}
