//! EIP-712 typed transactions for zksync-style rollup chains.
//!
//! Rollup chains replace the standard transaction envelope with type
//! `0x71`: the sender signs an EIP-712 hash of the transaction under the
//! chain's `("zkSync", "2", chain_id)` domain, and the signature travels in
//! a dedicated `customSignature` field of the RLP payload rather than as
//! `(v, r, s)`. This is what makes native paymasters and factory
//! dependencies expressible at the transaction level.

use alloy_primitives::{Address, B256, Bytes, Signature, U256, keccak256};
use alloy_rlp::{Encodable, Header};
use alloy_sol_types::{SolStruct, eip712_domain, sol};
use sha2::{Digest, Sha256};

use crate::chains::ChainId;
use crate::error::UsageError;
use crate::intent::TransactionIntent;

/// Transaction envelope type byte for EIP-712 rollup transactions.
pub const EIP712_TX_TYPE: u8 = 0x71;

/// Per-byte publish-data gas limit applied when the intent does not set one.
pub const DEFAULT_GAS_PER_PUBDATA: u64 = 50_000;

sol! {
    /// The typed-data shape rollup nodes expect under the zkSync domain.
    /// Addresses are widened to `uint256` and factory dependencies appear
    /// as bytecode hashes, per the protocol's signing scheme.
    struct Transaction {
        uint256 txType;
        uint256 from;
        uint256 to;
        uint256 gasLimit;
        uint256 gasPerPubdataByteLimit;
        uint256 maxFeePerGas;
        uint256 maxPriorityFeePerGas;
        uint256 paymaster;
        uint256 nonce;
        uint256 value;
        bytes data;
        bytes32[] factoryDeps;
        bytes paymasterInput;
    }
}

/// A fully-populated type-`0x71` transaction ready to hash and encode.
///
/// Built from an intent only after the dispatch router has filled nonce,
/// gas limit, and fees, so every field here is concrete.
#[derive(Debug, Clone)]
pub struct RollupTransaction {
    /// Chain the transaction is bound to.
    pub chain_id: ChainId,
    /// Sender address.
    pub from: Address,
    /// Recipient address.
    pub to: Address,
    /// Account nonce.
    pub nonce: u64,
    /// Gas limit.
    pub gas_limit: u64,
    /// Per-byte publish-data gas limit.
    pub gas_per_pubdata: u64,
    /// Maximum total fee per gas.
    pub max_fee_per_gas: u128,
    /// Maximum priority fee per gas.
    pub max_priority_fee_per_gas: u128,
    /// Transferred value in wei.
    pub value: U256,
    /// Call payload.
    pub data: Bytes,
    /// Raw factory dependency bytecodes.
    pub factory_deps: Vec<Bytes>,
    /// Paymaster contract, when fees are sponsored.
    pub paymaster: Option<Address>,
    /// Paymaster validation input.
    pub paymaster_input: Bytes,
}

impl RollupTransaction {
    /// Lowers a filled intent into the rollup envelope.
    ///
    /// Callers must have resolved recipient, nonce, gas limit, and the
    /// EIP-1559 fee pair first.
    pub fn from_intent(intent: &TransactionIntent, from: Address) -> Result<Self, UsageError> {
        let to = intent.to().ok_or(UsageError::MissingRecipient)?;
        let rollup = intent.rollup().cloned().unwrap_or_default();
        Ok(Self {
            chain_id: intent.chain_id(),
            from,
            to,
            nonce: intent.nonce().unwrap_or_default(),
            gas_limit: intent.gas_limit().unwrap_or_default(),
            gas_per_pubdata: rollup.gas_per_pubdata.unwrap_or(DEFAULT_GAS_PER_PUBDATA),
            max_fee_per_gas: intent.max_fee_per_gas().unwrap_or_default(),
            max_priority_fee_per_gas: intent.max_priority_fee_per_gas().unwrap_or_default(),
            value: intent.value(),
            data: intent.data(),
            factory_deps: rollup.factory_deps,
            paymaster: rollup.paymaster,
            paymaster_input: rollup.paymaster_input,
        })
    }

    /// The EIP-712 digest the sender signs.
    pub fn signing_hash(&self) -> Result<B256, UsageError> {
        let dep_hashes = self
            .factory_deps
            .iter()
            .map(|code| hash_bytecode(code))
            .collect::<Result<Vec<_>, _>>()?;

        let typed = Transaction {
            txType: U256::from(EIP712_TX_TYPE),
            from: address_word(self.from),
            to: address_word(self.to),
            gasLimit: U256::from(self.gas_limit),
            gasPerPubdataByteLimit: U256::from(self.gas_per_pubdata),
            maxFeePerGas: U256::from(self.max_fee_per_gas),
            maxPriorityFeePerGas: U256::from(self.max_priority_fee_per_gas),
            paymaster: address_word(self.paymaster.unwrap_or(Address::ZERO)),
            nonce: U256::from(self.nonce),
            value: self.value,
            data: self.data.clone(),
            factoryDeps: dep_hashes,
            paymasterInput: self.paymaster_input.clone(),
        };

        let domain = eip712_domain! {
            name: "zkSync",
            version: "2",
            chain_id: self.chain_id,
        };
        Ok(typed.eip712_signing_hash(&domain))
    }

    /// Serializes the signed transaction as raw bytes for
    /// `eth_sendRawTransaction`: the `0x71` type byte followed by the RLP
    /// list with the signature in `customSignature`.
    #[must_use]
    pub fn encode_signed(&self, signature: &Signature) -> Bytes {
        let custom_signature = Bytes::from(signature.as_bytes().to_vec());
        let empty = Bytes::new();

        let paymaster = self.paymaster.unwrap_or(Address::ZERO);
        let paymaster_payload = if self.paymaster.is_some() {
            paymaster.length() + self.paymaster_input.length()
        } else {
            0
        };
        let paymaster_header = Header {
            list: true,
            payload_length: paymaster_payload,
        };

        let payload_length = self.nonce.length()
            + self.max_priority_fee_per_gas.length()
            + self.max_fee_per_gas.length()
            + self.gas_limit.length()
            + self.to.length()
            + self.value.length()
            + self.data.length()
            + self.chain_id.length()
            + empty.length() * 2
            + self.chain_id.length()
            + self.from.length()
            + self.gas_per_pubdata.length()
            + self.factory_deps.length()
            + custom_signature.length()
            + paymaster_header.length()
            + paymaster_header.payload_length;

        let mut out = Vec::with_capacity(1 + payload_length + 3);
        out.push(EIP712_TX_TYPE);
        Header {
            list: true,
            payload_length,
        }
        .encode(&mut out);
        self.nonce.encode(&mut out);
        self.max_priority_fee_per_gas.encode(&mut out);
        self.max_fee_per_gas.encode(&mut out);
        self.gas_limit.encode(&mut out);
        self.to.encode(&mut out);
        self.value.encode(&mut out);
        self.data.encode(&mut out);
        self.chain_id.encode(&mut out);
        empty.encode(&mut out);
        empty.encode(&mut out);
        self.chain_id.encode(&mut out);
        self.from.encode(&mut out);
        self.gas_per_pubdata.encode(&mut out);
        self.factory_deps.encode(&mut out);
        custom_signature.encode(&mut out);
        paymaster_header.encode(&mut out);
        if self.paymaster.is_some() {
            paymaster.encode(&mut out);
            self.paymaster_input.encode(&mut out);
        }
        Bytes::from(out)
    }

    /// The transaction hash the network will report: keccak of the raw
    /// signed bytes.
    #[must_use]
    pub fn hash_signed(&self, signature: &Signature) -> B256 {
        keccak256(self.encode_signed(signature))
    }
}

/// Rollup bytecode hash: a sha256 with the version byte and the bytecode's
/// 32-byte word count stamped into the top four bytes.
///
/// The protocol requires length to be a whole, odd number of 32-byte words
/// below 2^16.
pub fn hash_bytecode(code: &[u8]) -> Result<B256, UsageError> {
    if code.len() % 32 != 0 {
        return Err(UsageError::InvalidFactoryDependency(format!(
            "bytecode length {} is not a multiple of 32",
            code.len()
        )));
    }
    let words = code.len() / 32;
    if words % 2 == 0 {
        return Err(UsageError::InvalidFactoryDependency(format!(
            "bytecode is {words} words; an odd word count is required"
        )));
    }
    let words = u16::try_from(words).map_err(|_| {
        UsageError::InvalidFactoryDependency(format!("bytecode is too large ({words} words)"))
    })?;

    let mut hash: [u8; 32] = Sha256::digest(code).into();
    hash[0] = 1;
    hash[1] = 0;
    hash[2..4].copy_from_slice(&words.to_be_bytes());
    Ok(B256::from(hash))
}

fn address_word(address: Address) -> U256 {
    U256::from_be_slice(address.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;

    fn sample_tx(paymaster: Option<Address>) -> RollupTransaction {
        RollupTransaction {
            chain_id: crate::chains::ZKSYNC_ERA_MAINNET,
            from: address!("1111111111111111111111111111111111111111"),
            to: address!("2222222222222222222222222222222222222222"),
            nonce: 7,
            gas_limit: 500_000,
            gas_per_pubdata: DEFAULT_GAS_PER_PUBDATA,
            max_fee_per_gas: 250_000_000,
            max_priority_fee_per_gas: 0,
            value: U256::from(1_000),
            data: Bytes::from_static(&[0xde, 0xad]),
            factory_deps: Vec::new(),
            paymaster,
            paymaster_input: Bytes::new(),
        }
    }

    #[test]
    fn test_bytecode_hash_stamps_word_count() {
        let code = vec![0u8; 96]; // 3 words
        let hash = hash_bytecode(&code).unwrap();
        assert_eq!(hash[0], 1);
        assert_eq!(hash[1], 0);
        assert_eq!(u16::from_be_bytes([hash[2], hash[3]]), 3);
    }

    #[test]
    fn test_bytecode_hash_rejects_bad_shapes() {
        assert!(matches!(
            hash_bytecode(&[0u8; 31]),
            Err(UsageError::InvalidFactoryDependency(_))
        ));
        assert!(matches!(
            hash_bytecode(&[0u8; 64]),
            Err(UsageError::InvalidFactoryDependency(_))
        ));
    }

    #[test]
    fn test_signing_hash_depends_on_paymaster() {
        let without = sample_tx(None).signing_hash().unwrap();
        let with = sample_tx(Some(address!("3333333333333333333333333333333333333333")))
            .signing_hash()
            .unwrap();
        assert_ne!(without, with);
    }

    #[test]
    fn test_encode_signed_shape() {
        let signer = PrivateKeySigner::random();
        let tx = sample_tx(Some(address!("3333333333333333333333333333333333333333")));
        let signature = signer.sign_hash_sync(&tx.signing_hash().unwrap()).unwrap();

        let raw = tx.encode_signed(&signature);
        assert_eq!(raw[0], EIP712_TX_TYPE);
        // the 65-byte custom signature must appear in the payload verbatim
        let sig_bytes = signature.as_bytes();
        assert!(
            raw.windows(sig_bytes.len())
                .any(|window| window == sig_bytes)
        );
        assert_eq!(tx.hash_signed(&signature), keccak256(&raw));
    }

    #[test]
    fn test_from_intent_requires_recipient() {
        let intent = TransactionIntent::new(crate::chains::ZKSYNC_ERA_MAINNET);
        let err = RollupTransaction::from_intent(
            &intent,
            address!("1111111111111111111111111111111111111111"),
        )
        .unwrap_err();
        assert!(matches!(err, UsageError::MissingRecipient));
    }
}
