//! Account handles: the three signing/dispatch models.
//!
//! [`AccountHandle`] is a closed tagged union over the capability set
//! {address lookup, raw-hash signing, send}. The dispatch router branches on
//! the variant tag, never on runtime type inspection:
//!
//! - [`KeyAccount`] holds a private key directly.
//! - [`DelegatedAccount`] proxies signing and submission to an external
//!   wallet service behind the narrow [`RemoteWallet`] interface.
//! - `Smart` wraps an ERC-4337 contract account behind [`SmartAccountApi`];
//!   the implementation lives in the companion account-abstraction crate.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, B256, Bytes, Signature, eip191_hash_message};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;

use crate::error::{EngineError, UsageError};
use crate::intent::TransactionIntent;

/// An external wallet service that holds the key material elsewhere.
///
/// This is the entire surface the engine needs from a delegated wallet:
/// "what is your address", "sign this hash", and "get this intent on-chain
/// through your own channel".
#[async_trait]
pub trait RemoteWallet: Send + Sync {
    /// The wallet's address.
    fn address(&self) -> Address;

    /// Signs a 32-byte hash.
    async fn sign_hash(&self, hash: B256) -> Result<Signature, EngineError>;

    /// Signs and broadcasts the intent, returning the transaction hash.
    async fn send_transaction(&self, intent: &TransactionIntent) -> Result<B256, EngineError>;
}

/// The capability surface of an ERC-4337 smart account, as seen by the core
/// engine. Implemented by the account-abstraction crate.
#[async_trait]
pub trait SmartAccountApi: Send + Sync {
    /// The account address, derived counterfactually when undeployed.
    async fn address(&self) -> Result<Address, EngineError>;

    /// Whether bytecode is present at the account address.
    async fn is_deployed(&self) -> Result<bool, EngineError>;

    /// Produces an ERC-1271-validatable signature over a message.
    async fn personal_sign(&self, message: &[u8]) -> Result<Bytes, EngineError>;

    /// Wraps the intent in a user operation and submits it via a bundler,
    /// returning the transaction hash the operation landed in.
    async fn send_intent(&self, intent: &TransactionIntent) -> Result<B256, EngineError>;

    /// Estimates gas for the wrapped call (the user operation's call-gas
    /// component, not the raw call's).
    async fn estimate_intent_gas(&self, intent: &TransactionIntent) -> Result<u64, EngineError>;
}

/// A raw-signature capability shared by key-holding and delegated accounts.
///
/// Smart accounts cannot implement this: they have no single ECDSA key.
#[async_trait]
pub trait HashSigner: Send + Sync {
    /// The signer's address.
    fn address(&self) -> Address;

    /// Signs a 32-byte hash, returning the recoverable signature.
    async fn sign_hash(&self, hash: B256) -> Result<Signature, EngineError>;
}

/// An account controlled directly by a local private key.
#[derive(Clone)]
pub struct KeyAccount {
    signer: PrivateKeySigner,
}

impl KeyAccount {
    /// Wraps an existing local signer.
    #[must_use]
    pub const fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    /// Generates a fresh random key. Useful for tests and throwaway
    /// session signers.
    #[must_use]
    pub fn random() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
        }
    }

    /// The account address.
    #[must_use]
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub(crate) const fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }
}

impl fmt::Debug for KeyAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyAccount")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HashSigner for KeyAccount {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn sign_hash(&self, hash: B256) -> Result<Signature, EngineError> {
        Ok(Signer::sign_hash(&self.signer, &hash).await?)
    }
}

/// An account whose key material lives in an external service or device.
#[derive(Clone)]
pub struct DelegatedAccount {
    wallet: Arc<dyn RemoteWallet>,
}

impl DelegatedAccount {
    /// Wraps a remote wallet handle.
    #[must_use]
    pub fn new(wallet: Arc<dyn RemoteWallet>) -> Self {
        Self { wallet }
    }

    /// The wallet's address.
    #[must_use]
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Signs and broadcasts through the wallet's own channel.
    pub async fn send_transaction(&self, intent: &TransactionIntent) -> Result<B256, EngineError> {
        self.wallet.send_transaction(intent).await
    }
}

impl fmt::Debug for DelegatedAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedAccount")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HashSigner for DelegatedAccount {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign_hash(&self, hash: B256) -> Result<Signature, EngineError> {
        self.wallet.sign_hash(hash).await
    }
}

/// One of the three account kinds the dispatch router understands.
#[derive(Clone)]
pub enum AccountHandle {
    /// Raw key-holding account.
    Key(KeyAccount),
    /// Externally delegated wallet.
    Delegated(DelegatedAccount),
    /// ERC-4337 smart-contract account.
    Smart(Arc<dyn SmartAccountApi>),
}

impl AccountHandle {
    /// The signing address. For smart accounts this may hit the chain to
    /// derive the counterfactual address.
    pub async fn address(&self) -> Result<Address, EngineError> {
        match self {
            Self::Key(account) => Ok(account.address()),
            Self::Delegated(account) => Ok(account.address()),
            Self::Smart(account) => account.address().await,
        }
    }

    /// Signs a raw 32-byte hash. Fails for smart accounts, which only
    /// produce ERC-1271 signatures via `personal_sign`.
    pub async fn sign_hash(&self, hash: B256) -> Result<Signature, EngineError> {
        match self {
            Self::Key(account) => HashSigner::sign_hash(account, hash).await,
            Self::Delegated(account) => HashSigner::sign_hash(account, hash).await,
            Self::Smart(_) => Err(UsageError::SmartAccountRawSignature.into()),
        }
    }

    /// Signs a human-readable message. Key and delegated accounts produce
    /// an EIP-191 personal signature; smart accounts produce an
    /// ERC-1271-validatable signature through their own signing path.
    pub async fn sign_message(&self, message: &[u8]) -> Result<Bytes, EngineError> {
        match self {
            Self::Smart(account) => account.personal_sign(message).await,
            Self::Key(_) | Self::Delegated(_) => {
                let signature = self.sign_hash(eip191_hash_message(message)).await?;
                Ok(signature.as_bytes().into())
            }
        }
    }
}

impl fmt::Debug for AccountHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(account) => f.debug_tuple("Key").field(account).finish(),
            Self::Delegated(account) => f.debug_tuple("Delegated").field(account).finish(),
            Self::Smart(_) => f.write_str("Smart(..)"),
        }
    }
}

impl From<KeyAccount> for AccountHandle {
    fn from(account: KeyAccount) -> Self {
        Self::Key(account)
    }
}

impl From<DelegatedAccount> for AccountHandle {
    fn from(account: DelegatedAccount) -> Self {
        Self::Delegated(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;

    #[tokio::test]
    async fn test_key_account_signs_recoverably() {
        let account = KeyAccount::random();
        let hash = keccak256(b"evmtx");
        let signature = HashSigner::sign_hash(&account, hash).await.unwrap();
        let recovered = signature.recover_address_from_prehash(&hash).unwrap();
        assert_eq!(recovered, account.address());
    }

    #[tokio::test]
    async fn test_key_handle_signs_messages_with_eip191_prefix() {
        let account = KeyAccount::random();
        let expected = account.address();
        let handle = AccountHandle::from(account);
        let encoded = handle.sign_message(b"hello").await.unwrap();
        let signature = Signature::from_raw(&encoded).unwrap();
        let digest = eip191_hash_message(b"hello");
        assert_eq!(
            signature.recover_address_from_prehash(&digest).unwrap(),
            expected
        );
    }

    #[tokio::test]
    async fn test_handle_rejects_raw_signing_for_smart_accounts() {
        struct Noop;

        #[async_trait]
        impl SmartAccountApi for Noop {
            async fn address(&self) -> Result<Address, EngineError> {
                Ok(Address::ZERO)
            }
            async fn is_deployed(&self) -> Result<bool, EngineError> {
                Ok(false)
            }
            async fn personal_sign(&self, _message: &[u8]) -> Result<Bytes, EngineError> {
                Ok(Bytes::new())
            }
            async fn send_intent(&self, _intent: &TransactionIntent) -> Result<B256, EngineError> {
                Ok(B256::ZERO)
            }
            async fn estimate_intent_gas(
                &self,
                _intent: &TransactionIntent,
            ) -> Result<u64, EngineError> {
                Ok(0)
            }
        }

        let handle = AccountHandle::Smart(Arc::new(Noop));
        let err = handle.sign_hash(B256::ZERO).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Usage(UsageError::SmartAccountRawSignature)
        ));
    }
}
