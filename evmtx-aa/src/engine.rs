//! The smart-account engine: ERC-4337 assembly, submission, and signing.
//!
//! A [`SmartAccount`] lives in one of two states, `counterfactual` or
//! `deployed`, and the split is deliberately not cached: the derived
//! address never changes, so it is computed once, but deployment status is
//! re-read from `eth_getCode` wherever correctness depends on it. The
//! first user operation carries the factory init code, so deployment
//! happens atomically with the first real call.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::aliases::U192;
use alloy_primitives::{
    Address, B256, Bytes, FixedBytes, U256, address, eip191_hash_message, fixed_bytes,
};
use alloy_provider::Provider;
use alloy_sol_types::{SolCall, sol};
use async_trait::async_trait;
use rand::RngExt;
use rand::rng;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use evmtx::account::{AccountHandle, SmartAccountApi};
use evmtx::error::{EngineError, UsageError};
use evmtx::{ChainId, DispatchRouter, TransactionIntent};

use crate::bundler::BundlerClient;
use crate::paymaster::PaymasterClient;
use crate::permissions::SessionPermissionGrant;
use crate::userop::{UserOperation, UserOperationDraft};

/// Canonical ERC-4337 v0.6 entry point, deployed at the same address on
/// every supported chain.
pub const ENTRY_POINT_V06: Address = address!("5FF137D4b0FDCD49DcA30c7CF57E578a026d2789");

/// ERC-1271 success magic value (`isValidSignature` selector).
pub const ERC1271_MAGIC: FixedBytes<4> = fixed_bytes!("1626ba7e");

/// Safety margin added to the bundler's call-gas estimate. Applied to the
/// call-gas component only; verification and pre-verification gas are used
/// as estimated.
pub const CALL_GAS_MARGIN: u64 = 50_000;

sol! {
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IEntryPoint {
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
    }
}

sol! {
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IAccountFactory {
        function getAddress(address adminSigner, bytes data) external view returns (address account);
        function createAccount(address admin, bytes data) external returns (address account);
    }
}

sol! {
    /// The slice of the account implementation the engine talks to
    /// directly: the execute entry point, structured message wrapping, and
    /// ERC-1271 validation.
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IAccountContract {
        function execute(address target, uint256 value, bytes data) external;
        function getMessageHash(bytes32 messageHash) external view returns (bytes32 typedHash);
        function isValidSignature(bytes32 hash, bytes signature) external view returns (bytes4 magicValue);
    }
}

/// Construction-time configuration for a [`SmartAccount`].
#[derive(Debug, Clone)]
pub struct SmartAccountOptions {
    /// Account factory contract.
    pub factory: Address,
    /// Entry point; defaults to [`ENTRY_POINT_V06`].
    pub entry_point: Address,
    /// Bundler RPC endpoint.
    pub bundler_url: Url,
    /// Paymaster RPC endpoint, when sponsorship is available.
    pub paymaster_url: Option<Url>,
    /// Whether operations should be paymaster-sponsored.
    pub gasless: bool,
    /// Overrides counterfactual derivation when the account address is
    /// already known.
    pub account_address: Option<Address>,
    /// Upper bound on bundler receipt polling; unbounded when `None`.
    pub receipt_timeout: Option<Duration>,
}

impl SmartAccountOptions {
    /// Options for a v0.6 account behind the given factory and bundler.
    #[must_use]
    pub const fn new(factory: Address, bundler_url: Url) -> Self {
        Self {
            factory,
            entry_point: ENTRY_POINT_V06,
            bundler_url,
            paymaster_url: None,
            gasless: false,
            account_address: None,
            receipt_timeout: None,
        }
    }

    /// Enables gas sponsorship through a paymaster endpoint.
    #[must_use]
    pub fn with_paymaster(mut self, paymaster_url: Url) -> Self {
        self.paymaster_url = Some(paymaster_url);
        self.gasless = true;
        self
    }

    /// Overrides the entry point contract.
    #[must_use]
    pub const fn with_entry_point(mut self, entry_point: Address) -> Self {
        self.entry_point = entry_point;
        self
    }

    /// Pins the account address instead of deriving it from the factory.
    #[must_use]
    pub const fn with_account_address(mut self, account_address: Address) -> Self {
        self.account_address = Some(account_address);
        self
    }

    /// Bounds how long a submission waits for bundler inclusion.
    #[must_use]
    pub const fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = Some(timeout);
        self
    }
}

struct Inner<P> {
    provider: P,
    chain_id: ChainId,
    admin: AccountHandle,
    options: SmartAccountOptions,
    bundler: BundlerClient,
    paymaster: Option<PaymasterClient>,
    router: DispatchRouter<P>,
    derived_address: OnceCell<Address>,
}

/// An ERC-4337 smart account driven by an admin signer.
///
/// Cheap to clone; all state is behind one `Arc`.
pub struct SmartAccount<P> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for SmartAccount<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> fmt::Debug for SmartAccount<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmartAccount")
            .field("chain_id", &self.inner.chain_id)
            .field("factory", &self.inner.options.factory)
            .field("entry_point", &self.inner.options.entry_point)
            .field("gasless", &self.inner.options.gasless)
            .finish_non_exhaustive()
    }
}

impl<P> SmartAccount<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    /// Creates the engine for one account. `admin` must be able to produce
    /// raw hash signatures (a key or delegated account, not another smart
    /// account).
    #[must_use]
    pub fn new(
        provider: P,
        chain_id: ChainId,
        admin: AccountHandle,
        options: SmartAccountOptions,
    ) -> Self {
        let bundler = BundlerClient::new(options.bundler_url.clone());
        let paymaster = options.paymaster_url.clone().map(PaymasterClient::new);
        let router = DispatchRouter::new(provider.clone(), chain_id);
        Self {
            inner: Arc::new(Inner {
                provider,
                chain_id,
                admin,
                options,
                bundler,
                paymaster,
                router,
                derived_address: OnceCell::new(),
            }),
        }
    }

    /// This account as an [`AccountHandle`] for the dispatch router.
    #[must_use]
    pub fn handle(&self) -> AccountHandle {
        AccountHandle::Smart(Arc::new(self.clone()))
    }

    /// The account address: the construction override when present,
    /// otherwise derived once from the factory. Derivation does not depend
    /// on deployment state.
    pub async fn address(&self) -> Result<Address, EngineError> {
        if let Some(address) = self.inner.options.account_address {
            return Ok(address);
        }
        self.inner
            .derived_address
            .get_or_try_init(|| async {
                let admin = self.inner.admin.address().await?;
                let factory =
                    IAccountFactory::new(self.inner.options.factory, &self.inner.provider);
                let derived = factory
                    .getAddress(admin, Bytes::new())
                    .call()
                    .await
                    .map_err(contract_err)?;
                debug!(%admin, %derived, "counterfactual address derived");
                Ok(derived)
            })
            .await
            .copied()
    }

    /// Whether bytecode is present at the account address. Always re-read,
    /// never cached.
    pub async fn is_deployed(&self) -> Result<bool, EngineError> {
        let address = self.address().await?;
        let code = self.inner.provider.get_code_at(address).await?;
        Ok(!code.is_empty())
    }

    /// Assembles a fully-signed user operation for an intent without
    /// submitting it.
    ///
    /// Two sponsorship passes bracket gas estimation because paymaster
    /// signatures cover the gas fields, while estimation needs the
    /// paymaster data length.
    pub async fn build_user_operation(
        &self,
        intent: &TransactionIntent,
    ) -> Result<UserOperation, EngineError> {
        let mut draft = self.draft_operation(intent).await?;
        self.apply_sponsorship(&mut draft).await?;
        self.fill_gas(&mut draft).await?;
        self.apply_sponsorship(&mut draft).await?;

        let op_hash = draft.hash(self.inner.options.entry_point, self.inner.chain_id);
        let signature = self
            .inner
            .admin
            .sign_hash(eip191_hash_message(op_hash))
            .await?;
        debug!(%op_hash, "user operation signed");
        Ok(draft.into_signed(Bytes::from(signature.as_bytes().to_vec())))
    }

    /// Submits an intent as a user operation and polls the bundler until
    /// the carrier transaction hash is known or `cancel` fires.
    pub async fn send_with_cancellation(
        &self,
        intent: &TransactionIntent,
        cancel: &CancellationToken,
    ) -> Result<B256, EngineError> {
        let op = self.build_user_operation(intent).await?;
        let op_hash = self
            .inner
            .bundler
            .send_user_operation(&op, self.inner.options.entry_point)
            .await?;
        info!(%op_hash, sender = %op.sender, "user operation submitted");
        self.inner
            .bundler
            .wait_for_transaction_hash(op_hash, cancel)
            .await
    }

    /// Grants session-key permissions, returning the carrier transaction
    /// hash.
    pub async fn create_session_key(
        &self,
        grant: &SessionPermissionGrant,
    ) -> Result<B256, EngineError> {
        self.submit_grant(grant).await
    }

    /// Grants admin rights to another signer.
    pub async fn add_admin(&self, signer: Address) -> Result<B256, EngineError> {
        self.submit_grant(&SessionPermissionGrant::add_admin(signer))
            .await
    }

    /// Revokes a signer's admin rights.
    pub async fn remove_admin(&self, signer: Address) -> Result<B256, EngineError> {
        self.submit_grant(&SessionPermissionGrant::remove_admin(signer))
            .await
    }

    /// The partial operation: identity, nonce, deployment, call, and fees.
    /// Gas fields stay zero until the bundler has estimated them.
    async fn draft_operation(
        &self,
        intent: &TransactionIntent,
    ) -> Result<UserOperationDraft, EngineError> {
        let target = intent.to().ok_or(UsageError::MissingRecipient)?;
        let sender = self.address().await?;
        let init_code = self.init_code(sender).await?;
        let nonce = self.fetch_nonce(sender).await?;
        let (max_fee_per_gas, max_priority_fee_per_gas) = self.fee_pair().await?;

        let call_data = IAccountContract::executeCall {
            target,
            value: intent.value(),
            data: intent.data(),
        }
        .abi_encode();

        Ok(UserOperationDraft {
            sender,
            nonce,
            init_code,
            call_data: call_data.into(),
            call_gas_limit: U256::ZERO,
            verification_gas_limit: U256::ZERO,
            pre_verification_gas: U256::ZERO,
            max_fee_per_gas: U256::from(max_fee_per_gas),
            max_priority_fee_per_gas: U256::from(max_priority_fee_per_gas),
            paymaster_and_data: Bytes::new(),
        })
    }

    /// Factory init code while undeployed, empty afterwards.
    async fn init_code(&self, sender: Address) -> Result<Bytes, EngineError> {
        let code = self.inner.provider.get_code_at(sender).await?;
        if !code.is_empty() {
            return Ok(Bytes::new());
        }
        let admin = self.inner.admin.address().await?;
        let create = IAccountFactory::createAccountCall {
            admin,
            data: Bytes::new(),
        }
        .abi_encode();
        let mut init_code = self.inner.options.factory.to_vec();
        init_code.extend_from_slice(&create);
        Ok(init_code.into())
    }

    /// Entry-point nonce under a freshly-drawn random 192-bit key, so
    /// concurrently-prepared operations never contend on a sequence.
    async fn fetch_nonce(&self, sender: Address) -> Result<U256, EngineError> {
        let key_bytes: [u8; 24] = rng().random();
        let key = U192::from_be_bytes(key_bytes);
        let entry_point =
            IEntryPoint::new(self.inner.options.entry_point, &self.inner.provider);
        entry_point
            .getNonce(sender, key)
            .call()
            .await
            .map_err(contract_err)
    }

    /// The bundler's fee hint when offered, the node's pair otherwise.
    async fn fee_pair(&self) -> Result<(u128, u128), EngineError> {
        if let Some(pair) = self.inner.bundler.gas_price_hint().await {
            return Ok(pair);
        }
        self.inner.router.estimator().fee_pair(true).await
    }

    async fn apply_sponsorship(&self, draft: &mut UserOperationDraft) -> Result<(), EngineError> {
        if !self.inner.options.gasless {
            return Ok(());
        }
        let Some(paymaster) = self.inner.paymaster.as_ref() else {
            return Ok(());
        };
        draft.paymaster_and_data = paymaster
            .sponsor_user_operation(&draft.for_estimation(), self.inner.options.entry_point)
            .await?;
        Ok(())
    }

    async fn fill_gas(&self, draft: &mut UserOperationDraft) -> Result<(), EngineError> {
        let estimate = self
            .inner
            .bundler
            .estimate_user_operation_gas(&draft.for_estimation(), self.inner.options.entry_point)
            .await?;
        draft.call_gas_limit = estimate.call_gas_limit + U256::from(CALL_GAS_MARGIN);
        draft.verification_gas_limit = estimate.verification_gas_limit;
        draft.pre_verification_gas = estimate.pre_verification_gas;
        Ok(())
    }

    /// ERC-1271 needs deployed bytecode; a zero-value self-call through
    /// the normal dispatch pipeline deploys via the init code.
    async fn ensure_deployed(&self) -> Result<(), EngineError> {
        if self.is_deployed().await? {
            return Ok(());
        }
        let account = self.address().await?;
        info!(%account, "force-deploying smart account with a zero-value self-call");
        let intent = TransactionIntent::new(self.inner.chain_id).with_to(account);
        self.inner.router.send(&intent, &self.handle()).await?;
        Ok(())
    }

    async fn submit_grant(&self, grant: &SessionPermissionGrant) -> Result<B256, EngineError> {
        let account = self.address().await?;
        let digest = grant.signing_hash(account, self.inner.chain_id);
        let signature = self.inner.admin.sign_hash(digest).await?;
        let calldata = grant.encode_call(Bytes::from(signature.as_bytes().to_vec()));
        debug!(signer = %grant.signer, ?grant.admin_status, "submitting permission grant");

        let intent = TransactionIntent::new(self.inner.chain_id)
            .with_to(account)
            .with_data(calldata);
        self.inner.router.send(&intent, &self.handle()).await
    }

    fn submission_token(&self) -> CancellationToken {
        let cancel = CancellationToken::new();
        if let Some(timeout) = self.inner.options.receipt_timeout {
            let timed = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                timed.cancel();
            });
        }
        cancel
    }
}

#[async_trait]
impl<P> SmartAccountApi for SmartAccount<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    async fn address(&self) -> Result<Address, EngineError> {
        Self::address(self).await
    }

    async fn is_deployed(&self) -> Result<bool, EngineError> {
        Self::is_deployed(self).await
    }

    async fn personal_sign(&self, message: &[u8]) -> Result<Bytes, EngineError> {
        self.ensure_deployed().await?;
        let account = Self::address(self).await?;
        let message_hash = eip191_hash_message(message);
        let contract = IAccountContract::new(account, &self.inner.provider);

        // Probe for the wrapped EIP-712 account-message scheme with a
        // harmless read; implementations without it revert the call.
        let digest = match contract.getMessageHash(message_hash).call().await {
            Ok(wrapped) => {
                debug!(%account, "signing via structured account message");
                wrapped
            }
            Err(err) => {
                debug!(%account, error = %err, "structured message probe failed; using EIP-191");
                message_hash
            }
        };
        let signature = self.inner.admin.sign_hash(digest).await?;
        let signature = Bytes::from(signature.as_bytes().to_vec());

        // Self-check: the account contract must accept what was just
        // produced. A rejection means an ABI assumption is wrong, not that
        // the network misbehaved.
        let magic = contract
            .isValidSignature(message_hash, signature.clone())
            .call()
            .await
            .map_err(|err| {
                EngineError::ProtocolMismatch(format!("isValidSignature call failed: {err}"))
            })?;
        if magic != ERC1271_MAGIC {
            return Err(EngineError::ProtocolMismatch(
                "account rejected its own signature".to_string(),
            ));
        }
        Ok(signature)
    }

    async fn send_intent(&self, intent: &TransactionIntent) -> Result<B256, EngineError> {
        let cancel = self.submission_token();
        self.send_with_cancellation(intent, &cancel).await
    }

    async fn estimate_intent_gas(&self, intent: &TransactionIntent) -> Result<u64, EngineError> {
        let mut draft = self.draft_operation(intent).await?;
        self.apply_sponsorship(&mut draft).await?;
        self.fill_gas(&mut draft).await?;
        Ok(draft.call_gas_limit.saturating_to())
    }
}

fn contract_err(err: alloy_contract::Error) -> EngineError {
    match err {
        alloy_contract::Error::TransportError(err) => EngineError::Rpc(err),
        other => EngineError::InvalidResponse(other.to_string()),
    }
}
