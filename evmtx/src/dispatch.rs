//! The dispatch state machine: validate, fill, price, sign, submit.
//!
//! All send-time policy lives here. The intent builder never validates and
//! the estimator never mutates, so every send walks the same four phases in
//! order and each phase has exactly one home. The branch between signing
//! models happens last, on the [`AccountHandle`] variant tag and the chain
//! profile, after the intent has been fully resolved.

use alloy_network::{EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, B256};
use alloy_provider::Provider;
use alloy_rpc_types_eth::TransactionRequest;
use tracing::debug;

use crate::account::AccountHandle;
use crate::chains::{ChainId, ChainProfile};
use crate::error::{EngineError, UsageError};
use crate::fees::{FeeEstimator, FeeQuote};
use crate::intent::TransactionIntent;
use crate::rollup::RollupTransaction;

/// Routes a resolved intent to the signing and submission path its account
/// and chain require.
#[derive(Debug, Clone)]
pub struct DispatchRouter<P> {
    provider: P,
    profile: ChainProfile,
    estimator: FeeEstimator<P>,
}

impl<P> DispatchRouter<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    /// Creates a router for one chain, classified against the built-in
    /// chain tables.
    #[must_use]
    pub fn new(provider: P, chain_id: ChainId) -> Self {
        Self::with_profile(provider, ChainProfile::for_chain(chain_id))
    }

    /// Creates a router with an explicit [`ChainProfile`], for chains the
    /// built-in tables do not cover.
    #[must_use]
    pub fn with_profile(provider: P, profile: ChainProfile) -> Self {
        Self {
            estimator: FeeEstimator::new(provider.clone(), profile),
            provider,
            profile,
        }
    }

    /// The fee estimator this router prices with.
    #[must_use]
    pub const fn estimator(&self) -> &FeeEstimator<P> {
        &self.estimator
    }

    /// Validates, resolves, signs, and broadcasts an intent, returning the
    /// transaction hash.
    pub async fn send(
        &self,
        intent: &TransactionIntent,
        account: &AccountHandle,
    ) -> Result<B256, EngineError> {
        let sender = self.validate(intent, account).await?;
        let intent = self.fill_defaults(intent.clone(), sender, account).await?;
        let quote = self.estimator.quote(&intent, true).await?;
        debug!(?quote, "intent priced");
        self.sign_and_submit(intent, quote, account).await
    }

    /// Phase 1: structural checks, before any network traffic.
    async fn validate(
        &self,
        intent: &TransactionIntent,
        account: &AccountHandle,
    ) -> Result<Address, EngineError> {
        if intent.chain_id() == 0 || intent.chain_id() != self.profile.chain_id {
            return Err(UsageError::InvalidChainId.into());
        }
        if intent.to().is_none() {
            return Err(UsageError::MissingRecipient.into());
        }
        if intent.gas_price().is_some()
            && (intent.max_fee_per_gas().is_some() || intent.max_priority_fee_per_gas().is_some())
        {
            return Err(UsageError::ConflictingFeeFields.into());
        }
        if self.profile.is_rollup() && matches!(account, AccountHandle::Smart(_)) {
            return Err(UsageError::SmartAccountOnRollup.into());
        }

        let sender = account.address().await?;
        if let Some(explicit) = intent.from() {
            if explicit != sender {
                return Err(UsageError::SenderMismatch {
                    explicit,
                    signer: sender,
                }
                .into());
            }
        }
        debug!(chain_id = intent.chain_id(), %sender, "intent validated");
        Ok(sender)
    }

    /// Phase 2: resolve sender and gas limit so later phases see a
    /// fully-populated intent.
    async fn fill_defaults(
        &self,
        mut intent: TransactionIntent,
        sender: Address,
        account: &AccountHandle,
    ) -> Result<TransactionIntent, EngineError> {
        if intent.from().is_none() {
            intent.set_from(sender);
        }
        if intent.gas_limit().is_none() {
            let limit = self.estimator.gas_limit(&intent, account).await?;
            debug!(gas_limit = limit, "gas limit estimated");
            intent.set_gas_limit(limit);
        }
        Ok(intent)
    }

    /// Phase 4: pick a signing path and get the transaction on-chain.
    async fn sign_and_submit(
        &self,
        intent: TransactionIntent,
        quote: FeeQuote,
        account: &AccountHandle,
    ) -> Result<B256, EngineError> {
        let takes_structured_path = self.profile.is_rollup()
            && (intent.rollup_paymaster_configured()
                || intent.rollup().is_some_and(|r| !r.factory_deps.is_empty()));
        if takes_structured_path {
            return self.send_structured(intent, quote, account).await;
        }

        match account {
            AccountHandle::Key(key) => self.send_with_key(intent, quote, key).await,
            AccountHandle::Delegated(wallet) => {
                let intent = write_back_quote(intent, quote);
                debug!("delegating submission to remote wallet");
                wallet.send_transaction(&intent).await
            }
            AccountHandle::Smart(api) => {
                let intent = write_back_quote(intent, quote);
                debug!("routing intent through smart-account bundler");
                api.send_intent(&intent).await
            }
        }
    }

    /// Rollup paymaster/factory-deps path: EIP-712 structured transaction
    /// submitted as raw bytes.
    async fn send_structured(
        &self,
        mut intent: TransactionIntent,
        quote: FeeQuote,
        account: &AccountHandle,
    ) -> Result<B256, EngineError> {
        let sender = account.address().await?;
        if intent.nonce().is_none() {
            let nonce = self
                .provider
                .get_transaction_count(sender)
                .pending()
                .await?;
            intent = intent.with_nonce(nonce);
        }
        intent = write_back_quote(intent, quote);

        let tx = RollupTransaction::from_intent(&intent, sender)?;
        let signature = account.sign_hash(tx.signing_hash()?).await?;
        let raw = tx.encode_signed(&signature);
        debug!(bytes = raw.len(), "submitting structured transaction");
        let pending = self.provider.send_raw_transaction(&raw).await?;
        Ok(*pending.tx_hash())
    }

    /// Local-key path: standard envelope built and signed via
    /// `alloy-network`.
    async fn send_with_key(
        &self,
        intent: TransactionIntent,
        quote: FeeQuote,
        key: &crate::account::KeyAccount,
    ) -> Result<B256, EngineError> {
        let sender = key.address();
        let nonce = match intent.nonce() {
            Some(nonce) => nonce,
            None => {
                self.provider
                    .get_transaction_count(sender)
                    .pending()
                    .await?
            }
        };

        let mut request = TransactionRequest::default()
            .with_from(sender)
            .with_value(intent.value())
            .with_input(intent.data())
            .with_nonce(nonce)
            .with_chain_id(intent.chain_id());
        if let Some(to) = intent.to() {
            request = request.with_to(to);
        }
        if let Some(limit) = intent.gas_limit() {
            request = request.with_gas_limit(limit);
        }
        request = match quote {
            FeeQuote::Legacy { gas_price } => request.with_gas_price(gas_price),
            FeeQuote::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            }
            | FeeQuote::Rollup {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => request
                .with_max_fee_per_gas(max_fee_per_gas)
                .with_max_priority_fee_per_gas(max_priority_fee_per_gas),
        };

        let wallet = EthereumWallet::from(key.signer().clone());
        let envelope = request
            .build(&wallet)
            .await
            .map_err(|err| EngineError::Build(err.to_string()))?;
        let pending = self.provider.send_tx_envelope(envelope).await?;
        debug!(tx_hash = %pending.tx_hash(), nonce, "transaction broadcast");
        Ok(*pending.tx_hash())
    }
}

/// Writes the priced quote back onto the intent for paths that hand the
/// intent itself onward. A legacy quote also guarantees the EIP-1559 fields
/// are not what downstream reads.
fn write_back_quote(intent: TransactionIntent, quote: FeeQuote) -> TransactionIntent {
    match quote {
        FeeQuote::Legacy { gas_price } => intent.with_gas_price(gas_price),
        FeeQuote::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        }
        | FeeQuote::Rollup {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => intent
            .with_max_fee_per_gas(max_fee_per_gas)
            .with_max_priority_fee_per_gas(max_priority_fee_per_gas),
    }
}
