//! Session keys and admin delegation for smart accounts.
//!
//! Delegation is a signed [`IAccountPermissions::SignerPermissionRequest`]:
//! the current admin produces an EIP-712 signature over the request under
//! the account's own domain, and anyone may then submit it to
//! `setPermissionsForSigner`. The contract enforces single use through the
//! request's uid; this module only guarantees the uid is fresh per grant.

use alloy_primitives::{Address, B256, U256, Bytes};
use alloy_sol_types::{SolStruct, eip712_domain, sol};
use rand::RngExt;
use rand::rng;

use evmtx::ChainId;

sol! {
    /// Permission surface of the smart-account implementation.
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IAccountPermissions {
        struct SignerPermissionRequest {
            address signer;
            uint8 isAdmin;
            address[] approvedTargets;
            uint256 nativeTokenLimitPerTransaction;
            uint128 permissionStartTimestamp;
            uint128 permissionEndTimestamp;
            uint128 reqValidityStartTimestamp;
            uint128 reqValidityEndTimestamp;
            bytes32 uid;
        }

        function setPermissionsForSigner(SignerPermissionRequest req, bytes signature) external;
    }
}

/// Admin flag carried by a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AdminStatus {
    /// Not an admin change: the request grants session-key permissions.
    None = 0,
    /// Grant full admin rights to the signer.
    Grant = 1,
    /// Revoke the signer's admin rights.
    Revoke = 2,
}

/// A single-use permission change for one signer, ready to be admin-signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPermissionGrant {
    /// The signer being granted or revoked.
    pub signer: Address,
    /// Whether this request changes admin status.
    pub admin_status: AdminStatus,
    /// Contracts the session key may call. Ignored for admin changes.
    pub approved_targets: Vec<Address>,
    /// Native-token cap per transaction, in wei.
    pub native_token_limit_per_transaction: U256,
    /// Unix start of the permission window.
    pub permission_start: u64,
    /// Unix end of the permission window.
    pub permission_end: u64,
    /// Unix start of the request's own validity window.
    pub validity_start: u64,
    /// Unix end of the request's own validity window.
    pub validity_end: u64,
    /// Random single-use id; the contract rejects reuse.
    pub uid: B256,
}

/// Request validity granted to freshly-built requests (ten years).
const REQUEST_VALIDITY_SECS: u64 = 10 * 365 * 24 * 60 * 60;

impl SessionPermissionGrant {
    /// A session-key grant: scoped targets, a per-transaction spend cap,
    /// and an explicit permission window.
    #[must_use]
    pub fn session_key(
        signer: Address,
        approved_targets: Vec<Address>,
        native_token_limit_per_transaction: U256,
        permission_start: u64,
        permission_end: u64,
    ) -> Self {
        Self {
            signer,
            admin_status: AdminStatus::None,
            approved_targets,
            native_token_limit_per_transaction,
            permission_start,
            permission_end,
            validity_start: 0,
            validity_end: now_secs().saturating_add(REQUEST_VALIDITY_SECS),
            uid: random_uid(),
        }
    }

    /// An admin grant: unrestricted, no target or spend scoping applies.
    #[must_use]
    pub fn add_admin(signer: Address) -> Self {
        Self::admin_change(signer, AdminStatus::Grant)
    }

    /// An admin revocation using the same request machinery.
    #[must_use]
    pub fn remove_admin(signer: Address) -> Self {
        Self::admin_change(signer, AdminStatus::Revoke)
    }

    fn admin_change(signer: Address, admin_status: AdminStatus) -> Self {
        Self {
            signer,
            admin_status,
            approved_targets: Vec::new(),
            native_token_limit_per_transaction: U256::ZERO,
            permission_start: 0,
            permission_end: 0,
            validity_start: 0,
            validity_end: now_secs().saturating_add(REQUEST_VALIDITY_SECS),
            uid: random_uid(),
        }
    }

    /// The ABI-level request struct.
    #[must_use]
    pub fn to_request(&self) -> IAccountPermissions::SignerPermissionRequest {
        IAccountPermissions::SignerPermissionRequest {
            signer: self.signer,
            isAdmin: self.admin_status as u8,
            approvedTargets: self.approved_targets.clone(),
            nativeTokenLimitPerTransaction: self.native_token_limit_per_transaction,
            permissionStartTimestamp: u128::from(self.permission_start),
            permissionEndTimestamp: u128::from(self.permission_end),
            reqValidityStartTimestamp: u128::from(self.validity_start),
            reqValidityEndTimestamp: u128::from(self.validity_end),
            uid: self.uid,
        }
    }

    /// The EIP-712 digest the admin signs, bound to the account contract
    /// and chain.
    #[must_use]
    pub fn signing_hash(&self, account: Address, chain_id: ChainId) -> B256 {
        let domain = eip712_domain! {
            name: "Account",
            version: "1",
            chain_id: chain_id,
            verifying_contract: account,
        };
        self.to_request().eip712_signing_hash(&domain)
    }

    /// Calldata for submitting this request with the admin's signature.
    #[must_use]
    pub fn encode_call(&self, signature: Bytes) -> Bytes {
        use alloy_sol_types::SolCall;
        IAccountPermissions::setPermissionsForSignerCall {
            req: self.to_request(),
            signature,
        }
        .abi_encode()
        .into()
    }
}

fn random_uid() -> B256 {
    let uid: [u8; 32] = rng().random();
    B256::from(uid)
}

fn now_secs() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}
