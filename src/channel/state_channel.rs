use super::free_balance::{FreeBalance, TokenIndexedCoinTransferMap};
use super::{AppInstance, ChannelOwners};
use crate::encode::{
    self,
    types::{Address, Hash, U256},
    Encode, Writer,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Errors of the channel transition algebra.
#[derive(Debug, thiserror::Error)]
pub enum StateChannelError {
    #[error("app {0:?} is already installed in this channel")]
    AlreadyInstalled(Hash),
    #[error("app {0:?} is not among the proposed app instances")]
    AppNotProposed(Hash),
    #[error("{party:?} holds {have} of asset {asset:?} but needs {need}")]
    InsufficientFunds {
        party: Address,
        asset: Address,
        have: U256,
        need: U256,
    },
    #[error("{address:?} is not a channel owner")]
    NotChannelOwner { address: Address },
    #[error("proposal {0:?} collides with an existing app instance")]
    ProposalCollision(Hash),
    #[error("there are no installed app instances in this channel")]
    NoInstalledApps,
    #[error("could not resolve a signer address from a public identifier")]
    IdentifierResolution(#[from] crate::sig::Error),
}

/// A two-party channel anchored by an on-chain multisig.
///
/// Immutable value object: every transition returns a new channel. The host
/// must treat a channel as a single-writer resource; the algebra itself is
/// pure and makes no attempt at synchronization.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StateChannel {
    multisig_address: Address,
    owners: ChannelOwners,
    free_balance: FreeBalance,
    app_instances: BTreeMap<Hash, AppInstance>,
    proposed_app_instances: BTreeMap<Hash, AppInstance>,
    monotonic_num_proposed_apps: u64,
    schema_version: u32,
}

pub(crate) const SCHEMA_VERSION: u32 = 1;

impl StateChannel {
    /// Create a freshly set-up channel with an empty free balance.
    ///
    /// This mirrors what the setup protocol persists; it exists so hosts and
    /// tests can construct the install precondition without that protocol.
    pub fn setup(multisig_address: Address, owners: ChannelOwners, free_balance_timeout: u64) -> Self {
        let fb_identity = encode::to_hash(&FreeBalanceIdentityPreimage {
            multisig_address: &multisig_address,
            owners: &owners,
            timeout: free_balance_timeout,
        });
        StateChannel {
            multisig_address,
            owners,
            free_balance: FreeBalance::new(fb_identity, free_balance_timeout),
            app_instances: BTreeMap::new(),
            proposed_app_instances: BTreeMap::new(),
            monotonic_num_proposed_apps: 0,
            schema_version: SCHEMA_VERSION,
        }
    }

    pub fn multisig_address(&self) -> Address {
        self.multisig_address
    }

    pub fn owners(&self) -> &ChannelOwners {
        &self.owners
    }

    pub fn free_balance(&self) -> &FreeBalance {
        &self.free_balance
    }

    pub fn app_instances(&self) -> &BTreeMap<Hash, AppInstance> {
        &self.app_instances
    }

    pub fn proposed_app_instances(&self) -> &BTreeMap<Hash, AppInstance> {
        &self.proposed_app_instances
    }

    pub fn app_instance(&self, identity_hash: &Hash) -> Option<&AppInstance> {
        self.app_instances.get(identity_hash)
    }

    pub fn proposed_app_instance(&self, identity_hash: &Hash) -> Option<&AppInstance> {
        self.proposed_app_instances.get(identity_hash)
    }

    pub fn has_app_instance(&self, identity_hash: &Hash) -> bool {
        self.app_instances.contains_key(identity_hash)
    }

    pub fn monotonic_num_proposed_apps(&self) -> u64 {
        self.monotonic_num_proposed_apps
    }

    /// Highest app sequence number among the installed apps.
    ///
    /// Returns [StateChannelError::NoInstalledApps] on a channel that has
    /// none; callers that want "0 if empty" say so explicitly with
    /// `unwrap_or(0)`.
    pub fn most_recent_app_sequence_number(&self) -> Result<u64, StateChannelError> {
        self.app_instances
            .values()
            .map(|app| app.app_seq_no)
            .max()
            .ok_or(StateChannelError::NoInstalledApps)
    }

    /// Replace the free balance with one carrying the given absolute balance.
    ///
    /// Deposit-flow surface for hosts and tests; does not bump the free
    /// balance version (deposits happen on-chain, not via commitments).
    pub fn with_free_balance_of(mut self, token: Address, owner: Address, amount: U256) -> Self {
        let owners = self.owners;
        self.free_balance = self.free_balance.with_balance(&owners, token, owner, amount);
        self
    }

    /// Record a proposal, bumping the monotonic proposal counter.
    ///
    /// `app_instances` and `proposed_app_instances` stay disjoint on identity
    /// hash; a proposal whose hash is already present either way is a
    /// collision.
    pub fn add_proposal(&self, proposal: AppInstance) -> Result<StateChannel, StateChannelError> {
        let identity_hash = proposal.identity_hash();
        if self.app_instances.contains_key(&identity_hash)
            || self.proposed_app_instances.contains_key(&identity_hash)
        {
            return Err(StateChannelError::ProposalCollision(identity_hash));
        }

        let mut next = self.clone();
        next.proposed_app_instances.insert(identity_hash, proposal);
        next.monotonic_num_proposed_apps += 1;
        Ok(next)
    }

    /// Move a proposed app into the installed set, debiting the free balance.
    ///
    /// The identity-hash checks make replay of a completed install fail
    /// recognizably instead of double-debiting: the first run removes the
    /// proposal, so a second run hits [StateChannelError::AlreadyInstalled].
    pub fn install_app(
        &self,
        identity_hash: &Hash,
        decrement: &TokenIndexedCoinTransferMap,
    ) -> Result<StateChannel, StateChannelError> {
        if self.app_instances.contains_key(identity_hash) {
            return Err(StateChannelError::AlreadyInstalled(*identity_hash));
        }
        let proposal = self
            .proposed_app_instances
            .get(identity_hash)
            .ok_or(StateChannelError::AppNotProposed(*identity_hash))?
            .clone();

        let free_balance = self.free_balance.checked_decrement(&self.owners, decrement)?;

        let mut next = self.clone();
        next.free_balance = free_balance;
        next.proposed_app_instances.remove(identity_hash);
        next.app_instances.insert(*identity_hash, proposal);
        Ok(next)
    }
}

/// Identity of the designated free-balance app: hash of
/// `(multisig ‖ owner0 ‖ owner1 ‖ timeout)`, one slot each.
struct FreeBalanceIdentityPreimage<'a> {
    multisig_address: &'a Address,
    owners: &'a ChannelOwners,
    timeout: u64,
}

impl Encode for FreeBalanceIdentityPreimage<'_> {
    fn encode<W: Writer>(&self, writer: &mut W) {
        encode::write_address(writer, self.multisig_address);
        encode::write_address(writer, &self.owners.0[0]);
        encode::write_address(writer, &self.owners.0[1]);
        encode::write_u64(writer, self.timeout);
    }
}
