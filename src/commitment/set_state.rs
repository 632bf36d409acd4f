use super::{CommitmentError, NetworkContext, SignatureSlots};
use crate::channel::{ChannelOwners, StateChannel};
use crate::encode::{
    self,
    types::{Address, Hash, Signature},
    Encode, Writer,
};
use serde::{Deserialize, Serialize};

/// Commitment type tag, first slot of every commitment preimage so the two
/// commitment kinds can never hash to the same bytes.
const SET_STATE_TAG: u64 = 1;

/// A signed claim that `(app identity, state hash, version, timeout)` is the
/// latest state of an app instance.
///
/// For the install protocol this is built over the post-install free
/// balance; both parties sign the same hash and the signatures are stored in
/// canonical owner order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SetStateCommitment {
    pub chain_id: u64,
    pub multisig_address: Address,
    pub app_identity_hash: Hash,
    pub app_state_hash: Hash,
    pub version_number: u64,
    pub state_timeout: u64,
    signatures: SignatureSlots,
}

impl SetStateCommitment {
    pub fn new(
        chain_id: u64,
        multisig_address: Address,
        app_identity_hash: Hash,
        app_state_hash: Hash,
        version_number: u64,
        state_timeout: u64,
    ) -> Self {
        SetStateCommitment {
            chain_id,
            multisig_address,
            app_identity_hash,
            app_state_hash,
            version_number,
            state_timeout,
            signatures: SignatureSlots::default(),
        }
    }

    /// Set-state commitment over a channel's current free balance.
    pub fn for_free_balance(network: &NetworkContext, channel: &StateChannel) -> Self {
        let fb = channel.free_balance();
        SetStateCommitment::new(
            network.chain_id,
            channel.multisig_address(),
            fb.identity_hash(),
            fb.state_hash(),
            fb.version_number(),
            fb.timeout(),
        )
    }

    /// The digest both parties sign.
    ///
    /// Slot layout of the hashed encoding:
    ///
    /// ```text
    /// slot   commitment type tag (1)
    /// slot   chain id
    /// slot   multisig address
    /// slot   app identity hash
    /// slot   app state hash
    /// slot   version number
    /// slot   state timeout
    /// ```
    pub fn hash_to_sign(&self) -> Hash {
        encode::to_hash(self)
    }

    /// Attach both parties' signatures, reordering them into canonical
    /// owner order. Signatures that do not recover to a channel owner are
    /// rejected.
    pub fn add_signatures(
        &mut self,
        owners: &ChannelOwners,
        sig_a: Signature,
        sig_b: Signature,
    ) -> Result<(), CommitmentError> {
        self.signatures.add(self.hash_to_sign(), owners, sig_a, sig_b)
    }

    /// Both signatures in canonical owner order; errors if either is missing.
    pub fn signatures(&self) -> Result<[Signature; 2], CommitmentError> {
        self.signatures.both()
    }

    pub fn signature_of(&self, owner_index: usize) -> Option<Signature> {
        self.signatures.get(owner_index)
    }
}

impl Encode for SetStateCommitment {
    fn encode<W: Writer>(&self, writer: &mut W) {
        encode::write_u64(writer, SET_STATE_TAG);
        encode::write_u64(writer, self.chain_id);
        encode::write_address(writer, &self.multisig_address);
        encode::write_word(writer, &self.app_identity_hash);
        encode::write_word(writer, &self.app_state_hash);
        encode::write_u64(writer, self.version_number);
        encode::write_u64(writer, self.state_timeout);
    }
}
