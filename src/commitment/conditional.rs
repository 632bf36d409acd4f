use super::{CommitmentError, NetworkContext, SignatureSlots};
use crate::channel::{AppInstance, ChannelOwners, StateChannel};
use crate::encode::{
    self,
    types::{Address, Bytes, Hash, Signature},
    Encode, Writer,
};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

const CONDITIONAL_TAG: u64 = 2;

/// A signed claim that, on dispute, the multisig executes a conditional
/// transfer for an app instance: the app's outcome is read through the
/// interpreter and paid out against the free balance.
///
/// Structurally parallel to [super::SetStateCommitment] for signing
/// purposes: same tag-slot discipline, same signature handling.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalTransactionCommitment {
    pub chain_id: u64,
    pub multisig_address: Address,
    pub app_identity_hash: Hash,
    pub free_balance_app_identity: Hash,
    pub interpreter_addr: Address,
    /// ABI-encoded arguments the interpreter is invoked with.
    pub interpreter_params: Bytes,
    signatures: SignatureSlots,
}

impl ConditionalTransactionCommitment {
    /// Conditional transaction for `app`, which must live in `channel`'s
    /// world (the caller passes the post-install channel).
    pub fn for_app(network: &NetworkContext, channel: &StateChannel, app: &AppInstance) -> Self {
        ConditionalTransactionCommitment {
            chain_id: network.chain_id,
            multisig_address: channel.multisig_address(),
            app_identity_hash: app.identity_hash(),
            free_balance_app_identity: channel.free_balance().identity_hash(),
            interpreter_addr: network.interpreter_for(app.outcome_type),
            interpreter_params: encode_interpreter_params(app),
            signatures: SignatureSlots::default(),
        }
    }

    /// The digest both parties sign.
    ///
    /// Slot layout of the hashed encoding:
    ///
    /// ```text
    /// slot   commitment type tag (2)
    /// slot   chain id
    /// slot   multisig address
    /// slot   app identity hash
    /// slot   free balance app identity
    /// slot   interpreter address
    /// slot   keccak-256 of the interpreter params
    /// ```
    ///
    /// The params are folded to their hash so the preimage stays fixed-width
    /// no matter how large the interpreter arguments grow.
    pub fn hash_to_sign(&self) -> Hash {
        encode::to_hash(self)
    }

    pub fn add_signatures(
        &mut self,
        owners: &ChannelOwners,
        sig_a: Signature,
        sig_b: Signature,
    ) -> Result<(), CommitmentError> {
        self.signatures.add(self.hash_to_sign(), owners, sig_a, sig_b)
    }

    pub fn signatures(&self) -> Result<[Signature; 2], CommitmentError> {
        self.signatures.both()
    }
}

/// Interpreter arguments for an installed app, one slot per field:
/// initiator/responder deposit amounts and their asset ids.
fn encode_interpreter_params(app: &AppInstance) -> Bytes {
    struct Params<'a>(&'a AppInstance);

    impl Encode for Params<'_> {
        fn encode<W: Writer>(&self, writer: &mut W) {
            encode::write_u256(writer, &self.0.initiator_deposit);
            encode::write_u256(writer, &self.0.responder_deposit);
            encode::write_address(writer, &self.0.initiator_deposit_asset_id);
            encode::write_address(writer, &self.0.responder_deposit_asset_id);
        }
    }

    let mut collector = SlotCollector(Vec::new());
    Params(app).encode(&mut collector);
    Bytes(collector.0)
}

struct SlotCollector(Vec<u8>);

impl Writer for SlotCollector {
    fn write(&mut self, slot: &[u8]) {
        self.0.extend_from_slice(slot);
    }
}

impl Encode for ConditionalTransactionCommitment {
    fn encode<W: Writer>(&self, writer: &mut W) {
        encode::write_u64(writer, CONDITIONAL_TAG);
        encode::write_u64(writer, self.chain_id);
        encode::write_address(writer, &self.multisig_address);
        encode::write_word(writer, &self.app_identity_hash);
        encode::write_word(writer, &self.free_balance_app_identity);
        encode::write_address(writer, &self.interpreter_addr);
        let params_hash = Hash(Keccak256::digest(&self.interpreter_params.0).into());
        encode::write_word(writer, &params_hash);
    }
}
