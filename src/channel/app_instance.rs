use super::PublicIdentifier;
use crate::encode::{
    self,
    types::{Address, Bytes, Hash, U256},
    Encode, Writer,
};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// How the outcome of a finalized app state is interpreted on-chain.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeType {
    TwoPartyFixedOutcome,
    SingleAssetTwoPartyCoinTransfer,
    MultiAssetMultiPartyCoinTransfer,
    RefundOutcomeType,
}

/// On-chain interface of the app definition contract.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppInterface {
    pub app_definition: Address,
    pub state_encoding: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub action_encoding: Option<String>,
}

/// A deterministic state machine instantiated within a channel.
///
/// App instances are plain values. The same struct describes a proposal (in
/// `proposed_app_instances`) and an installed app (in `app_instances`); the
/// install transition moves it from one map to the other.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppInstance {
    pub initiator_identifier: PublicIdentifier,
    pub responder_identifier: PublicIdentifier,
    pub app_interface: AppInterface,
    pub default_timeout: u64,
    /// Position in the channel's monotonic proposal sequence; part of the
    /// identity hash so that re-proposing the same app yields a fresh
    /// instance.
    pub app_seq_no: u64,
    /// ABI-encoded latest app state.
    pub latest_state: Bytes,
    pub latest_version_number: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub latest_action: Option<Bytes>,
    pub state_timeout: u64,
    pub outcome_type: OutcomeType,
    pub initiator_deposit: U256,
    pub responder_deposit: U256,
    pub initiator_deposit_asset_id: Address,
    pub responder_deposit_asset_id: Address,
}

impl AppInstance {
    /// Content-addressed identifier of this instance.
    ///
    /// Slot layout of the hashed encoding:
    ///
    /// ```text
    /// bytes  initiator identifier   (length slot + 2 content slots)
    /// bytes  responder identifier   (length slot + 2 content slots)
    /// slot   app definition address
    /// slot   default timeout
    /// slot   app sequence number
    /// ```
    ///
    /// Only immutable parameters participate, so the hash is stable across
    /// state updates.
    pub fn identity_hash(&self) -> Hash {
        encode::to_hash(&IdentityPreimage(self))
    }

    /// Keccak-256 of the ABI-encoded latest state.
    pub fn state_hash(&self) -> Hash {
        Hash(Keccak256::digest(&self.latest_state.0).into())
    }
}

struct IdentityPreimage<'a>(&'a AppInstance);

impl Encode for IdentityPreimage<'_> {
    fn encode<W: Writer>(&self, writer: &mut W) {
        encode::write_bytes(writer, &self.0.initiator_identifier.0);
        encode::write_bytes(writer, &self.0.responder_identifier.0);
        encode::write_address(writer, &self.0.app_interface.app_definition);
        encode::write_u64(writer, self.0.default_timeout);
        encode::write_u64(writer, self.0.app_seq_no);
    }
}
