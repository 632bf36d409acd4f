//! The channel data model and the install transition algebra.
//!
//! A [StateChannel] is an immutable value object; every protocol transition
//! produces a new channel. Channels are content-addressed by their multisig
//! address, app instances by their identity hash. There are deliberately no
//! back-pointers from app instances to channels; the channel is passed
//! explicitly wherever both are needed.

mod app_instance;
mod free_balance;
mod state_channel;
mod transition;

pub use app_instance::{AppInstance, AppInterface, OutcomeType};
pub use free_balance::{CoinTransfer, FreeBalance, TokenIndexedCoinTransferMap};
pub use state_channel::{StateChannel, StateChannelError};
pub use transition::{assert_sufficient_deposits, compute_install_state_channel_transition};

use crate::encode::types::{parse_prefixed_hex, to_prefixed_hex, Address};
use core::fmt::Debug;
use core::str::FromStr;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// A participant identifier: the compressed SEC1 encoding of the
/// participant's secp256k1 public key.
///
/// Identifiers travel on the wire; the signer [Address] behind one is derived
/// on demand, see [PublicIdentifier::signer_address].
#[derive(PartialEq, Eq, Copy, Clone)]
pub struct PublicIdentifier(pub [u8; 33]);

impl PublicIdentifier {
    /// Resolve the signer address controlled by this identifier.
    pub fn signer_address(&self) -> Result<Address, crate::sig::Error> {
        crate::sig::identifier_address(self)
    }
}

impl Debug for PublicIdentifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("0x")?;
        for b in self.0.iter() {
            f.write_fmt(format_args!("{:02x}", b))?;
        }
        Ok(())
    }
}

impl Serialize for PublicIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_prefixed_hex(&self.0))
    }
}

impl<'de> Deserialize<'de> for PublicIdentifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_prefixed_hex::<33>(&s)
            .map(PublicIdentifier)
            .map_err(de::Error::custom)
    }
}

impl FromStr for PublicIdentifier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_prefixed_hex::<33>(s).map(PublicIdentifier)
    }
}

/// The two multisig owner signer addresses, in canonical order.
///
/// Canonical owner order is a fixed property of the channel and independent
/// of any app's initiator/responder order. Signatures on every commitment
/// for this channel are stored in this order. Code that works in app order
/// uses its own type and converts explicitly; the two orderings must never
/// be conflated.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(transparent)]
pub struct ChannelOwners(pub [Address; 2]);

impl ChannelOwners {
    pub fn index_of(&self, addr: &Address) -> Option<usize> {
        self.0.iter().position(|o| o == addr)
    }

    pub fn contains(&self, addr: &Address) -> bool {
        self.index_of(addr).is_some()
    }
}
