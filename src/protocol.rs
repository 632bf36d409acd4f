//! The install protocol: engine, middleware contract, wire messages and the
//! orchestrator that drives a run to completion.

pub mod install;
pub mod message;
pub mod middleware;
pub mod orchestrator;

use crate::channel::StateChannelError;
use crate::commitment::CommitmentError;
use crate::encode::types::{Address, Hash, U256};
use serde::{Deserialize, Serialize};

/// Which side of a protocol run this engine plays.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolRole {
    Initiator,
    Responder,
}

/// Protocol tag carried by every wire message.
///
/// Only `install` has an engine in this crate; the full set exists so the
/// dispatcher can reject the others precisely instead of misparsing them.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ProtocolName {
    Setup,
    Propose,
    Install,
    Update,
    TakeAction,
    Uninstall,
}

/// Opaque identifier correlating the messages of one protocol run across
/// both parties.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ProcessId(pub String);

impl ProcessId {
    pub fn random<R: rand::Rng>(rng: &mut R) -> Self {
        let bytes: [u8; 16] = rng.gen();
        ProcessId(hex::encode(bytes))
    }
}

impl core::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything that can abort an install run.
///
/// The engine handles nothing internally; every error propagates out through
/// the orchestrator and ends the run. Errors raised before the persist step
/// leave no observable effects anywhere.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("no state channel exists for this install")]
    NoStateChannel,
    #[error("{party:?} holds {have} of asset {asset:?} but needs {need}")]
    InsufficientFunds {
        party: Address,
        asset: Address,
        have: U256,
        need: U256,
    },
    #[error("host validation rejected the install: {0}")]
    HostRejected(String),
    #[error("counterparty signature recovered to {recovered:?}, expected {expected:?}")]
    InvalidCounterpartySignature { expected: Address, recovered: Address },
    #[error("app {0:?} is not among the proposed app instances")]
    AppNotProposed(Hash),
    #[error("app {0:?} is already installed")]
    AlreadyInstalled(Hash),
    #[error("timed out waiting for the counterparty")]
    ProtocolTimeout,
    #[error("the host failed to persist the install: {0}")]
    PersistenceFailed(String),
    #[error("transport failure: {0}")]
    Io(String),
    #[error("declared app identity hash {declared:?} does not match the proposal ({computed:?})")]
    IdentityHashMismatch { declared: Hash, computed: Hash },
    #[error("params target multisig {expected:?} but the channel is {actual:?}")]
    WrongChannel { expected: Address, actual: Address },
    #[error(transparent)]
    Channel(StateChannelError),
    #[error(transparent)]
    Commitment(#[from] CommitmentError),
    #[error("signature handling failed")]
    Signature(#[from] crate::sig::Error),
    #[error(transparent)]
    Message(#[from] message::MessageError),
    #[error("host answered a {expected:?} request with a mismatched response")]
    UnexpectedResponse { expected: middleware::Opcode },
    #[error("engine advanced after reaching a terminal state")]
    AlreadyTerminated,
}

impl From<StateChannelError> for InstallError {
    fn from(e: StateChannelError) -> Self {
        match e {
            StateChannelError::InsufficientFunds {
                party,
                asset,
                have,
                need,
            } => InstallError::InsufficientFunds {
                party,
                asset,
                have,
                need,
            },
            StateChannelError::AppNotProposed(hash) => InstallError::AppNotProposed(hash),
            StateChannelError::AlreadyInstalled(hash) => InstallError::AlreadyInstalled(hash),
            other => InstallError::Channel(other),
        }
    }
}
