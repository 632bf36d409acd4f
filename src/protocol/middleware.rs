//! The contract between the protocol engine and its host.
//!
//! The engine suspends by yielding a [MiddlewareRequest]; the host answers
//! with the matching [MiddlewareResponse] and resumes it. These five opcodes
//! are the engine's entire observable surface: signing, validation, I/O and
//! persistence all live on the host side of this boundary.

use super::message::{InstallParams, ProtocolMessageData};
use super::{ProtocolName, ProtocolRole};
use crate::channel::{AppInstance, StateChannel};
use crate::commitment::SetStateCommitment;
use crate::encode::types::{Hash, Signature};
use serde::{Deserialize, Serialize};

/// The suspension points, exhaustively. No other step of an engine blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    OpValidate,
    OpSign,
    IoSend,
    IoSendAndWait,
    PersistAppInstance,
}

/// What kind of app-instance persistence a [PersistRequest] asks for.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PersistAppType {
    CreateInstance,
    UpdateInstance,
    RemoveInstance,
    Reject,
}

/// Context handed to the host's validation hook before anything is signed.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub protocol: ProtocolName,
    pub params: InstallParams,
    /// The channel as it was before the speculative transition.
    pub state_channel: StateChannel,
    /// The app instance the transition would install.
    pub app_instance: AppInstance,
    pub role: ProtocolRole,
}

/// Ask the host to durably record a protocol outcome.
///
/// The install engine only ever issues [PersistAppType::CreateInstance]; the
/// other variants belong to the update, uninstall and propose-reject flows
/// that share this store surface.
#[derive(Debug, Clone)]
pub struct PersistRequest {
    pub request_type: PersistAppType,
    pub channel: StateChannel,
    pub app_instance: AppInstance,
    /// Fully signed free-balance set-state commitment, signatures in
    /// canonical owner order. Keyed in the store by
    /// `(multisig, app identity, version)`.
    pub commitment: SetStateCommitment,
}

#[derive(Debug)]
pub enum MiddlewareRequest {
    Validate(ValidationRequest),
    /// Sign the given digest with the free-balance signing key, which may
    /// differ per channel from the multisig owner key. Key selection is the
    /// host's business.
    Sign(Hash),
    Send(ProtocolMessageData),
    SendAndWait(ProtocolMessageData),
    Persist(PersistRequest),
}

impl MiddlewareRequest {
    pub fn opcode(&self) -> Opcode {
        match self {
            MiddlewareRequest::Validate(_) => Opcode::OpValidate,
            MiddlewareRequest::Sign(_) => Opcode::OpSign,
            MiddlewareRequest::Send(_) => Opcode::IoSend,
            MiddlewareRequest::SendAndWait(_) => Opcode::IoSendAndWait,
            MiddlewareRequest::Persist(_) => Opcode::PersistAppInstance,
        }
    }
}

#[derive(Debug)]
pub enum MiddlewareResponse {
    /// `None` accepts; `Some(reason)` rejects the install.
    Validate(Option<String>),
    Sign(Signature),
    Sent,
    Received(ProtocolMessageData),
    Persisted,
}

/// Host-side failures crossing the middleware boundary.
#[derive(Debug, thiserror::Error)]
pub enum MiddlewareError {
    /// Wall-clock deadline expired while waiting for the counterparty. The
    /// host enforces this; the engine itself carries no timers.
    #[error("middleware timeout")]
    Timeout,
    #[error("transport: {0}")]
    Io(String),
    #[error("persistence: {0}")]
    Persistence(String),
}

/// The host. One implementation serves all engines; the host must serialize
/// runs that touch the same channel (a channel is a single-writer resource).
pub trait Middleware {
    fn handle(&mut self, request: MiddlewareRequest)
        -> Result<MiddlewareResponse, MiddlewareError>;
}
