//! Drives install engines against a host middleware.
//!
//! The orchestrator owns the dispatch decisions: a local initiation request
//! becomes a role-0 engine, an inbound round-one message becomes a role-1
//! engine, and anything else is rejected before an engine exists. It then
//! pumps the engine's request/response loop until the run terminates.
//!
//! Locking discipline is the host's: at most one active protocol per
//! multisig address at a time. The orchestrator is otherwise stateless, so
//! hosts may keep one per channel or share one across channels as long as
//! they serialize per-channel runs.

use super::install::{InstallEngine, InstallOutcome, Step};
use super::message::{InstallParams, MessageError, ProtocolMessageData, SeqNo};
use super::middleware::{Middleware, MiddlewareError};
use super::{InstallError, ProcessId, ProtocolName};
use crate::channel::StateChannel;
use crate::commitment::NetworkContext;

pub struct Orchestrator<M: Middleware> {
    middleware: M,
    network: NetworkContext,
}

impl<M: Middleware> Orchestrator<M> {
    pub fn new(middleware: M, network: NetworkContext) -> Self {
        Orchestrator { middleware, network }
    }

    pub fn middleware_mut(&mut self) -> &mut M {
        &mut self.middleware
    }

    /// Run an install as role 0 (initiator).
    ///
    /// `pre_channel` is the caller's current view of the channel; `None`
    /// (channel unknown to the store) fails with
    /// [InstallError::NoStateChannel] before any engine exists.
    pub fn initiate_install(
        &mut self,
        process_id: ProcessId,
        params: InstallParams,
        pre_channel: Option<StateChannel>,
    ) -> Result<InstallOutcome, InstallError> {
        let pre_channel = pre_channel.ok_or(InstallError::NoStateChannel)?;
        let engine = InstallEngine::initiator(process_id, self.network.clone(), params, pre_channel);
        self.drive(engine)
    }

    /// Dispatch an inbound protocol message.
    ///
    /// Only a round-one install message (sequence number 1) starts an engine
    /// here; replies with the unassigned sentinel resume a waiting
    /// `IO_SEND_AND_WAIT` inside the host and never reach this entry point.
    pub fn handle_install_message(
        &mut self,
        message: ProtocolMessageData,
        pre_channel: Option<StateChannel>,
    ) -> Result<InstallOutcome, InstallError> {
        if message.protocol != ProtocolName::Install {
            return Err(MessageError::WrongProtocol {
                expected: ProtocolName::Install,
                actual: message.protocol,
            }
            .into());
        }
        if message.seq != SeqNo::Assigned(1) {
            return Err(MessageError::UnexpectedSeq(message.seq).into());
        }

        let pre_channel = pre_channel.ok_or(InstallError::NoStateChannel)?;
        let engine = InstallEngine::responder(self.network.clone(), &message, pre_channel)?;
        self.drive(engine)
    }

    /// Pump one engine to completion.
    ///
    /// Requests are forwarded to the middleware in program order; the engine
    /// never advances past a request until the host has answered it. Any
    /// error aborts the run and, because the engine sequences persistence
    /// last-but-one (initiator) or before the reply (responder), an aborted
    /// run never leaves a half-committed channel behind.
    fn drive(&mut self, mut engine: InstallEngine) -> Result<InstallOutcome, InstallError> {
        let span = tracing::info_span!(
            "install",
            process_id = %engine.process_id(),
            role = ?engine.role(),
        );
        let _guard = span.enter();

        let mut input = None;
        loop {
            match engine.advance(input.take()) {
                Ok(Step::Yield(request)) => {
                    tracing::debug!(opcode = ?request.opcode(), "engine request");
                    let response = self
                        .middleware
                        .handle(request)
                        .map_err(middleware_error_to_install)?;
                    input = Some(response);
                }
                Ok(Step::Done(outcome)) => {
                    tracing::info!(
                        app = ?outcome.app_instance.identity_hash(),
                        free_balance_version = outcome.channel.free_balance().version_number(),
                        "install complete"
                    );
                    return Ok(outcome);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "install aborted");
                    return Err(e);
                }
            }
        }
    }
}

fn middleware_error_to_install(e: MiddlewareError) -> InstallError {
    match e {
        MiddlewareError::Timeout => InstallError::ProtocolTimeout,
        MiddlewareError::Io(msg) => InstallError::Io(msg),
        MiddlewareError::Persistence(msg) => InstallError::PersistenceFailed(msg),
    }
}
