//! The install protocol engine.
//!
//! A linear, suspendable sequence per role. The engine is an explicit state
//! machine: [InstallEngine::advance] consumes the host's response to the
//! previously yielded request, runs pure computation, and either yields the
//! next [MiddlewareRequest] or terminates. It owns no I/O, no clocks and no
//! store; cancelling a run before the persist step therefore leaves no trace.
//!
//! The two roles are deliberately asymmetric. The initiator signs before it
//! knows the responder agrees (it must, to have anything to send) but only
//! persists after verifying the countersignature. The responder verifies
//! before signing and persists before sending, so neither side is ever left
//! holding a unilateral obligation: an initiator that crashes mid-wait has a
//! locally signed but unpersisted commitment, discarded on retry; a
//! responder that crashes between persist and send re-emits the reply on
//! reconnect.

use super::message::{InstallParams, ProtocolMessageData};
use super::middleware::{
    MiddlewareRequest, MiddlewareResponse, Opcode, PersistAppType, PersistRequest,
    ValidationRequest,
};
use super::{InstallError, ProcessId, ProtocolName, ProtocolRole};
use crate::channel::{
    assert_sufficient_deposits, compute_install_state_channel_transition, AppInstance,
    StateChannel,
};
use crate::commitment::{NetworkContext, SetStateCommitment};
use crate::encode::types::{Hash, Signature};
use crate::sig;

/// Terminal value of a successful run.
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub channel: StateChannel,
    pub app_instance: AppInstance,
    pub commitment: SetStateCommitment,
}

/// One step of engine progress: either a request the host must answer, or
/// the terminal value.
#[derive(Debug)]
pub enum Step {
    Yield(MiddlewareRequest),
    Done(InstallOutcome),
}

#[derive(Debug)]
enum EngineState {
    Start,
    Validating {
        post_channel: StateChannel,
        app: AppInstance,
    },
    Signing {
        post_channel: StateChannel,
        app: AppInstance,
        commitment: SetStateCommitment,
        hash: Hash,
    },
    AwaitingReply {
        outcome_channel: StateChannel,
        app: AppInstance,
        commitment: SetStateCommitment,
        hash: Hash,
        my_signature: Signature,
    },
    Persisting {
        outcome: InstallOutcome,
        /// Responder only: the reply to emit once persistence succeeded.
        reply: Option<ProtocolMessageData>,
    },
    Sending {
        outcome: InstallOutcome,
    },
    Finished,
    /// Poisoned: an error already propagated out of `advance`.
    Failed,
}

#[derive(Debug)]
pub struct InstallEngine {
    role: ProtocolRole,
    process_id: ProcessId,
    network: NetworkContext,
    params: InstallParams,
    pre_channel: StateChannel,
    /// Responder: the initiator's signature from the round-one message.
    counterparty_signature: Option<Signature>,
    state: EngineState,
}

impl InstallEngine {
    /// Role 0: start an install on a channel we hold locally.
    pub fn initiator(
        process_id: ProcessId,
        network: NetworkContext,
        params: InstallParams,
        pre_channel: StateChannel,
    ) -> Self {
        InstallEngine {
            role: ProtocolRole::Initiator,
            process_id,
            network,
            params,
            pre_channel,
            counterparty_signature: None,
            state: EngineState::Start,
        }
    }

    /// Role 1: react to an inbound round-one message.
    pub fn responder(
        network: NetworkContext,
        message: &ProtocolMessageData,
        pre_channel: StateChannel,
    ) -> Result<Self, InstallError> {
        let params = message.install_params()?.clone();
        let signature = message.install_custom_data()?.signature;
        Ok(InstallEngine {
            role: ProtocolRole::Responder,
            process_id: message.process_id.clone(),
            network,
            params,
            pre_channel,
            counterparty_signature: Some(signature),
            state: EngineState::Start,
        })
    }

    pub fn role(&self) -> ProtocolRole {
        self.role
    }

    pub fn process_id(&self) -> &ProcessId {
        &self.process_id
    }

    /// Drive the machine one step.
    ///
    /// The first call passes `None`; every later call passes the response to
    /// the request yielded before. A mismatched response fails the run.
    pub fn advance(&mut self, input: Option<MiddlewareResponse>) -> Result<Step, InstallError> {
        let state = core::mem::replace(&mut self.state, EngineState::Failed);
        match (state, input) {
            (EngineState::Start, None) => self.start(),

            (EngineState::Validating { post_channel, app }, Some(MiddlewareResponse::Validate(verdict))) => {
                self.validated(post_channel, app, verdict)
            }
            (EngineState::Validating { .. }, _) => Err(InstallError::UnexpectedResponse {
                expected: Opcode::OpValidate,
            }),

            (
                EngineState::Signing {
                    post_channel,
                    app,
                    commitment,
                    hash,
                },
                Some(MiddlewareResponse::Sign(signature)),
            ) => self.signed(post_channel, app, commitment, hash, signature),
            (EngineState::Signing { .. }, _) => Err(InstallError::UnexpectedResponse {
                expected: Opcode::OpSign,
            }),

            (
                EngineState::AwaitingReply {
                    outcome_channel,
                    app,
                    commitment,
                    hash,
                    my_signature,
                },
                Some(MiddlewareResponse::Received(reply)),
            ) => self.reply_received(outcome_channel, app, commitment, hash, my_signature, reply),
            (EngineState::AwaitingReply { .. }, _) => Err(InstallError::UnexpectedResponse {
                expected: Opcode::IoSendAndWait,
            }),

            (EngineState::Persisting { outcome, reply }, Some(MiddlewareResponse::Persisted)) => {
                match reply {
                    None => {
                        self.state = EngineState::Finished;
                        Ok(Step::Done(outcome))
                    }
                    Some(reply) => {
                        self.state = EngineState::Sending { outcome };
                        Ok(Step::Yield(MiddlewareRequest::Send(reply)))
                    }
                }
            }
            (EngineState::Persisting { .. }, _) => Err(InstallError::UnexpectedResponse {
                expected: Opcode::PersistAppInstance,
            }),

            (EngineState::Sending { outcome }, Some(MiddlewareResponse::Sent)) => {
                self.state = EngineState::Finished;
                Ok(Step::Done(outcome))
            }
            (EngineState::Sending { .. }, _) => Err(InstallError::UnexpectedResponse {
                expected: Opcode::IoSend,
            }),

            (EngineState::Start, Some(_)) | (EngineState::Finished, _) | (EngineState::Failed, _) => {
                Err(InstallError::AlreadyTerminated)
            }
        }
    }

    /// Preflight, sufficiency and the speculative transition, ending in the
    /// validation request. Nothing before this point is observable outside
    /// the engine.
    fn start(&mut self) -> Result<Step, InstallError> {
        if self.params.multisig_address != self.pre_channel.multisig_address() {
            return Err(InstallError::WrongChannel {
                expected: self.params.multisig_address,
                actual: self.pre_channel.multisig_address(),
            });
        }

        let computed = self.params.proposal.identity_hash();
        if self.params.app_identity_hash != computed {
            return Err(InstallError::IdentityHashMismatch {
                declared: self.params.app_identity_hash,
                computed,
            });
        }

        assert_sufficient_deposits(&self.pre_channel, &self.params.proposal)?;

        let post_channel =
            compute_install_state_channel_transition(&self.pre_channel, &self.params.proposal)?;
        // The transition moves the proposal verbatim, so the new instance is
        // the proposal itself.
        let app = self.params.proposal.clone();

        let request = MiddlewareRequest::Validate(ValidationRequest {
            protocol: ProtocolName::Install,
            params: self.params.clone(),
            state_channel: self.pre_channel.clone(),
            app_instance: app.clone(),
            role: self.role,
        });
        self.state = EngineState::Validating { post_channel, app };
        Ok(Step::Yield(request))
    }

    /// Host verdict is in. Build the free-balance commitment; the responder
    /// additionally verifies the initiator's signature *before* producing
    /// its own, so it never signs a commitment the counterparty did not
    /// countersign first.
    fn validated(
        &mut self,
        post_channel: StateChannel,
        app: AppInstance,
        verdict: Option<String>,
    ) -> Result<Step, InstallError> {
        if let Some(reason) = verdict {
            return Err(InstallError::HostRejected(reason));
        }

        let commitment = SetStateCommitment::for_free_balance(&self.network, &post_channel);
        let hash = commitment.hash_to_sign();

        if self.role == ProtocolRole::Responder {
            let their_sig = self
                .counterparty_signature
                .expect("responder engines are constructed with the round-one signature");
            let expected = self.params.initiator_identifier.signer_address()?;
            let recovered = sig::recover_signer(hash, their_sig)?;
            if recovered != expected {
                tracing::warn!(?expected, ?recovered, "initiator signature mismatch");
                return Err(InstallError::InvalidCounterpartySignature { expected, recovered });
            }
        }

        self.state = EngineState::Signing {
            post_channel,
            app,
            commitment,
            hash,
        };
        Ok(Step::Yield(MiddlewareRequest::Sign(hash)))
    }

    /// Our own signature is in.
    fn signed(
        &mut self,
        post_channel: StateChannel,
        app: AppInstance,
        mut commitment: SetStateCommitment,
        hash: Hash,
        my_signature: Signature,
    ) -> Result<Step, InstallError> {
        match self.role {
            ProtocolRole::Initiator => {
                let message = ProtocolMessageData::install_round_one(
                    self.process_id.clone(),
                    self.params.responder_identifier,
                    self.params.clone(),
                    my_signature,
                );
                self.state = EngineState::AwaitingReply {
                    outcome_channel: post_channel,
                    app,
                    commitment,
                    hash,
                    my_signature,
                };
                Ok(Step::Yield(MiddlewareRequest::SendAndWait(message)))
            }
            ProtocolRole::Responder => {
                let their_sig = self
                    .counterparty_signature
                    .expect("verified in the previous step");
                // Aggregation stores both signatures in canonical owner
                // order and re-validates them against the owners.
                commitment.add_signatures(post_channel.owners(), my_signature, their_sig)?;

                let outcome = InstallOutcome {
                    channel: post_channel,
                    app_instance: app,
                    commitment,
                };
                let reply = ProtocolMessageData::install_reply(
                    self.process_id.clone(),
                    self.params.initiator_identifier,
                    my_signature,
                );
                let request = persist_request(&outcome);
                self.state = EngineState::Persisting {
                    outcome,
                    reply: Some(reply),
                };
                Ok(Step::Yield(request))
            }
        }
    }

    /// Initiator: the responder's reply arrived.
    fn reply_received(
        &mut self,
        outcome_channel: StateChannel,
        app: AppInstance,
        mut commitment: SetStateCommitment,
        hash: Hash,
        my_signature: Signature,
        reply: ProtocolMessageData,
    ) -> Result<Step, InstallError> {
        if reply.process_id != self.process_id {
            return Err(super::message::MessageError::ProcessMismatch {
                expected: self.process_id.clone(),
                actual: reply.process_id,
            }
            .into());
        }
        let their_sig = reply.install_custom_data()?.signature;

        let expected = self.params.responder_identifier.signer_address()?;
        let recovered = sig::recover_signer(hash, their_sig)?;
        if recovered != expected {
            tracing::warn!(?expected, ?recovered, "responder signature mismatch");
            return Err(InstallError::InvalidCounterpartySignature { expected, recovered });
        }

        commitment.add_signatures(outcome_channel.owners(), my_signature, their_sig)?;

        let outcome = InstallOutcome {
            channel: outcome_channel,
            app_instance: app,
            commitment,
        };
        let request = persist_request(&outcome);
        self.state = EngineState::Persisting {
            outcome,
            reply: None,
        };
        Ok(Step::Yield(request))
    }
}

fn persist_request(outcome: &InstallOutcome) -> MiddlewareRequest {
    MiddlewareRequest::Persist(PersistRequest {
        request_type: PersistAppType::CreateInstance,
        channel: outcome.channel.clone(),
        app_instance: outcome.app_instance.clone(),
        commitment: outcome.commitment.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::super::message::{MessageError, SeqNo};
    use super::*;
    use crate::encode::types::U256;
    use crate::testutil::{
        funded_channel_with_proposal, network, signer_a, signer_b, test_install_params,
    };

    fn process_id() -> ProcessId {
        ProcessId("test-run".into())
    }

    /// The hash both parties are expected to sign for the fixture channel.
    fn expected_hash(pre: &StateChannel, params: &InstallParams) -> Hash {
        let post = compute_install_state_channel_transition(pre, &params.proposal).unwrap();
        SetStateCommitment::for_free_balance(&network(), &post).hash_to_sign()
    }

    fn initiator_engine() -> InstallEngine {
        InstallEngine::initiator(
            process_id(),
            network(),
            test_install_params(),
            funded_channel_with_proposal(),
        )
    }

    fn responder_engine(round_one: &ProtocolMessageData) -> InstallEngine {
        InstallEngine::responder(network(), round_one, funded_channel_with_proposal()).unwrap()
    }

    fn round_one_message(signature: Signature) -> ProtocolMessageData {
        let params = test_install_params();
        ProtocolMessageData::install_round_one(
            process_id(),
            params.responder_identifier,
            params,
            signature,
        )
    }

    #[test]
    fn initiator_runs_validate_sign_wait_persist_in_order() {
        let pre = funded_channel_with_proposal();
        let params = test_install_params();
        let hash = expected_hash(&pre, &params);
        let mut engine = initiator_engine();

        // Validation comes first; nothing is signed or sent before it.
        let step = engine.advance(None).unwrap();
        let validation = match step {
            Step::Yield(MiddlewareRequest::Validate(v)) => v,
            other => panic!("expected a validation request, got {other:?}"),
        };
        assert_eq!(validation.role, ProtocolRole::Initiator);
        assert_eq!(validation.protocol, ProtocolName::Install);
        assert_eq!(validation.state_channel, pre);
        assert_eq!(validation.app_instance, params.proposal);

        // Then our signature over the free-balance commitment.
        let step = engine.advance(Some(MiddlewareResponse::Validate(None))).unwrap();
        match step {
            Step::Yield(MiddlewareRequest::Sign(h)) => assert_eq!(h, hash),
            other => panic!("expected a sign request, got {other:?}"),
        }

        // Then the round-one message carrying params and our signature.
        let my_sig = signer_a().sign_eth(hash);
        let step = engine.advance(Some(MiddlewareResponse::Sign(my_sig))).unwrap();
        let sent = match step {
            Step::Yield(MiddlewareRequest::SendAndWait(m)) => m,
            other => panic!("expected send-and-wait, got {other:?}"),
        };
        assert_eq!(sent.seq, SeqNo::Assigned(1));
        assert_eq!(sent.to, params.responder_identifier);
        assert!(sent.install_params().is_ok());
        assert_eq!(sent.install_custom_data().unwrap().signature, my_sig);

        // The responder countersigns; the engine verifies and persists.
        let their_sig = signer_b().sign_eth(hash);
        let reply = ProtocolMessageData::install_reply(
            process_id(),
            params.initiator_identifier,
            their_sig,
        );
        let step = engine.advance(Some(MiddlewareResponse::Received(reply))).unwrap();
        let persist = match step {
            Step::Yield(MiddlewareRequest::Persist(p)) => p,
            other => panic!("expected persist, got {other:?}"),
        };
        assert_eq!(persist.request_type, PersistAppType::CreateInstance);
        assert_eq!(
            persist.channel.free_balance().version_number(),
            pre.free_balance().version_number() + 1
        );
        assert!(persist.channel.has_app_instance(&params.app_identity_hash));

        // Signatures are filed in canonical owner order.
        let sigs = persist.commitment.signatures().unwrap();
        for (i, sig) in sigs.iter().enumerate() {
            assert_eq!(
                crate::sig::recover_signer(hash, *sig).unwrap(),
                persist.channel.owners().0[i]
            );
        }

        match engine.advance(Some(MiddlewareResponse::Persisted)).unwrap() {
            Step::Done(outcome) => {
                assert_eq!(outcome.channel, persist.channel);
            }
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[test]
    fn responder_verifies_before_signing_and_persists_before_sending() {
        let pre = funded_channel_with_proposal();
        let params = test_install_params();
        let hash = expected_hash(&pre, &params);

        let their_sig = signer_a().sign_eth(hash);
        let mut engine = responder_engine(&round_one_message(their_sig));

        let step = engine.advance(None).unwrap();
        match step {
            Step::Yield(MiddlewareRequest::Validate(v)) => {
                assert_eq!(v.role, ProtocolRole::Responder)
            }
            other => panic!("expected validation, got {other:?}"),
        }

        // The initiator signature is checked during this step; only then is
        // our own signature requested.
        let step = engine.advance(Some(MiddlewareResponse::Validate(None))).unwrap();
        match step {
            Step::Yield(MiddlewareRequest::Sign(h)) => assert_eq!(h, hash),
            other => panic!("expected sign, got {other:?}"),
        }

        let my_sig = signer_b().sign_eth(hash);
        let step = engine.advance(Some(MiddlewareResponse::Sign(my_sig))).unwrap();
        match step {
            Step::Yield(MiddlewareRequest::Persist(p)) => {
                assert_eq!(p.request_type, PersistAppType::CreateInstance);
                p.commitment.signatures().unwrap();
            }
            other => panic!("expected persist before send, got {other:?}"),
        }

        // Only after persistence does the reply go out.
        let step = engine.advance(Some(MiddlewareResponse::Persisted)).unwrap();
        let reply = match step {
            Step::Yield(MiddlewareRequest::Send(m)) => m,
            other => panic!("expected send, got {other:?}"),
        };
        assert_eq!(reply.seq, SeqNo::Unassigned);
        assert_eq!(reply.to, params.initiator_identifier);
        assert!(reply.params.is_none());
        assert_eq!(reply.install_custom_data().unwrap().signature, my_sig);

        match engine.advance(Some(MiddlewareResponse::Sent)).unwrap() {
            Step::Done(outcome) => {
                assert!(outcome.channel.has_app_instance(&params.app_identity_hash))
            }
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[test]
    fn insufficient_funds_aborts_before_any_request() {
        let params = {
            let mut p = test_install_params();
            p.proposal.initiator_deposit = U256::from(1000u64);
            p.app_identity_hash = p.proposal.identity_hash();
            p
        };
        let pre = funded_channel_with_proposal()
            .add_proposal(params.proposal.clone())
            .unwrap();
        let mut engine = InstallEngine::initiator(process_id(), network(), params, pre);

        let err = engine.advance(None).unwrap_err();
        match err {
            InstallError::InsufficientFunds { have, need, .. } => {
                assert_eq!(have, U256::from(100u64));
                assert_eq!(need, U256::from(1000u64));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn host_rejection_aborts_with_no_signature_requested() {
        let mut engine = initiator_engine();
        engine.advance(None).unwrap();
        let err = engine
            .advance(Some(MiddlewareResponse::Validate(Some(
                "app definition not whitelisted".into(),
            ))))
            .unwrap_err();
        assert!(matches!(err, InstallError::HostRejected(reason) if reason.contains("whitelisted")));
    }

    #[test]
    fn responder_rejects_wrong_initiator_signature() {
        let wrong_hash = Hash([0x99; 32]);
        let their_sig = signer_a().sign_eth(wrong_hash);
        let mut engine = responder_engine(&round_one_message(their_sig));

        engine.advance(None).unwrap();
        let err = engine
            .advance(Some(MiddlewareResponse::Validate(None)))
            .unwrap_err();
        assert!(matches!(
            err,
            InstallError::InvalidCounterpartySignature { .. }
        ));
    }

    #[test]
    fn initiator_rejects_wrong_responder_signature() {
        let pre = funded_channel_with_proposal();
        let params = test_install_params();
        let hash = expected_hash(&pre, &params);
        let mut engine = initiator_engine();

        engine.advance(None).unwrap();
        engine.advance(Some(MiddlewareResponse::Validate(None))).unwrap();
        let my_sig = signer_a().sign_eth(hash);
        engine.advance(Some(MiddlewareResponse::Sign(my_sig))).unwrap();

        // Responder signs a different hash.
        let their_sig = signer_b().sign_eth(Hash([0x99; 32]));
        let reply = ProtocolMessageData::install_reply(
            process_id(),
            params.initiator_identifier,
            their_sig,
        );
        let err = engine
            .advance(Some(MiddlewareResponse::Received(reply)))
            .unwrap_err();
        assert!(matches!(
            err,
            InstallError::InvalidCounterpartySignature { .. }
        ));
    }

    #[test]
    fn initiator_rejects_reply_from_other_process() {
        let pre = funded_channel_with_proposal();
        let params = test_install_params();
        let hash = expected_hash(&pre, &params);
        let mut engine = initiator_engine();

        engine.advance(None).unwrap();
        engine.advance(Some(MiddlewareResponse::Validate(None))).unwrap();
        engine
            .advance(Some(MiddlewareResponse::Sign(signer_a().sign_eth(hash))))
            .unwrap();

        let reply = ProtocolMessageData::install_reply(
            ProcessId("some-other-run".into()),
            params.initiator_identifier,
            signer_b().sign_eth(hash),
        );
        let err = engine
            .advance(Some(MiddlewareResponse::Received(reply)))
            .unwrap_err();
        assert!(matches!(err, InstallError::Message(_)));
    }

    #[test]
    fn identity_hash_skew_is_rejected() {
        let mut params = test_install_params();
        params.app_identity_hash = Hash([0xee; 32]);
        let mut engine = InstallEngine::initiator(
            process_id(),
            network(),
            params,
            funded_channel_with_proposal(),
        );
        let err = engine.advance(None).unwrap_err();
        assert!(matches!(err, InstallError::IdentityHashMismatch { .. }));
    }

    #[test]
    fn wrong_multisig_is_rejected() {
        let mut params = test_install_params();
        params.multisig_address = crate::Address([0x0f; 20]);
        let mut engine = InstallEngine::initiator(
            process_id(),
            network(),
            params,
            funded_channel_with_proposal(),
        );
        let err = engine.advance(None).unwrap_err();
        assert!(matches!(err, InstallError::WrongChannel { .. }));
    }

    #[test]
    fn mismatched_response_fails_the_run() {
        let mut engine = initiator_engine();
        engine.advance(None).unwrap();
        let err = engine
            .advance(Some(MiddlewareResponse::Sign(Signature::new(&[0; 64], 27))))
            .unwrap_err();
        assert!(matches!(
            err,
            InstallError::UnexpectedResponse {
                expected: Opcode::OpValidate
            }
        ));
    }

    #[test]
    fn advancing_a_finished_engine_fails() {
        let pre = funded_channel_with_proposal();
        let params = test_install_params();
        let hash = expected_hash(&pre, &params);
        let mut engine = initiator_engine();

        engine.advance(None).unwrap();
        engine.advance(Some(MiddlewareResponse::Validate(None))).unwrap();
        engine
            .advance(Some(MiddlewareResponse::Sign(signer_a().sign_eth(hash))))
            .unwrap();
        let reply = ProtocolMessageData::install_reply(
            process_id(),
            params.initiator_identifier,
            signer_b().sign_eth(hash),
        );
        engine.advance(Some(MiddlewareResponse::Received(reply))).unwrap();
        match engine.advance(Some(MiddlewareResponse::Persisted)).unwrap() {
            Step::Done(_) => {}
            other => panic!("expected done, got {other:?}"),
        }

        let err = engine.advance(Some(MiddlewareResponse::Persisted)).unwrap_err();
        assert!(matches!(err, InstallError::AlreadyTerminated));
    }

    #[test]
    fn responder_construction_requires_params() {
        let reply = ProtocolMessageData::install_reply(
            process_id(),
            test_install_params().initiator_identifier,
            Signature::new(&[0x11; 64], 27),
        );
        let err =
            InstallEngine::responder(network(), &reply, funded_channel_with_proposal()).unwrap_err();
        assert!(matches!(err, InstallError::Message(MessageError::MissingParams)));
    }
}
