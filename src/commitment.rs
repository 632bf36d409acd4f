//! Commitments: signed byte-strings authorizing on-chain action.
//!
//! The builder functions here are pure: given the network context and a
//! channel (or app instance) they produce an unsigned commitment whose
//! `hash_to_sign()` both parties compute independently and must agree on
//! byte-for-byte. Signatures are attached afterwards, always stored in
//! canonical channel-owner order regardless of which side produced which.

mod conditional;
mod set_state;

pub use conditional::ConditionalTransactionCommitment;
pub use set_state::SetStateCommitment;

use crate::channel::{ChannelOwners, OutcomeType};
use crate::encode::types::{Address, Hash, Signature};
use crate::sig;
use serde::{Deserialize, Serialize};

/// On-chain deployment the commitments refer to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkContext {
    pub chain_id: u64,
    pub two_party_fixed_outcome_interpreter: Address,
    pub single_asset_two_party_coin_transfer_interpreter: Address,
    pub multi_asset_multi_party_coin_transfer_interpreter: Address,
    pub refund_interpreter: Address,
}

impl NetworkContext {
    pub fn interpreter_for(&self, outcome_type: OutcomeType) -> Address {
        match outcome_type {
            OutcomeType::TwoPartyFixedOutcome => self.two_party_fixed_outcome_interpreter,
            OutcomeType::SingleAssetTwoPartyCoinTransfer => {
                self.single_asset_two_party_coin_transfer_interpreter
            }
            OutcomeType::MultiAssetMultiPartyCoinTransfer => {
                self.multi_asset_multi_party_coin_transfer_interpreter
            }
            OutcomeType::RefundOutcomeType => self.refund_interpreter,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommitmentError {
    #[error("signature recovery failed")]
    RecoveryFailed(#[from] sig::Error),
    #[error("signature recovered to {0:?}, which is not a channel owner")]
    InvalidSignature(Address),
    #[error("two signatures recovered to the same owner {0:?}")]
    DuplicateSigner(Address),
    #[error("commitment is missing the signature of owner {0}")]
    MissingSignature(usize),
}

/// Signature slots in canonical channel-owner order.
///
/// `add_signatures` recovers the signer behind each input and files it under
/// the matching owner, so callers never need to know which side signed what.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct SignatureSlots([Option<Signature>; 2]);

impl SignatureSlots {
    pub(crate) fn add(
        &mut self,
        hash: Hash,
        owners: &ChannelOwners,
        sig_a: Signature,
        sig_b: Signature,
    ) -> Result<(), CommitmentError> {
        let mut slots = [None, None];
        for sig in [sig_a, sig_b] {
            let signer = sig::recover_signer(hash, sig)?;
            let idx = owners
                .index_of(&signer)
                .ok_or(CommitmentError::InvalidSignature(signer))?;
            if slots[idx].is_some() {
                return Err(CommitmentError::DuplicateSigner(signer));
            }
            slots[idx] = Some(sig);
        }
        self.0 = slots;
        Ok(())
    }

    pub(crate) fn both(&self) -> Result<[Signature; 2], CommitmentError> {
        Ok([
            self.0[0].ok_or(CommitmentError::MissingSignature(0))?,
            self.0[1].ok_or(CommitmentError::MissingSignature(1))?,
        ])
    }

    pub(crate) fn get(&self, idx: usize) -> Option<Signature> {
        self.0[idx]
    }
}
