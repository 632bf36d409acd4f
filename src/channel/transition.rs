//! The pure install transition: `(pre-channel, proposal) → post-channel`.

use super::free_balance::TokenIndexedCoinTransferMap;
use super::state_channel::{StateChannel, StateChannelError};
use super::AppInstance;
use crate::encode::types::{Address, U256};

/// Signer addresses in app order, initiator first.
///
/// App order is whatever the proposal says and may be the opposite of the
/// channel's canonical owner order; the conversion happens exactly here, at
/// the boundary of the transition.
struct AppParties {
    initiator: Address,
    responder: Address,
}

impl AppParties {
    fn resolve(proposal: &AppInstance) -> Result<Self, StateChannelError> {
        Ok(AppParties {
            initiator: proposal.initiator_identifier.signer_address()?,
            responder: proposal.responder_identifier.signer_address()?,
        })
    }
}

/// Check that each depositing owner can cover its deposit.
///
/// Performed once per deposit side, on purpose: the two deposits may be
/// denominated in different assets, and the error should name the exact
/// party, asset and shortfall.
pub fn assert_sufficient_deposits(
    channel: &StateChannel,
    proposal: &AppInstance,
) -> Result<(), StateChannelError> {
    let parties = AppParties::resolve(proposal)?;

    for (party, asset, need) in [
        (
            parties.initiator,
            proposal.initiator_deposit_asset_id,
            proposal.initiator_deposit,
        ),
        (
            parties.responder,
            proposal.responder_deposit_asset_id,
            proposal.responder_deposit,
        ),
    ] {
        if !channel.owners().contains(&party) {
            return Err(StateChannelError::NotChannelOwner { address: party });
        }
        let have = channel.free_balance().balance_of(&asset, &party);
        if have < need {
            return Err(StateChannelError::InsufficientFunds {
                party,
                asset,
                have,
                need,
            });
        }
    }
    Ok(())
}

/// Apply the install transition.
///
/// Resolves the app parties, derives the token-indexed deduction map from
/// the proposal's deposits and moves the proposal from the proposed set into
/// the installed set with the free balance debited and its version bumped.
/// Pure: same inputs, same output channel.
pub fn compute_install_state_channel_transition(
    pre_channel: &StateChannel,
    proposal: &AppInstance,
) -> Result<StateChannel, StateChannelError> {
    let parties = AppParties::resolve(proposal)?;
    for party in [parties.initiator, parties.responder] {
        if !pre_channel.owners().contains(&party) {
            return Err(StateChannelError::NotChannelOwner { address: party });
        }
    }
    // In this model an asset id *is* the token contract address (the zero
    // address denoting the chain's native coin).
    let initiator_token = proposal.initiator_deposit_asset_id;
    let responder_token = proposal.responder_deposit_asset_id;

    let mut decrement = TokenIndexedCoinTransferMap::new();
    if initiator_token == responder_token {
        // Single entry listing both owners. The amounts are assigned by
        // checking which owner the app initiator is, so the two deposits
        // land on the right sides regardless of app order.
        let owners = pre_channel.owners();
        let (first, second) = if parties.initiator == owners.0[0] {
            (proposal.initiator_deposit, proposal.responder_deposit)
        } else {
            (proposal.responder_deposit, proposal.initiator_deposit)
        };
        let entry = decrement.entry(initiator_token).or_default();
        entry.insert(owners.0[0], first);
        entry.insert(owners.0[1], second);
    } else {
        decrement
            .entry(initiator_token)
            .or_default()
            .insert(parties.initiator, proposal.initiator_deposit);
        decrement
            .entry(responder_token)
            .or_default()
            .insert(parties.responder, proposal.responder_deposit);
    }

    tracing::debug!(
        multisig = ?pre_channel.multisig_address(),
        app = ?proposal.identity_hash(),
        tokens = decrement.len(),
        "computed install decrement"
    );

    pre_channel.install_app(&proposal.identity_hash(), &decrement)
}
