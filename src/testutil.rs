//! Shared fixtures for the in-crate tests.
//!
//! The two signers are the standard local-devnet accounts (see sig/tests.rs
//! for the derived addresses). Do not use them anywhere real.

use crate::channel::{
    AppInstance, AppInterface, ChannelOwners, OutcomeType, PublicIdentifier, StateChannel,
};
use crate::commitment::NetworkContext;
use crate::encode::types::{Address, Bytes, U256};
use crate::protocol::message::InstallParams;
use crate::Signer;
use hex::FromHex;

pub(crate) fn signer_a() -> Signer {
    let sk = <[u8; 32]>::from_hex(
        "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
    )
    .unwrap();
    Signer::from_secret_bytes(&sk).unwrap()
}

pub(crate) fn signer_b() -> Signer {
    let sk = <[u8; 32]>::from_hex(
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
    )
    .unwrap();
    Signer::from_secret_bytes(&sk).unwrap()
}

pub(crate) fn id_a() -> PublicIdentifier {
    signer_a().public_identifier()
}

pub(crate) fn id_b() -> PublicIdentifier {
    signer_b().public_identifier()
}

pub(crate) fn eth() -> Address {
    Address::default()
}

pub(crate) fn network() -> NetworkContext {
    NetworkContext {
        chain_id: 1,
        two_party_fixed_outcome_interpreter: Address([0x21; 20]),
        single_asset_two_party_coin_transfer_interpreter: Address([0x22; 20]),
        multi_asset_multi_party_coin_transfer_interpreter: Address([0x23; 20]),
        refund_interpreter: Address([0x24; 20]),
    }
}

/// App proposed by A towards B, 30/40 wei deposits in the native asset.
pub(crate) fn test_app(seq_no: u64) -> AppInstance {
    AppInstance {
        initiator_identifier: id_a(),
        responder_identifier: id_b(),
        app_interface: AppInterface {
            app_definition: "0x5b38da6a701c568545dcfcb03fcb875f56beddc4".parse().unwrap(),
            state_encoding: "tuple(uint256 counter)".into(),
            action_encoding: None,
        },
        default_timeout: 0xa0,
        app_seq_no: seq_no,
        latest_state: Bytes(vec![0u8; 32]),
        latest_version_number: 0,
        latest_action: None,
        state_timeout: 0,
        outcome_type: OutcomeType::SingleAssetTwoPartyCoinTransfer,
        initiator_deposit: U256::from(30u64),
        responder_deposit: U256::from(40u64),
        initiator_deposit_asset_id: eth(),
        responder_deposit_asset_id: eth(),
    }
}

/// Channel between A and B with 100 wei of native-asset balance each, and
/// `test_app(1)` already proposed.
pub(crate) fn funded_channel_with_proposal() -> StateChannel {
    let owners = ChannelOwners([signer_a().address(), signer_b().address()]);
    StateChannel::setup(Address([0x01; 20]), owners, 172800)
        .with_free_balance_of(eth(), signer_a().address(), U256::from(100u64))
        .with_free_balance_of(eth(), signer_b().address(), U256::from(100u64))
        .add_proposal(test_app(1))
        .unwrap()
}

pub(crate) fn test_install_params() -> InstallParams {
    let proposal = test_app(1);
    InstallParams {
        initiator_identifier: proposal.initiator_identifier,
        responder_identifier: proposal.responder_identifier,
        multisig_address: Address([0x01; 20]),
        app_identity_hash: proposal.identity_hash(),
        proposal,
    }
}
