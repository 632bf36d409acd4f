//! Core of a generalized state-channel runtime for an account-based chain.
//!
//! A state channel is a two-party off-chain construct anchored by an on-chain
//! multisignature wallet. The channel hosts many app instances, each a small
//! deterministic state machine whose outcome redistributes funds from a shared
//! free balance. This crate implements the install protocol: the asymmetric
//! two-round exchange by which both parties atomically debit the free balance,
//! materialize a new app instance and exchange signatures over the commitment
//! that authorizes on-chain dispute resolution.
//!
//! The crate is deliberately host-agnostic: the protocol engine in
//! [`protocol::install`] is a suspendable state machine that only ever talks
//! to the outside world through the typed requests in
//! [`protocol::middleware`]. Signing, validation, message transport and
//! persistence are all supplied by the host.

mod encode {
    mod hashing;
    mod slots;

    pub mod types;

    pub use hashing::{to_hash, Keccak256Writer};
    pub use slots::{
        write_address, write_bytes, write_u256, write_u64, write_word, Encode, Writer,
    };
}

pub mod channel;
pub mod commitment;
pub mod protocol;
pub mod sig;

#[cfg(test)]
pub(crate) mod testutil;

pub use encode::types::{Address, Bytes, Bytes32, Hash, Signature, U256};
pub use sig::Signer;
