//! Dummy signer that always panics. Fallback if no signer feature flag is
//! selected, so the real errors surface through `compile_error!` instead of a
//! wall of missing-type diagnostics.

use crate::channel::PublicIdentifier;
use crate::encode::types::{Address, Hash, Signature};

#[derive(Debug)]
pub struct Error {}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("no signing backend enabled")
    }
}

impl std::error::Error for Error {}

#[derive(Debug)]
pub struct Signer {}

impl Signer {
    pub fn new<R: rand::Rng + rand::CryptoRng>(_rng: &mut R) -> Self {
        unimplemented!()
    }

    pub fn from_secret_bytes(_bytes: &[u8; 32]) -> Result<Self, Error> {
        unimplemented!()
    }

    pub fn address(&self) -> Address {
        unimplemented!()
    }

    pub fn public_identifier(&self) -> PublicIdentifier {
        unimplemented!()
    }

    pub fn sign_eth(&self, _msg: Hash) -> Signature {
        unimplemented!()
    }
}

pub fn recover_signer(_hash: Hash, _eth_sig: Signature) -> Result<Address, Error> {
    unimplemented!()
}

pub fn identifier_address(_id: &PublicIdentifier) -> Result<Address, Error> {
    unimplemented!()
}
