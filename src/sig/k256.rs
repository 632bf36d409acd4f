//! Signer using the k256 crate (pure-Rust implementation of ecdsa).

use super::{address_from_uncompressed, hash_to_eth_signed_msg_hash};
use crate::channel::PublicIdentifier;
use crate::encode::types::{Address, Hash, Signature};
use k256::{
    ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
};

pub use k256::ecdsa::Error;

#[derive(Debug)]
pub struct Signer {
    key: SigningKey,
    addr: Address,
}

impl From<&VerifyingKey> for Address {
    fn from(key: &VerifyingKey) -> Self {
        // The uncompressed encoding is 65 bytes; if that ever changes the
        // dependency has changed so fundamentally that panicking is the only
        // honest option.
        let pk_bytes: [u8; 65] = key.to_encoded_point(false).as_bytes().try_into().unwrap();
        address_from_uncompressed(&pk_bytes)
    }
}

impl Signer {
    pub fn new<R: rand::Rng + rand::CryptoRng>(rng: &mut R) -> Self {
        let key = SigningKey::random(rng);
        let addr = Address::from(key.verifying_key());
        Self { key, addr }
    }

    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, Error> {
        let key = SigningKey::from_slice(bytes)?;
        let addr = Address::from(key.verifying_key());
        Ok(Self { key, addr })
    }

    pub fn address(&self) -> Address {
        self.addr
    }

    /// Compressed SEC1 encoding of the public key, used as the participant
    /// identifier on the wire.
    pub fn public_identifier(&self) -> PublicIdentifier {
        let bytes: [u8; 33] = self
            .key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .try_into()
            .unwrap();
        PublicIdentifier(bytes)
    }

    /// Sign a hash using an Ethereum 65-byte recoverable signature.
    ///
    /// Note that this differs from transaction signatures: the
    /// `Ethereum Signed Message` prefix is added here, so callers pass the
    /// bare commitment hash.
    pub fn sign_eth(&self, msg: Hash) -> Signature {
        let hash = hash_to_eth_signed_msg_hash(msg);

        // Deterministic (RFC 6979) signing over a prehash cannot fail for a
        // valid key, which `self.key` is by construction.
        let (sig, recid) = self
            .key
            .sign_prehash_recoverable(&hash.0)
            .expect("signing with a validated key");

        let mut rs = [0u8; 64];
        rs.copy_from_slice(sig.to_bytes().as_slice());
        // The library produces low-s signatures; on-chain checks reject the
        // non-canonical solution (EIP-2).
        debug_assert!(rs[32] & 0x80 == 0);

        // yParity is offset by 27 on-chain (EIP-2098 kept the Bitcoin
        // convention).
        Signature::new(&rs, 27 + recid.to_byte())
    }
}

/// Recover the signer address from a signature produced by [Signer::sign_eth].
///
/// `hash` is the hash passed to `sign_eth`, without the
/// `Ethereum Signed Message` prefix.
pub fn recover_signer(hash: Hash, eth_sig: Signature) -> Result<Address, Error> {
    let hash = hash_to_eth_signed_msg_hash(hash);

    let v = eth_sig.0[64].checked_sub(27).ok_or_else(Error::new)?;
    let recid = RecoveryId::from_byte(v).ok_or_else(Error::new)?;
    let sig = EcdsaSignature::from_slice(&eth_sig.0[..64])?;

    let key = VerifyingKey::recover_from_prehash(&hash.0, &sig, recid)?;
    Ok(Address::from(&key))
}

/// Signer address behind a compressed public identifier.
pub fn identifier_address(id: &PublicIdentifier) -> Result<Address, Error> {
    let key = VerifyingKey::from_sec1_bytes(&id.0)?;
    Ok(Address::from(&key))
}
