//! Signer using the secp256k1 C library.

use super::{address_from_uncompressed, hash_to_eth_signed_msg_hash};
use crate::channel::PublicIdentifier;
use crate::encode::types::{Address, Hash, Signature};
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    All, Message, PublicKey, Secp256k1, SecretKey,
};

pub use secp256k1::Error;

#[derive(Debug)]
pub struct Signer {
    secp: Secp256k1<All>,
    sk: SecretKey,
    pk: PublicKey,
    addr: Address,
}

impl From<PublicKey> for Address {
    fn from(pk: PublicKey) -> Self {
        address_from_uncompressed(&pk.serialize_uncompressed())
    }
}

impl Signer {
    pub fn new<R: rand::Rng + rand::CryptoRng>(rng: &mut R) -> Self {
        let secp = Secp256k1::new();
        let (sk, pk) = secp.generate_keypair(rng);
        Self {
            secp,
            sk,
            pk,
            addr: pk.into(),
        }
    }

    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, Error> {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(bytes)?;
        let pk = PublicKey::from_secret_key(&secp, &sk);
        Ok(Self {
            secp,
            sk,
            pk,
            addr: pk.into(),
        })
    }

    pub fn address(&self) -> Address {
        self.addr
    }

    /// Compressed SEC1 encoding of the public key, used as the participant
    /// identifier on the wire.
    pub fn public_identifier(&self) -> PublicIdentifier {
        PublicIdentifier(self.pk.serialize())
    }

    /// Sign a hash using an Ethereum 65-byte recoverable signature.
    ///
    /// Note that this differs from transaction signatures: the
    /// `Ethereum Signed Message` prefix is added here, so callers pass the
    /// bare commitment hash.
    pub fn sign_eth(&self, msg: Hash) -> Signature {
        let hash = hash_to_eth_signed_msg_hash(msg);

        // We have to use sign_ecdsa_recoverable because the on-chain check
        // must be able to recover the address; this gives us v.
        let sig = self
            .secp
            .sign_ecdsa_recoverable(&Message::from(hash), &self.sk);
        let (v, rs) = sig.serialize_compact();

        // The library already produces the canonical (low-s) solution, the
        // assert exists to fail early if that ever changes (EIP-2).
        debug_assert!(rs[32] & 0x80 == 0);

        // yParity is offset by 27 on-chain (EIP-2098 kept the Bitcoin
        // convention).
        Signature::new(&rs, 27 + v.to_i32() as u8)
    }
}

/// Recover the signer address from a signature produced by [Signer::sign_eth].
///
/// `hash` is the hash passed to `sign_eth`, without the
/// `Ethereum Signed Message` prefix.
pub fn recover_signer(hash: Hash, eth_sig: Signature) -> Result<Address, Error> {
    let hash = hash_to_eth_signed_msg_hash(hash);

    let rs = &eth_sig.0[..64];
    let v = eth_sig.0[64].checked_sub(27).ok_or(Error::InvalidSignature)?;

    let recid = RecoveryId::from_i32(v.into())?;
    let sig = RecoverableSignature::from_compact(rs, recid)?;

    let secp = Secp256k1::verification_only();
    let pk = secp.recover_ecdsa(&Message::from(hash), &sig)?;
    Ok(pk.into())
}

/// Signer address behind a compressed public identifier.
pub fn identifier_address(id: &PublicIdentifier) -> Result<Address, Error> {
    let pk = PublicKey::from_slice(&id.0)?;
    Ok(pk.into())
}
