//! Creation and verification of Ethereum-style recoverable signatures.
//!
//! The backends (and their respective dependency) are selected with the
//! equally named feature flags. [Error][k256::Error], [Signer][k256::Signer]
//! and the free functions are re-exported from the selected backend. If both
//! feature flags are present, [secp256k1] wins because [k256] is part of the
//! default feature set and may be enabled by accident.

use crate::encode::types::Hash;
use sha3::{Digest, Keccak256};


// Import the requested implementation(s), as well as the dummy fallback to
// make sure it always compiles, even with no feature flags set.
#[doc(hidden)]
#[allow(dead_code)]
mod dummy;
#[cfg(feature = "k256")]
pub mod k256;
#[cfg(feature = "secp256k1")]
pub mod secp256k1;

#[cfg(not(any(feature = "secp256k1", feature = "k256")))]
compile_error!(
    "Signature dependency needed, use one of the following feature flags: 'secp256k1', 'k256'"
);
#[cfg(not(any(feature = "secp256k1", feature = "k256")))]
pub use self::dummy::{identifier_address, recover_signer, Error, Signer};

#[cfg(all(not(feature = "secp256k1"), feature = "k256"))]
pub use self::k256::{identifier_address, recover_signer, Error, Signer};
#[cfg(feature = "secp256k1")]
#[doc(hidden)]
pub use self::secp256k1::{identifier_address, recover_signer, Error, Signer};

/// Helper function for the signing backends.
///
/// Adds the `\x19Ethereum Signed Message\n<length>` prefix to the hash. This
/// is the format the on-chain signature checks expect.
fn hash_to_eth_signed_msg_hash(hash: Hash) -> Hash {
    // Packed encoding, so we can't go through the slot writer.
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n32");
    hasher.update(hash.0);
    Hash(hasher.finalize().into())
}

/// Keccak address derivation from an uncompressed SEC1 public key.
///
/// `pk_bytes` is the 65-byte uncompressed encoding; the leading format byte
/// is not part of the hashed key material.
fn address_from_uncompressed(pk_bytes: &[u8; 65]) -> crate::encode::types::Address {
    let hash: [u8; 32] = Keccak256::digest(&pk_bytes[1..]).into();
    let mut addr = crate::encode::types::Address([0; 20]);
    addr.0.copy_from_slice(&hash[32 - 20..]);
    addr
}
