//! Byte-oriented value types shared by the whole crate.
//!
//! On the JSON wire every binary field is a `0x`-prefixed lowercase hex
//! string; the serde impls here produce and require exactly that shape.

use core::fmt::Debug;
use core::str::FromStr;

use rand::{distributions::Standard, prelude::Distribution};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use uint::construct_uint;

#[cfg(feature = "secp256k1")]
use secp256k1::ThirtyTwoByteHash;

macro_rules! impl_hex_debug {
    ($T:ident) => {
        impl Debug for $T {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str("0x")?;
                for b in self.0.iter() {
                    f.write_fmt(format_args!("{:02x}", b))?;
                }
                Ok(())
            }
        }
    };
}

pub(crate) fn parse_prefixed_hex<const N: usize>(s: &str) -> Result<[u8; N], String> {
    let body = s
        .strip_prefix("0x")
        .ok_or_else(|| format!("expected 0x-prefixed hex, got {:?}", s))?;
    let mut out = [0u8; N];
    if body.len() != N * 2 {
        return Err(format!("expected {} hex chars, got {}", N * 2, body.len()));
    }
    hex::decode_to_slice(body, &mut out).map_err(|e| e.to_string())?;
    Ok(out)
}

pub(crate) fn to_prefixed_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

macro_rules! bytesN {
    ( $T:ident, $N:literal ) => {
        #[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone)]
        pub struct $T(pub [u8; $N]);

        impl Serialize for $T {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&to_prefixed_hex(&self.0))
            }
        }

        impl<'de> Deserialize<'de> for $T {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                parse_prefixed_hex::<$N>(&s).map($T).map_err(de::Error::custom)
            }
        }

        impl FromStr for $T {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_prefixed_hex::<$N>(s).map($T)
            }
        }

        impl Distribution<$T> for Standard {
            fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> $T {
                let mut bytes = [0u8; $N];
                rng.fill(&mut bytes[..]);
                $T(bytes)
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self([0; $N])
            }
        }

        impl_hex_debug!($T);
    };
}

bytesN!(Bytes32, 32);
bytesN!(Hash, 32);

#[cfg(feature = "secp256k1")]
impl ThirtyTwoByteHash for Hash {
    fn into_32(self) -> [u8; 32] {
        self.0
    }
}

bytesN!(Signature, 65);

impl Signature {
    pub fn new(rs: &[u8; 64], v: u8) -> Self {
        let mut sig = Signature([0; 65]);
        sig.0[..64].copy_from_slice(rs);
        sig.0[64] = v;
        sig
    }
}

bytesN!(Address, 20);

/// Dynamic-length byte string with `0x`-hex JSON representation.
#[derive(PartialEq, Eq, Clone, Default)]
pub struct Bytes(pub Vec<u8>);

impl_hex_debug!(Bytes);

impl Bytes {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(v: Vec<u8>) -> Self {
        Bytes(v)
    }
}

impl Serialize for Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_prefixed_hex(&self.0))
    }
}

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let body = s
            .strip_prefix("0x")
            .ok_or_else(|| de::Error::custom("expected 0x-prefixed hex"))?;
        hex::decode(body).map(Bytes).map_err(de::Error::custom)
    }
}

// We could use primitive_types::U256 or ethereum_types::U256 here instead.
// Both wrap construct_uint without adding much we need, so the crate keeps
// its own instantiation and full control over the serde representation.
construct_uint! {
    pub struct U256(4);
}

impl U256 {
    pub fn to_be_bytes(self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        self.to_big_endian(&mut bytes);
        bytes
    }
}

impl Serialize for U256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Minimal-length hex, e.g. 30 => "0x1e", 0 => "0x0".
        serializer.serialize_str(&format!("{:#x}", self))
    }
}

impl<'de> Deserialize<'de> for U256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let body = s
            .strip_prefix("0x")
            .ok_or_else(|| de::Error::custom("expected 0x-prefixed hex"))?;
        if body.is_empty() || body.len() > 64 {
            return Err(de::Error::custom("hex quantity out of range"));
        }
        let mut bytes = [0u8; 32];
        let padded = format!("{:0>64}", body);
        hex::decode_to_slice(&padded, &mut bytes).map_err(de::Error::custom)?;
        Ok(U256::from_big_endian(&bytes))
    }
}

impl Distribution<U256> for Standard {
    fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> U256 {
        let buf: [u8; 32] = rng.gen();
        U256::from_big_endian(&buf)
    }
}
