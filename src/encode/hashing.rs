use super::slots::{Encode, Writer};
use super::types::Hash;

use sha3::{
    digest::{core_api::CoreWrapper, Output},
    Digest, Keccak256, Keccak256Core,
};

/// [Writer] that feeds every slot straight into a keccak-256 hasher.
pub struct Keccak256Writer {
    hasher: CoreWrapper<Keccak256Core>,
}

impl Default for Keccak256Writer {
    fn default() -> Self {
        Self {
            hasher: Keccak256::new(),
        }
    }
}

impl Writer for Keccak256Writer {
    fn write(&mut self, slot: &[u8]) {
        self.hasher.update(slot);
    }
}

impl Keccak256Writer {
    pub fn finalize(self) -> Output<Keccak256> {
        self.hasher.finalize()
    }
}

/// Keccak-256 over the slot encoding of `value`.
pub fn to_hash<T: Encode + ?Sized>(value: &T) -> Hash {
    let mut writer = Keccak256Writer::default();
    value.encode(&mut writer);
    Hash(writer.finalize().into())
}

/// [Writer] collecting the raw slots, used by tests to pin byte layouts.
#[cfg(test)]
#[derive(Default)]
pub struct VecWriter(pub Vec<u8>);

#[cfg(test)]
impl Writer for VecWriter {
    fn write(&mut self, slot: &[u8]) {
        self.0.extend_from_slice(slot);
    }
}
