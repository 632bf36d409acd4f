//! 32-byte-slot encoding of the values that end up inside commitment hashes.
//!
//! The layout follows the host chain's structured-data conventions: every
//! fixed-width field occupies one 32-byte slot (numbers and addresses
//! right-aligned, 32-byte words raw), dynamic byte strings are written as a
//! length slot followed by their content in left-aligned slots. Each hashable
//! type documents its own slot sequence next to its [Encode] impl.

use super::types::{Address, Hash, U256};

const SLOT_SIZE: usize = 32;

pub trait Writer {
    fn write(&mut self, slot: &[u8]);
}

/// A value with a canonical slot encoding.
///
/// Implementations must be deterministic: two honest parties encoding equal
/// values must produce identical bytes, since both hash the encoding and
/// compare signatures over the result.
pub trait Encode {
    fn encode<W: Writer>(&self, writer: &mut W);
}

fn write_right_aligned<W: Writer, const N: usize>(writer: &mut W, v: [u8; N]) {
    let mut slot = [0u8; SLOT_SIZE];
    slot[SLOT_SIZE - N..].copy_from_slice(&v);
    writer.write(&slot);
}

fn write_left_aligned<W: Writer>(writer: &mut W, v: &[u8]) {
    debug_assert!(v.len() <= SLOT_SIZE);
    let mut slot = [0u8; SLOT_SIZE];
    slot[..v.len()].copy_from_slice(v);
    writer.write(&slot);
}

pub fn write_u64<W: Writer>(writer: &mut W, v: u64) {
    write_right_aligned(writer, v.to_be_bytes());
}

pub fn write_u256<W: Writer>(writer: &mut W, v: &U256) {
    writer.write(&v.to_be_bytes());
}

pub fn write_address<W: Writer>(writer: &mut W, a: &Address) {
    write_right_aligned(writer, a.0);
}

pub fn write_word<W: Writer>(writer: &mut W, h: &Hash) {
    writer.write(&h.0);
}

/// Length slot, then the content padded out to whole slots.
pub fn write_bytes<W: Writer>(writer: &mut W, bytes: &[u8]) {
    write_u64(writer, bytes.len() as u64);
    let chunks = bytes.chunks_exact(SLOT_SIZE);
    let rem = chunks.remainder();
    for chunk in chunks {
        writer.write(chunk);
    }
    if !rem.is_empty() {
        write_left_aligned(writer, rem);
    }
}

#[cfg(test)]
mod tests {
    use super::super::hashing::VecWriter;
    use super::*;

    fn slots_hex<F: Fn(&mut VecWriter)>(f: F) -> String {
        let mut w = VecWriter::default();
        f(&mut w);
        hex::encode(&w.0)
    }

    #[test]
    fn u64_is_right_aligned() {
        let got = slots_hex(|w| write_u64(w, 0x2222));
        assert_eq!(
            got,
            "0000000000000000000000000000000000000000000000000000000000002222"
        );
    }

    #[test]
    fn address_is_right_aligned() {
        let addr: Address = "0x5b38da6a701c568545dcfcb03fcb875f56beddc4".parse().unwrap();
        let got = slots_hex(|w| write_address(w, &addr));
        assert_eq!(
            got,
            "0000000000000000000000005b38da6a701c568545dcfcb03fcb875f56beddc4"
        );
    }

    #[test]
    fn bytes_are_length_prefixed_and_padded() {
        let got = slots_hex(|w| write_bytes(w, &[0xa1, 0xa2, 0xa3, 0xa4]));
        assert_eq!(
            got,
            concat!(
                "0000000000000000000000000000000000000000000000000000000000000004",
                "a1a2a3a400000000000000000000000000000000000000000000000000000000"
            )
        );
    }

    #[test]
    fn bytes_exact_slot_has_no_padding_slot() {
        let got = slots_hex(|w| write_bytes(w, &[0x11; 32]));
        assert_eq!(got.len(), 2 * 2 * SLOT_SIZE);
    }

    #[test]
    fn u256_round_trip_slot() {
        let v = U256::from(0x5555u64);
        let got = slots_hex(|w| write_u256(w, &v));
        assert_eq!(
            got,
            "0000000000000000000000000000000000000000000000000000000000005555"
        );
    }
}
