//! Minimal big-endian parsing helpers.
//!
//! Readers never move `i` past the end of the buffer.

use alloy_primitives::{Address, U256};

pub fn read_slice<'a>(bytes: &'a [u8], i: &mut usize, len: usize) -> Option<&'a [u8]> {
    let end = i.checked_add(len)?;
    let out = bytes.get(*i..end)?;
    *i = end;
    Some(out)
}

pub fn read_u32_be(bytes: &[u8], i: &mut usize) -> Option<u32> {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(read_slice(bytes, i, 4)?);
    Some(u32::from_be_bytes(buf))
}

pub fn read_address(bytes: &[u8], i: &mut usize) -> Option<Address> {
    read_slice(bytes, i, 20).map(Address::from_slice)
}

/// Read a 32-byte ABI word as an offset or length; `None` if it does not fit a `usize`.
pub fn read_word_usize(bytes: &[u8], i: &mut usize) -> Option<usize> {
    let word = U256::from_be_slice(read_slice(bytes, i, 32)?);
    u64::try_from(word).ok().and_then(|v| usize::try_from(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_do_not_advance_on_failure() {
        let bytes = [0u8, 0, 0, 7, 1, 2];
        let mut i = 0;
        assert_eq!(read_u32_be(&bytes, &mut i), Some(7));
        assert_eq!(i, 4);
        assert_eq!(read_u32_be(&bytes, &mut i), None);
        assert_eq!(i, 4);
        assert_eq!(read_slice(&bytes, &mut i, 2), Some(&[1u8, 2][..]));
        assert_eq!(read_slice(&bytes, &mut i, usize::MAX), None);
    }

    #[test]
    fn oversized_word_is_rejected() {
        let bytes = [0xffu8; 32];
        let mut i = 0;
        assert_eq!(read_word_usize(&bytes, &mut i), None);
        assert_eq!(i, 32);
    }
}
