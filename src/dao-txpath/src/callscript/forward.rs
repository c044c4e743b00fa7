//! Detection and extraction of `forward(bytes)` invocations.

use crate::{abi::FORWARD_SELECTOR, utils::bytes::{read_slice, read_word_usize}};

/// Offset word plus length word.
const MIN_ARGS_LEN: usize = 64;

/// Whether `data` is a call to `forward(bytes)` with room for its dynamic argument.
pub fn is_forward_call(data: &[u8]) -> bool {
    data.len() >= 4 + MIN_ARGS_LEN && data[..4] == FORWARD_SELECTOR
}

/// Extract the `bytes` argument of a `forward(bytes)` call.
///
/// Follows the dynamic-bytes layout: the first argument word is the offset of the
/// length word (relative to the arguments), and the payload follows the length word.
/// Returns `None` for anything that does not fit that layout.
pub fn decode_forward_call(data: &[u8]) -> Option<&[u8]> {
    if !is_forward_call(data) {
        return None;
    }
    let args = &data[4..];

    let mut i = 0usize;
    let offset = read_word_usize(args, &mut i)?;
    let mut at = offset;
    let len = read_word_usize(args, &mut at)?;
    read_slice(args, &mut at, len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::forward_call_data;

    #[test]
    fn extracts_payload() {
        let payload = vec![7u8; 45];
        let data = forward_call_data(&payload);
        assert!(is_forward_call(&data));
        assert_eq!(decode_forward_call(&data), Some(&payload[..]));
    }

    #[test]
    fn empty_payload() {
        let data = forward_call_data(&[]);
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(decode_forward_call(&data), Some(&[][..]));
    }

    #[test]
    fn rejects_other_selectors_and_short_data() {
        let mut data = forward_call_data(&[1, 2, 3]).to_vec();
        assert!(decode_forward_call(&data[..4 + 63]).is_none());
        data[0] ^= 0xff;
        assert!(!is_forward_call(&data));
        assert!(decode_forward_call(&data).is_none());
    }

    #[test]
    fn rejects_out_of_range_offsets_and_lengths() {
        let mut data = forward_call_data(&[1, 2, 3]).to_vec();
        // offset past the end
        data[4 + 31] = 0xf0;
        assert!(decode_forward_call(&data).is_none());

        let mut data = forward_call_data(&[1, 2, 3]).to_vec();
        // length larger than what follows
        data[4 + 62] = 0x01;
        assert!(decode_forward_call(&data).is_none());
    }
}
