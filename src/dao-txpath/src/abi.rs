//! Solidity ABI surfaces the resolver talks to.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};

sol! {
    /// Apps that relay an EVM callscript on behalf of entities they trust.
    interface IForwarder {
        function isForwarder() external pure returns (bool);
        function canForward(address sender, bytes evmCallScript) external view returns (bool);
        function forward(bytes evmScript) external;
    }

    /// Forwarders that charge a token fee per `forward`.
    interface IForwarderFee {
        function forwardFee() external view returns (address, uint256);
    }

    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
    }
}

/// 4-byte selector of `forward(bytes)`.
pub const FORWARD_SELECTOR: [u8; 4] = IForwarder::forwardCall::SELECTOR;

/// Call data for `forward(script)`.
pub fn forward_call_data(script: &[u8]) -> Bytes {
    IForwarder::forwardCall {
        evmScript: Bytes::copy_from_slice(script),
    }
    .abi_encode()
    .into()
}

/// Call data for ERC-20 `approve(spender, value)`.
pub fn approve_call_data(spender: Address, value: U256) -> Bytes {
    IERC20::approveCall { spender, value }.abi_encode().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_selector() {
        assert_eq!(FORWARD_SELECTOR, [0xd9, 0x48, 0xd4, 0x68]);
    }

    #[test]
    fn forward_encoding_layout() {
        let data = forward_call_data(&[0xaa, 0xbb]);
        // selector + offset + length + one padded word
        assert_eq!(data.len(), 4 + 32 * 3);
        assert_eq!(data[4 + 31], 0x20);
        assert_eq!(data[4 + 63], 2);
        assert_eq!(&data[4 + 64..4 + 66], &[0xaa, 0xbb]);
    }

    #[test]
    fn approve_encoding() {
        let spender = Address::repeat_byte(0x11);
        let data = approve_call_data(spender, U256::from(5u64));
        assert_eq!(&data[..4], &IERC20::approveCall::SELECTOR);
        assert_eq!(&data[4 + 12..4 + 32], spender.as_slice());
        assert_eq!(data[4 + 63], 5);
    }
}
