//! Minimal ABI encoding for initializer calls and proxy constructor arguments.

use crate::domain::address::Address;
use crate::hash::keccak256;

/// Width of one ABI word.
pub const WORD: usize = 32;

/// 4-byte function selector: `keccak256(signature)[..4]`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash.as_bytes()[..4]);
    out
}

/// Address left-padded to one word.
pub fn encode_address(address: &Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

fn encode_uint(value: usize) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&(value as u64).to_be_bytes());
    word
}

/// Call data for `signature` with address arguments.
pub fn encode_call(signature: &str, args: &[Address]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + WORD * args.len());
    out.extend_from_slice(&selector(signature));
    for arg in args {
        out.extend_from_slice(&encode_address(arg));
    }
    out
}

/// `abi.encode(address implementation, bytes data)`, the proxy constructor arguments.
pub fn encode_proxy_constructor(implementation: &Address, data: &[u8]) -> Vec<u8> {
    let padded = data.len().div_ceil(WORD) * WORD;
    let mut out = Vec::with_capacity(WORD * 3 + padded);
    out.extend_from_slice(&encode_address(implementation));
    out.extend_from_slice(&encode_uint(2 * WORD));
    out.extend_from_slice(&encode_uint(data.len()));
    out.extend_from_slice(data);
    out.resize(WORD * 3 + padded, 0);
    out
}

/// Address argument `index` of call data, if it is a well-formed address word.
pub fn decode_address_arg(call_data: &[u8], index: usize) -> Option<Address> {
    let start = 4 + index * WORD;
    let word = call_data.get(start..start + WORD)?;
    if word[..12].iter().any(|b| *b != 0) {
        return None;
    }
    Address::from_slice(&word[12..])
}

/// `0x`-prefixed lowercase hex.
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
