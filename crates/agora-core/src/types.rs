use serde::{Deserialize, Serialize};

/// 32-byte hash type
pub type Hash = [u8; 32];

/// 20-byte address type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Address([u8; 20]);

impl Address {
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Derive an address from arbitrary bytes: the last 20 bytes are kept,
    /// shorter input is right-aligned. This is how a 32-byte public key or
    /// hash collapses to an address.
    pub fn from_slice(slice: &[u8]) -> Self {
        let mut bytes = [0u8; 20];
        if slice.len() >= 20 {
            bytes.copy_from_slice(&slice[slice.len() - 20..]);
        } else {
            bytes[20 - slice.len()..].copy_from_slice(slice);
        }
        Self(bytes)
    }

    pub fn from_hash(hash: &Hash) -> Self {
        Self::from_slice(hash)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn zero() -> Self {
        Self([0u8; 20])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_slice_keeps_last_20_bytes() {
        let mut input = [0u8; 32];
        for (i, b) in input.iter_mut().enumerate() {
            *b = i as u8;
        }
        let addr = Address::from_slice(&input);
        assert_eq!(addr.as_bytes(), &input[12..32]);
    }

    #[test]
    fn short_input_is_right_aligned() {
        let addr = Address::from_slice(&[0xff, 0xee]);
        let mut expected = [0u8; 20];
        expected[18] = 0xff;
        expected[19] = 0xee;
        assert_eq!(addr.as_bytes(), &expected);
    }

    #[test]
    fn zero_is_zero() {
        assert!(Address::zero().is_zero());
        assert!(!Address::from_slice(&[1u8; 20]).is_zero());
    }
}
