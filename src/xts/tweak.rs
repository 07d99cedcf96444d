//! Tweak arithmetic. Both standards multiply the tweak by α in
//! GF(2^128) mod x^128 + x^7 + x^2 + x + 1 between consecutive blocks.
//! They disagree on how the field element is laid out in the 16 bytes:
//!
//! * IEEE 1619 reads the block as a little-endian integer, so α shifts
//!   every bit towards byte 15 and feeds back `0x87` into byte 0.
//! * GB/T 17964-2021 reads it bit-reflected and big-endian (the GHASH
//!   convention), so α shifts towards the low bit of byte 15 and feeds
//!   back `0xE1` into the top of byte 0.
//!
//! Ciphertexts of the two standards agree on the first block only.
use std::fmt;
use std::str::FromStr;

use super::primitive::Block;
use super::XtsError;

/// Magic used by IEEE 1619
/// for multiplying the tweak
const GF_128_FDBK: u8 = 0x87;

/// The same polynomial, bit-reflected
const GF_128_FDBK_GB: u8 = 0xE1;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XtsStandard {
    /// GB/T 17964-2021
    #[default]
    Gb,
    /// IEEE Std 1619
    Ieee,
}

impl XtsStandard {
    /// Byte-wise multiplication by α, in place.
    pub fn mul_alpha(self, bytes: &mut Block) {
        match self {
            Self::Ieee => {
                let mut carry = 0;
                for byte in bytes.iter_mut() {
                    let out = *byte >> 7;
                    *byte = (*byte << 1) | carry;
                    carry = out;
                }
                if carry != 0 {
                    bytes[0] ^= GF_128_FDBK;
                }
            }
            Self::Gb => {
                let mut carry = 0;
                for byte in bytes.iter_mut() {
                    let out = *byte & 1;
                    *byte = (*byte >> 1) | (carry << 7);
                    carry = out;
                }
                if carry != 0 {
                    bytes[0] ^= GF_128_FDBK_GB;
                }
            }
        }
    }

    /// Reads a block as a word whose bit order matches the arithmetic
    pub(crate) fn load_word(self, bytes: &Block) -> u128 {
        match self {
            Self::Ieee => u128::from_le_bytes(*bytes),
            Self::Gb => u128::from_be_bytes(*bytes),
        }
    }

    pub(crate) fn store_word(self, word: u128) -> Block {
        match self {
            Self::Ieee => word.to_le_bytes(),
            Self::Gb => word.to_be_bytes(),
        }
    }

    /// Word-wise multiplication by α, equal to [`Self::mul_alpha`]
    /// on the serialized form.
    pub(crate) fn mul_alpha_word(self, word: u128) -> u128 {
        match self {
            Self::Ieee => {
                let feedback = (word >> 127) as u8 * GF_128_FDBK;
                (word << 1) ^ u128::from(feedback)
            }
            Self::Gb => {
                let feedback = (word & 1) as u8 * GF_128_FDBK_GB;
                (word >> 1) ^ (u128::from(feedback) << 120)
            }
        }
    }
}

impl fmt::Display for XtsStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gb => f.write_str("GB"),
            Self::Ieee => f.write_str("IEEE"),
        }
    }
}

impl FromStr for XtsStandard {
    type Err = XtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("gb") {
            Ok(Self::Gb)
        } else if s.eq_ignore_ascii_case("ieee") {
            Ok(Self::Ieee)
        } else {
            Err(XtsError::UnknownStandard(s.to_owned()))
        }
    }
}

/// The working tweak of one data unit.
#[derive(Debug, Clone)]
pub struct Tweak {
    bytes: Block,
    standard: XtsStandard,
}

impl Tweak {
    pub fn new(bytes: Block, standard: XtsStandard) -> Self {
        Self { bytes, standard }
    }

    pub fn standard(&self) -> XtsStandard {
        self.standard
    }

    /// Returns the contents, then multiplies the inner
    /// bytes by α. Called exactly once per 128bit block.
    pub fn advance(&mut self) -> Block {
        let copy = self.bytes;
        self.standard.mul_alpha(&mut self.bytes);
        copy
    }

    /// Same as calling [`Self::advance`] once per slot in `out`,
    /// using word arithmetic.
    pub(crate) fn advance_into(&mut self, out: &mut [Block]) {
        let standard = self.standard;
        let mut word = standard.load_word(&self.bytes);
        for slot in out.iter_mut() {
            *slot = standard.store_word(word);
            word = standard.mul_alpha_word(word);
        }
        self.bytes = standard.store_word(word);
    }
}
