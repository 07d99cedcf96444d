//! The block cipher boundary. XTS needs nothing from the cipher beyond
//! key expansion and encrypting or decrypting 128-bit blocks, which the
//! RustCrypto ciphers expose through the `cipher` traits.
use aes::{Aes128, Aes256};
use cipher::{
    consts::U16, generic_array::GenericArray, BlockDecrypt, BlockEncrypt, BlockSizeUser, KeyInit,
    KeySizeUser,
};
use sm4::Sm4;

use super::stream::Capabilities;
use super::tweak::{Tweak, XtsStandard};
use super::{Result, XtsError};

/// Always 128 bits by definition
pub const BLOCK_SIZE: usize = 16;

/// Alias for a block-sized byte array
pub type Block = [u8; BLOCK_SIZE];

/// The block type the cipher crates operate on
pub type CipherBlock = GenericArray<u8, U16>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// A 128-bit block cipher XTS can be instantiated over.
pub trait BlockPrimitive: KeyInit + BlockSizeUser<BlockSize = U16> + BlockEncrypt + BlockDecrypt {
    /// Name used in log output
    const NAME: &'static str;

    /// Whether the batched stream pays off for this cipher
    /// on a machine with the given capabilities.
    fn has_stream(caps: &Capabilities) -> bool;

    /// Size in bytes of one raw key (half of a combined XTS key)
    fn key_len() -> usize {
        <Self as KeySizeUser>::key_size()
    }
}

impl BlockPrimitive for Sm4 {
    const NAME: &'static str = "SM4";

    fn has_stream(caps: &Capabilities) -> bool {
        caps.simd
    }
}

impl BlockPrimitive for Aes128 {
    const NAME: &'static str = "AES-128";

    fn has_stream(caps: &Capabilities) -> bool {
        caps.aes
    }
}

impl BlockPrimitive for Aes256 {
    const NAME: &'static str = "AES-256";

    fn has_stream(caps: &Capabilities) -> bool {
        caps.aes
    }
}

fn expand<C: BlockPrimitive>(key: &[u8]) -> Result<C> {
    C::new_from_slice(key).map_err(|_| XtsError::InvalidKeyLength {
        expected: C::key_len(),
        got: key.len(),
    })
}

fn xor_block(dst: &mut [u8], tweak: &Block) {
    for (dst, &src) in dst.iter_mut().zip(tweak.iter()) {
        *dst ^= src
    }
}

/// Expanded data key. Only ever transforms payload blocks.
pub struct DataKeySchedule<C>(C);

impl<C: BlockPrimitive> DataKeySchedule<C> {
    pub(crate) fn expand(key: &[u8]) -> Result<Self> {
        expand(key).map(Self)
    }

    /// `block = E(block ^ tweak) ^ tweak`, or the inverse
    pub(crate) fn crypt_block(&self, block: &mut [u8], tweak: &Block, direction: Direction) {
        debug_assert_eq!(block.len(), BLOCK_SIZE);
        xor_block(block, tweak);
        let inner = GenericArray::from_mut_slice(block);
        match direction {
            Direction::Encrypt => self.0.encrypt_block(inner),
            Direction::Decrypt => self.0.decrypt_block(inner),
        }
        xor_block(block, tweak);
    }

    /// Raw multi-block transform, tweaks are applied by the caller
    pub(crate) fn crypt_blocks(&self, blocks: &mut [CipherBlock], direction: Direction) {
        match direction {
            Direction::Encrypt => self.0.encrypt_blocks(blocks),
            Direction::Decrypt => self.0.decrypt_blocks(blocks),
        }
    }
}

/// Expanded tweak key. Its only job is turning the caller's
/// initial tweak into the working tweak T0.
pub struct TweakKeySchedule<C>(C);

impl<C: BlockPrimitive> TweakKeySchedule<C> {
    pub(crate) fn expand(key: &[u8]) -> Result<Self> {
        expand(key).map(Self)
    }

    pub(crate) fn working_tweak(&self, iv: &Block, standard: XtsStandard) -> Tweak {
        let mut block = GenericArray::from(*iv);
        self.0.encrypt_block(&mut block);
        Tweak::new(block.into(), standard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_lengths() {
        assert_eq!(Sm4::key_len(), 16);
        assert_eq!(Aes128::key_len(), 16);
        assert_eq!(Aes256::key_len(), 32);
    }

    #[test]
    fn rejects_wrong_key_length() {
        let err = DataKeySchedule::<Sm4>::expand(&[0; 15]).err().unwrap();
        assert!(matches!(
            err,
            XtsError::InvalidKeyLength {
                expected: 16,
                got: 15
            }
        ));
        assert!(TweakKeySchedule::<Aes256>::expand(&[0; 16]).is_err());
        assert!(TweakKeySchedule::<Aes256>::expand(&[0; 32]).is_ok());
    }

    #[test]
    fn crypt_block_inverts() {
        let data = DataKeySchedule::<Sm4>::expand(&[7; 16]).unwrap();
        let tweak = [0x5a; BLOCK_SIZE];
        let plaintext = *b"sixteen byte blk";
        let mut block = plaintext;
        data.crypt_block(&mut block, &tweak, Direction::Encrypt);
        assert_ne!(block, plaintext);
        data.crypt_block(&mut block, &tweak, Direction::Decrypt);
        assert_eq!(block, plaintext);
    }
}
