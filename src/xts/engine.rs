//! The generic block-at-a-time path and ciphertext stealing.
//!
//! A data unit of `16k + r` bytes is split into a bulk of whole blocks
//! and, when `r != 0`, a stealing region made of the last whole block
//! and the `r` trailing bytes. The bulk may be streamed, the stealing
//! region always goes through [`steal`].
use super::primitive::{BlockPrimitive, DataKeySchedule, Direction, BLOCK_SIZE};
use super::stream::Dispatch;
use super::tweak::Tweak;

/// Length of the prefix of a `len` byte data unit that is
/// processed without ciphertext stealing.
pub(crate) fn bulk_len(len: usize) -> usize {
    match len % BLOCK_SIZE {
        0 => len,
        tail => len - BLOCK_SIZE - tail,
    }
}

/// Transforms whole blocks, one tweak per block.
pub(crate) fn crypt_blocks<C: BlockPrimitive>(
    data: &DataKeySchedule<C>,
    tweak: &mut Tweak,
    blocks: &mut [u8],
    direction: Direction,
) {
    debug_assert_eq!(blocks.len() % BLOCK_SIZE, 0);
    for block in blocks.chunks_exact_mut(BLOCK_SIZE) {
        let tweak_bytes = tweak.advance();
        data.crypt_block(block, &tweak_bytes, direction);
    }
}

/// Ciphertext stealing over the last whole block and the `r`
/// trailing bytes (`BLOCK_SIZE < region.len() < 2 * BLOCK_SIZE`).
///
/// Encryption uses T(m) then T(m+1), decryption must undo the second
/// step first and so uses T(m+1) then T(m).
pub(crate) fn steal<C: BlockPrimitive>(
    data: &DataKeySchedule<C>,
    tweak: &mut Tweak,
    region: &mut [u8],
    direction: Direction,
) {
    debug_assert!(region.len() > BLOCK_SIZE && region.len() < 2 * BLOCK_SIZE);
    let tail = region.len() - BLOCK_SIZE;
    let current = tweak.advance();
    let next = tweak.advance();
    let (first, second) = match direction {
        Direction::Encrypt => (current, next),
        Direction::Decrypt => (next, current),
    };

    let (last_full, partial) = region.split_at_mut(BLOCK_SIZE);
    data.crypt_block(last_full, &first, direction);

    let mut joined = [0; BLOCK_SIZE];
    joined.copy_from_slice(last_full);
    joined[..tail].copy_from_slice(partial);
    partial.copy_from_slice(&last_full[..tail]);

    data.crypt_block(&mut joined, &second, direction);
    last_full.copy_from_slice(&joined);
}

/// Transforms one whole data unit in place. Length checks are the
/// caller's job, `buf` must hold at least one block.
pub(crate) fn crypt_data_unit<C: BlockPrimitive>(
    data: &DataKeySchedule<C>,
    dispatch: &Dispatch<C>,
    mut tweak: Tweak,
    buf: &mut [u8],
    direction: Direction,
) {
    debug_assert!(buf.len() >= BLOCK_SIZE);
    let (bulk, region) = buf.split_at_mut(bulk_len(buf.len()));
    dispatch.run(data, &mut tweak, bulk, direction);
    if !region.is_empty() {
        steal(data, &mut tweak, region, direction);
    }
}
