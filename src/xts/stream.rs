//! Streaming dispatch. A context decides once, at `init`, whether the
//! bulk of every transform goes through the generic block-at-a-time loop
//! or through the batched stream below. The stream computes a whole batch
//! of tweaks with word arithmetic and hands the batch to the cipher's
//! multi-block API, which is where the hardware backends of the cipher
//! crates pipeline their rounds.
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use super::primitive::{Block, BlockPrimitive, CipherBlock, DataKeySchedule, Direction, BLOCK_SIZE};
use super::tweak::{Tweak, XtsStandard};
use super::{engine, XtsError};

/// Blocks handed to the cipher per call
pub const STREAM_BATCH: usize = 16;

/// Processes whole blocks of `blocks` under consecutive tweaks,
/// leaving `tweak` at the value for the next block.
pub type StreamFn<C> = fn(&DataKeySchedule<C>, &mut Tweak, &mut [u8], Direction);

/// CPU features relevant to picking a stream
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Hardware AES rounds
    pub aes: bool,
    /// 256-bit (x86) or 128-bit (aarch64) vector units
    pub simd: bool,
}

static CAPABILITIES: OnceLock<Capabilities> = OnceLock::new();

/// Detected once per process.
pub fn capabilities() -> &'static Capabilities {
    CAPABILITIES.get_or_init(detect)
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn detect() -> Capabilities {
    Capabilities {
        aes: std::is_x86_feature_detected!("aes"),
        simd: std::is_x86_feature_detected!("avx2"),
    }
}

#[cfg(target_arch = "aarch64")]
fn detect() -> Capabilities {
    Capabilities {
        aes: std::arch::is_aarch64_feature_detected!("aes"),
        simd: std::arch::is_aarch64_feature_detected!("neon"),
    }
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
fn detect() -> Capabilities {
    Capabilities::default()
}

/// Capability query: the accelerated stream for `C` under `standard`,
/// if this machine has one.
pub fn find_stream<C: BlockPrimitive>(standard: XtsStandard) -> Option<StreamFn<C>> {
    C::has_stream(capabilities()).then(|| stream_for::<C>(standard))
}

fn stream_for<C: BlockPrimitive>(standard: XtsStandard) -> StreamFn<C> {
    match standard {
        XtsStandard::Ieee => stream_ieee::<C>,
        XtsStandard::Gb => stream_gb::<C>,
    }
}

fn stream_ieee<C: BlockPrimitive>(
    data: &DataKeySchedule<C>,
    tweak: &mut Tweak,
    blocks: &mut [u8],
    direction: Direction,
) {
    debug_assert_eq!(tweak.standard(), XtsStandard::Ieee);
    stream_batched(data, tweak, blocks, direction)
}

fn stream_gb<C: BlockPrimitive>(
    data: &DataKeySchedule<C>,
    tweak: &mut Tweak,
    blocks: &mut [u8],
    direction: Direction,
) {
    debug_assert_eq!(tweak.standard(), XtsStandard::Gb);
    stream_batched(data, tweak, blocks, direction)
}

fn stream_batched<C: BlockPrimitive>(
    data: &DataKeySchedule<C>,
    tweak: &mut Tweak,
    blocks: &mut [u8],
    direction: Direction,
) {
    debug_assert_eq!(blocks.len() % BLOCK_SIZE, 0);
    let mut tweaks: [Block; STREAM_BATCH] = [[0; BLOCK_SIZE]; STREAM_BATCH];
    let mut batch = [CipherBlock::default(); STREAM_BATCH];
    for chunk in blocks.chunks_mut(BLOCK_SIZE * STREAM_BATCH) {
        let count = chunk.len() / BLOCK_SIZE;
        let (tweaks, batch) = (&mut tweaks[..count], &mut batch[..count]);
        tweak.advance_into(tweaks);
        for ((dst, src), t) in batch
            .iter_mut()
            .zip(chunk.chunks_exact(BLOCK_SIZE))
            .zip(tweaks.iter())
        {
            for ((d, s), t) in dst.iter_mut().zip(src.iter()).zip(t.iter()) {
                *d = s ^ t;
            }
        }
        data.crypt_blocks(batch, direction);
        for ((dst, src), t) in chunk
            .chunks_exact_mut(BLOCK_SIZE)
            .zip(batch.iter())
            .zip(tweaks.iter())
        {
            for ((d, s), t) in dst.iter_mut().zip(src.iter()).zip(t.iter()) {
                *d = s ^ t;
            }
        }
    }
}

/// How a context picks its bulk path
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPolicy {
    /// Stream when [`find_stream`] offers one
    #[default]
    Auto,
    /// Never stream
    Generic,
    /// Always bind the batched stream, whatever the hardware
    Stream,
}

impl fmt::Display for DispatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Generic => f.write_str("generic"),
            Self::Stream => f.write_str("stream"),
        }
    }
}

impl FromStr for DispatchPolicy {
    type Err = XtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "generic" => Ok(Self::Generic),
            "stream" => Ok(Self::Stream),
            _ => Err(XtsError::UnknownDispatchPolicy(s.to_owned())),
        }
    }
}

/// The bulk path bound into a context
pub enum Dispatch<C> {
    Generic,
    Stream(StreamFn<C>),
}

// Manual impls: derives would needlessly require `C: Clone`
impl<C> Clone for Dispatch<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Dispatch<C> {}

impl<C> fmt::Debug for Dispatch<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic => f.write_str("Generic"),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl<C: BlockPrimitive> Dispatch<C> {
    pub fn select(policy: DispatchPolicy, standard: XtsStandard) -> Self {
        let stream = match policy {
            DispatchPolicy::Auto => find_stream::<C>(standard),
            DispatchPolicy::Generic => None,
            DispatchPolicy::Stream => Some(stream_for::<C>(standard)),
        };
        stream.map_or(Self::Generic, Self::Stream)
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// Runs the bulk (every block before the stealing region)
    pub(crate) fn run(
        &self,
        data: &DataKeySchedule<C>,
        tweak: &mut Tweak,
        blocks: &mut [u8],
        direction: Direction,
    ) {
        match self {
            Self::Generic => engine::crypt_blocks(data, tweak, blocks, direction),
            Self::Stream(stream) => stream(data, tweak, blocks, direction),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::Aes128;
    use sm4::Sm4;

    fn schedule<C: BlockPrimitive>() -> DataKeySchedule<C> {
        let key: Vec<u8> = (0..C::key_len() as u8).collect();
        DataKeySchedule::expand(&key).unwrap()
    }

    fn compare_paths<C: BlockPrimitive>(standard: XtsStandard) {
        let data = schedule::<C>();
        let seed = *b"0123456789abcdef";
        for blocks in [1, 2, 15, 16, 17, 33, 40] {
            let input: Vec<u8> = (0..blocks * BLOCK_SIZE).map(|i| (i * 7) as u8).collect();
            for direction in [Direction::Encrypt, Direction::Decrypt] {
                let mut generic = input.clone();
                let mut generic_tweak = Tweak::new(seed, standard);
                engine::crypt_blocks(&data, &mut generic_tweak, &mut generic, direction);

                let mut streamed = input.clone();
                let mut stream_tweak = Tweak::new(seed, standard);
                stream_for::<C>(standard)(&data, &mut stream_tweak, &mut streamed, direction);

                assert_eq!(generic, streamed, "{standard} {blocks} blocks");
                assert_eq!(generic_tweak.advance(), stream_tweak.advance());
            }
        }
    }

    #[test]
    fn stream_matches_generic_sm4() {
        compare_paths::<Sm4>(XtsStandard::Gb);
        compare_paths::<Sm4>(XtsStandard::Ieee);
    }

    #[test]
    fn stream_matches_generic_aes() {
        compare_paths::<Aes128>(XtsStandard::Gb);
        compare_paths::<Aes128>(XtsStandard::Ieee);
    }

    #[test]
    fn capabilities_are_cached() {
        assert!(std::ptr::eq(capabilities(), capabilities()));
    }

    #[test]
    fn select_honours_policy() {
        assert!(!Dispatch::<Sm4>::select(DispatchPolicy::Generic, XtsStandard::Gb).is_stream());
        assert!(Dispatch::<Sm4>::select(DispatchPolicy::Stream, XtsStandard::Ieee).is_stream());
        let auto = Dispatch::<Aes128>::select(DispatchPolicy::Auto, XtsStandard::Ieee);
        assert_eq!(auto.is_stream(), capabilities().aes);
    }

    #[test]
    fn parse_policy() {
        assert_eq!("Stream".parse::<DispatchPolicy>().unwrap(), DispatchPolicy::Stream);
        assert_eq!("generic".parse::<DispatchPolicy>().unwrap(), DispatchPolicy::Generic);
        assert!("fast".parse::<DispatchPolicy>().is_err());
    }
}
