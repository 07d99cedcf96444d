//! XTS over a 128-bit block cipher, following IEEE Std 1619 and
//! GB/T 17964-2021. The context owns the data and tweak key schedules;
//! every call supplies its own 16-byte initial tweak, typically the
//! little-endian sector number (see [`crate::sector::sector_tweak`]).
use std::fmt;

use rand::RngCore;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, trace, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

mod engine;
pub mod primitive;
pub mod stream;
pub mod tweak;

pub use primitive::{Block, BlockPrimitive, Direction, BLOCK_SIZE};
pub use stream::{Dispatch, DispatchPolicy};
pub use tweak::{Tweak, XtsStandard};

use primitive::{DataKeySchedule, TweakKeySchedule};

/// IEEE Std 1619-2018 and NIST SP 800-38E cap a data unit at 2^20 blocks
pub const MAX_BLOCKS_PER_DATA_UNIT: usize = 1 << 20;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum XtsError {
    #[error("Invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
    #[error("Input of {len} bytes is too short, XTS needs at least one full block")]
    InputTooShort { len: usize },
    #[error("Data key and tweak key are identical")]
    EqualKeys,
    #[error("The XTS context has no keys")]
    UninitializedContext,
    #[error("Data unit of {len} bytes exceeds the maximum of {max} bytes")]
    DataUnitTooLarge { len: usize, max: usize },
    #[error("Unknown XTS standard {0:?}, expected \"GB\" or \"IEEE\"")]
    UnknownStandard(String),
    #[error("Unknown dispatch policy {0:?}, expected auto, generic or stream")]
    UnknownDispatchPolicy(String),
}

pub type Result<T> = std::result::Result<T, XtsError>;

pub fn get_random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0; N];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

/// Raw key bytes, wiped on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Key<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> From<[u8; N]> for Key<N> {
    fn from(bytes: [u8; N]) -> Self {
        Self { bytes }
    }
}

impl<const N: usize> AsRef<[u8]> for Key<N> {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl<const N: usize> fmt::Debug for Key<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key").finish_non_exhaustive()
    }
}

impl<const N: usize> Key<N> {
    pub fn as_slice(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    pub fn random() -> Self {
        Self {
            bytes: get_random_bytes(),
        }
    }
}

/// Key size of SM4, AES-128
pub type Key128 = Key<16>;
/// Key size of AES-256
pub type Key256 = Key<32>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct XtsConfig {
    pub dispatch: DispatchPolicy,
    /// Accept identical data and tweak keys for decryption only,
    /// so that data written by weaker implementations stays readable.
    /// Encryption under such keys is always refused.
    pub allow_insecure_decrypt: bool,
}

/// Both schedules, always set together
struct KeyPair<C> {
    data: DataKeySchedule<C>,
    tweak: TweakKeySchedule<C>,
    equal: bool,
}

/// Needs to be initialized with both keys before use, after that
/// it can be shared freely: transforms only take `&self`.
pub struct XtsContext<C> {
    keys: Option<KeyPair<C>>,
    standard: XtsStandard,
    dispatch: Dispatch<C>,
    config: XtsConfig,
}

impl<C> fmt::Debug for XtsContext<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XtsContext")
            .field("initialized", &self.keys.is_some())
            .field("standard", &self.standard)
            .field("dispatch", &self.dispatch)
            .field("config", &self.config)
            .finish()
    }
}

impl<C: BlockPrimitive> Default for XtsContext<C> {
    fn default() -> Self {
        Self::new(XtsConfig::default())
    }
}

impl<C: BlockPrimitive> XtsContext<C> {
    /// An empty context, see [`Self::init`]
    pub fn new(config: XtsConfig) -> Self {
        Self {
            keys: None,
            standard: XtsStandard::default(),
            dispatch: Dispatch::Generic,
            config,
        }
    }

    /// Shorthand for [`Self::new`] followed by [`Self::init`]
    pub fn with_keys(data_key: &[u8], tweak_key: &[u8], standard: XtsStandard) -> Result<Self> {
        let mut ctx = Self::default();
        ctx.init(data_key, tweak_key, standard)?;
        Ok(ctx)
    }

    /// Expands both keys and binds the bulk path for `standard`.
    /// On error the context is left untouched.
    pub fn init(&mut self, data_key: &[u8], tweak_key: &[u8], standard: XtsStandard) -> Result<()> {
        let data = DataKeySchedule::expand(data_key)?;
        let tweak = TweakKeySchedule::expand(tweak_key)?;
        let equal = bool::from(data_key.ct_eq(tweak_key));
        if equal && !self.config.allow_insecure_decrypt {
            return Err(XtsError::EqualKeys);
        }
        let dispatch = Dispatch::select(self.config.dispatch, standard);
        debug!(
            "Initialized {}-XTS ({standard}), bulk path {dispatch:?}",
            C::NAME
        );
        self.keys = Some(KeyPair { data, tweak, equal });
        self.standard = standard;
        self.dispatch = dispatch;
        Ok(())
    }

    /// Like [`Self::init`] with one key of twice the cipher's key
    /// size: the data key followed by the tweak key.
    pub fn init_combined(&mut self, key: &[u8], standard: XtsStandard) -> Result<()> {
        let half = C::key_len();
        if key.len() != 2 * half {
            return Err(XtsError::InvalidKeyLength {
                expected: 2 * half,
                got: key.len(),
            });
        }
        let (data_key, tweak_key) = key.split_at(half);
        self.init(data_key, tweak_key, standard)
    }

    pub fn is_initialized(&self) -> bool {
        self.keys.is_some()
    }

    pub fn standard(&self) -> XtsStandard {
        self.standard
    }

    pub fn dispatch(&self) -> &Dispatch<C> {
        &self.dispatch
    }

    pub fn encrypt(&self, iv: &Block, input: &[u8]) -> Result<Vec<u8>> {
        self.crypt_owned(iv, input, Direction::Encrypt)
    }

    pub fn decrypt(&self, iv: &Block, input: &[u8]) -> Result<Vec<u8>> {
        self.crypt_owned(iv, input, Direction::Decrypt)
    }

    pub fn encrypt_in_place(&self, iv: &Block, buf: &mut [u8]) -> Result<()> {
        self.crypt_in_place(iv, buf, Direction::Encrypt)
    }

    pub fn decrypt_in_place(&self, iv: &Block, buf: &mut [u8]) -> Result<()> {
        self.crypt_in_place(iv, buf, Direction::Decrypt)
    }

    fn crypt_owned(&self, iv: &Block, input: &[u8], direction: Direction) -> Result<Vec<u8>> {
        let keys = self.checked_keys(input.len(), direction)?;
        let mut output = input.to_vec();
        self.crypt_unchecked(keys, iv, &mut output, direction);
        Ok(output)
    }

    /// Nothing is written unless every check passes.
    pub fn crypt_in_place(&self, iv: &Block, buf: &mut [u8], direction: Direction) -> Result<()> {
        let keys = self.checked_keys(buf.len(), direction)?;
        self.crypt_unchecked(keys, iv, buf, direction);
        Ok(())
    }

    fn checked_keys(&self, len: usize, direction: Direction) -> Result<&KeyPair<C>> {
        let keys = self.keys.as_ref().ok_or(XtsError::UninitializedContext)?;
        if len < BLOCK_SIZE {
            return Err(XtsError::InputTooShort { len });
        }
        let max = MAX_BLOCKS_PER_DATA_UNIT * BLOCK_SIZE;
        if len > max {
            return Err(XtsError::DataUnitTooLarge { len, max });
        }
        if keys.equal {
            if direction == Direction::Encrypt {
                return Err(XtsError::EqualKeys);
            }
            warn!("Decrypting with identical data and tweak keys");
        }
        Ok(keys)
    }

    fn crypt_unchecked(&self, keys: &KeyPair<C>, iv: &Block, buf: &mut [u8], direction: Direction) {
        trace!("{direction:?} {} bytes ({})", buf.len(), self.standard);
        let tweak = keys.tweak.working_tweak(iv, self.standard);
        engine::crypt_data_unit(&keys.data, &self.dispatch, tweak, buf, direction);
    }
}
