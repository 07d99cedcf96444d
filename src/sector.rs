//! Sector-addressed encryption on top of an [`XtsContext`]. A buffer is
//! a run of consecutive data units of `sector_size` bytes, each one
//! tweaked with its own sector number.
use thiserror::Error;
use tracing::debug;

use crate::xts::{
    Block, BlockPrimitive, Direction, XtsContext, XtsError, BLOCK_SIZE, MAX_BLOCKS_PER_DATA_UNIT,
};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SectorError {
    #[error("The sector size {0} is not valid (must be between 16 and {max} bytes)", max = MAX_SECTOR_SIZE)]
    InvalidSectorSize(usize),
    #[error("Sector {sector} could not be processed")]
    Sector {
        sector: u64,
        #[source]
        source: XtsError,
    },
    #[error("{count} sectors starting at {first} run past the last sector number")]
    SectorOutOfRange { first: u64, count: u64 },
    #[error(transparent)]
    Xts(#[from] XtsError),
}

type Result<T> = std::result::Result<T, SectorError>;

pub const DEFAULT_SECTOR_SIZE: usize = 512;
pub const MAX_SECTOR_SIZE: usize = MAX_BLOCKS_PER_DATA_UNIT * BLOCK_SIZE;

/// Initial tweak for sector `sector_number`: the little-endian
/// sector number, zero padded to a block.
pub fn sector_tweak(sector_number: u64) -> Block {
    let mut bytes = [0; BLOCK_SIZE];
    bytes[..std::mem::size_of::<u64>()].copy_from_slice(&sector_number.to_le_bytes());
    bytes
}

#[derive(Debug)]
pub struct SectorCipher<C> {
    ctx: XtsContext<C>,
    sector_size: usize,
}

impl<C: BlockPrimitive> SectorCipher<C> {
    pub fn new(ctx: XtsContext<C>, sector_size: usize) -> Result<Self> {
        if !(BLOCK_SIZE..=MAX_SECTOR_SIZE).contains(&sector_size) {
            return Err(SectorError::InvalidSectorSize(sector_size));
        }
        if !ctx.is_initialized() {
            return Err(XtsError::UninitializedContext.into());
        }
        Ok(Self { ctx, sector_size })
    }

    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    pub fn context(&self) -> &XtsContext<C> {
        &self.ctx
    }

    /// Number of data units `len` bytes span, the last one possibly short
    pub fn sector_count(&self, len: usize) -> usize {
        len.div_ceil(self.sector_size)
    }

    pub fn encrypt_sectors(&self, first_sector: u64, data: &mut [u8]) -> Result<()> {
        self.crypt_sectors(first_sector, data, Direction::Encrypt)
    }

    pub fn decrypt_sectors(&self, first_sector: u64, data: &mut [u8]) -> Result<()> {
        self.crypt_sectors(first_sector, data, Direction::Decrypt)
    }

    fn crypt_sectors(&self, first_sector: u64, data: &mut [u8], direction: Direction) -> Result<()> {
        let count = self.sector_count(data.len()) as u64;
        if count > 0 && first_sector.checked_add(count - 1).is_none() {
            return Err(SectorError::SectorOutOfRange {
                first: first_sector,
                count,
            });
        }
        // A short trailing unit must still hold a whole block. Checked
        // up front so a failure leaves `data` untouched.
        let tail = data.len() % self.sector_size;
        if tail != 0 && tail < BLOCK_SIZE {
            let sector = first_sector + (count - 1);
            return Err(SectorError::Sector {
                sector,
                source: XtsError::InputTooShort { len: tail },
            });
        }
        debug!("{direction:?} {count} sectors starting at {first_sector}");
        let sectors = (0..count).map(|i| first_sector + i);
        for (sector, unit) in sectors.zip(data.chunks_mut(self.sector_size)) {
            self.ctx
                .crypt_in_place(&sector_tweak(sector), unit, direction)
                .map_err(|source| SectorError::Sector { sector, source })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xts::{get_random_bytes, Key128, XtsStandard};
    use sm4::Sm4;

    fn cipher(sector_size: usize) -> SectorCipher<Sm4> {
        let ctx = XtsContext::with_keys(
            Key128::random().as_slice(),
            Key128::random().as_slice(),
            XtsStandard::Gb,
        )
        .unwrap();
        SectorCipher::new(ctx, sector_size).unwrap()
    }

    #[test]
    fn tweak_encoding() {
        assert_eq!(sector_tweak(0), [0; BLOCK_SIZE]);
        let mut expected = [0; BLOCK_SIZE];
        expected[..5].copy_from_slice(&[0x12, 0x34, 0x56, 0x78, 0x9a]);
        assert_eq!(sector_tweak(0x9a78563412), expected);
        assert_eq!(sector_tweak(u64::MAX)[8..], [0u8; 8]);
    }

    #[test]
    fn sectors_match_single_unit_calls() {
        let cipher = cipher(DEFAULT_SECTOR_SIZE);
        let plaintext = get_random_bytes::<2048>();
        let mut data = plaintext;
        cipher.encrypt_sectors(7, &mut data).unwrap();
        for (i, unit) in plaintext.chunks(DEFAULT_SECTOR_SIZE).enumerate() {
            let expected = cipher
                .context()
                .encrypt(&sector_tweak(7 + i as u64), unit)
                .unwrap();
            assert_eq!(data[i * DEFAULT_SECTOR_SIZE..][..DEFAULT_SECTOR_SIZE], expected[..]);
        }
        cipher.decrypt_sectors(7, &mut data).unwrap();
        assert_eq!(data, plaintext);
    }

    #[test]
    fn short_trailing_sector_is_stolen() {
        let cipher = cipher(64);
        let plaintext = get_random_bytes::<200>();
        let mut data = plaintext;
        cipher.encrypt_sectors(0, &mut data).unwrap();
        assert_eq!(cipher.sector_count(data.len()), 4);
        cipher.decrypt_sectors(0, &mut data).unwrap();
        assert_eq!(data, plaintext);
    }

    #[test]
    fn too_short_trailing_sector_is_rejected() {
        let cipher = cipher(64);
        let mut data = [0x11; 64 * 2 + 15];
        let err = cipher.encrypt_sectors(3, &mut data).unwrap_err();
        assert!(matches!(
            err,
            SectorError::Sector {
                sector: 5,
                source: XtsError::InputTooShort { len: 15 }
            }
        ));
        assert!(data.iter().all(|&b| b == 0x11));
    }

    #[test]
    fn sector_size_is_validated() {
        let ctx = || {
            XtsContext::<Sm4>::with_keys(&[1; 16], &[2; 16], XtsStandard::Ieee).unwrap()
        };
        assert!(matches!(
            SectorCipher::new(ctx(), 15),
            Err(SectorError::InvalidSectorSize(15))
        ));
        assert!(SectorCipher::new(ctx(), MAX_SECTOR_SIZE + 1).is_err());
        assert!(SectorCipher::new(ctx(), 4096).is_ok());
        assert!(matches!(
            SectorCipher::new(XtsContext::<Sm4>::default(), 512),
            Err(SectorError::Xts(XtsError::UninitializedContext))
        ));
    }

    #[test]
    fn last_sector_number_is_usable() {
        let cipher = cipher(DEFAULT_SECTOR_SIZE);
        let plaintext = get_random_bytes::<DEFAULT_SECTOR_SIZE>();
        let mut data = plaintext;
        cipher.encrypt_sectors(u64::MAX, &mut data).unwrap();
        let expected = cipher
            .context()
            .encrypt(&sector_tweak(u64::MAX), &plaintext)
            .unwrap();
        assert_eq!(data[..], expected[..]);
        cipher.decrypt_sectors(u64::MAX, &mut data).unwrap();
        assert_eq!(data, plaintext);
    }

    #[test]
    fn sector_numbers_do_not_wrap() {
        let cipher = cipher(DEFAULT_SECTOR_SIZE);
        let mut data = [0x22; DEFAULT_SECTOR_SIZE * 2];
        let err = cipher.encrypt_sectors(u64::MAX, &mut data).unwrap_err();
        assert!(matches!(
            err,
            SectorError::SectorOutOfRange {
                first: u64::MAX,
                count: 2
            }
        ));
        assert!(data.iter().all(|&b| b == 0x22));
        assert!(cipher.decrypt_sectors(u64::MAX - 1, &mut data).is_ok());
    }
}
