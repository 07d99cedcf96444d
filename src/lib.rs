pub mod sector;
pub mod xts;

pub use sector::{sector_tweak, SectorCipher, SectorError};
pub use xts::{XtsConfig, XtsContext, XtsError, XtsStandard};
