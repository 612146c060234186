//! Block engine seam.
//!
//! ```text
//!   RecordStore ──► BlockEngine ──► NorBlockDriver ──► NorFlashDevice ──► SPI
//!                  (logical sectors) (words, blocks)   (bytes, sectors)
//! ```
//!
//! A block engine (flash translation layer) maps logical sectors onto
//! physical blocks and drives the chip through the [`NorBlockDriver`]
//! contract. [`BlockAdapter`] implements that contract for any
//! [`NorFlashDevice`](crate::traits::NorFlashDevice). The engine owns its
//! driver value, so there is no global driver instance and several engines
//! can live side by side.

mod adapter;
mod direct;

pub use adapter::BlockAdapter;
pub use direct::{DirectMappedEngine, LOGICAL_SECTOR_SIZE};

use core::fmt;

/// Engines address flash in 32-bit words.
pub const WORD_SIZE: u32 = 4;

/// Status codes shared by block engines and their drivers.
///
/// The numeric codes follow the LevelX NOR status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineError {
    Error,
    NoSectors,
    SectorNotFound,
    NoPages,
    InvalidWrite,
    NandErrorCorrected,
    NandErrorNotCorrected,
    NoMemory,
    Disabled,
    /// Operation requested before `initialize`.
    NotInitialized,
    /// Operation requested before `open`, or after `close`.
    NotOpen,
    SystemInvalidFormat,
    SystemInvalidBlock,
    SystemAllocationFailed,
    SystemMutexCreateFailed,
    SystemInvalidSectorMap,
}

impl EngineError {
    pub fn code(&self) -> u8 {
        match self {
            EngineError::Error => 0x01,
            EngineError::NoSectors => 0x02,
            EngineError::SectorNotFound => 0x03,
            EngineError::NoPages => 0x04,
            EngineError::InvalidWrite => 0x05,
            EngineError::NandErrorCorrected => 0x06,
            EngineError::NandErrorNotCorrected => 0x07,
            EngineError::NoMemory => 0x08,
            EngineError::Disabled => 0x09,
            // LevelX reports both lifecycle violations as a plain error.
            EngineError::NotInitialized | EngineError::NotOpen => 0x01,
            EngineError::SystemInvalidFormat => 0x5A,
            EngineError::SystemInvalidBlock => 0x5B,
            EngineError::SystemAllocationFailed => 0x5C,
            EngineError::SystemMutexCreateFailed => 0x5D,
            EngineError::SystemInvalidSectorMap => 0x5E,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineError::Error => "ERROR",
            EngineError::NoSectors => "NO_SECTORS",
            EngineError::SectorNotFound => "SECTOR_NOT_FOUND",
            EngineError::NoPages => "NO_PAGES",
            EngineError::InvalidWrite => "INVALID_WRITE",
            EngineError::NandErrorCorrected => "NAND_ERROR_CORRECTED",
            EngineError::NandErrorNotCorrected => "NAND_ERROR_NOT_CORRECTED",
            EngineError::NoMemory => "NO_MEMORY",
            EngineError::Disabled => "DISABLED",
            EngineError::NotInitialized => "NOT_INITIALIZED",
            EngineError::NotOpen => "NOT_OPEN",
            EngineError::SystemInvalidFormat => "SYSTEM_INVALID_FORMAT",
            EngineError::SystemInvalidBlock => "SYSTEM_INVALID_BLOCK",
            EngineError::SystemAllocationFailed => "SYSTEM_ALLOCATION_FAILED",
            EngineError::SystemMutexCreateFailed => "SYSTEM_MUTEX_CREATE_FAILED",
            EngineError::SystemInvalidSectorMap => "SYSTEM_INVALID_SECTOR_MAP",
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x} {}", self.code(), self.as_str())
    }
}

impl core::error::Error for EngineError {}

/// Driver failures collapse into the engine's code domain. A read-back
/// mismatch keeps its identity, everything else becomes [`EngineError::Error`].
impl<E> From<crate::error::Error<E>> for EngineError {
    fn from(err: crate::error::Error<E>) -> Self {
        match err {
            crate::error::Error::InvalidWrite { .. } => EngineError::InvalidWrite,
            _ => EngineError::Error,
        }
    }
}

/// Flash geometry handed to the engine when it opens the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlockGeometry {
    pub total_blocks: u32,
    pub words_per_block: u32,
}

impl BlockGeometry {
    pub const fn new(total_blocks: u32, block_size: u32) -> Self {
        Self {
            total_blocks,
            words_per_block: block_size / WORD_SIZE,
        }
    }

    #[inline]
    pub const fn block_size(&self) -> u32 {
        self.words_per_block * WORD_SIZE
    }

    /// Byte address of the first word of `block`.
    #[inline]
    pub const fn block_address(&self, block: u32) -> u32 {
        block * self.words_per_block * WORD_SIZE
    }
}

/// What a block engine needs from the layer below it.
///
/// Addresses are word addresses (`byte address / WORD_SIZE`), lengths are
/// implied by the word slices.
pub trait NorBlockDriver {
    /// Brings the hardware into a known state. Called by the engine on open.
    fn initialize(&mut self) -> Result<(), EngineError>;

    fn geometry(&self) -> &BlockGeometry;

    fn read(&mut self, word_address: u32, words: &mut [u32]) -> Result<(), EngineError>;

    fn write(&mut self, word_address: u32, words: &[u32]) -> Result<(), EngineError>;

    fn erase_block(&mut self, block: u32, erase_count: u32) -> Result<(), EngineError>;

    fn erase_verify(&mut self, block: u32) -> Result<(), EngineError>;

    /// Called by the engine when it detects an internal inconsistency.
    fn system_error(&mut self, code: EngineError) -> Result<(), EngineError>;
}

/// Logical sector interface of a block engine.
pub trait BlockEngine {
    fn is_initialized(&self) -> bool;

    fn is_open(&self) -> bool;

    /// Resets the engine's bookkeeping. Leaves the engine closed.
    fn initialize(&mut self) -> Result<(), EngineError>;

    fn open(&mut self) -> Result<(), EngineError>;

    fn close(&mut self) -> Result<(), EngineError>;

    /// Logical sector size in bytes. Stable for the engine's lifetime.
    fn sector_size(&self) -> usize;

    fn sector_read(&mut self, sector: u32, buf: &mut [u8]) -> Result<(), EngineError>;

    fn sector_write(&mut self, sector: u32, buf: &[u8]) -> Result<(), EngineError>;

    /// Marks a logical sector as no longer in use.
    fn sector_release(&mut self, sector: u32) -> Result<(), EngineError>;
}
