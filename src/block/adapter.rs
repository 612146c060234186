use super::{BlockGeometry, EngineError, NorBlockDriver, WORD_SIZE};
use crate::traits::NorFlashDevice;

/// Words moved per driver call. Keeps the byte scratch buffer at one page.
const CHUNK_WORDS: usize = 64;
const CHUNK_BYTES: usize = CHUNK_WORDS * WORD_SIZE as usize;

/// Translates the block engine's word/block interface onto a
/// [`NorFlashDevice`].
///
/// One block maps onto one erasable sector of the chip. Words travel
/// little-endian.
#[derive(Debug)]
pub struct BlockAdapter<F> {
    flash: F,
    geometry: BlockGeometry,
}

impl<F> BlockAdapter<F>
where
    F: NorFlashDevice,
{
    pub fn new(flash: F) -> Self {
        let geometry = BlockGeometry::new(flash.total_sectors(), flash.sector_size());
        Self { flash, geometry }
    }

    /// Restricts the engine to the first `total_blocks` sectors of the chip.
    pub fn with_total_blocks(mut self, total_blocks: u32) -> Self {
        self.geometry.total_blocks = total_blocks.min(self.flash.total_sectors());
        self
    }

    pub fn flash(&mut self) -> &mut F {
        &mut self.flash
    }

    pub fn release(self) -> F {
        self.flash
    }

    fn block_address(&self, block: u32) -> Result<u32, EngineError> {
        if block >= self.geometry.total_blocks {
            warn!("block {} outside of {} blocks", block, self.geometry.total_blocks);
            return Err(EngineError::SystemInvalidBlock);
        }
        Ok(self.geometry.block_address(block))
    }

    /// Byte address of `len` words starting at `word_address`, provided the
    /// whole run lies inside the configured blocks.
    fn word_range(&self, word_address: u32, len: usize) -> Result<u32, EngineError> {
        let limit = self
            .geometry
            .total_blocks
            .checked_mul(self.geometry.words_per_block);
        let end = u32::try_from(len)
            .ok()
            .and_then(|len| word_address.checked_add(len));
        match (end, limit) {
            (Some(end), Some(limit)) if end <= limit => Ok(word_address * WORD_SIZE),
            _ => {
                warn!("words {:#x}+{} outside of the block range", word_address, len);
                Err(EngineError::SystemInvalidBlock)
            }
        }
    }
}

impl<F> NorBlockDriver for BlockAdapter<F>
where
    F: NorFlashDevice,
    EngineError: From<F::Error>,
{
    fn initialize(&mut self) -> Result<(), EngineError> {
        self.flash.initialize().map_err(EngineError::from)
    }

    fn geometry(&self) -> &BlockGeometry {
        &self.geometry
    }

    fn read(&mut self, word_address: u32, words: &mut [u32]) -> Result<(), EngineError> {
        let mut addr = self.word_range(word_address, words.len())?;
        let mut scratch = [0u8; CHUNK_BYTES];
        for chunk in words.chunks_mut(CHUNK_WORDS) {
            let bytes = &mut scratch[..chunk.len() * WORD_SIZE as usize];
            self.flash.read(addr, bytes)?;
            for (word, raw) in chunk.iter_mut().zip(bytes.chunks_exact(WORD_SIZE as usize)) {
                *word = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            }
            addr += bytes.len() as u32;
        }
        Ok(())
    }

    fn write(&mut self, word_address: u32, words: &[u32]) -> Result<(), EngineError> {
        let mut addr = self.word_range(word_address, words.len())?;
        let mut scratch = [0u8; CHUNK_BYTES];
        for chunk in words.chunks(CHUNK_WORDS) {
            let bytes = &mut scratch[..chunk.len() * WORD_SIZE as usize];
            for (word, raw) in chunk.iter().zip(bytes.chunks_exact_mut(WORD_SIZE as usize)) {
                raw.copy_from_slice(&word.to_le_bytes());
            }
            self.flash.write(addr, bytes)?;
            addr += bytes.len() as u32;
        }
        Ok(())
    }

    fn erase_block(&mut self, block: u32, erase_count: u32) -> Result<(), EngineError> {
        let addr = self.block_address(block)?;
        self.flash.erase_sector(addr, erase_count)?;
        Ok(())
    }

    fn erase_verify(&mut self, block: u32) -> Result<(), EngineError> {
        let addr = self.block_address(block)?;
        self.flash.verify_sector_erased(addr)?;
        Ok(())
    }

    /// Treats the engine's complaint as a hardware desync and brings the chip
    /// back into a known state.
    fn system_error(&mut self, code: EngineError) -> Result<(), EngineError> {
        error!("block engine system error {}", code.code());
        self.flash.initialize().map_err(EngineError::from)
    }
}
