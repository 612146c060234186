use super::{BlockEngine, EngineError, NorBlockDriver, WORD_SIZE};

/// Size of a logical sector in bytes.
pub const LOGICAL_SECTOR_SIZE: usize = 512;
const SECTOR_WORDS: usize = LOGICAL_SECTOR_SIZE / WORD_SIZE as usize;

/// Block engine without wear leveling.
///
/// Logical sector `n` lives at a fixed place: block `n / sectors_per_block`,
/// slot `n % sectors_per_block`. Writes that only clear bits are programmed
/// in place, anything else rewrites the whole block through a block sized
/// buffer. Useful on its own for small, rarely written records and as a
/// stand-in while bringing up a real flash translation layer on top of
/// [`NorBlockDriver`].
///
/// A block rewrite erases all of the block's logical sectors before
/// programming them back from RAM. If programming fails after the erase,
/// the neighbouring sectors in that block are lost along with the update.
#[derive(Debug)]
pub struct DirectMappedEngine<D, const BLOCK_WORDS: usize = 1024> {
    driver: D,
    block: [u32; BLOCK_WORDS],
    initialized: bool,
    open: bool,
    total_erases: u32,
}

impl<D, const BLOCK_WORDS: usize> DirectMappedEngine<D, BLOCK_WORDS>
where
    D: NorBlockDriver,
{
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            block: [0xFFFF_FFFF; BLOCK_WORDS],
            initialized: false,
            open: false,
            total_erases: 0,
        }
    }

    pub fn driver(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn release_driver(self) -> D {
        self.driver
    }

    /// Number of block erases issued since construction, across all blocks.
    pub fn total_erases(&self) -> u32 {
        self.total_erases
    }

    pub fn sectors_per_block(&self) -> u32 {
        (BLOCK_WORDS / SECTOR_WORDS) as u32
    }

    pub fn total_sectors(&self) -> u32 {
        self.driver.geometry().total_blocks * self.sectors_per_block()
    }

    /// Returns `(first word address of the sector, block, word offset within the block)`.
    fn locate(&self, sector: u32, len: usize) -> Result<(u32, u32, usize), EngineError> {
        if !self.open {
            return Err(EngineError::NotOpen);
        }
        if len != LOGICAL_SECTOR_SIZE {
            return Err(EngineError::Error);
        }
        if sector >= self.total_sectors() {
            return Err(EngineError::SectorNotFound);
        }
        let block = sector / self.sectors_per_block();
        let offset = (sector % self.sectors_per_block()) as usize * SECTOR_WORDS;
        let word_address = block * BLOCK_WORDS as u32 + offset as u32;
        Ok((word_address, block, offset))
    }

    /// Replaces one slot of `block` with `words`, preserving the other slots
    /// as long as the final program succeeds.
    fn rewrite_block(
        &mut self,
        block: u32,
        offset: usize,
        words: &[u32; SECTOR_WORDS],
    ) -> Result<(), EngineError> {
        let block_address = block * BLOCK_WORDS as u32;
        self.driver.read(block_address, &mut self.block)?;
        self.block[offset..offset + SECTOR_WORDS].copy_from_slice(words);
        self.total_erases = self.total_erases.wrapping_add(1);
        debug!("rewriting block {} (erase {})", block, self.total_erases);
        // No per-block wear tracking: the driver gets the engine-wide count.
        self.driver.erase_block(block, self.total_erases)?;
        if let Err(e) = self.driver.erase_verify(block) {
            warn!("block {} not erased after erase", block);
            self.driver.system_error(EngineError::SystemInvalidBlock)?;
            return Err(e);
        }
        self.driver.write(block_address, &self.block)
    }

    fn store(&mut self, sector: u32, words: &[u32; SECTOR_WORDS]) -> Result<(), EngineError> {
        let (word_address, block, offset) = self.locate(sector, LOGICAL_SECTOR_SIZE)?;
        let current = &mut self.block[..SECTOR_WORDS];
        self.driver.read(word_address, current)?;
        if *current == words[..] {
            return Ok(());
        }
        // NOR programming can only clear bits.
        if current.iter().zip(words).all(|(c, n)| c & n == *n) {
            return self.driver.write(word_address, words);
        }
        self.rewrite_block(block, offset, words)
    }
}

impl<D, const BLOCK_WORDS: usize> BlockEngine for DirectMappedEngine<D, BLOCK_WORDS>
where
    D: NorBlockDriver,
{
    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn initialize(&mut self) -> Result<(), EngineError> {
        self.initialized = true;
        self.open = false;
        Ok(())
    }

    fn open(&mut self) -> Result<(), EngineError> {
        if !self.initialized {
            return Err(EngineError::NotInitialized);
        }
        self.driver.initialize()?;
        let geometry = *self.driver.geometry();
        if geometry.words_per_block as usize != BLOCK_WORDS || BLOCK_WORDS % SECTOR_WORDS != 0 {
            error!(
                "block of {} words does not fit the engine",
                geometry.words_per_block
            );
            return Err(EngineError::SystemInvalidFormat);
        }
        if geometry.total_blocks == 0 {
            return Err(EngineError::NoSectors);
        }
        info!(
            "engine open: {} blocks, {} logical sectors",
            geometry.total_blocks,
            self.total_sectors()
        );
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), EngineError> {
        if !self.open {
            return Err(EngineError::NotOpen);
        }
        self.open = false;
        Ok(())
    }

    fn sector_size(&self) -> usize {
        LOGICAL_SECTOR_SIZE
    }

    fn sector_read(&mut self, sector: u32, buf: &mut [u8]) -> Result<(), EngineError> {
        let (word_address, _, _) = self.locate(sector, buf.len())?;
        let words = &mut self.block[..SECTOR_WORDS];
        self.driver.read(word_address, words)?;
        for (word, raw) in words.iter().zip(buf.chunks_exact_mut(WORD_SIZE as usize)) {
            raw.copy_from_slice(&word.to_le_bytes());
        }
        Ok(())
    }

    fn sector_write(&mut self, sector: u32, buf: &[u8]) -> Result<(), EngineError> {
        if buf.len() != LOGICAL_SECTOR_SIZE {
            return Err(EngineError::Error);
        }
        let mut words = [0u32; SECTOR_WORDS];
        for (word, raw) in words.iter_mut().zip(buf.chunks_exact(WORD_SIZE as usize)) {
            *word = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        }
        self.store(sector, &words)
    }

    /// Returns the sector to the erased state.
    fn sector_release(&mut self, sector: u32) -> Result<(), EngineError> {
        self.store(sector, &[0xFFFF_FFFF; SECTOR_WORDS])
    }
}
