//! Typed records on top of a [`BlockEngine`].
//!
//! A [`RecordStore`] keeps one value of a [`StoredObject`] in a run of
//! consecutive logical sectors starting at a caller chosen base sector. The
//! value lives in memory; `read` and `write` move it between memory and
//! flash. Multi-sector writes are not atomic and there is no checksum, so a
//! record that needs integrity checking has to carry its own.

use crate::block::{BlockEngine, EngineError};
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use core::ops::Range;

/// A fixed size value with an explicit byte layout.
///
/// By convention the first byte of the layout is a version tag.
pub trait StoredObject: Default {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Writes the value into `buf`, which is exactly `SIZE` bytes long.
    fn encode(&self, buf: &mut [u8]);

    /// Reads a value back from `buf`, which is exactly `SIZE` bytes long.
    fn decode(buf: &[u8]) -> Self;
}

/// Number of logical sectors needed for `size` bytes.
pub const fn sectors_for(size: usize, sector_size: usize) -> usize {
    size.div_ceil(sector_size)
}

/// Size of the record buffer: a whole number of sectors holding `size` bytes.
pub const fn record_buffer_len(size: usize, sector_size: usize) -> usize {
    sectors_for(size, sector_size) * sector_size
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError<E = EngineError> {
    /// The engine could not be initialized or opened.
    Open(E),
    /// A sector operation failed. Sectors before it were already transferred.
    Sector { sector: u32, error: E },
}

impl<E: fmt::Display> fmt::Display for StoreError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Open(e) => write!(f, "opening the block engine failed: {}", e),
            StoreError::Sector { sector, error } => {
                write!(f, "logical sector {} failed: {}", sector, error)
            }
        }
    }
}

impl<E: fmt::Debug + fmt::Display> core::error::Error for StoreError<E> {}

/// One `T` persisted across `ceil(T::SIZE / sector_size)` logical sectors.
///
/// Two stores on the same engine must not overlap their sector ranges.
pub struct RecordStore<T> {
    base_sector: u32,
    sector_size: usize,
    fill_byte: u8,
    buffer: Vec<u8>,
    object: T,
}

impl<T: StoredObject> RecordStore<T> {
    /// Sizes the buffer from the engine's sector size and installs
    /// `T::default()`. Does not touch the engine.
    pub fn new<E: BlockEngine>(engine: &E, base_sector: u32) -> Self {
        let sector_size = engine.sector_size();
        let mut store = Self {
            base_sector,
            sector_size,
            fill_byte: 0xFF,
            buffer: vec![0; record_buffer_len(T::SIZE, sector_size)],
            object: T::default(),
        };
        store.initialize_default();
        store
    }

    /// Uses `fill_byte` for the bytes of the buffer not covered by `T`.
    pub fn with_fill_byte(mut self, fill_byte: u8) -> Self {
        self.fill_byte = fill_byte;
        self.initialize_default();
        self
    }

    /// Refills the buffer with the fill byte and resets the value to
    /// `T::default()`.
    pub fn initialize_default(&mut self) {
        self.buffer.fill(self.fill_byte);
        self.object = T::default();
        self.object.encode(&mut self.buffer[..T::SIZE]);
    }

    pub fn base_sector(&self) -> u32 {
        self.base_sector
    }

    pub fn sector_count(&self) -> usize {
        sectors_for(T::SIZE, self.sector_size)
    }

    /// Logical sectors covered by this store.
    pub fn sectors(&self) -> Range<u32> {
        self.base_sector..self.base_sector + self.sector_count() as u32
    }

    /// Initializes and opens the engine unless that already happened.
    pub fn open<E: BlockEngine>(&self, engine: &mut E) -> Result<(), StoreError> {
        ensure_open(engine)
    }

    /// Loads the record from flash.
    ///
    /// Stops at the first failing sector. Sectors read before the failure
    /// show up in [`stored_object`](Self::stored_object); the rest keep the
    /// in-memory value, unsaved edits included.
    pub fn read<E: BlockEngine>(&mut self, engine: &mut E) -> Result<(), StoreError> {
        self.object.encode(&mut self.buffer[..T::SIZE]);
        let result = self.for_each_sector(engine, |engine, sector, chunk| {
            engine.sector_read(sector, chunk)
        });
        self.object = T::decode(&self.buffer[..T::SIZE]);
        result
    }

    /// Stores the current value. Stops at the first failing sector without
    /// rolling back the sectors already written.
    pub fn write<E: BlockEngine>(&mut self, engine: &mut E) -> Result<(), StoreError> {
        self.object.encode(&mut self.buffer[..T::SIZE]);
        self.for_each_sector(engine, |engine, sector, chunk| {
            engine.sector_write(sector, chunk)
        })
    }

    /// Hands the sectors back to the engine.
    pub fn release<E: BlockEngine>(&mut self, engine: &mut E) -> Result<(), StoreError> {
        self.for_each_sector(engine, |engine, sector, _| engine.sector_release(sector))
    }

    pub fn stored_object(&self) -> &T {
        &self.object
    }

    /// Changes take effect on flash with the next [`write`](Self::write).
    pub fn stored_object_mut(&mut self) -> &mut T {
        &mut self.object
    }

    /// The sector sized byte image last read or written.
    pub fn raw(&self) -> &[u8] {
        &self.buffer
    }

    fn for_each_sector<E: BlockEngine>(
        &mut self,
        engine: &mut E,
        mut op: impl FnMut(&mut E, u32, &mut [u8]) -> Result<(), EngineError>,
    ) -> Result<(), StoreError> {
        let base_sector = self.base_sector;
        let sector_size = self.sector_size;
        for (i, chunk) in self.buffer.chunks_mut(sector_size).enumerate() {
            let sector = base_sector + i as u32;
            ensure_open(engine)?;
            if let Err(error) = op(engine, sector, chunk) {
                warn!("record sector {} failed: {}", sector, error.code());
                return Err(StoreError::Sector { sector, error });
            }
        }
        Ok(())
    }
}

fn ensure_open<E: BlockEngine>(engine: &mut E) -> Result<(), StoreError> {
    if !engine.is_initialized() {
        engine.initialize().map_err(StoreError::Open)?;
    }
    if !engine.is_open() {
        engine.open().map_err(StoreError::Open)?;
    }
    Ok(())
}

impl<T: fmt::Debug> fmt::Debug for RecordStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStore")
            .field("base_sector", &self.base_sector)
            .field("sector_size", &self.sector_size)
            .field("object", &self.object)
            .finish()
    }
}
