//! `embedded-storage` NOR flash traits for [`Sst26Flash`].
//!
//! Lets the chip back any `embedded-storage` consumer (key-value stores,
//! bootloaders) next to the block adapter.

use crate::comms::Sst26Flash;
use crate::error::Error;
use crate::geometry::{CAPACITY, SECTOR_SIZE};
use crate::traits::NorFlashDevice;
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;
use embedded_storage::nor_flash::{
    ErrorType, MultiwriteNorFlash, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

impl<E: Debug> NorFlashError for Error<E> {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            Error::NotAligned { .. } => NorFlashErrorKind::NotAligned,
            Error::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            _ => NorFlashErrorKind::Other,
        }
    }
}

fn check_range<E>(offset: u32, length: usize) -> Result<(), Error<E>> {
    if length > CAPACITY as usize || offset > CAPACITY - length as u32 {
        return Err(Error::OutOfBounds);
    }
    Ok(())
}

impl<SPI, D> ErrorType for Sst26Flash<SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    type Error = Error<SPI::Error>;
}

impl<SPI, D> ReadNorFlash for Sst26Flash<SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Error<SPI::Error>> {
        check_range(offset, bytes.len())?;
        NorFlashDevice::read(self, offset, bytes)
    }

    fn capacity(&self) -> usize {
        CAPACITY as usize
    }
}

impl<SPI, D> NorFlash for Sst26Flash<SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = SECTOR_SIZE as usize;

    /// Erases every sector in `from..to`. Both ends must be sector aligned.
    fn erase(&mut self, from: u32, to: u32) -> Result<(), Error<SPI::Error>> {
        if from > to || to > CAPACITY {
            return Err(Error::OutOfBounds);
        }
        if from % SECTOR_SIZE != 0 {
            return Err(Error::NotAligned { address: from });
        }
        if to % SECTOR_SIZE != 0 {
            return Err(Error::NotAligned { address: to });
        }
        for addr in (from..to).step_by(SECTOR_SIZE as usize) {
            NorFlashDevice::erase_sector(self, addr, 0)?;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Error<SPI::Error>> {
        check_range(offset, bytes.len())?;
        NorFlashDevice::write(self, offset, bytes)
    }
}

/// Page program only clears bits, so a location may be written again as long
/// as it only turns ones into zeros.
impl<SPI, D> MultiwriteNorFlash for Sst26Flash<SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
}
