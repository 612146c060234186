use core::fmt::{self, Debug, Display};

/// The error type used by this library.
///
/// This can encapsulate an SPI error, and adds its own protocol errors
/// on top of that. `E` is the error type of the underlying bus.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// An SPI transfer failed.
    Spi(E),
    /// The write enable latch was not set before a latch consuming
    /// instruction, or was still set after write disable.
    WriteEnable,
    /// The device stayed busy, or did not answer with its JEDEC ID, for
    /// longer than the configured bound.
    Timeout,
    /// Read-back after a write did not match the data written.
    InvalidWrite { address: u32 },
    /// Erase verification found a byte other than `0xFF`.
    NotErased { address: u32 },
    /// Erase and erase verification require a sector aligned address.
    NotAligned { address: u32 },
    /// A page program that is empty or would cross a page boundary.
    InvalidArgument,
    /// The requested range lies outside the device.
    OutOfBounds,
    /// The requested SFDP field was never programmed at the factory.
    NotProgrammed,
}

impl<E> Error<E> {
    /// `true` for read-back and erase verification failures.
    pub fn is_verification_failure(&self) -> bool {
        matches!(self, Error::InvalidWrite { .. } | Error::NotErased { .. })
    }
}

#[cfg(feature = "defmt")]
impl<E> defmt::Format for Error<E> {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Error::Spi(_spi) => defmt::write!(fmt, "Error::Spi"),
            Error::WriteEnable => defmt::write!(fmt, "Error::WriteEnable"),
            Error::Timeout => defmt::write!(fmt, "Error::Timeout"),
            Error::InvalidWrite { address } => {
                defmt::write!(fmt, "Error::InvalidWrite({=u32:#x})", address)
            }
            Error::NotErased { address } => {
                defmt::write!(fmt, "Error::NotErased({=u32:#x})", address)
            }
            Error::NotAligned { address } => {
                defmt::write!(fmt, "Error::NotAligned({=u32:#x})", address)
            }
            Error::InvalidArgument => defmt::write!(fmt, "Error::InvalidArgument"),
            Error::OutOfBounds => defmt::write!(fmt, "Error::OutOfBounds"),
            Error::NotProgrammed => defmt::write!(fmt, "Error::NotProgrammed"),
        }
    }
}

impl<E: Debug> Debug for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Spi(spi) => write!(f, "Error::Spi({:?})", spi),
            Error::WriteEnable => write!(f, "Error::WriteEnable"),
            Error::Timeout => write!(f, "Error::Timeout"),
            Error::InvalidWrite { address } => write!(f, "Error::InvalidWrite({:#08x})", address),
            Error::NotErased { address } => write!(f, "Error::NotErased({:#08x})", address),
            Error::NotAligned { address } => write!(f, "Error::NotAligned({:#08x})", address),
            Error::InvalidArgument => write!(f, "Error::InvalidArgument"),
            Error::OutOfBounds => write!(f, "Error::OutOfBounds"),
            Error::NotProgrammed => write!(f, "Error::NotProgrammed"),
        }
    }
}

impl<E: Debug> Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Spi(spi) => write!(f, "SPI transfer failed: {:?}", spi),
            Error::WriteEnable => write!(f, "write enable latch in unexpected state"),
            Error::Timeout => write!(f, "flash did not become ready in time"),
            Error::InvalidWrite { address } => {
                write!(f, "read-back mismatch at {:#08x}", address)
            }
            Error::NotErased { address } => write!(f, "byte at {:#08x} is not erased", address),
            Error::NotAligned { address } => {
                write!(f, "address {:#08x} is not sector aligned", address)
            }
            Error::InvalidArgument => write!(f, "invalid argument"),
            Error::OutOfBounds => write!(f, "range outside of flash"),
            Error::NotProgrammed => write!(f, "parameter not programmed"),
        }
    }
}

impl<E: Debug> core::error::Error for Error<E> {}
