/// Refer to datasheet:
/// https://ww1.microchip.com/downloads/en/DeviceDoc/SST26VF016B-Data-Sheet-DS20005262.pdf
use bitflags::bitflags;

/// SST26 instruction set (datasheet table 5-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Opcode {
    /// No operation, used to cancel a pending reset enable.
    Nop = 0x00,
    /// Enable a software reset. Must be followed directly by `Reset`.
    ResetEnable = 0x66,
    Reset = 0x99,
    /// Read the 8-bit status register.
    ReadStatus = 0x05,
    /// Write the status and configuration registers.
    WriteStatus = 0x01,
    /// Read the 8-bit configuration register.
    ReadConfig = 0x35,
    Read = 0x03,
    /// Read with one dummy byte after the address, for higher clock rates.
    ReadHighSpeed = 0x0B,
    /// Read the 3-byte JEDEC identifier.
    ReadJedecId = 0x9F,
    /// Read the Serial Flash Discoverable Parameters table.
    ReadSfdp = 0x5A,
    /// Set the write enable latch.
    WriteEnable = 0x06,
    /// Clear the write enable latch.
    WriteDisable = 0x04,
    SectorErase = 0x20,
    BlockErase = 0xD8,
    ChipErase = 0xC7,
    PageProgram = 0x02,
    ReadBlockProtection = 0x72,
    /// Global block protection unlock.
    UnlockBlockProtection = 0x98,
    ReadSecurityId = 0x88,
    DeepPowerDown = 0xB9,
    /// Release from deep power-down and read the device ID.
    ReleasePowerDown = 0xAB,
}

bitflags! {
    /// Status register bits (datasheet 5.1).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        /// Write operation in progress.
        const BUSY = 1 << 0;
        /// Status of the **W**rite **E**nable **L**atch.
        const WEL = 1 << 1;
        /// Erase suspended.
        const WSE = 1 << 2;
        /// Program suspended.
        const WSP = 1 << 3;
        /// Write protection lock-down.
        const WPLD = 1 << 4;
        /// Security ID space locked.
        const SEC = 1 << 5;
    }
}

bitflags! {
    /// Configuration register bits (datasheet 5.2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Config: u8 {
        /// I/O configuration for SPI mode.
        const IOC = 1 << 1;
        /// Block protection volatility state.
        const BPNV = 1 << 3;
        /// Write protection pin enable.
        const WPEN = 1 << 7;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Status {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Status({=u8:#x})", self.bits())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Config {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Config({=u8:#x})", self.bits())
    }
}

/// JEDEC manufacturer, device type and device identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct JedecId {
    pub manufacturer: u8,
    pub device_type: u8,
    pub device: u8,
}

impl JedecId {
    /// Microchip SST26VF016B.
    pub const SST26VF016B: JedecId = JedecId {
        manufacturer: 0xBF,
        device_type: 0x26,
        device: 0x41,
    };

    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        Self {
            manufacturer: bytes[0],
            device_type: bytes[1],
            device: bytes[2],
        }
    }
}

/// Well known offsets into the SFDP table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum SfdpAddress {
    SectorType1Size = 0x04C,
    SectorMap = 0x100,
    /// Holds 0x30 when an EUI-48 was programmed at the factory.
    Eui48Programmed = 0x260,
    Eui48 = 0x261,
    /// Holds 0x40 when an EUI-64 was programmed at the factory.
    Eui64Programmed = 0x267,
    Eui64 = 0x268,
}

pub(crate) const EUI48_MARKER: u8 = 0x30;
pub(crate) const EUI64_MARKER: u8 = 0x40;

/// Builds an instruction followed by a 24-bit big-endian address.
///
/// Only 24 bits of `addr` are transferred; the upper byte is dropped.
pub(crate) fn addressed(opcode: Opcode, addr: u32) -> [u8; 4] {
    let addr = addr & 0x00FF_FFFF;
    [
        opcode as u8,
        (addr >> 16) as u8,
        (addr >> 8) as u8,
        addr as u8,
    ]
}

/// Same as [`addressed`] with a trailing dummy byte (high-speed read, SFDP).
pub(crate) fn addressed_with_dummy(opcode: Opcode, addr: u32) -> [u8; 5] {
    let [op, a2, a1, a0] = addressed(opcode, addr);
    [op, a2, a1, a0, 0xFF]
}
