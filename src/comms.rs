/// Refer to datasheet:
/// https://ww1.microchip.com/downloads/en/DeviceDoc/SST26VF016B-Data-Sheet-DS20005262.pdf
use crate::config::DriverConfig;
use crate::error::Error;
use crate::geometry::{
    is_sector_aligned, PageChunks, PAGE_SIZE, SECTOR_SIZE, TOTAL_SECTORS, VERIFY_SLICE,
};
use crate::registers::{
    addressed, addressed_with_dummy, Config, JedecId, Opcode, SfdpAddress, Status, EUI48_MARKER,
    EUI64_MARKER,
};
use crate::traits::NorFlashDevice;
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use embedded_hal::spi::{Operation, SpiDevice};

/// Interval between two status reads while waiting for the device.
pub const POLL_INTERVAL_MS: u32 = 1;

pub struct Sst26Flash<SPI, D> {
    spi: SPI,
    delay: D,
    config: DriverConfig,
}

impl<SPI, D> Debug for Sst26Flash<SPI, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Sst26Flash")
            .field("config", &self.config)
            .finish()
    }
}

/// Result of scanning a range of sectors for their erase state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EraseScan {
    pub erased: u32,
    pub not_erased: u32,
}

impl<SPI, D> NorFlashDevice for Sst26Flash<SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    type Error = Error<SPI::Error>;

    fn total_sectors(&self) -> u32 {
        TOTAL_SECTORS
    }

    fn sector_size(&self) -> u32 {
        SECTOR_SIZE
    }

    /// Resets the device, waits until it answers with the SST26 JEDEC ID and
    /// lifts the power-on write protection of all blocks.
    fn initialize(&mut self) -> Result<(), Error<SPI::Error>> {
        info!("initializing SST26 flash");
        self.reset()?;
        self.wait_for_com_ok(self.config.handshake_timeout_ms)?;
        self.unlock_block_protection()?;
        let status = self.read_status()?;
        debug!("initial status: {:?}", status);
        Ok(())
    }

    /// Software reset (see datasheet 4.5.1)
    /// The reset sequence consists of two consecutive instructions, Reset-Enable
    /// (66H) followed by Reset (99H). Any other instruction in between cancels
    /// the reset enable.
    fn reset(&mut self) -> Result<(), Error<SPI::Error>> {
        self.command(&[Opcode::ResetEnable as u8])?;
        self.command(&[Opcode::Reset as u8])?;
        // tRST
        self.delay.delay_us(1);
        Ok(())
    }

    /// From datasheet section 5.4 (Read (03H))
    /// Reads flash contents into `buf`, starting at `addr`. The address is
    /// incremented internally, so one transfer may span pages and sectors.
    /// Only 24 bits of `addr` are transferred to the device.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error<SPI::Error>> {
        if buf.is_empty() {
            return Ok(());
        }
        trace!("read {:#x} len {}", addr, buf.len());
        self.spi
            .transaction(&mut [
                Operation::Write(&addressed(Opcode::Read, addr)),
                Operation::Read(buf),
            ])
            .map_err(Error::Spi)
    }

    /// Programs `data` starting at `addr`.
    ///
    /// The range is split so that no page program crosses a 256 byte page
    /// boundary. Every page program is preceded by a write enable and followed
    /// by a bounded busy wait. With read-back verification configured the
    /// written range is compared afterwards.
    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), Error<SPI::Error>> {
        if data.is_empty() {
            return Ok(());
        }
        trace!("write {:#x} len {}", addr, data.len());
        if let Err(e) = self.program_chunks(addr, data) {
            // Leave the latch cleared even when a chunk failed halfway.
            let _ = self.command(&[Opcode::WriteDisable as u8]);
            return Err(e);
        }
        self.write_disable()?;
        if self.config.verifies_writes() {
            self.verify_written(addr, data)?;
        }
        Ok(())
    }

    /// Sector erase (see datasheet 5.19)
    /// The Sector-Erase instruction clears all bits in the selected 4 KByte
    /// sector to '1'. A Write-Enable instruction must be executed prior.
    /// `erase_count` is not needed by the chip and only kept for the block
    /// engine's benefit.
    fn erase_sector(&mut self, addr: u32, erase_count: u32) -> Result<(), Error<SPI::Error>> {
        if !is_sector_aligned(addr) {
            return Err(Error::NotAligned { address: addr });
        }
        debug!("erase sector {:#x} (erase count {})", addr, erase_count);
        let timeout_ms = self.config.sector_erase_timeout_ms;
        self.with_write_enable(|this| {
            this.command(&addressed(Opcode::SectorErase, addr))?;
            this.wait_ready(timeout_ms)
        })
    }

    fn verify_sector_erased(&mut self, addr: u32) -> Result<(), Error<SPI::Error>> {
        if !is_sector_aligned(addr) {
            return Err(Error::NotAligned { address: addr });
        }
        let mut slice = [0u8; VERIFY_SLICE];
        for offset in (0..SECTOR_SIZE).step_by(VERIFY_SLICE) {
            let slice_addr = addr + offset;
            self.read(slice_addr, &mut slice)?;
            if let Some(pos) = slice.iter().position(|&b| b != 0xFF) {
                let address = slice_addr + pos as u32;
                debug!("sector {:#x} not erased at {:#x}", addr, address);
                return Err(Error::NotErased { address });
            }
        }
        Ok(())
    }
}

impl<SPI, D> Sst26Flash<SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    /// Wraps the bus without touching the device. Call
    /// [`NorFlashDevice::initialize`] before use.
    pub fn new(spi: SPI, delay: D, config: DriverConfig) -> Self {
        Self { spi, delay, config }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: DriverConfig) {
        self.config = config;
    }

    /// Gives back the bus and the delay provider.
    pub fn release(self) -> (SPI, D) {
        (self.spi, self.delay)
    }

    pub fn nop(&mut self) -> Result<(), Error<SPI::Error>> {
        self.command(&[Opcode::Nop as u8])
    }

    /// Reads the status register.
    pub fn read_status(&mut self) -> Result<Status, Error<SPI::Error>> {
        let mut response = [0u8; 1];
        self.command_with_response(&[Opcode::ReadStatus as u8], &mut response)?;
        Ok(Status::from_bits_truncate(response[0]))
    }

    pub fn is_busy(&mut self) -> Result<bool, Error<SPI::Error>> {
        Ok(self.read_status()?.contains(Status::BUSY))
    }

    pub fn is_wel(&mut self) -> Result<bool, Error<SPI::Error>> {
        Ok(self.read_status()?.contains(Status::WEL))
    }

    /// Reads the configuration register.
    pub fn read_config(&mut self) -> Result<Config, Error<SPI::Error>> {
        let mut response = [0u8; 1];
        self.command_with_response(&[Opcode::ReadConfig as u8], &mut response)?;
        Ok(Config::from_bits_truncate(response[0]))
    }

    /// Write-Status Register (see datasheet 5.28)
    /// Writes the status and the configuration register in one instruction.
    /// Only the writable bits of the status register are taken by the device.
    pub fn write_registers(
        &mut self,
        status: Status,
        config: Config,
    ) -> Result<(), Error<SPI::Error>> {
        let timeout_ms = self.config.page_program_timeout_ms;
        self.with_write_enable(|this| {
            this.command(&[Opcode::WriteStatus as u8, status.bits(), config.bits()])?;
            this.wait_ready(timeout_ms)
        })
    }

    /// Like [`NorFlashDevice::read`] but uses the high-speed read instruction
    /// (0BH) with its dummy byte.
    pub fn read_fast(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error<SPI::Error>> {
        if buf.is_empty() {
            return Ok(());
        }
        self.spi
            .transaction(&mut [
                Operation::Write(&addressed_with_dummy(Opcode::ReadHighSpeed, addr)),
                Operation::Read(buf),
            ])
            .map_err(Error::Spi)
    }

    /// Page-Program (see datasheet 5.24)
    /// Programs up to 256 bytes within one page. The write enable latch must
    /// already be set; nothing is sent otherwise. `data` must not run past the
    /// end of the page containing `addr`.
    pub fn page_program(&mut self, addr: u32, data: &[u8]) -> Result<(), Error<SPI::Error>> {
        if data.is_empty() || (addr % PAGE_SIZE) as usize + data.len() > PAGE_SIZE as usize {
            return Err(Error::InvalidArgument);
        }
        if !self.is_wel()? {
            warn!("page program at {:#x} without WEL", addr);
            return Err(Error::WriteEnable);
        }
        self.spi
            .transaction(&mut [
                Operation::Write(&addressed(Opcode::PageProgram, addr)),
                Operation::Write(data),
            ])
            .map_err(Error::Spi)
    }

    /// Chip-Erase (see datasheet 5.21)
    /// Clears all bits in the device to '1'.
    pub fn erase_chip(&mut self) -> Result<(), Error<SPI::Error>> {
        info!("chip erase");
        let timeout_ms = self.config.chip_erase_timeout_ms;
        self.with_write_enable(|this| {
            this.command(&[Opcode::ChipErase as u8])?;
            this.wait_ready(timeout_ms)
        })
    }

    /// Waits until the BUSY bit clears.
    ///
    /// The status register is polled every [`POLL_INTERVAL_MS`]. A
    /// `timeout_ms` of `0` waits forever, otherwise [`Error::Timeout`] is
    /// returned once more than `timeout_ms` have passed. Only the poll
    /// delays are counted, not the time spent on the bus, so on hardware the
    /// wait can run somewhat past `timeout_ms + POLL_INTERVAL_MS`.
    pub fn wait_ready(&mut self, timeout_ms: u32) -> Result<(), Error<SPI::Error>> {
        let mut elapsed_ms: u32 = 0;
        while self.read_status()?.contains(Status::BUSY) {
            self.delay.delay_ms(POLL_INTERVAL_MS);
            elapsed_ms = elapsed_ms.saturating_add(POLL_INTERVAL_MS);
            if timeout_ms > 0 && elapsed_ms > timeout_ms {
                warn!("flash still busy after {} ms", elapsed_ms);
                return Err(Error::Timeout);
            }
        }
        Ok(())
    }

    /// Reads the JEDEC manufacturer/device identification.
    pub fn read_jedec_id(&mut self) -> Result<JedecId, Error<SPI::Error>> {
        let mut response = [0u8; 3];
        self.command_with_response(&[Opcode::ReadJedecId as u8], &mut response)?;
        Ok(JedecId::from_bytes(response))
    }

    /// `true` if the device answers with the SST26VF016B identification.
    pub fn is_com_ok(&mut self) -> Result<bool, Error<SPI::Error>> {
        Ok(self.read_jedec_id()? == JedecId::SST26VF016B)
    }

    /// Polls [`Self::is_com_ok`] with the same timing rules as
    /// [`Self::wait_ready`].
    pub fn wait_for_com_ok(&mut self, timeout_ms: u32) -> Result<(), Error<SPI::Error>> {
        let mut elapsed_ms: u32 = 0;
        while !self.is_com_ok()? {
            self.delay.delay_ms(POLL_INTERVAL_MS);
            elapsed_ms = elapsed_ms.saturating_add(POLL_INTERVAL_MS);
            if timeout_ms > 0 && elapsed_ms > timeout_ms {
                error!("no JEDEC ID handshake after {} ms", elapsed_ms);
                return Err(Error::Timeout);
            }
        }
        Ok(())
    }

    /// From datasheet section 5.10 (Write-Enable (06H))
    /// Sets the Write-Enable-Latch bit, then reads the status register back
    /// to make sure the device accepted it.
    pub fn write_enable(&mut self) -> Result<(), Error<SPI::Error>> {
        self.command(&[Opcode::WriteEnable as u8])?;
        let status = self.read_status()?;
        if !status.contains(Status::WEL) {
            warn!("WEL should be set: {:?}", status);
            return Err(Error::WriteEnable);
        }
        Ok(())
    }

    /// From datasheet section 5.11 (Write-Disable (04H))
    /// Clears the Write-Enable-Latch bit and checks that it is cleared.
    pub fn write_disable(&mut self) -> Result<(), Error<SPI::Error>> {
        self.command(&[Opcode::WriteDisable as u8])?;
        let status = self.read_status()?;
        if status.contains(Status::WEL) {
            warn!("WEL should be cleared: {:?}", status);
            return Err(Error::WriteEnable);
        }
        Ok(())
    }

    /// Reads `buf.len()` bytes of the SFDP table starting at `addr`.
    pub fn read_sfdp(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error<SPI::Error>> {
        self.spi
            .transaction(&mut [
                Operation::Write(&addressed_with_dummy(Opcode::ReadSfdp, addr)),
                Operation::Read(buf),
            ])
            .map_err(Error::Spi)
    }

    pub fn read_sfdp_byte(&mut self, addr: SfdpAddress) -> Result<u8, Error<SPI::Error>> {
        let mut byte = [0u8; 1];
        self.read_sfdp(addr as u32, &mut byte)?;
        Ok(byte[0])
    }

    /// Factory programmed EUI-48, if present.
    pub fn read_eui48(&mut self) -> Result<[u8; 6], Error<SPI::Error>> {
        if self.read_sfdp_byte(SfdpAddress::Eui48Programmed)? != EUI48_MARKER {
            return Err(Error::NotProgrammed);
        }
        let mut eui = [0u8; 6];
        self.read_sfdp(SfdpAddress::Eui48 as u32, &mut eui)?;
        Ok(eui)
    }

    /// Factory programmed EUI-64, if present.
    pub fn read_eui64(&mut self) -> Result<[u8; 8], Error<SPI::Error>> {
        if self.read_sfdp_byte(SfdpAddress::Eui64Programmed)? != EUI64_MARKER {
            return Err(Error::NotProgrammed);
        }
        let mut eui = [0u8; 8];
        self.read_sfdp(SfdpAddress::Eui64 as u32, &mut eui)?;
        Ok(eui)
    }

    /// Reads the block-protection register, most significant byte first.
    pub fn read_block_protection(&mut self, out: &mut [u8]) -> Result<(), Error<SPI::Error>> {
        self.command_with_response(&[Opcode::ReadBlockProtection as u8], out)
    }

    /// Global Block-Protection Unlock (see datasheet 5.34)
    /// Clears all write protection bits of the block-protection register.
    /// Requires the write enable latch.
    pub fn unlock_block_protection(&mut self) -> Result<(), Error<SPI::Error>> {
        self.with_write_enable(|this| this.command(&[Opcode::UnlockBlockProtection as u8]))
    }

    /// Reads from the 2 KByte security ID space.
    pub fn read_security_id(&mut self, addr: u16, buf: &mut [u8]) -> Result<(), Error<SPI::Error>> {
        let [hi, lo] = addr.to_be_bytes();
        self.command_with_response(&[Opcode::ReadSecurityId as u8, hi, lo, 0xFF], buf)
    }

    pub fn power_down(&mut self) -> Result<(), Error<SPI::Error>> {
        self.command(&[Opcode::DeepPowerDown as u8])
    }

    pub fn release_power_down(&mut self) -> Result<(), Error<SPI::Error>> {
        self.command(&[Opcode::ReleasePowerDown as u8])?;
        // tSBR
        self.delay.delay_us(10);
        Ok(())
    }

    /// Checks every sector from `first_sector` to the end of the device.
    pub fn scan_erased(&mut self, first_sector: u32) -> Result<EraseScan, Error<SPI::Error>> {
        let mut scan = EraseScan::default();
        for sector in first_sector..TOTAL_SECTORS {
            match self.verify_sector_erased(sector * SECTOR_SIZE) {
                Ok(()) => scan.erased += 1,
                Err(Error::NotErased { .. }) => scan.not_erased += 1,
                Err(e) => return Err(e),
            }
        }
        Ok(scan)
    }

    /// Runs `op` between write enable and write disable. The latch is
    /// cleared on a best effort basis when `op` fails.
    fn with_write_enable<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, Error<SPI::Error>>,
    ) -> Result<T, Error<SPI::Error>> {
        self.write_enable()?;
        match op(self) {
            Ok(value) => {
                self.write_disable()?;
                Ok(value)
            }
            Err(e) => {
                let _ = self.command(&[Opcode::WriteDisable as u8]);
                Err(e)
            }
        }
    }

    fn program_chunks(&mut self, addr: u32, data: &[u8]) -> Result<(), Error<SPI::Error>> {
        let timeout_ms = self.config.page_program_timeout_ms;
        for (chunk_addr, offset, len) in PageChunks::new(addr, data.len()) {
            self.write_enable()?;
            self.page_program(chunk_addr, &data[offset..offset + len])?;
            self.wait_ready(timeout_ms)?;
        }
        Ok(())
    }

    fn verify_written(&mut self, addr: u32, data: &[u8]) -> Result<(), Error<SPI::Error>> {
        let mut slice = [0u8; VERIFY_SLICE];
        for (i, expected) in data.chunks(VERIFY_SLICE).enumerate() {
            let slice_addr = addr.wrapping_add((i * VERIFY_SLICE) as u32);
            let actual = &mut slice[..expected.len()];
            self.read(slice_addr, actual)?;
            if let Some(pos) = actual.iter().zip(expected).position(|(a, e)| a != e) {
                let address = slice_addr.wrapping_add(pos as u32);
                error!("read-back mismatch at {:#x}", address);
                return Err(Error::InvalidWrite { address });
            }
        }
        Ok(())
    }

    /// Writes a command to the SPI bus
    fn command(&mut self, bytes: &[u8]) -> Result<(), Error<SPI::Error>> {
        self.spi
            .transaction(&mut [Operation::Write(bytes)])
            .map_err(Error::Spi)
    }

    /// Writes an instruction to the SPI bus and reads the response into
    /// `response` within the same chip select.
    fn command_with_response(
        &mut self,
        instruction: &[u8],
        response: &mut [u8],
    ) -> Result<(), Error<SPI::Error>> {
        self.spi
            .transaction(&mut [Operation::Write(instruction), Operation::Read(response)])
            .map_err(Error::Spi)
    }
}
