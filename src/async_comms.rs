/// Refer to datasheet:
/// https://ww1.microchip.com/downloads/en/DeviceDoc/SST26VF016B-Data-Sheet-DS20005262.pdf
use crate::comms::POLL_INTERVAL_MS;
use crate::config::DriverConfig;
use crate::error::Error;
use crate::geometry::{
    is_sector_aligned, PageChunks, PAGE_SIZE, SECTOR_SIZE, TOTAL_SECTORS, VERIFY_SLICE,
};
use crate::registers::{addressed, JedecId, Opcode, Status};
use crate::traits::AsyncNorFlashDevice;
use core::fmt::Debug;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::spi::{Operation, SpiDevice};

pub struct AsyncSst26Flash<SPI, D> {
    spi: SPI,
    delay: D,
    config: DriverConfig,
}

impl<SPI, D> Debug for AsyncSst26Flash<SPI, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AsyncSst26Flash")
            .field("config", &self.config)
            .finish()
    }
}

impl<SPI, D> AsyncNorFlashDevice for AsyncSst26Flash<SPI, D>
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

    async fn initialize(&mut self) -> Result<(), Error<SPI::Error>> {
        info!("initializing SST26 flash");
        self.reset().await?;
        self.wait_for_com_ok(self.config.handshake_timeout_ms)
            .await?;
        self.write_enable().await?;
        self.command(&[Opcode::UnlockBlockProtection as u8]).await?;
        self.write_disable().await?;
        let status = self.read_status().await?;
        debug!("initial status: {:?}", status);
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), Error<SPI::Error>> {
        self.command(&[Opcode::ResetEnable as u8]).await?;
        self.command(&[Opcode::Reset as u8]).await?;
        self.delay.delay_us(1).await;
        Ok(())
    }

    /// From datasheet section 5.4 (Read (03H))
    /// Reads flash contents into `buf`, starting at `addr`, in a single
    /// transfer.
    async fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error<SPI::Error>> {
        if buf.is_empty() {
            return Ok(());
        }
        self.spi
            .transaction(&mut [
                Operation::Write(&addressed(Opcode::Read, addr)),
                Operation::Read(buf),
            ])
            .await
            .map_err(Error::Spi)
    }

    async fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), Error<SPI::Error>> {
        if data.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.program_chunks(addr, data).await {
            let _ = self.command(&[Opcode::WriteDisable as u8]).await;
            return Err(e);
        }
        self.write_disable().await?;
        if self.config.verifies_writes() {
            self.verify_written(addr, data).await?;
        }
        Ok(())
    }

    async fn erase_sector(&mut self, addr: u32, erase_count: u32) -> Result<(), Error<SPI::Error>> {
        if !is_sector_aligned(addr) {
            return Err(Error::NotAligned { address: addr });
        }
        debug!("erase sector {:#x} (erase count {})", addr, erase_count);
        self.write_enable().await?;
        let erased = match self
            .command(&addressed(Opcode::SectorErase, addr))
            .await
        {
            Ok(()) => self.wait_ready(self.config.sector_erase_timeout_ms).await,
            Err(e) => Err(e),
        };
        if let Err(e) = erased {
            let _ = self.command(&[Opcode::WriteDisable as u8]).await;
            return Err(e);
        }
        self.write_disable().await
    }

    async fn verify_sector_erased(&mut self, addr: u32) -> Result<(), Error<SPI::Error>> {
        if !is_sector_aligned(addr) {
            return Err(Error::NotAligned { address: addr });
        }
        let mut slice = [0u8; VERIFY_SLICE];
        for offset in (0..SECTOR_SIZE).step_by(VERIFY_SLICE) {
            let slice_addr = addr + offset;
            self.read(slice_addr, &mut slice).await?;
            if let Some(pos) = slice.iter().position(|&b| b != 0xFF) {
                return Err(Error::NotErased {
                    address: slice_addr + pos as u32,
                });
            }
        }
        Ok(())
    }
}

impl<SPI, D> AsyncSst26Flash<SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    pub fn new(spi: SPI, delay: D, config: DriverConfig) -> Self {
        Self { spi, delay, config }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn release(self) -> (SPI, D) {
        (self.spi, self.delay)
    }

    /// Reads the status register.
    pub async fn read_status(&mut self) -> Result<Status, Error<SPI::Error>> {
        let mut response = [0u8; 1];
        self.command_with_response(&[Opcode::ReadStatus as u8], &mut response)
            .await?;
        Ok(Status::from_bits_truncate(response[0]))
    }

    pub async fn is_busy(&mut self) -> Result<bool, Error<SPI::Error>> {
        Ok(self.read_status().await?.contains(Status::BUSY))
    }

    pub async fn is_wel(&mut self) -> Result<bool, Error<SPI::Error>> {
        Ok(self.read_status().await?.contains(Status::WEL))
    }

    /// Page-Program (see datasheet 5.24)
    /// The write enable latch must already be set and `data` must stay within
    /// the page containing `addr`.
    pub async fn page_program(&mut self, addr: u32, data: &[u8]) -> Result<(), Error<SPI::Error>> {
        if data.is_empty() || (addr % PAGE_SIZE) as usize + data.len() > PAGE_SIZE as usize {
            return Err(Error::InvalidArgument);
        }
        if !self.is_wel().await? {
            warn!("page program at {:#x} without WEL", addr);
            return Err(Error::WriteEnable);
        }
        self.spi
            .transaction(&mut [
                Operation::Write(&addressed(Opcode::PageProgram, addr)),
                Operation::Write(data),
            ])
            .await
            .map_err(Error::Spi)
    }

    /// Chip-Erase (see datasheet 5.21)
    pub async fn erase_chip(&mut self) -> Result<(), Error<SPI::Error>> {
        self.write_enable().await?;
        let erased = match self.command(&[Opcode::ChipErase as u8]).await {
            Ok(()) => self.wait_ready(self.config.chip_erase_timeout_ms).await,
            Err(e) => Err(e),
        };
        if let Err(e) = erased {
            let _ = self.command(&[Opcode::WriteDisable as u8]).await;
            return Err(e);
        }
        self.write_disable().await
    }

    /// Waits until the BUSY bit clears. `0` waits forever.
    ///
    /// Elapsed time counts the poll delays only, bus transfers come on top.
    pub async fn wait_ready(&mut self, timeout_ms: u32) -> Result<(), Error<SPI::Error>> {
        let mut elapsed_ms: u32 = 0;
        while self.read_status().await?.contains(Status::BUSY) {
            self.delay.delay_ms(POLL_INTERVAL_MS).await;
            elapsed_ms = elapsed_ms.saturating_add(POLL_INTERVAL_MS);
            if timeout_ms > 0 && elapsed_ms > timeout_ms {
                warn!("flash still busy after {} ms", elapsed_ms);
                return Err(Error::Timeout);
            }
        }
        Ok(())
    }

    /// Reads the JEDEC manufacturer/device identification.
    pub async fn read_jedec_id(&mut self) -> Result<JedecId, Error<SPI::Error>> {
        let mut response = [0u8; 3];
        self.command_with_response(&[Opcode::ReadJedecId as u8], &mut response)
            .await?;
        Ok(JedecId::from_bytes(response))
    }

    pub async fn is_com_ok(&mut self) -> Result<bool, Error<SPI::Error>> {
        Ok(self.read_jedec_id().await? == JedecId::SST26VF016B)
    }

    pub async fn wait_for_com_ok(&mut self, timeout_ms: u32) -> Result<(), Error<SPI::Error>> {
        let mut elapsed_ms: u32 = 0;
        while !self.is_com_ok().await? {
            self.delay.delay_ms(POLL_INTERVAL_MS).await;
            elapsed_ms = elapsed_ms.saturating_add(POLL_INTERVAL_MS);
            if timeout_ms > 0 && elapsed_ms > timeout_ms {
                error!("no JEDEC ID handshake after {} ms", elapsed_ms);
                return Err(Error::Timeout);
            }
        }
        Ok(())
    }

    /// Sets the Write-Enable-Latch bit and checks that the device took it.
    pub async fn write_enable(&mut self) -> Result<(), Error<SPI::Error>> {
        self.command(&[Opcode::WriteEnable as u8]).await?;
        let status = self.read_status().await?;
        if !status.contains(Status::WEL) {
            warn!("WEL should be set: {:?}", status);
            return Err(Error::WriteEnable);
        }
        Ok(())
    }

    /// Clears the Write-Enable-Latch bit and checks that it is cleared.
    pub async fn write_disable(&mut self) -> Result<(), Error<SPI::Error>> {
        self.command(&[Opcode::WriteDisable as u8]).await?;
        let status = self.read_status().await?;
        if status.contains(Status::WEL) {
            warn!("WEL should be cleared: {:?}", status);
            return Err(Error::WriteEnable);
        }
        Ok(())
    }

    async fn program_chunks(&mut self, addr: u32, data: &[u8]) -> Result<(), Error<SPI::Error>> {
        let timeout_ms = self.config.page_program_timeout_ms;
        for (chunk_addr, offset, len) in PageChunks::new(addr, data.len()) {
            self.write_enable().await?;
            self.page_program(chunk_addr, &data[offset..offset + len])
                .await?;
            self.wait_ready(timeout_ms).await?;
        }
        Ok(())
    }

    async fn verify_written(&mut self, addr: u32, data: &[u8]) -> Result<(), Error<SPI::Error>> {
        let mut slice = [0u8; VERIFY_SLICE];
        for (i, expected) in data.chunks(VERIFY_SLICE).enumerate() {
            let slice_addr = addr.wrapping_add((i * VERIFY_SLICE) as u32);
            let actual = &mut slice[..expected.len()];
            self.read(slice_addr, actual).await?;
            if let Some(pos) = actual.iter().zip(expected).position(|(a, e)| a != e) {
                return Err(Error::InvalidWrite {
                    address: slice_addr.wrapping_add(pos as u32),
                });
            }
        }
        Ok(())
    }

    /// Writes a command to the SPI bus
    async fn command(&mut self, bytes: &[u8]) -> Result<(), Error<SPI::Error>> {
        self.spi
            .transaction(&mut [Operation::Write(bytes)])
            .await
            .map_err(Error::Spi)
    }

    async fn command_with_response(
        &mut self,
        instruction: &[u8],
        response: &mut [u8],
    ) -> Result<(), Error<SPI::Error>> {
        self.spi
            .transaction(&mut [Operation::Write(instruction), Operation::Read(response)])
            .await
            .map_err(Error::Spi)
    }
}
