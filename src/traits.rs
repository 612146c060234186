/// Byte level interface of a NOR flash chip driver.
///
/// This is the seam between the chip protocol and everything stacked on top
/// of it (the block adapter in particular).
pub trait NorFlashDevice {
    type Error;

    /// Number of erasable sectors.
    fn total_sectors(&self) -> u32;

    /// Size of an erasable sector in bytes.
    fn sector_size(&self) -> u32;

    /// Resets the chip, waits for it to identify itself and unlocks it for writing.
    fn initialize(&mut self) -> Result<(), Self::Error>;

    /// Software reset.
    fn reset(&mut self) -> Result<(), Self::Error>;

    /// Reads flash contents into `buf`, starting at `addr`.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Programs `data` at `addr`, split into page programs.
    /// The target range must be erased.
    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error>;

    /// Sets all memory within the sector starting at `addr` to `0xFF`.
    fn erase_sector(&mut self, addr: u32, erase_count: u32) -> Result<(), Self::Error>;

    /// Checks that every byte of the sector starting at `addr` reads `0xFF`.
    fn verify_sector_erased(&mut self, addr: u32) -> Result<(), Self::Error>;
}

/// Async counterpart of [`NorFlashDevice`].
pub trait AsyncNorFlashDevice {
    type Error;

    fn total_sectors(&self) -> u32;

    fn sector_size(&self) -> u32;

    async fn initialize(&mut self) -> Result<(), Self::Error>;

    async fn reset(&mut self) -> Result<(), Self::Error>;

    async fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Self::Error>;

    async fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error>;

    async fn erase_sector(&mut self, addr: u32, erase_count: u32) -> Result<(), Self::Error>;

    async fn verify_sector_erased(&mut self, addr: u32) -> Result<(), Self::Error>;
}
