/// Whether `write` reads back and compares every programmed byte.
///
/// Read-back roughly doubles the time a write takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteVerification {
    Disabled,
    ReadBack,
}

/// Driver timing and verification settings.
///
/// Timeouts are in milliseconds; `0` waits forever. There is deliberately no
/// `Default` impl: the caller decides about write verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriverConfig {
    pub verification: WriteVerification,
    /// Bound for one page program to complete (tPP is 1.5 ms max).
    pub page_program_timeout_ms: u32,
    /// Bound for one sector erase to complete (tSE is 25 ms max).
    pub sector_erase_timeout_ms: u32,
    /// Bound for a chip erase to complete (tSCE is 50 ms max).
    pub chip_erase_timeout_ms: u32,
    /// Bound for the JEDEC ID handshake after reset.
    pub handshake_timeout_ms: u32,
}

impl DriverConfig {
    pub const fn new(verification: WriteVerification) -> Self {
        Self {
            verification,
            page_program_timeout_ms: 3,
            sector_erase_timeout_ms: 50,
            chip_erase_timeout_ms: 100,
            handshake_timeout_ms: 100,
        }
    }

    pub const fn with_page_program_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.page_program_timeout_ms = timeout_ms;
        self
    }

    pub const fn with_sector_erase_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.sector_erase_timeout_ms = timeout_ms;
        self
    }

    pub const fn with_chip_erase_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.chip_erase_timeout_ms = timeout_ms;
        self
    }

    pub const fn with_handshake_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.handshake_timeout_ms = timeout_ms;
        self
    }

    pub fn verifies_writes(&self) -> bool {
        self.verification == WriteVerification::ReadBack
    }
}
