//! Device geometry and boundary arithmetic.

/// Largest unit a single page program may write.
pub const PAGE_SIZE: u32 = 256;
/// Smallest erasable unit.
pub const SECTOR_SIZE: u32 = 4096;
/// Number of 4 KiB sectors on an SST26VF016B.
pub const TOTAL_SECTORS: u32 = 512;
/// 2 MiB.
pub const CAPACITY: u32 = SECTOR_SIZE * TOTAL_SECTORS;
/// Slice length used when scanning a sector for erased bytes.
pub const VERIFY_SLICE: usize = 16;

#[inline]
pub fn is_sector_aligned(addr: u32) -> bool {
    addr % SECTOR_SIZE == 0
}

/// Splits a byte range into page program chunks.
///
/// The first chunk runs up to the end of the page containing `addr`, every
/// following chunk is at most one page. No chunk crosses a page boundary.
#[derive(Debug, Clone)]
pub struct PageChunks {
    addr: u32,
    offset: usize,
    len: usize,
}

impl PageChunks {
    pub fn new(addr: u32, len: usize) -> Self {
        Self {
            addr,
            offset: 0,
            len,
        }
    }
}

impl Iterator for PageChunks {
    /// `(flash address, offset into the source buffer, chunk length)`
    type Item = (u32, usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.len {
            return None;
        }
        let addr = self.addr.wrapping_add(self.offset as u32);
        let room = (PAGE_SIZE - addr % PAGE_SIZE) as usize;
        let chunk = room.min(self.len - self.offset);
        let item = (addr, self.offset, chunk);
        self.offset += chunk;
        Some(item)
    }
}
