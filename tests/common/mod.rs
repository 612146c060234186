//! A simulated SST26VF016B behind the `embedded-hal` SPI device traits.
#![allow(dead_code)]

use std::cell::{Cell, RefCell, RefMut};
use std::rc::Rc;

use embedded_hal::spi::{ErrorKind, ErrorType, Operation};

pub const CAPACITY: usize = 2 * 1024 * 1024;
const SECTOR: usize = 4096;
const PAGE: usize = 256;
const SFDP_LEN: usize = 0x300;
const BPR_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimError;

impl embedded_hal::spi::Error for SimError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

pub struct SimState {
    pub memory: Vec<u8>,
    pub wel: bool,
    /// Status reads left that still report BUSY.
    pub busy_polls: u32,
    pub busy_after_program: u32,
    pub busy_after_erase: u32,
    pub always_busy: bool,
    /// WREN is accepted on the bus but the latch never sets.
    pub wren_ignored: bool,
    pub fail_transport: bool,
    /// Blocks are write protected until ULBPR.
    pub protected: bool,
    /// A cell that keeps its value whatever is programmed.
    pub stuck_address: Option<u32>,
    pub jedec_id: [u8; 3],
    pub config_reg: u8,
    pub sfdp: Vec<u8>,
    pub block_protection: [u8; BPR_LEN],
    pub security_id: Vec<u8>,
    pub powered_down: bool,
    reset_enabled: bool,
    pub resets: usize,
    pub programs: Vec<(u32, usize)>,
    pub erases: Vec<u32>,
    pub chip_erases: usize,
    pub status_writes: Vec<(u8, u8)>,
    pub opcodes: Vec<u8>,
    pub transactions: usize,
}

impl Default for SimState {
    fn default() -> Self {
        let mut security_id = vec![0xFF; 2048];
        security_id[..8].copy_from_slice(&[0x10, 0x32, 0x54, 0x76, 0x98, 0xBA, 0xDC, 0xFE]);
        Self {
            memory: vec![0xFF; CAPACITY],
            wel: false,
            busy_polls: 0,
            busy_after_program: 1,
            busy_after_erase: 3,
            always_busy: false,
            wren_ignored: false,
            fail_transport: false,
            protected: false,
            stuck_address: None,
            jedec_id: [0xBF, 0x26, 0x41],
            config_reg: 0x08,
            sfdp: vec![0xFF; SFDP_LEN],
            block_protection: [0x55; BPR_LEN],
            security_id,
            powered_down: false,
            reset_enabled: false,
            resets: 0,
            programs: Vec::new(),
            erases: Vec::new(),
            chip_erases: 0,
            status_writes: Vec::new(),
            opcodes: Vec::new(),
            transactions: 0,
        }
    }
}

/// 24-bit big-endian address following the opcode.
fn address(tx: &[u8]) -> usize {
    let byte = |i: usize| tx.get(i).copied().unwrap_or(0) as usize;
    (byte(1) << 16) | (byte(2) << 8) | byte(3)
}

impl SimState {
    fn status(&mut self) -> u8 {
        let busy = if self.always_busy {
            true
        } else if self.busy_polls > 0 {
            self.busy_polls -= 1;
            true
        } else {
            false
        };
        (busy as u8) | ((self.wel as u8) << 1)
    }

    /// Runs one chip-select cycle. `tx` is everything clocked in, the return
    /// value is what gets clocked out during the read phase.
    fn execute(&mut self, tx: &[u8], read_len: usize) -> Vec<u8> {
        let mut rx = vec![0xFF; read_len];
        let Some(&opcode) = tx.first() else {
            return rx;
        };
        self.opcodes.push(opcode);
        if self.reset_enabled && opcode != 0x99 {
            self.reset_enabled = false;
        }
        match opcode {
            0x66 => self.reset_enabled = true,
            0x99 => {
                if self.reset_enabled {
                    self.resets += 1;
                    self.wel = false;
                    self.busy_polls = 0;
                    self.reset_enabled = false;
                }
            }
            0x05 => {
                for b in rx.iter_mut() {
                    *b = self.status();
                }
            }
            0x35 => rx.fill(self.config_reg),
            0x01 => {
                if self.wel && tx.len() >= 3 {
                    self.status_writes.push((tx[1], tx[2]));
                    self.config_reg = tx[2];
                    self.wel = false;
                    self.busy_polls = self.busy_after_program;
                }
            }
            0x9F => {
                for (b, id) in rx.iter_mut().zip(self.jedec_id.iter().cycle()) {
                    *b = *id;
                }
            }
            0x06 => {
                if !self.wren_ignored {
                    self.wel = true;
                }
            }
            0x04 => self.wel = false,
            0x03 | 0x0B => {
                let start = address(tx);
                for (i, b) in rx.iter_mut().enumerate() {
                    *b = self.memory[(start + i) % CAPACITY];
                }
            }
            0x5A => {
                let start = address(tx);
                for (i, b) in rx.iter_mut().enumerate() {
                    *b = self.sfdp.get(start + i).copied().unwrap_or(0xFF);
                }
            }
            0x02 => {
                if self.wel {
                    let start = address(tx);
                    let data = &tx[4..];
                    if !self.protected {
                        let page_base = start & !(PAGE - 1);
                        for (i, b) in data.iter().enumerate() {
                            let addr = (page_base | ((start + i) & (PAGE - 1))) % CAPACITY;
                            if self.stuck_address == Some(addr as u32) {
                                continue;
                            }
                            self.memory[addr] &= *b;
                        }
                    }
                    self.programs.push((start as u32, data.len()));
                    self.wel = false;
                    self.busy_polls = self.busy_after_program;
                }
            }
            0x20 => {
                if self.wel {
                    let start = address(tx) & !(SECTOR - 1);
                    if !self.protected {
                        self.memory[start..start + SECTOR].fill(0xFF);
                    }
                    self.erases.push(start as u32);
                    self.wel = false;
                    self.busy_polls = self.busy_after_erase;
                }
            }
            0xC7 => {
                if self.wel {
                    if !self.protected {
                        self.memory.fill(0xFF);
                    }
                    self.chip_erases += 1;
                    self.wel = false;
                    self.busy_polls = self.busy_after_erase;
                }
            }
            0x72 => {
                for (b, bpr) in rx.iter_mut().zip(self.block_protection.iter()) {
                    *b = *bpr;
                }
            }
            0x98 => {
                if self.wel {
                    self.block_protection = [0; BPR_LEN];
                    self.protected = false;
                    self.wel = false;
                }
            }
            0x88 => {
                let start = ((tx[1] as usize) << 8) | tx[2] as usize;
                for (i, b) in rx.iter_mut().enumerate() {
                    *b = self.security_id.get(start + i).copied().unwrap_or(0xFF);
                }
            }
            0xB9 => self.powered_down = true,
            0xAB => self.powered_down = false,
            _ => {}
        }
        rx
    }
}

/// Shared handle on the simulated chip. Clones talk to the same chip, so a
/// test can keep one to inspect the state while the driver owns another.
#[derive(Clone, Default)]
pub struct SimFlash {
    state: Rc<RefCell<SimState>>,
}

impl SimFlash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RefMut<'_, SimState> {
        self.state.borrow_mut()
    }

    pub fn memory(&self, addr: u32, len: usize) -> Vec<u8> {
        let state = self.state.borrow();
        state.memory[addr as usize..addr as usize + len].to_vec()
    }

    /// Factory EUI-48 and EUI-64 as the SFDP table of a programmed part.
    pub fn program_euis(&self, eui48: [u8; 6], eui64: [u8; 8]) {
        let mut state = self.state.borrow_mut();
        state.sfdp[0x260] = 0x30;
        state.sfdp[0x261..0x267].copy_from_slice(&eui48);
        state.sfdp[0x267] = 0x40;
        state.sfdp[0x268..0x270].copy_from_slice(&eui64);
    }

    fn run(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), SimError> {
        let mut state = self.state.borrow_mut();
        state.transactions += 1;
        if state.fail_transport {
            return Err(SimError);
        }
        let mut tx = Vec::new();
        let mut read_len = 0;
        for op in operations.iter() {
            match op {
                Operation::Write(bytes) => tx.extend_from_slice(bytes),
                Operation::Read(buf) => read_len += buf.len(),
                Operation::Transfer(read, write) => {
                    tx.extend_from_slice(write);
                    read_len += read.len();
                }
                Operation::TransferInPlace(buf) => {
                    tx.extend_from_slice(buf);
                    read_len += buf.len();
                }
                Operation::DelayNs(_) => {}
            }
        }
        let rx = state.execute(&tx, read_len);
        let mut rx = rx.into_iter();
        for op in operations.iter_mut() {
            match op {
                Operation::Read(buf)
                | Operation::Transfer(buf, _)
                | Operation::TransferInPlace(buf) => {
                    for b in buf.iter_mut() {
                        *b = rx.next().unwrap_or(0xFF);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl ErrorType for SimFlash {
    type Error = SimError;
}

impl embedded_hal::spi::SpiDevice for SimFlash {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), SimError> {
        self.run(operations)
    }
}

impl embedded_hal_async::spi::SpiDevice for SimFlash {
    async fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), SimError> {
        self.run(operations)
    }
}

/// Delay provider that only counts.
#[derive(Clone, Default)]
pub struct SimDelay {
    elapsed_ns: Rc<Cell<u64>>,
}

impl SimDelay {
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns.get() / 1_000_000
    }
}

impl embedded_hal::delay::DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns.set(self.elapsed_ns.get() + ns as u64);
    }
}

impl embedded_hal_async::delay::DelayNs for SimDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns.set(self.elapsed_ns.get() + ns as u64);
    }
}

pub fn block_on<F: core::future::Future>(f: F) -> F::Output {
    use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    fn raw_waker() -> RawWaker {
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            raw_waker()
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(core::ptr::null(), &VTABLE)
    }

    let waker = unsafe { Waker::from_raw(raw_waker()) };
    let mut cx = Context::from_waker(&waker);
    let mut f = core::pin::pin!(f);

    loop {
        if let Poll::Ready(val) = f.as_mut().poll(&mut cx) {
            return val;
        }
    }
}
