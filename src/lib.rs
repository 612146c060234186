//! Driver for the Microchip SST26VF016B serial NOR flash.
//!
//! Three layers, bottom up:
//!
//! - [`Sst26Flash`] / [`AsyncSst26Flash`]: the chip protocol on top of an
//!   `embedded-hal` [`SpiDevice`](embedded_hal::spi::SpiDevice). Write enable
//!   discipline, page splitting, busy polling and optional read-back
//!   verification live here. The blocking driver also implements the
//!   `embedded-storage` NOR flash traits.
//! - [`block`]: the contract between a block engine (wear leveling / flash
//!   translation layer) and the chip, the [`BlockAdapter`](block::BlockAdapter)
//!   implementing it, and a simple [`DirectMappedEngine`](block::DirectMappedEngine).
//! - [`store`]: [`RecordStore`](store::RecordStore), one typed value kept in a
//!   run of logical sectors (needs the `alloc` feature).
//!
//! ```ignore
//! let flash = Sst26Flash::new(spi, delay, DriverConfig::new(WriteVerification::ReadBack));
//! let mut engine: DirectMappedEngine<_> = DirectMappedEngine::new(BlockAdapter::new(flash));
//! let mut settings: RecordStore<Settings> = RecordStore::new(&engine, 5);
//! settings.read(&mut engine)?;
//! settings.stored_object_mut().volume = 7;
//! settings.write(&mut engine)?;
//! ```
#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[macro_use]
mod fmt;

pub mod async_comms;
pub mod block;
pub mod comms;
pub mod config;
pub mod error;
pub mod geometry;
mod nor_storage;
pub mod registers;
#[cfg(feature = "alloc")]
pub mod store;
pub mod traits;

pub use async_comms::AsyncSst26Flash;
pub use comms::{EraseScan, Sst26Flash};
pub use config::{DriverConfig, WriteVerification};
pub use error::Error;
pub use traits::{AsyncNorFlashDevice, NorFlashDevice};
