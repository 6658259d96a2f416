//! Partitioned access to flash devices.
//!
//! A board describes its flash as a fixed table of areas, each a window of `size` bytes at
//! `offset` on some [`FlashDevice`]. Consumers open an area by id and address it relative to its
//! start; every read, write and erase is checked against the area bounds before it reaches the
//! device, so nothing outside the area can be touched through its handle.
//!
//! ```
//! # use flashmap::{AreaDescriptor, AreaTable, DeviceError, FlashDevice};
//! # use core::cell::RefCell;
//! struct Ram(RefCell<[u8; 0x4000]>);
//!
//! impl FlashDevice for Ram {
//!     fn is_ready(&self) -> bool {
//!         true
//!     }
//!     fn read(&self, offset: usize, data: &mut [u8]) -> Result<(), DeviceError> {
//!         data.copy_from_slice(&self.0.borrow()[offset..offset + data.len()]);
//!         Ok(())
//!     }
//!     fn write(&self, offset: usize, data: &[u8]) -> Result<(), DeviceError> {
//!         self.0.borrow_mut()[offset..offset + data.len()].copy_from_slice(data);
//!         Ok(())
//!     }
//!     fn erase(&self, offset: usize, len: usize) -> Result<(), DeviceError> {
//!         self.0.borrow_mut()[offset..offset + len].fill(0xFF);
//!         Ok(())
//!     }
//!     fn write_block_size(&self) -> usize {
//!         1
//!     }
//!     fn erase_value(&self) -> u8 {
//!         0xFF
//!     }
//! }
//!
//! let flash = Ram(RefCell::new([0xFF; 0x4000]));
//! let areas = [
//!     AreaDescriptor::new(0, &flash, 0x0000, 0x2000).with_label("image-0"),
//!     AreaDescriptor::new(1, &flash, 0x2000, 0x2000).with_label("image-1"),
//! ];
//! let table = AreaTable::new(&areas);
//!
//! let slot = table.open(1).unwrap();
//! slot.write(0x10, b"hello").unwrap();
//! assert!(slot.write(0x1FFE, b"hello").is_err());
//! ```
//!
//! The crate does no locking. Callers that share a device between threads of control must
//! serialize access themselves.

#![cfg_attr(not(test), no_std)]

mod area;
mod device;
mod error;
mod table;
mod util;

#[cfg(test)]
mod tests_util;

pub use area::{Area, AreaDescriptor, Sector};
pub use device::{FlashDevice, PageLayout};
pub use error::{DeviceError, ErrorKind};
pub use table::AreaTable;
