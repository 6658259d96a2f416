use crate::device::{FlashDevice, Pages};
use crate::error::ErrorKind;
use crate::util::{in_bounds, CRC, FILL_CHUNK_SIZE};
use core::fmt;
use log::{debug, error, trace};
use zerocopy::{AsBytes, FromBytes};

/// A fixed partition of a flash device.
///
/// Descriptors are built once from board configuration and never change afterwards. The device
/// is borrowed: several areas usually share one controller.
#[derive(Clone, Copy)]
pub struct AreaDescriptor<'a> {
    id: u8,
    device: &'a dyn FlashDevice,
    offset: usize,
    size: usize,
    label: Option<&'a str>,
}

impl<'a> AreaDescriptor<'a> {
    pub const fn new(id: u8, device: &'a dyn FlashDevice, offset: usize, size: usize) -> Self {
        AreaDescriptor {
            id,
            device,
            offset,
            size,
            label: None,
        }
    }

    /// Attach a partition name, shown in listings only.
    pub const fn with_label(self, label: &'a str) -> Self {
        AreaDescriptor {
            label: Some(label),
            ..self
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    /// Start of the area within the device.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn label(&self) -> Option<&'a str> {
        self.label
    }

    pub fn device(&self) -> &'a dyn FlashDevice {
        self.device
    }
}

impl<'a> fmt::Debug for AreaDescriptor<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AreaDescriptor")
            .field("id", &self.id)
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("label", &self.label)
            .finish()
    }
}

/// One device page lying inside an area, addressed relative to the area start.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Sector {
    pub offset: usize,
    pub size: usize,
}

/// An opened flash area.
///
/// A handle is a plain view of its descriptor: it holds no lock and no reference count, any
/// number of handles to the same area may coexist, and closing one does not invalidate copies.
/// Overlapping accesses through different handles are not serialized.
///
/// Every access is checked against the area bounds before the device sees it. Write and erase
/// alignment is left to the device.
#[derive(Debug, Clone, Copy)]
pub struct Area<'a> {
    desc: &'a AreaDescriptor<'a>,
}

impl<'a> Area<'a> {
    pub(crate) fn new(desc: &'a AreaDescriptor<'a>) -> Self {
        Area { desc }
    }

    pub fn descriptor(&self) -> &'a AreaDescriptor<'a> {
        self.desc
    }

    pub fn id(&self) -> u8 {
        self.desc.id
    }

    pub fn size(&self) -> usize {
        self.desc.size
    }

    /// Release the handle. This does nothing; handles own no resources.
    pub fn close(self) {
        debug!("close area {}", self.desc.id);
    }

    /// Translate an area relative range to an absolute device offset.
    fn check(&self, offset: usize, len: usize) -> Result<usize, ErrorKind> {
        let fits_device = self.desc.offset.checked_add(self.desc.size).is_some();
        if !fits_device || !in_bounds(offset, len, self.desc.size) {
            error!(
                "area {}: 0x{:x}+0x{:x} outside of 0x{:x} bytes",
                self.desc.id, offset, len, self.desc.size
            );
            return Err(ErrorKind::OutOfBounds);
        }
        Ok(self.desc.offset + offset)
    }

    pub fn read(&self, offset: usize, data: &mut [u8]) -> Result<(), ErrorKind> {
        let abs = self.check(offset, data.len())?;
        trace!("area {} rd 0x{:x} len: {}", self.desc.id, abs, data.len());
        Ok(self.desc.device.read(abs, data)?)
    }

    /// Program `data` at `offset`. The target must already be erased if the device needs it.
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<(), ErrorKind> {
        let abs = self.check(offset, data.len())?;
        trace!("area {} wr 0x{:x} len: {}", self.desc.id, abs, data.len());
        Ok(self.desc.device.write(abs, data)?)
    }

    pub fn erase(&self, offset: usize, len: usize) -> Result<(), ErrorKind> {
        let abs = self.check(offset, len)?;
        trace!("area {} erase 0x{:x} len: {}", self.desc.id, abs, len);
        Ok(self.desc.device.erase(abs, len)?)
    }

    /// Write block size of the backing device.
    pub fn align(&self) -> usize {
        self.desc.device.write_block_size()
    }

    pub fn erased_value(&self) -> u8 {
        self.desc.device.erase_value()
    }

    /// Check that the device is still usable. `open` only checks once.
    pub fn has_driver(&self) -> Result<bool, ErrorKind> {
        if !self.desc.device.is_ready() {
            error!("area {}: device not ready", self.desc.id);
            return Err(ErrorKind::NotReady);
        }
        Ok(true)
    }

    pub fn device(&self) -> &'a dyn FlashDevice {
        self.desc.device
    }

    /// Fill `out` with the device pages that start inside this area.
    ///
    /// Returns the number of sectors written, or `NoSpace` if `out` is too short.
    pub fn sectors(&self, out: &mut [Sector]) -> Result<usize, ErrorKind> {
        let start = self.desc.offset;
        let end = start.saturating_add(self.desc.size);
        let mut count = 0;
        for (page_offset, page_size) in Pages::new(self.desc.device.page_layout()) {
            if page_offset < start {
                continue;
            }
            if page_offset >= end {
                break;
            }
            let slot = out.get_mut(count).ok_or_else(|| {
                error!("area {}: more than {} sectors", self.desc.id, count);
                ErrorKind::NoSpace
            })?;
            *slot = Sector {
                offset: page_offset - start,
                size: page_size,
            };
            count += 1;
        }
        Ok(count)
    }

    /// Read `len` bytes in `buf` sized pieces, handing each piece to `f`.
    ///
    /// Stops early when `f` returns false.
    fn read_chunks<F>(
        &self,
        offset: usize,
        len: usize,
        buf: &mut [u8],
        mut f: F,
    ) -> Result<(), ErrorKind>
    where
        F: FnMut(&[u8]) -> bool,
    {
        let mut abs = self.check(offset, len)?;
        if buf.is_empty() {
            return Err(ErrorKind::InvalidArgument);
        }
        let end = abs + len;
        while abs < end {
            let num_bytes = core::cmp::min(end - abs, buf.len());
            trace!("area {} rd 0x{:x} len: {}", self.desc.id, abs, num_bytes);
            self.desc.device.read(abs, &mut buf[..num_bytes])?;
            if !f(&buf[..num_bytes]) {
                break;
            }
            abs += num_bytes;
        }
        Ok(())
    }

    /// CRC-32 of `len` bytes at `offset`, read through `buf`.
    pub fn crc32(&self, offset: usize, len: usize, buf: &mut [u8]) -> Result<u32, ErrorKind> {
        let mut digest = CRC.digest();
        self.read_chunks(offset, len, buf, |chunk| {
            digest.update(chunk);
            true
        })?;
        Ok(digest.finalize())
    }

    /// True if every byte of the range reads as the erase value.
    pub fn is_erased(&self, offset: usize, len: usize, buf: &mut [u8]) -> Result<bool, ErrorKind> {
        let erased = self.erased_value();
        let mut result = true;
        self.read_chunks(offset, len, buf, |chunk| {
            result = chunk.iter().all(|b| *b == erased);
            result
        })?;
        Ok(result)
    }

    /// Copy `len` bytes from this area into `dst`, through `buf`.
    ///
    /// Both ranges are checked before anything is read. The destination is not erased here.
    pub fn copy_to(
        &self,
        offset: usize,
        dst: &Area<'_>,
        dst_offset: usize,
        len: usize,
        buf: &mut [u8],
    ) -> Result<(), ErrorKind> {
        let mut src_abs = self.check(offset, len)?;
        let mut dst_abs = dst.check(dst_offset, len)?;
        if buf.is_empty() {
            return Err(ErrorKind::InvalidArgument);
        }
        debug!(
            "copy area {} 0x{:x} -> area {} 0x{:x} len: {}",
            self.desc.id, offset, dst.desc.id, dst_offset, len
        );
        let mut remaining = len;
        while remaining > 0 {
            let num_bytes = core::cmp::min(remaining, buf.len());
            self.desc.device.read(src_abs, &mut buf[..num_bytes])?;
            dst.desc.device.write(dst_abs, &buf[..num_bytes])?;
            src_abs += num_bytes;
            dst_abs += num_bytes;
            remaining -= num_bytes;
        }
        Ok(())
    }

    /// Bring a range to the erased state.
    ///
    /// Devices with an erase cycle are erased; the others get the erase value written.
    pub fn flatten(&self, offset: usize, len: usize) -> Result<(), ErrorKind> {
        let mut abs = self.check(offset, len)?;
        let device = self.desc.device;
        if device.has_explicit_erase() {
            trace!("area {} erase 0x{:x} len: {}", self.desc.id, abs, len);
            return Ok(device.erase(abs, len)?);
        }

        let fill = [device.erase_value(); FILL_CHUNK_SIZE];
        let end = abs + len;
        while abs < end {
            let num_bytes = core::cmp::min(end - abs, FILL_CHUNK_SIZE);
            trace!("area {} fill 0x{:x} len: {}", self.desc.id, abs, num_bytes);
            device.write(abs, &fill[..num_bytes])?;
            abs += num_bytes;
        }
        Ok(())
    }

    /// Read a fixed layout record, such as an image header, at `offset`.
    pub fn read_struct<T: FromBytes + AsBytes>(&self, offset: usize) -> Result<T, ErrorKind> {
        let mut value = T::new_zeroed();
        self.read(offset, value.as_bytes_mut())?;
        Ok(value)
    }

    pub fn write_struct<T: AsBytes>(&self, offset: usize, value: &T) -> Result<(), ErrorKind> {
        self.write(offset, value.as_bytes())
    }
}
