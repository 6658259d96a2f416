use crate::error::DeviceError;

/// A run of equally sized pages in a device's erase layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    pub pages_count: usize,
    pub pages_size: usize,
}

/// Raw flash driver, addressed by absolute device offset.
///
/// All methods take `&self`: a device is shared by every area placed on it, so drivers that need
/// to mutate state do so through interior mutability. Nothing above this trait serializes access.
pub trait FlashDevice {
    /// Whether the driver is initialized and usable right now.
    fn is_ready(&self) -> bool;

    fn read(&self, offset: usize, data: &mut [u8]) -> Result<(), DeviceError>;

    fn write(&self, offset: usize, data: &[u8]) -> Result<(), DeviceError>;

    fn erase(&self, offset: usize, len: usize) -> Result<(), DeviceError>;

    /// Smallest unit the device can program, in bytes.
    fn write_block_size(&self) -> usize;

    /// Value every byte reads as after an erase.
    fn erase_value(&self) -> u8;

    /// Page layout of the whole device, lowest address first.
    fn page_layout(&self) -> &[PageLayout] {
        &[]
    }

    /// False for devices that can be overwritten in place without an erase cycle.
    fn has_explicit_erase(&self) -> bool {
        true
    }
}

/// Iterator over `(start_offset, size)` of every page described by a layout.
pub(crate) struct Pages<'a> {
    layout: &'a [PageLayout],
    run: usize,
    page: usize,
    offset: Option<usize>,
}

impl<'a> Pages<'a> {
    pub(crate) fn new(layout: &'a [PageLayout]) -> Self {
        Pages {
            layout,
            run: 0,
            page: 0,
            offset: Some(0),
        }
    }
}

impl<'a> Iterator for Pages<'a> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let run = self.layout.get(self.run)?;
            if self.page < run.pages_count {
                let offset = self.offset?;
                self.page += 1;
                // A layout reaching past the address space ends after its last addressable page.
                self.offset = offset.checked_add(run.pages_size);
                return Some((offset, run.pages_size));
            }
            self.run += 1;
            self.page = 0;
        }
    }
}
