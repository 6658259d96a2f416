use crate::device::{FlashDevice, PageLayout};
use crate::error::DeviceError;
use std::cell::{Cell, RefCell};
use std::vec::Vec;

pub(crate) const EINVAL: i32 = 22;

/// Device call as observed by [`RamDevice`], with absolute offset and length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Read(usize, usize),
    Write(usize, usize),
    Erase(usize, usize),
}

/// RAM backed flash device that records every call made to it.
pub(crate) struct RamDevice {
    data: RefCell<Vec<u8>>,
    calls: RefCell<Vec<Call>>,
    ready: Cell<bool>,
    fail_with: Cell<Option<DeviceError>>,
    write_block_size: usize,
    erase_value: u8,
    explicit_erase: bool,
    layout: Vec<PageLayout>,
}

impl RamDevice {
    pub(crate) fn new(nbytes: usize) -> Self {
        RamDevice {
            data: RefCell::new(vec![0xFF; nbytes]),
            calls: RefCell::new(Vec::new()),
            ready: Cell::new(true),
            fail_with: Cell::new(None),
            write_block_size: 4,
            erase_value: 0xFF,
            explicit_erase: true,
            layout: Vec::new(),
        }
    }

    pub(crate) fn with_pages(mut self, page_size: usize) -> Self {
        let nbytes = self.data.borrow().len();
        self.layout = vec![PageLayout {
            pages_count: nbytes / page_size,
            pages_size: page_size,
        }];
        self
    }

    pub(crate) fn with_layout(mut self, layout: &[PageLayout]) -> Self {
        self.layout = layout.to_vec();
        self
    }

    pub(crate) fn with_erase_value(mut self, erase_value: u8) -> Self {
        self.erase_value = erase_value;
        self.data.borrow_mut().fill(erase_value);
        self
    }

    pub(crate) fn with_write_block_size(mut self, write_block_size: usize) -> Self {
        self.write_block_size = write_block_size;
        self
    }

    pub(crate) fn without_erase(mut self) -> Self {
        self.explicit_erase = false;
        self
    }

    pub(crate) fn set_ready(&self, ready: bool) {
        self.ready.set(ready);
    }

    /// Make every following device operation fail with `err`.
    pub(crate) fn fail_with(&self, err: DeviceError) {
        self.fail_with.set(Some(err));
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub(crate) fn contents(&self, offset: usize, len: usize) -> Vec<u8> {
        self.data.borrow()[offset..offset + len].to_vec()
    }

    pub(crate) fn fill(&self, offset: usize, data: &[u8]) {
        self.data.borrow_mut()[offset..offset + data.len()].copy_from_slice(data);
    }

    fn range(&self, offset: usize, len: usize) -> Result<core::ops::Range<usize>, DeviceError> {
        if let Some(err) = self.fail_with.get() {
            return Err(err);
        }
        let end = offset + len;
        if end > self.data.borrow().len() {
            return Err(DeviceError(-EINVAL));
        }
        Ok(offset..end)
    }
}

impl FlashDevice for RamDevice {
    fn is_ready(&self) -> bool {
        self.ready.get()
    }

    fn read(&self, offset: usize, data: &mut [u8]) -> Result<(), DeviceError> {
        self.calls.borrow_mut().push(Call::Read(offset, data.len()));
        let range = self.range(offset, data.len())?;
        data.copy_from_slice(&self.data.borrow()[range]);
        Ok(())
    }

    fn write(&self, offset: usize, data: &[u8]) -> Result<(), DeviceError> {
        self.calls.borrow_mut().push(Call::Write(offset, data.len()));
        let range = self.range(offset, data.len())?;
        self.data.borrow_mut()[range].copy_from_slice(data);
        Ok(())
    }

    fn erase(&self, offset: usize, len: usize) -> Result<(), DeviceError> {
        self.calls.borrow_mut().push(Call::Erase(offset, len));
        let range = self.range(offset, len)?;
        self.data.borrow_mut()[range].fill(self.erase_value);
        Ok(())
    }

    fn write_block_size(&self) -> usize {
        self.write_block_size
    }

    fn erase_value(&self) -> u8 {
        self.erase_value
    }

    fn page_layout(&self) -> &[PageLayout] {
        &self.layout
    }

    fn has_explicit_erase(&self) -> bool {
        self.explicit_erase
    }
}

pub(crate) fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}
