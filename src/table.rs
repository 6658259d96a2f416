use crate::area::{Area, AreaDescriptor};
use crate::error::ErrorKind;
use log::{debug, error};

/// The fixed set of flash areas of a board, in configuration order.
#[derive(Debug, Clone, Copy)]
pub struct AreaTable<'a> {
    areas: &'a [AreaDescriptor<'a>],
}

impl<'a> AreaTable<'a> {
    pub const fn new(areas: &'a [AreaDescriptor<'a>]) -> Self {
        AreaTable { areas }
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    pub fn lookup(&self, id: u8) -> Result<&'a AreaDescriptor<'a>, ErrorKind> {
        self.areas
            .iter()
            .find(|area| area.id() == id)
            .ok_or(ErrorKind::NotFound)
    }

    /// Open the area with the given id.
    ///
    /// Fails with `NotFound` for unknown ids and `NotReady` if the area's device is not ready.
    /// No device I/O is performed.
    pub fn open(&self, id: u8) -> Result<Area<'a>, ErrorKind> {
        debug!("open area {}", id);
        let desc = self.lookup(id).map_err(|e| {
            error!("no flash area {}", id);
            e
        })?;

        if !desc.device().is_ready() {
            error!("area {}: device not ready", id);
            return Err(ErrorKind::NotReady);
        }

        Ok(Area::new(desc))
    }

    /// Call `f` for every area in table order.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&'a AreaDescriptor<'a>),
    {
        for area in self.areas {
            f(area);
        }
    }

    pub fn iter(&self) -> core::slice::Iter<'a, AreaDescriptor<'a>> {
        self.areas.iter()
    }
}

impl<'a> IntoIterator for AreaTable<'a> {
    type Item = &'a AreaDescriptor<'a>;
    type IntoIter = core::slice::Iter<'a, AreaDescriptor<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.areas.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_util::*;

    #[test]
    fn open_unknown_id() {
        init();
        let device = RamDevice::new(0x20000);
        let areas = [
            AreaDescriptor::new(1, &device, 0x0, 0x10000),
            AreaDescriptor::new(2, &device, 0x10000, 0x10000),
        ];
        let table = AreaTable::new(&areas);
        assert_eq!(table.open(99).map(|a| a.id()), Err(ErrorKind::NotFound));
        assert_eq!(table.lookup(99).map(|a| a.id()), Err(ErrorKind::NotFound));
        assert_eq!(table.open(2).map(|a| a.id()), Ok(2));
    }

    #[test]
    fn open_waits_for_ready_device() {
        init();
        let device = RamDevice::new(0x20000);
        let areas = [AreaDescriptor::new(1, &device, 0x10000, 0x1000)];
        let table = AreaTable::new(&areas);

        let early = table.open(1).unwrap();

        device.set_ready(false);
        assert_eq!(table.open(1).map(|a| a.id()), Err(ErrorKind::NotReady));

        device.set_ready(true);
        let area = table.open(1).unwrap();
        assert_eq!(area.size(), 0x1000);

        // Handles opened earlier are not re-validated.
        device.set_ready(false);
        let mut buf = [0u8; 4];
        early.read(0, &mut buf).unwrap();
        assert_eq!(early.has_driver(), Err(ErrorKind::NotReady));
        assert_eq!(device.calls().len(), 1);
    }

    #[test]
    fn open_does_no_io() {
        let device = RamDevice::new(0x10000);
        let areas = [AreaDescriptor::new(4, &device, 0x0, 0x10000)];
        let table = AreaTable::new(&areas);
        table.open(4).unwrap().close();
        assert!(device.calls().is_empty());
    }

    #[test]
    fn lookup_by_id() {
        let device = RamDevice::new(0x10000);
        let areas = [
            AreaDescriptor::new(0, &device, 0x0, 0x4000).with_label("mcuboot"),
            AreaDescriptor::new(1, &device, 0x4000, 0x6000).with_label("image-0"),
            AreaDescriptor::new(2, &device, 0xA000, 0x6000).with_label("image-1"),
        ];
        let table = AreaTable::new(&areas);
        let desc = table.lookup(1).unwrap();
        assert_eq!(desc.offset(), 0x4000);
        assert_eq!(desc.size(), 0x6000);
        assert_eq!(desc.label(), Some("image-0"));
    }

    #[test]
    fn label_borrowed_from_configuration() {
        let device = RamDevice::new(0x10000);
        let names = vec![String::from("storage")];
        let areas = [AreaDescriptor::new(9, &device, 0x8000, 0x8000).with_label(&names[0])];
        let table = AreaTable::new(&areas);
        assert_eq!(table.lookup(9).unwrap().label(), Some("storage"));
    }

    #[test]
    fn for_each_in_table_order() {
        let internal = RamDevice::new(0x10000);
        let external = RamDevice::new(0x40000);
        let areas = [
            AreaDescriptor::new(5, &external, 0x0, 0x20000),
            AreaDescriptor::new(0, &internal, 0x0, 0x8000),
            AreaDescriptor::new(3, &internal, 0x8000, 0x8000),
        ];
        let table = AreaTable::new(&areas);

        // Opening and closing other areas must not affect enumeration.
        table.open(3).unwrap().close();

        let mut seen = Vec::new();
        table.for_each(|area| seen.push(area.id()));
        assert_eq!(seen, vec![5, 0, 3]);

        let ids: Vec<u8> = table.iter().map(|area| area.id()).collect();
        assert_eq!(ids, seen);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn empty_table() {
        let table = AreaTable::new(&[]);
        assert!(table.is_empty());
        assert_eq!(table.open(0).map(|a| a.id()), Err(ErrorKind::NotFound));
        table.for_each(|_| panic!("no areas"));
    }
}
