/// CRC-32 as computed by the image tooling (IEEE polynomial, reflected, inverted).
pub(crate) const CRC: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

/// Chunk size used when programming the erase value into devices without an erase cycle.
pub(crate) const FILL_CHUNK_SIZE: usize = 64;

/// True if `len` bytes starting at `offset` fit inside an area of `size` bytes.
///
/// An `offset + len` that overflows is never in bounds.
pub(crate) fn in_bounds(offset: usize, len: usize, size: usize) -> bool {
    match offset.checked_add(len) {
        Some(end) => end <= size,
        None => false,
    }
}
