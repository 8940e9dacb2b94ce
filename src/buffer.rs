use std::fmt;

use bytes::{Bytes, BytesMut};
use log::debug;

use crate::{
    codec::{encode_remaining_length, remaining_length_len, RemainingLengthError},
    constants::{MAX_REMAINING_LENGTH, MAX_REMAINING_LENGTH_BYTES},
};

/// Who is responsible for the memory behind a [`PacketBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// No backing store.
    Unallocated,
    /// A fixed region lent by the caller. Never freed by the buffer.
    CallerOwned,
    /// Memory allocated by [`PacketBuffer::acquire`].
    LibraryOwned,
}

#[derive(Debug)]
enum Storage<'a> {
    Empty,
    Caller(&'a mut [u8]),
    Library(BytesMut),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// The buffer has no usable backing store.
    Unavailable,
    /// A write would pass the end of the buffer.
    Overflow { needed: usize, capacity: usize },
}

impl std::error::Error for BufferError {}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "Buffer Unavailable"),
            Self::Overflow { needed, capacity } => {
                write!(f, "Buffer Overflow: needed {needed} bytes, capacity {capacity}")
            }
        }
    }
}

/// Errors raised while writing a fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FixedHeaderError {
    Buffer(BufferError),
    RemainingLength(RemainingLengthError),
}

/// Byte buffer backing an outbound packet.
///
/// The buffer is either empty, lends a caller-supplied region, or owns a heap
/// allocation. `len() <= capacity()` always holds and the data is present
/// whenever the capacity is non-zero.
#[derive(Debug)]
pub struct PacketBuffer<'a> {
    storage: Storage<'a>,
    len: usize,
    capacity: usize,
    ownership: Ownership,
}

impl Default for PacketBuffer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> PacketBuffer<'a> {
    /// An empty buffer. The first `acquire` allocates.
    pub fn new() -> Self {
        Self { storage: Storage::Empty, len: 0, capacity: 0, ownership: Ownership::Unallocated }
    }

    /// A buffer backed by a caller-supplied region.
    ///
    /// `acquire` will zero the region and refuse requests larger than it.
    pub fn with_region(region: &'a mut [u8]) -> Self {
        let capacity = region.len();
        Self { storage: Storage::Caller(region), len: 0, capacity, ownership: Ownership::CallerOwned }
    }

    /// Prepares the buffer for a packet of `size` bytes.
    ///
    /// An empty buffer allocates exactly `size` zeroed bytes. A caller region is
    /// zeroed and reused; if it is smaller than `size` it becomes unusable and
    /// `BufferError::Unavailable` is returned.
    pub fn acquire(&mut self, size: usize) -> Result<(), BufferError> {
        self.len = 0;

        match &mut self.storage {
            Storage::Empty if self.ownership == Ownership::CallerOwned => {
                // Region was already dropped by an earlier failed acquire
                Err(BufferError::Unavailable)
            }
            Storage::Empty => {
                self.storage = Storage::Library(BytesMut::zeroed(size));
                self.capacity = size;
                self.ownership = Ownership::LibraryOwned;
                Ok(())
            }
            Storage::Caller(region) => {
                region.fill(0);

                if region.len() < size {
                    debug!("caller region of {} bytes is too small for {size}", region.len());
                    self.storage = Storage::Empty;
                    self.capacity = 0;
                    return Err(BufferError::Unavailable);
                }

                Ok(())
            }
            Storage::Library(data) => {
                // Reacquiring an owned buffer reuses the allocation when possible
                data.clear();
                data.resize(size, 0);
                self.capacity = size;
                Ok(())
            }
        }
    }

    /// Drops library-owned memory and resets the buffer to empty.
    ///
    /// A caller region is only detached, never freed.
    pub fn release(&mut self) {
        self.storage = Storage::Empty;
        self.len = 0;
        self.capacity = 0;
        self.ownership = Ownership::Unallocated;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Whether the buffer has a backing store.
    pub fn is_usable(&self) -> bool {
        !matches!(self.storage, Storage::Empty)
    }

    /// The bytes written so far, or `None` when there is no backing store.
    pub fn data(&self) -> Option<&[u8]> {
        match &self.storage {
            Storage::Empty => None,
            Storage::Caller(region) => Some(&region[..self.len]),
            Storage::Library(data) => Some(&data[..self.len]),
        }
    }

    /// The bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        self.data().unwrap_or(&[])
    }

    /// Copies the written bytes out, ready to hand to a transport.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }

    fn writable(&mut self, n: usize) -> Result<&mut [u8], BufferError> {
        let start = self.len;
        let end = start + n;
        let capacity = self.capacity;

        let data: &mut [u8] = match &mut self.storage {
            Storage::Empty => return Err(BufferError::Unavailable),
            Storage::Caller(region) => &mut region[..],
            Storage::Library(data) => &mut data[..],
        };

        if end > capacity {
            return Err(BufferError::Overflow { needed: end, capacity });
        }

        self.len = end;
        Ok(&mut data[start..end])
    }

    pub fn put_u8(&mut self, value: u8) -> Result<(), BufferError> {
        self.writable(1)?[0] = value;
        Ok(())
    }

    pub fn put_u16(&mut self, value: u16) -> Result<(), BufferError> {
        self.writable(2)?.copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn put_slice(&mut self, src: &[u8]) -> Result<(), BufferError> {
        self.writable(src.len())?.copy_from_slice(src);
        Ok(())
    }

    /// Writes a 2-byte big-endian length followed by `src`.
    pub fn put_length_prefixed(&mut self, src: &[u8]) -> Result<(), BufferError> {
        let len = u16::try_from(src.len())
            .map_err(|_| BufferError::Overflow { needed: src.len(), capacity: usize::from(u16::MAX) })?;
        self.put_u16(len)?;
        self.put_slice(src)
    }

    /// Acquires a buffer sized exactly for the packet, then writes the control
    /// byte and the remaining length.
    ///
    /// On any failure the buffer is released before returning.
    pub(crate) fn start_packet(
        &mut self,
        control_byte: u8,
        remaining_len: usize,
    ) -> Result<(), FixedHeaderError> {
        let value = match u32::try_from(remaining_len) {
            Ok(value) if value <= MAX_REMAINING_LENGTH => value,
            _ => {
                self.release();
                return Err(FixedHeaderError::RemainingLength(RemainingLengthError::TooLarge));
            }
        };

        if let Err(e) = self.acquire(1 + remaining_length_len(value) + remaining_len) {
            self.release();
            return Err(FixedHeaderError::Buffer(e));
        }

        let mut encoded = [0; MAX_REMAINING_LENGTH_BYTES];
        let written = match encode_remaining_length(value, &mut encoded) {
            Ok(written) => written,
            Err(e) => {
                self.release();
                return Err(FixedHeaderError::RemainingLength(e));
            }
        };

        let header = self.put_u8(control_byte).and_then(|_| self.put_slice(&encoded[..written]));
        if let Err(e) = header {
            self.release();
            return Err(FixedHeaderError::Buffer(e));
        }

        Ok(())
    }

    /// Runs `write` against the buffer, releasing it if any write fails.
    pub(crate) fn fill<F>(&mut self, write: F) -> Result<(), BufferError>
    where
        F: FnOnce(&mut Self) -> Result<(), BufferError>,
    {
        let result = write(self);
        if result.is_err() {
            self.release();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_allocates_library_owned_memory() {
        let mut buf = PacketBuffer::new();
        assert_eq!(buf.ownership(), Ownership::Unallocated);
        assert!(!buf.is_usable());

        buf.acquire(8).unwrap();
        assert_eq!(buf.ownership(), Ownership::LibraryOwned);
        assert_eq!(buf.capacity(), 8);
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.data(), Some(&[][..]));
    }

    #[test]
    fn release_then_reacquire_same_size() {
        let mut buf = PacketBuffer::new();
        buf.acquire(4).unwrap();
        buf.put_u16(0xBEEF).unwrap();
        buf.release();

        assert_eq!(buf.ownership(), Ownership::Unallocated);
        assert_eq!(buf.capacity(), 0);
        assert_eq!(buf.len(), 0);
        assert!(buf.data().is_none());

        buf.acquire(4).unwrap();
        assert_eq!(buf.capacity(), 4);
        assert_eq!(buf.ownership(), Ownership::LibraryOwned);
    }

    #[test]
    fn caller_region_is_zeroed_and_reused() {
        let mut region = [0xAA; 6];
        {
            let mut buf = PacketBuffer::with_region(&mut region);
            buf.acquire(4).unwrap();
            assert_eq!(buf.ownership(), Ownership::CallerOwned);
            assert_eq!(buf.capacity(), 6);
            buf.put_slice(&[1, 2]).unwrap();
            assert_eq!(buf.as_bytes(), &[1, 2]);
            buf.release();
            assert_eq!(buf.ownership(), Ownership::Unallocated);
        }
        assert_eq!(region, [1, 2, 0, 0, 0, 0]);
    }

    #[test]
    fn too_small_caller_region_becomes_unusable() {
        let mut region = [0xFF; 2];
        let mut buf = PacketBuffer::with_region(&mut region);

        assert_eq!(buf.acquire(4), Err(BufferError::Unavailable));
        assert!(!buf.is_usable());
        assert!(buf.data().is_none());
        assert_eq!(buf.capacity(), 0);
        assert_eq!(buf.ownership(), Ownership::CallerOwned);
        assert_eq!(buf.put_u8(1), Err(BufferError::Unavailable));

        // Still unusable until released
        assert_eq!(buf.acquire(1), Err(BufferError::Unavailable));

        buf.release();
        drop(buf);
        assert_eq!(region, [0, 0]);
    }

    #[test]
    fn writes_never_pass_capacity() {
        let mut buf = PacketBuffer::new();
        buf.acquire(3).unwrap();
        buf.put_u16(1).unwrap();

        assert_eq!(buf.put_u16(2), Err(BufferError::Overflow { needed: 4, capacity: 3 }));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn fill_releases_on_error() {
        let mut buf = PacketBuffer::new();
        buf.acquire(1).unwrap();

        let result = buf.fill(|buf| buf.put_slice(b"too long"));
        assert!(result.is_err());
        assert_eq!(buf.ownership(), Ownership::Unallocated);
        assert!(buf.data().is_none());
    }

    #[test]
    fn start_packet_sizes_exactly() {
        let mut buf = PacketBuffer::new();
        buf.start_packet(0x30, 200).unwrap();

        assert_eq!(buf.capacity(), 1 + 2 + 200);
        assert_eq!(buf.as_bytes(), &[0x30, 0xC8, 0x01]);
    }

    #[test]
    fn start_packet_releases_on_overflow() {
        let mut buf = PacketBuffer::new();
        let result = buf.start_packet(0x30, 2_097_152);

        assert!(matches!(result, Err(FixedHeaderError::RemainingLength(RemainingLengthError::TooLarge))));
        assert_eq!(buf.ownership(), Ownership::Unallocated);
    }

    #[test]
    fn start_packet_rejects_lengths_beyond_u32() {
        let mut buf = PacketBuffer::new();
        buf.acquire(4).unwrap();

        let result = buf.start_packet(0x30, usize::MAX);
        assert!(matches!(result, Err(FixedHeaderError::RemainingLength(RemainingLengthError::TooLarge))));
        assert_eq!(buf.ownership(), Ownership::Unallocated);
        assert!(buf.data().is_none());
    }
}
