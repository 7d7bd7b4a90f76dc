//! Zero-copy frames in physical memory
//!
//! A zero-copy client passes a two-word descriptor instead of pixels: the
//! magic word [`ZERO_COPY_MAGIC`] followed by the physical address of a
//! planar 4:2:0 frame. The frame is mapped read-only on first use and the
//! mapping is kept until the port is stopped with cleanup.

use std::io;
use std::mem::size_of;

use pixmux_hal::PhysAddr;
use rustc_hash::FxHashMap;

use crate::error::{Result, VideoError};

/// First word of a zero-copy descriptor
pub const ZERO_COPY_MAGIC: usize = 0xbeef_c0de;

/// Mappings kept at once
pub const MAX_MAPPINGS: usize = 32;

/// The physical frame address carried by `buf`, if it is a zero-copy
/// descriptor.
pub fn zero_copy_address(buf: &[u8]) -> Option<PhysAddr> {
    const WORD: usize = size_of::<usize>();
    let magic: usize = bytemuck::pod_read_unaligned(buf.get(..WORD)?);
    if magic != ZERO_COPY_MAGIC {
        return None;
    }
    let addr: usize = bytemuck::pod_read_unaligned(buf.get(WORD..2 * WORD)?);
    Some(PhysAddr(addr as u64))
}

/// Build a zero-copy descriptor for `addr`.
pub fn zero_copy_descriptor(addr: PhysAddr) -> [usize; 2] {
    [ZERO_COPY_MAGIC, addr.0 as usize]
}

/// A read-only view of physical memory. Dropping it unmaps the memory.
pub trait MappedRegion {
    fn bytes(&self) -> &[u8];
}

/// Access to physical memory, such as `/dev/mem`.
pub trait PhysicalMemory {
    fn page_size(&self) -> usize;

    /// Map `len` bytes from the page-aligned address `page`.
    fn map_read_only(&mut self, page: PhysAddr, len: usize) -> io::Result<Box<dyn MappedRegion>>;
}

struct Mapping {
    region: Box<dyn MappedRegion>,
    /// Offset of the frame from the mapped page
    offset: usize,
}

impl Mapping {
    fn frame(&self) -> &[u8] {
        self.region.bytes().get(self.offset..).unwrap_or_default()
    }
}

/// Live mappings by frame address
pub struct MappingTable {
    mappings: FxHashMap<PhysAddr, Mapping>,
    capacity: usize,
}

impl Default for MappingTable {
    fn default() -> Self {
        Self::new(MAX_MAPPINGS)
    }
}

impl MappingTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            mappings: FxHashMap::default(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn contains(&self, addr: PhysAddr) -> bool {
        self.mappings.contains_key(&addr)
    }

    /// The `frame_bytes` long frame at `addr`, mapping it if needed.
    pub fn frame(
        &mut self,
        memory: &mut dyn PhysicalMemory,
        addr: PhysAddr,
        frame_bytes: usize,
    ) -> Result<&[u8]> {
        let mapped = self
            .mappings
            .get(&addr)
            .is_some_and(|m| m.frame().len() >= frame_bytes);
        if !mapped {
            if self.mappings.remove(&addr).is_none() && self.mappings.len() >= self.capacity {
                tracing::error!("unable to map physical buffer at {}: table is full", addr);
                return Err(VideoError::MappingTableFull);
            }
            let mapping = map_frame(memory, addr, frame_bytes)?;
            self.mappings.insert(addr, mapping);
        }

        let frame = self.mappings.get(&addr).map(Mapping::frame).unwrap_or_default();
        frame.get(..frame_bytes).ok_or(VideoError::ShortBuffer {
            needed: frame_bytes,
            actual: frame.len(),
        })
    }

    /// Drop every mapping.
    pub fn clear(&mut self) {
        if !self.mappings.is_empty() {
            tracing::debug!("unmapping {} physical buffers", self.mappings.len());
        }
        self.mappings.clear();
    }
}

fn map_frame(memory: &mut dyn PhysicalMemory, addr: PhysAddr, frame_bytes: usize) -> Result<Mapping> {
    let page_mask = memory.page_size().max(1) as u64 - 1;
    let page = PhysAddr(addr.0 & !page_mask);
    let offset = (addr.0 - page.0) as usize;
    let len = (offset + frame_bytes + page_mask as usize) & !(page_mask as usize);

    tracing::info!("mapping physical buffer at {} ({} bytes from {})", addr, len, page);
    let region = memory
        .map_read_only(page, len)
        .map_err(|source| VideoError::Map { addr, source })?;
    Ok(Mapping { region, offset })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeMemory {
        base: u64,
        bytes: Vec<u8>,
        maps: usize,
    }

    struct Window(Vec<u8>);

    impl MappedRegion for Window {
        fn bytes(&self) -> &[u8] {
            &self.0
        }
    }

    impl PhysicalMemory for FakeMemory {
        fn page_size(&self) -> usize {
            4096
        }

        fn map_read_only(&mut self, page: PhysAddr, len: usize) -> io::Result<Box<dyn MappedRegion>> {
            assert_eq!(page.0 % 4096, 0);
            assert_eq!(len % 4096, 0);
            self.maps += 1;
            let start = (page.0 - self.base) as usize;
            let window = self
                .bytes
                .get(start..start + len)
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "outside memory"))?;
            Ok(Box::new(Window(window.to_vec())))
        }
    }

    fn memory() -> FakeMemory {
        FakeMemory {
            base: 0x8000_0000,
            bytes: (0..64 * 1024).map(|i| (i % 251) as u8).collect(),
            maps: 0,
        }
    }

    #[test]
    fn test_descriptor_round_trip() {
        let words = zero_copy_descriptor(PhysAddr(0x8000_1234));
        let bytes: &[u8] = bytemuck::cast_slice(&words);
        assert_eq!(zero_copy_address(bytes), Some(PhysAddr(0x8000_1234)));

        assert_eq!(zero_copy_address(&[0u8; 16]), None);
        assert_eq!(zero_copy_address(&bytes[..4]), None);
    }

    #[test]
    fn test_unaligned_frame_is_mapped_from_its_page() {
        let mut mem = memory();
        let mut table = MappingTable::default();
        let addr = PhysAddr(0x8000_1010);

        let frame = table.frame(&mut mem, addr, 96).unwrap();
        assert_eq!(frame.len(), 96);
        assert_eq!(frame[0], (0x1010 % 251) as u8);

        table.frame(&mut mem, addr, 96).unwrap();
        assert_eq!(mem.maps, 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_larger_frame_remaps() {
        let mut mem = memory();
        let mut table = MappingTable::default();
        let addr = PhysAddr(0x8000_0000);
        table.frame(&mut mem, addr, 100).unwrap();
        table.frame(&mut mem, addr, 5000).unwrap();
        assert_eq!(mem.maps, 2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_full_table() {
        let mut mem = memory();
        let mut table = MappingTable::new(2);
        table.frame(&mut mem, PhysAddr(0x8000_0000), 16).unwrap();
        table.frame(&mut mem, PhysAddr(0x8000_1000), 16).unwrap();
        assert!(matches!(
            table.frame(&mut mem, PhysAddr(0x8000_2000), 16),
            Err(VideoError::MappingTableFull)
        ));
        assert!(table.contains(PhysAddr(0x8000_1000)));

        table.clear();
        assert!(table.is_empty());
        table.frame(&mut mem, PhysAddr(0x8000_2000), 16).unwrap();
    }

    #[test]
    fn test_map_failure() {
        let mut mem = memory();
        let mut table = MappingTable::default();
        let result = table.frame(&mut mem, PhysAddr(0x9000_0000), 16);
        assert!(matches!(result, Err(VideoError::Map { .. })));
        assert!(table.is_empty());
    }
}
