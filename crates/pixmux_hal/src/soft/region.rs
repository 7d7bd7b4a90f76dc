//! First-fit allocator over the soft device's memory.

/// A live allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Region {
    pub offset: usize,
    pub size: usize,
}

pub(crate) struct RegionAllocator {
    total: usize,
    align: usize,
    /// Sorted by offset
    regions: Vec<Region>,
}

impl RegionAllocator {
    pub fn new(total: usize, align: usize) -> Self {
        Self {
            total,
            align: align.max(1),
            regions: Vec::with_capacity(16),
        }
    }

    pub fn alloc(&mut self, size: usize) -> Option<usize> {
        if size == 0 || size > self.total {
            return None;
        }

        let mut candidate = 0;
        for region in &self.regions {
            if candidate + size <= region.offset {
                break;
            }
            candidate = (region.offset + region.size).next_multiple_of(self.align);
        }

        if candidate + size > self.total {
            return None;
        }

        let pos = self
            .regions
            .iter()
            .position(|r| r.offset > candidate)
            .unwrap_or(self.regions.len());
        self.regions.insert(pos, Region {
            offset: candidate,
            size,
        });
        Some(candidate)
    }

    pub fn free(&mut self, offset: usize) -> bool {
        match self.regions.iter().position(|r| r.offset == offset) {
            Some(pos) => {
                self.regions.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn used_bytes(&self) -> usize {
        self.regions.iter().map(|r| r.size).sum()
    }

    pub fn total_bytes(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_fit_reuses_gap() {
        let mut a = RegionAllocator::new(1024, 64);
        let first = a.alloc(100).unwrap();
        let second = a.alloc(100).unwrap();
        assert_eq!(first, 0);
        assert_eq!(second, 128);

        assert!(a.free(first));
        assert_eq!(a.alloc(64), Some(0));
        assert_eq!(a.used_bytes(), 164);
    }

    #[test]
    fn test_exhaustion() {
        let mut a = RegionAllocator::new(256, 64);
        assert!(a.alloc(200).is_some());
        assert_eq!(a.alloc(64), None);
        assert_eq!(a.alloc(0), None);
        assert!(!a.free(4));
    }
}
