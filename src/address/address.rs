use crate::address::operations::{AlignOps, CalcOps, UsizeConvert};
use crate::config::{SMMU_PAGE_SHIFT, SMMU_PAGE_SIZE};

// trait to represent an address
pub trait Address:
    CalcOps + AlignOps + UsizeConvert + Copy + Clone + PartialEq + PartialOrd + Eq + Ord
{
    fn is_null(self) -> bool {
        self.as_usize() == 0
    }

    fn null() -> Self {
        Self::from_usize(0)
    }

    fn page_offset(self) -> usize {
        self.as_usize() & (SMMU_PAGE_SIZE - 1)
    }

    fn add_by(self, offset: usize) -> Self {
        Self::from_usize(self.as_usize() + offset)
    }

    fn sub_by(self, offset: usize) -> Self {
        Self::from_usize(self.as_usize() - offset)
    }

    fn step_by(&mut self, offset: usize) {
        *self = self.add_by(offset);
    }

    fn step_back_by(&mut self, offset: usize) {
        *self = self.sub_by(offset);
    }
}

#[macro_export]
macro_rules! impl_address {
    ($type:ty) => {
        impl $crate::address::UsizeConvert for $type {
            fn as_usize(&self) -> usize {
                self.0
            }
            fn from_usize(value: usize) -> Self {
                Self(value)
            }
        }

        $crate::impl_calc_ops!($type);
        impl $crate::address::AlignOps for $type {}
        impl $crate::address::Address for $type {}
    };
}

/// Physical address of a backing frame or a register window.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Paddr(pub usize);
impl_address!(Paddr);

/// I/O virtual address as issued by a hardware bus-master client.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Vaddr(pub usize);
impl_address!(Vaddr);

/// Half-open range of addresses `[start, end)`.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct AddressRange<T: Address> {
    start: T,
    end: T,
}

impl<T: Address> AddressRange<T> {
    pub fn new(start: T, end: T) -> Self {
        debug_assert!(start <= end);
        AddressRange { start, end }
    }

    pub fn from_start_len(start: T, len: usize) -> Self {
        AddressRange {
            start,
            end: start.add_by(len),
        }
    }

    pub fn start(&self) -> T {
        self.start
    }

    pub fn end(&self) -> T {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end.as_usize() - self.start.as_usize()
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Number of whole translation-granule pages the range covers.
    pub fn page_count(&self) -> usize {
        self.len() >> SMMU_PAGE_SHIFT
    }

    pub fn contains(&self, addr: T) -> bool {
        self.start <= addr && addr < self.end
    }
}

/// Range of I/O virtual addresses (e.g. the remappable window).
pub type VaddrRange = AddressRange<Vaddr>;
