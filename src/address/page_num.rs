use crate::address::address::{Address, Paddr, Vaddr};
use crate::address::operations::{AlignOps, CalcOps, UsizeConvert};
use crate::config::SMMU_PAGE_SIZE;

// trait to represent a page number
pub trait PageNum:
    CalcOps + UsizeConvert + Copy + Clone + PartialEq + PartialOrd + Eq + Ord
{
    type TAddress: Address;

    fn step(&mut self) {
        self.step_by(1);
    }

    fn step_by(&mut self, offset: usize) {
        *self = Self::from_usize(self.as_usize() + offset);
    }

    fn from_addr_floor(addr: Self::TAddress) -> Self {
        Self::from_usize(addr.align_down_to_page().as_usize() / SMMU_PAGE_SIZE)
    }

    fn from_addr_ceil(addr: Self::TAddress) -> Self {
        Self::from_usize(addr.align_up_to_page().as_usize() / SMMU_PAGE_SIZE)
    }

    fn start_addr(self) -> Self::TAddress {
        Self::TAddress::from_usize(self.as_usize() * SMMU_PAGE_SIZE)
    }

    fn diff(self, other: Self) -> isize {
        self.as_usize() as isize - other.as_usize() as isize
    }
}

#[macro_export]
macro_rules! impl_page_num {
    ($type:ty, $addr_type:ty) => {
        impl $crate::address::UsizeConvert for $type {
            fn as_usize(&self) -> usize {
                self.0
            }

            fn from_usize(value: usize) -> Self {
                Self(value)
            }
        }

        $crate::impl_calc_ops!($type);

        impl $crate::address::PageNum for $type {
            type TAddress = $addr_type;
        }
    };
}

/// Physical page (frame) number, as resolved by the backing provider.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Ppn(pub usize);
impl_page_num!(Ppn, Paddr);

/// I/O virtual page number.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Vpn(pub usize);
impl_page_num!(Vpn, Vaddr);

#[cfg(test)]
mod page_num_tests {
    use super::*;

    #[test]
    fn test_addr_page_round_trip() {
        let addr = Vaddr(3 * SMMU_PAGE_SIZE + 5);
        assert_eq!(Vpn::from_addr_floor(addr), Vpn(3));
        assert_eq!(Vpn::from_addr_ceil(addr), Vpn(4));
        assert_eq!(Vpn(3).start_addr(), Vaddr(3 * SMMU_PAGE_SIZE));
    }

    #[test]
    fn test_stepping() {
        let mut ppn = Ppn(7);
        ppn.step();
        ppn.step_by(2);
        assert_eq!(ppn, Ppn(10));
        assert_eq!(ppn.diff(Ppn(7)), 3);
    }
}
