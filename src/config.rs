//! Constants for the SMMU translation hardware (platform-independent)
#![allow(unused)]

use static_assertions::const_assert_eq;

// CPU page size; must equal the hardware translation granule (checked at probe)
pub const PAGE_SIZE: usize = 4096;

// Hardware translation granule
pub const SMMU_PAGE_SHIFT: usize = 12;
pub const SMMU_PAGE_SIZE: usize = 1 << SMMU_PAGE_SHIFT;

// Two-level table geometry:
// [31:22] directory index, [21:12] leaf index, [11:0] page offset
pub const SMMU_PDIR_COUNT: usize = 1024;
pub const SMMU_PTBL_COUNT: usize = 1024;
pub const SMMU_PDN_SHIFT: usize = 22;

/// I/O virtual span covered by one directory entry (one leaf table)
pub const SMMU_PTBL_SPAN: usize = SMMU_PTBL_COUNT * SMMU_PAGE_SIZE;

// Hardware address-space slots
pub const SMMU_NUM_ASIDS: usize = 4;

// Physical frame number field of a PTE / directory pointer register
pub const SMMU_PFN_MASK: u32 = 0x000f_ffff;

/// Default page budget for the table pool: enough for every AS to hold a
/// fully-populated directory plus a generous number of leaf tables.
pub const DEFAULT_TABLE_PAGES: usize = 512;

// Geometry consistency: the two table levels plus the page offset cover the
// 32-bit I/O virtual space exactly
const_assert_eq!(SMMU_PAGE_SIZE, PAGE_SIZE);
const_assert_eq!(SMMU_PTBL_SPAN, 1 << SMMU_PDN_SHIFT);
const_assert_eq!(
    (SMMU_PDIR_COUNT as u64) * (SMMU_PTBL_COUNT as u64) * (SMMU_PAGE_SIZE as u64),
    1u64 << 32
);
