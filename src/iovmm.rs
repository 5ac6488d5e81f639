//! Generic translation-domain interface
//!
//! The surface through which a generic I/O virtual-memory layer drives this
//! device: region descriptors with externally supplied backing callbacks,
//! opaque domain handles, and the provider trait dispatched per logical
//! client request. The registration framework itself lives outside this
//! crate; a provider is announced under its fixed [`VMM_NAME`].

use crate::address::{Ppn, Vaddr};
use crate::config::SMMU_PAGE_SHIFT;
use crate::{AlignOps, SmmuResult};

/// Name this provider registers under.
pub const VMM_NAME: &str = "iovmm-smmu";

/// Backing-frame callbacks supplied by the buffer owner.
///
/// The translation layer never allocates mapped content itself; each page of
/// a region is resolved through these callbacks as it is mapped, and released
/// again on unmap or rollback.
pub trait RegionBacking {
    /// Resolves the physical frame backing the page at `offset` bytes into
    /// the region, pinning it resident for the lifetime of the mapping.
    /// Returns `None` if no valid frame can be produced.
    fn lock_makeresident(&self, offset: usize) -> Option<Ppn>;

    /// Releases the frame backing the page at `offset`.
    fn release(&self, offset: usize);
}

/// A virtually contiguous, page-granular region of I/O virtual space.
#[derive(Clone, Copy)]
pub struct IoRegion<'a> {
    start: Vaddr,
    length: usize,
    backing: Option<&'a dyn RegionBacking>,
}

impl<'a> IoRegion<'a> {
    /// Builds a region descriptor. `start` and `length` must be granule
    /// aligned.
    pub fn new(start: Vaddr, length: usize, backing: Option<&'a dyn RegionBacking>) -> Self {
        debug_assert!(start.is_page_aligned());
        debug_assert!(length % crate::config::SMMU_PAGE_SIZE == 0);
        IoRegion {
            start,
            length,
            backing,
        }
    }

    pub fn start(&self) -> Vaddr {
        self.start
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Number of granule pages the region covers.
    pub fn page_count(&self) -> usize {
        self.length >> SMMU_PAGE_SHIFT
    }

    pub fn backing(&self) -> Option<&'a dyn RegionBacking> {
        self.backing
    }
}

/// Handle to an allocated translation domain: one hardware address space
/// claimed for one logical client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainHandle {
    pub(crate) asid: usize,
}

impl DomainHandle {
    /// Hardware address-space identifier behind the handle.
    pub fn asid(&self) -> usize {
        self.asid
    }
}

/// Provider surface a generic translation-domain layer dispatches through.
pub trait IovmmDevice {
    /// Fixed provider name.
    fn name(&self) -> &'static str;

    /// log2 of the translation granule.
    fn pgsize_bits(&self) -> usize;

    /// Claims a free address space for `client_name` and steers the client's
    /// hardware group into it.
    fn alloc_domain(&self, client_name: &str) -> SmmuResult<DomainHandle>;

    /// Releases an address space: unbinds its hardware clients and tears
    /// down its tables.
    fn free_domain(&self, domain: DomainHandle);

    /// Establishes translations for every page of `region`. All-or-nothing.
    fn map(&self, domain: DomainHandle, region: &IoRegion<'_>) -> SmmuResult<()>;

    /// Removes the translations of `region`; with `decommit`, frees leaf
    /// tables that become empty.
    fn unmap(&self, domain: DomainHandle, region: &IoRegion<'_>, decommit: bool);

    /// Establishes a single fixed translation. `pfn` must be valid.
    fn map_pfn(&self, domain: DomainHandle, addr: Vaddr, pfn: Ppn);

    /// Snapshots the registers lost across system sleep.
    fn suspend(&self);

    /// Restores hardware state after system sleep.
    fn resume(&self);
}
