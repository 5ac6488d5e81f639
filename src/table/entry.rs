use crate::address::{Ppn, UsizeConvert, Vaddr};
use crate::config::{SMMU_PAGE_SHIFT, SMMU_PDIR_COUNT, SMMU_PDN_SHIFT, SMMU_PTBL_COUNT};
use alloc::boxed::Box;

bitflags::bitflags! {
    /// Attribute bits of a translation entry, in the positions the hardware
    /// defines for the directory-pointer and PTE words.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u32 {
        const NEXT      = 1 << 28;  // directory entry points to a next-level table
        const NONSECURE = 1 << 29;  // access is not checked against the security register
        const WRITABLE  = 1 << 30;
        const READABLE  = 1 << 31;
    }
}

/// Default attributes for a leaf translation.
pub const PTE_ATTR: PteFlags = PteFlags::READABLE
    .union(PteFlags::WRITABLE)
    .union(PteFlags::NONSECURE);

/// Attributes of the per-ASID directory pointer.
pub const PDIR_ATTR: PteFlags = PTE_ATTR;

/// I/O virtual address → virtual page number.
pub fn addr_to_pfn(addr: Vaddr) -> usize {
    addr.as_usize() >> SMMU_PAGE_SHIFT
}

/// I/O virtual address → directory index.
pub fn addr_to_pdn(addr: Vaddr) -> usize {
    addr.as_usize() >> SMMU_PDN_SHIFT
}

/// I/O virtual address → index within the leaf table.
pub fn addr_to_ptn(addr: Vaddr) -> usize {
    addr_to_pfn(addr) & (SMMU_PTBL_COUNT - 1)
}

/// Leaf page-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pte {
    /// No translation for this page.
    #[default]
    Vacant,
    /// Page translated to `pfn` with `attrs`.
    Mapped { pfn: Ppn, attrs: PteFlags },
}

impl Pte {
    pub fn new_mapped(pfn: Ppn, attrs: PteFlags) -> Self {
        Pte::Mapped { pfn, attrs }
    }

    pub fn is_vacant(&self) -> bool {
        matches!(self, Pte::Vacant)
    }

    pub fn is_mapped(&self) -> bool {
        !self.is_vacant()
    }

    pub fn pfn(&self) -> Option<Ppn> {
        match self {
            Pte::Vacant => None,
            Pte::Mapped { pfn, .. } => Some(*pfn),
        }
    }

    pub fn clear(&mut self) {
        *self = Pte::Vacant;
    }
}

/// Directory entry. A non-vacant entry owns its leaf table, so every table
/// reachable from a directory is owned by exactly one address space.
#[derive(Debug, Default)]
pub enum Pde {
    /// No leaf table behind this directory slot.
    #[default]
    Vacant,
    /// Slot populated with a leaf table.
    Table(Box<PageTable>),
}

impl Pde {
    pub fn is_vacant(&self) -> bool {
        matches!(self, Pde::Vacant)
    }

    pub fn table(&self) -> Option<&PageTable> {
        match self {
            Pde::Vacant => None,
            Pde::Table(table) => Some(table),
        }
    }

    pub fn table_mut(&mut self) -> Option<&mut PageTable> {
        match self {
            Pde::Vacant => None,
            Pde::Table(table) => Some(table),
        }
    }

    /// Unlinks and returns the leaf table, leaving the slot vacant.
    pub fn take_table(&mut self) -> Option<Box<PageTable>> {
        match core::mem::take(self) {
            Pde::Vacant => None,
            Pde::Table(table) => Some(table),
        }
    }

    /// Links a leaf table into the slot. The slot must be vacant.
    pub fn link(&mut self, table: Box<PageTable>) {
        debug_assert!(self.is_vacant());
        *self = Pde::Table(table);
    }
}

/// Second-level (leaf) translation table.
#[derive(Debug)]
pub struct PageTable {
    entries: [Pte; SMMU_PTBL_COUNT],
}

impl PageTable {
    /// A fully vacant table.
    pub fn new() -> Self {
        PageTable {
            entries: [Pte::Vacant; SMMU_PTBL_COUNT],
        }
    }

    pub fn entry(&self, ptn: usize) -> &Pte {
        &self.entries[ptn]
    }

    pub fn entry_mut(&mut self, ptn: usize) -> &mut Pte {
        &mut self.entries[ptn]
    }

    /// Number of mapped entries; the occupancy counter kept by the owning
    /// address space must always equal this.
    pub fn occupied(&self) -> usize {
        self.entries.iter().filter(|pte| pte.is_mapped()).count()
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

/// First-level page directory of one address space.
#[derive(Debug)]
pub struct PageDirectory {
    entries: [Pde; SMMU_PDIR_COUNT],
}

impl PageDirectory {
    /// A fully vacant directory.
    pub fn new() -> Self {
        PageDirectory {
            entries: core::array::from_fn(|_| Pde::Vacant),
        }
    }

    pub fn entry(&self, pdn: usize) -> &Pde {
        &self.entries[pdn]
    }

    pub fn entry_mut(&mut self, pdn: usize) -> &mut Pde {
        &mut self.entries[pdn]
    }
}

impl Default for PageDirectory {
    fn default() -> Self {
        Self::new()
    }
}
