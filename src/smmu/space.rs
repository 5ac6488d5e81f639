use crate::address::Vaddr;
use crate::config::SMMU_PDIR_COUNT;
use crate::hw::clean_for_device;
use crate::hw::client::DomainHwcMap;
use crate::table::{
    PTE_ATTR, PageDirectory, Pde, Pte, PteFlags, TablePool, addr_to_pdn, addr_to_ptn,
};
use crate::SmmuResult;
use alloc::boxed::Box;
use alloc::vec::Vec;
use log::error;
use spin::Mutex;

/// One hardware address-space slot.
///
/// The slot exists for the whole device lifetime; it is "free" while no
/// binding group points at it. The mutex guards the directory, the occupancy
/// counters and every leaf table reachable from the directory.
#[derive(Debug)]
pub(crate) struct AddressSpace {
    asid: usize,
    pub(crate) inner: Mutex<AsInner>,
}

impl AddressSpace {
    pub(crate) fn new(asid: usize) -> Self {
        AddressSpace {
            asid,
            inner: Mutex::new(AsInner::new()),
        }
    }

    pub(crate) fn asid(&self) -> usize {
        self.asid
    }
}

/// Mutable state of an address space; all access goes through the slot lock.
#[derive(Debug)]
pub(crate) struct AsInner {
    /// Binding group currently steered into this ASID; `None` marks the
    /// slot free.
    pub(crate) hwclients: Option<&'static DomainHwcMap>,
    /// Lazily created page directory.
    pdir: Option<Box<PageDirectory>>,
    /// Mapped-entry count per directory slot; a leaf table is freed exactly
    /// when its count returns to zero.
    pte_count: Vec<u32>,
    /// Attributes applied to every leaf translation.
    pub(crate) pte_attr: PteFlags,
}

impl AsInner {
    fn new() -> Self {
        AsInner {
            hwclients: None,
            pdir: None,
            pte_count: Vec::new(),
            pte_attr: PTE_ATTR,
        }
    }

    pub(crate) fn is_free(&self) -> bool {
        self.hwclients.is_none()
    }

    pub(crate) fn pdir(&self) -> Option<&PageDirectory> {
        self.pdir.as_deref()
    }

    /// Creates the directory if this slot does not have one yet.
    pub(crate) fn alloc_pdir(&mut self, pool: &mut TablePool) -> SmmuResult<()> {
        if self.pdir.is_some() {
            return Ok(());
        }
        let pte_count = alloc::vec![0u32; SMMU_PDIR_COUNT];
        let pdir = match pool.alloc_directory() {
            Ok(pdir) => pdir,
            Err(e) => {
                error!("smmu: failed to allocate page directory");
                return Err(e);
            }
        };
        clean_for_device(&*pdir);
        self.pte_count = pte_count;
        self.pdir = Some(pdir);
        Ok(())
    }

    /// Releases the leaf table behind directory slot `pdn`, if present, and
    /// publishes the now-vacant directory entry.
    pub(crate) fn free_ptbl(&mut self, pool: &mut TablePool, pdn: usize) {
        let Some(pdir) = self.pdir.as_mut() else {
            return;
        };
        if let Some(table) = pdir.entry_mut(pdn).take_table() {
            pool.free_table(table);
            clean_for_device(pdir.entry(pdn));
        }
    }

    /// Tears down the directory and every leaf table reachable from it.
    pub(crate) fn free_pdir(&mut self, pool: &mut TablePool) {
        if let Some(mut pdir) = self.pdir.take() {
            for pdn in 0..SMMU_PDIR_COUNT {
                if let Some(table) = pdir.entry_mut(pdn).take_table() {
                    pool.free_table(table);
                }
            }
            pool.free_directory(pdir);
            self.pte_count = Vec::new();
        }
    }

    /// Finds the leaf entry translating `addr`, together with the occupancy
    /// counter of its table.
    ///
    /// With `allocate` set, a vacant directory slot gets a fresh leaf table:
    /// the table is fully populated and published before the directory entry
    /// linking it is written and published, so a concurrent hardware walk
    /// never chases a link to unpublished lines. Without `allocate`, a
    /// vacant slot yields `Ok(None)`.
    ///
    /// The slot must have a directory; translation against an unallocated
    /// domain is a caller bug.
    pub(crate) fn locate_pte(
        &mut self,
        addr: Vaddr,
        allocate: Option<&mut TablePool>,
    ) -> SmmuResult<Option<(&mut Pte, &mut u32)>> {
        let pdn = addr_to_pdn(addr);
        let ptn = addr_to_ptn(addr);
        let pdir = self
            .pdir
            .as_mut()
            .expect("translation on a domain with no directory");

        if pdir.entry(pdn).is_vacant() {
            let Some(pool) = allocate else {
                return Ok(None);
            };
            let table = match pool.alloc_table() {
                Ok(table) => table,
                Err(e) => {
                    error!("smmu: failed to allocate page table");
                    return Err(e);
                }
            };
            clean_for_device(&*table);
            pdir.entry_mut(pdn).link(table);
            clean_for_device(pdir.entry(pdn));
        }

        let counter = &mut self.pte_count[pdn];
        match pdir.entry_mut(pdn) {
            Pde::Table(table) => Ok(Some((table.entry_mut(ptn), counter))),
            Pde::Vacant => unreachable!("directory entry vacant after link"),
        }
    }

    /// Occupancy counter of directory slot `pdn` next to the actual number
    /// of mapped entries in its table (0/0 for a vacant slot).
    #[cfg(test)]
    pub(crate) fn occupancy(&self, pdn: usize) -> (u32, usize) {
        let counted = self.pte_count.get(pdn).copied().unwrap_or(0);
        let actual = self
            .pdir
            .as_ref()
            .and_then(|pdir| pdir.entry(pdn).table())
            .map(|table| table.occupied())
            .unwrap_or(0);
        (counted, actual)
    }
}
