use crate::address::{Address, Ppn, UsizeConvert, Vaddr};
use crate::config::{SMMU_PAGE_SHIFT, SMMU_PAGE_SIZE, SMMU_PFN_MASK};
use crate::hw::clean_for_device;
use crate::hw::regs::{self, RegisterIo, ptc_flush_adr, tlb_flush_va_group};
use crate::iovmm::{DomainHandle, IoRegion};
use crate::smmu::space::AsInner;
use crate::table::{Pte, addr_to_pdn};
use crate::{SmmuDevice, SmmuError, SmmuResult};
use log::{error, warn};

impl<R: RegisterIo> SmmuDevice<R> {
    /// Invalidates one changed translation: the TLB VA group holding `iova`,
    /// scoped to `asid`, and the PTC line holding the entry at `pte_line`.
    fn flush_tlb_and_ptc(&self, asid: usize, iova: Vaddr, pte_line: usize) {
        self.regs
            .write(regs::MC_SMMU_TLB_FLUSH_0, tlb_flush_va_group(asid, iova));
        self.regs
            .write(regs::MC_SMMU_PTC_FLUSH_0, ptc_flush_adr(pte_line));
        self.flush_smmu_regs();
    }

    /// Maps every page of `region`, resolving the backing frame of each page
    /// through the region's [`crate::iovmm::RegionBacking`] as it goes.
    ///
    /// Pages are established in ascending address order. The AS lock is
    /// dropped around each frame resolution — the provider may block or
    /// re-enter translation — and re-acquired for the table mutation. On any
    /// failure the pages already established are torn down again in
    /// descending order and the call returns `OutOfMemory` with no trace
    /// left behind.
    pub fn map(&self, domain: DomainHandle, region: &IoRegion<'_>) -> SmmuResult<()> {
        let as_ = &self.ases[domain.asid()];
        let ops = region.backing().expect("map requires a backing provider");
        let pcount = region.page_count();
        let mut addr = region.start();

        for i in 0..pcount {
            let Some(pfn) = ops.lock_makeresident(i << SMMU_PAGE_SHIFT) else {
                error!("smmu: no backing frame for page {} of region", i);
                let mut inner = as_.inner.lock();
                self.rollback_map(&mut inner, region, i, addr);
                return Err(SmmuError::OutOfMemory);
            };

            let pte_line;
            {
                let mut inner = as_.inner.lock();
                debug_assert!(!inner.is_free(), "map on a free address space");
                let attrs = inner.pte_attr;
                let mut pool = self.pool.lock();
                match inner.locate_pte(addr, Some(&mut pool)) {
                    Ok(Some((pte, pte_counter))) => {
                        if pte.is_vacant() {
                            *pte_counter += 1;
                        }
                        *pte = Pte::new_mapped(pfn, attrs);
                        // A mapped entry can never read back vacant; the
                        // counter follows the entry state exactly.
                        debug_assert!(pte.is_mapped());
                        clean_for_device(pte);
                        pte_line = core::ptr::from_ref(pte) as usize;
                    }
                    Ok(None) => unreachable!("allocating locate returned no entry"),
                    Err(e) => {
                        drop(pool);
                        self.rollback_map(&mut inner, region, i, addr);
                        return Err(e);
                    }
                }
            }
            self.flush_tlb_and_ptc(domain.asid(), addr, pte_line);
            addr.step_by(SMMU_PAGE_SIZE);
        }
        Ok(())
    }

    /// Unwinds the first `mapped` pages of a partially established region,
    /// highest address first: release the backing frame, vacate the entry,
    /// and free any leaf table whose occupancy returns to zero. Caller holds
    /// the AS lock.
    fn rollback_map(&self, inner: &mut AsInner, region: &IoRegion<'_>, mapped: usize, addr: Vaddr) {
        let ops = region.backing();
        let mut pool = self.pool.lock();
        let mut addr = addr;
        for i in (0..mapped).rev() {
            if let Some(ops) = ops {
                ops.release(i << SMMU_PAGE_SHIFT);
            }
            addr.step_back_by(SMMU_PAGE_SIZE);
            let pdn = addr_to_pdn(addr);
            if let Ok(Some((pte, pte_counter))) = inner.locate_pte(addr, None) {
                if pte.is_mapped() {
                    pte.clear();
                    clean_for_device(pte);
                    debug_assert!(*pte_counter > 0, "occupancy underflow");
                    *pte_counter -= 1;
                    if *pte_counter == 0 {
                        inner.free_ptbl(&mut pool, pdn);
                    }
                }
            }
        }
    }

    /// Removes the translations of `region` in ascending order, releasing
    /// each page's backing frame when the region carries a provider.
    ///
    /// With `decommit`, a leaf table whose occupancy returns to zero is
    /// freed, followed by a full flush — the freed table's lines are stale
    /// throughout the PTC, not just one entry. Entries already vacant are
    /// skipped, so unmapping the same region twice is harmless.
    ///
    /// The whole call runs under the AS lock: unlike `map`, nothing here can
    /// block or fail midway.
    pub fn unmap(&self, domain: DomainHandle, region: &IoRegion<'_>, decommit: bool) {
        let as_ = &self.ases[domain.asid()];
        let mut inner = as_.inner.lock();
        debug_assert!(!inner.is_free(), "unmap on a free address space");
        let mut addr = region.start();

        for i in 0..region.page_count() {
            if let Some(ops) = region.backing() {
                ops.release(i << SMMU_PAGE_SHIFT);
            }

            let pdn = addr_to_pdn(addr);
            if let Ok(Some((pte, pte_counter))) = inner.locate_pte(addr, None) {
                if pte.is_mapped() {
                    pte.clear();
                    clean_for_device(pte);
                    debug_assert!(*pte_counter > 0, "occupancy underflow");
                    *pte_counter -= 1;
                    if *pte_counter == 0 && decommit {
                        let mut pool = self.pool.lock();
                        inner.free_ptbl(&mut pool, pdn);
                        drop(pool);
                        self.flush_all(false);
                    }
                }
            }
            addr.step_by(SMMU_PAGE_SIZE);
        }
    }

    /// Establishes a single fixed translation of `addr` to `pfn`.
    ///
    /// The frame must already be valid and resident — passing an invalid
    /// frame is a caller bug, not a runtime condition. If no table page can
    /// be produced the translation is skipped with a warning.
    pub fn map_pfn(&self, domain: DomainHandle, addr: Vaddr, pfn: Ppn) {
        assert!(
            pfn.as_usize() <= SMMU_PFN_MASK as usize,
            "invalid frame number"
        );
        let as_ = &self.ases[domain.asid()];
        let mut inner = as_.inner.lock();
        debug_assert!(!inner.is_free(), "map_pfn on a free address space");
        let attrs = inner.pte_attr;

        let pte_line;
        {
            let mut pool = self.pool.lock();
            match inner.locate_pte(addr, Some(&mut pool)) {
                Ok(Some((pte, pte_counter))) => {
                    if pte.is_vacant() {
                        *pte_counter += 1;
                    }
                    *pte = Pte::new_mapped(pfn, attrs);
                    debug_assert!(pte.is_mapped());
                    clean_for_device(pte);
                    pte_line = core::ptr::from_ref(pte) as usize;
                }
                Ok(None) => unreachable!("allocating locate returned no entry"),
                Err(_) => {
                    warn!("smmu: map_pfn at {:?} found no table memory", addr);
                    return;
                }
            }
        }
        self.flush_tlb_and_ptc(domain.asid(), addr, pte_line);
    }
}

#[cfg(test)]
mod translate_tests {
    use super::*;
    use crate::address::VaddrRange;
    use crate::config::{SMMU_PDN_SHIFT, SMMU_PTBL_SPAN};
    use crate::hw::regs::RegisterFile;
    use crate::iovmm::IoRegion;
    use crate::smmu::tests_common::{SeqBacking, probe_default};
    use crate::SmmuPlatform;

    fn region<'a>(start: usize, pages: usize, ops: &'a SeqBacking) -> IoRegion<'a> {
        IoRegion::new(Vaddr(start), pages * SMMU_PAGE_SIZE, Some(ops))
    }

    // 1. Mapping one page creates one directory entry with occupancy 1
    #[test]
    fn test_map_single_page() {
        let dev = probe_default();
        let domain = dev.alloc_domain("nvmap").expect("alloc");
        let backing = SeqBacking::new(0x100);

        dev.map(domain, &region(0, 1, &backing)).expect("map");

        let mut inner = dev.ases[domain.asid()].inner.lock();
        assert_eq!(inner.occupancy(0), (1, 1));
        let (pte, _) = inner
            .locate_pte(Vaddr(0), None)
            .expect("lookup")
            .expect("mapped entry");
        assert_eq!(pte.pfn(), Some(Ppn(0x100)));
        drop(inner);

        assert_eq!(dev.pool.lock().pages_in_use(), 2); // directory + one table

        dev.unmap(domain, &region(0, 1, &backing), true);
        dev.free_domain(domain);
    }

    // 2. Pages in different directory slots get independent tables
    #[test]
    fn test_map_spans_directory_entries() {
        let dev = probe_default();
        let domain = dev.alloc_domain("nvmap").expect("alloc");
        let backing = SeqBacking::new(0x100);

        dev.map(domain, &region(0, 1, &backing)).expect("first slot");
        dev.map(domain, &region(SMMU_PTBL_SPAN, 1, &backing))
            .expect("second slot");

        {
            let inner = dev.ases[domain.asid()].inner.lock();
            assert_eq!(inner.occupancy(0), (1, 1));
            assert_eq!(inner.occupancy(1), (1, 1));
        }
        assert_eq!(dev.pool.lock().pages_in_use(), 3);

        dev.free_domain(domain);
        assert_eq!(dev.pool.lock().pages_in_use(), 0);
    }

    // 3. map writes the resolved frames into the entries in order
    #[test]
    fn test_map_records_frames() {
        let dev = probe_default();
        let domain = dev.alloc_domain("nvmap").expect("alloc");
        let backing = SeqBacking::new(0x200);

        dev.map(domain, &region(0x8000, 4, &backing)).expect("map");

        let mut inner = dev.ases[domain.asid()].inner.lock();
        for page in 0..4 {
            let addr = Vaddr(0x8000 + page * SMMU_PAGE_SIZE);
            let (pte, _) = inner
                .locate_pte(addr, None)
                .expect("lookup")
                .expect("mapped entry");
            assert_eq!(pte.pfn(), Some(Ppn(0x200 + page)));
        }
        drop(inner);

        dev.unmap(domain, &region(0x8000, 4, &backing), true);
        dev.free_domain(domain);
    }

    // 4. Round trip: unmap with decommit restores the pre-map table state
    #[test]
    fn test_map_unmap_round_trip() {
        let dev = probe_default();
        let domain = dev.alloc_domain("nvmap").expect("alloc");
        let backing = SeqBacking::new(0x300);
        let baseline = dev.pool.lock().pages_in_use();

        let r = region(0x10_0000, 8, &backing);
        dev.map(domain, &r).expect("map");
        dev.unmap(domain, &r, true);

        assert_eq!(dev.pool.lock().pages_in_use(), baseline);
        {
            let inner = dev.ases[domain.asid()].inner.lock();
            assert_eq!(inner.occupancy(addr_to_pdn(Vaddr(0x10_0000))), (0, 0));
        }
        assert_eq!(backing.released.borrow().len(), 8);

        dev.free_domain(domain);
    }

    // 5. Unmap is idempotent: the second pass finds only vacant entries
    #[test]
    fn test_unmap_idempotent() {
        let dev = probe_default();
        let domain = dev.alloc_domain("nvmap").expect("alloc");
        let backing = SeqBacking::new(0x400);

        let r = region(0, 2, &backing);
        dev.map(domain, &r).expect("map");
        dev.unmap(domain, &r, true);
        let pages_after_first = dev.pool.lock().pages_in_use();

        dev.unmap(domain, &r, true);
        assert_eq!(dev.pool.lock().pages_in_use(), pages_after_first);
        {
            let inner = dev.ases[domain.asid()].inner.lock();
            assert_eq!(inner.occupancy(0), (0, 0));
        }

        dev.free_domain(domain);
    }

    // 6. Without decommit the emptied leaf table stays allocated for reuse
    #[test]
    fn test_unmap_without_decommit_keeps_table() {
        let dev = probe_default();
        let domain = dev.alloc_domain("nvmap").expect("alloc");
        let backing = SeqBacking::new(0x500);

        let r = region(0, 1, &backing);
        dev.map(domain, &r).expect("map");
        dev.unmap(domain, &r, false);

        assert_eq!(dev.pool.lock().pages_in_use(), 2); // table kept
        {
            let inner = dev.ases[domain.asid()].inner.lock();
            assert_eq!(inner.occupancy(0), (0, 0));
        }

        dev.free_domain(domain);
        assert_eq!(dev.pool.lock().pages_in_use(), 0);
    }

    // 7. Rollback atomicity: failure at page k unwinds pages 0..k completely
    #[test]
    fn test_map_rollback_on_failed_resolution() {
        let dev = probe_default();
        let domain = dev.alloc_domain("nvmap").expect("alloc");
        let backing = SeqBacking::failing_at(0x600, 5);
        let baseline = dev.pool.lock().pages_in_use();

        let r = region(0, 8, &backing);
        assert_eq!(dev.map(domain, &r).expect_err("page 5 fails"), SmmuError::OutOfMemory);

        // Pages 0..5 were released, in descending order
        let released = backing.released.borrow();
        let expected: Vec<usize> = (0..5).rev().map(|i| i * SMMU_PAGE_SIZE).collect();
        assert_eq!(*released, expected);
        drop(released);

        // No table pages leaked, no entry left behind
        assert_eq!(dev.pool.lock().pages_in_use(), baseline);
        {
            let inner = dev.ases[domain.asid()].inner.lock();
            assert_eq!(inner.occupancy(0), (0, 0));
        }

        dev.free_domain(domain);
    }

    // 8. Rollback on table-pool exhaustion mid-region
    #[test]
    fn test_map_rollback_on_pool_exhaustion() {
        let mut p = SmmuPlatform::new(
            RegisterFile::new(),
            VaddrRange::from_start_len(Vaddr(0), 1 << 30),
        );
        p.table_pages = 2; // directory + one leaf table
        let dev = SmmuDevice::probe(p).expect("probe");
        let domain = dev.alloc_domain("nvmap").expect("alloc");
        let backing = SeqBacking::new(0x700);

        // First page lands in slot 0; second needs a table the pool cannot
        // provide
        let r = IoRegion::new(
            Vaddr(SMMU_PTBL_SPAN - SMMU_PAGE_SIZE),
            2 * SMMU_PAGE_SIZE,
            Some(&backing),
        );
        assert_eq!(dev.map(domain, &r).expect_err("pool exhausted"), SmmuError::OutOfMemory);

        assert_eq!(dev.pool.lock().pages_in_use(), 1); // directory only
        {
            let inner = dev.ases[domain.asid()].inner.lock();
            assert_eq!(inner.occupancy(0), (0, 0));
            assert_eq!(inner.occupancy(1), (0, 0));
        }

        dev.free_domain(domain);
    }

    // 9. Occupancy counters always match the table contents
    #[test]
    fn test_occupancy_invariant_across_operations() {
        let dev = probe_default();
        let domain = dev.alloc_domain("nvmap").expect("alloc");
        let backing = SeqBacking::new(0x800);

        dev.map(domain, &region(0, 6, &backing)).expect("map six");
        dev.unmap(domain, &region(0, 3, &backing), false);
        dev.map(domain, &region(SMMU_PAGE_SIZE, 2, &backing))
            .expect("remap overlap");

        {
            let inner = dev.ases[domain.asid()].inner.lock();
            let (counted, actual) = inner.occupancy(0);
            assert_eq!(counted as usize, actual);
            assert_eq!(actual, 5); // pages 1..6 mapped, page 0 vacant
        }

        dev.unmap(domain, &region(0, 6, &backing), true);
        {
            let inner = dev.ases[domain.asid()].inner.lock();
            assert_eq!(inner.occupancy(0), (0, 0));
        }
        dev.free_domain(domain);
    }

    // 10. map_pfn establishes a single fixed translation
    #[test]
    fn test_map_pfn() {
        let dev = probe_default();
        let domain = dev.alloc_domain("nvmap").expect("alloc");

        let addr = Vaddr(3 << SMMU_PDN_SHIFT);
        dev.map_pfn(domain, addr, Ppn(0x9a));

        {
            let mut inner = dev.ases[domain.asid()].inner.lock();
            assert_eq!(inner.occupancy(3), (1, 1));
            let (pte, _) = inner
                .locate_pte(addr, None)
                .expect("lookup")
                .expect("entry");
            assert_eq!(pte.pfn(), Some(Ppn(0x9a)));
        }

        dev.unmap(domain, &IoRegion::new(addr, SMMU_PAGE_SIZE, None), true);
        dev.free_domain(domain);
    }

    // 11. Targeted flush words reach the hardware on map
    #[test]
    fn test_map_issues_targeted_flush() {
        let dev = probe_default();
        let domain = dev.alloc_domain("nvmap").expect("alloc");
        let backing = SeqBacking::new(0xb0);

        let addr = 7 * SMMU_PAGE_SIZE;
        dev.map(domain, &region(addr, 1, &backing)).expect("map");

        let tlb = dev.regs.read(regs::MC_SMMU_TLB_FLUSH_0);
        assert_eq!(tlb, tlb_flush_va_group(domain.asid(), Vaddr(addr)));
        let ptc = dev.regs.read(regs::MC_SMMU_PTC_FLUSH_0);
        assert_eq!(
            ptc & regs::MC_SMMU_PTC_FLUSH_0_PTC_FLUSH_TYPE_ADR,
            regs::MC_SMMU_PTC_FLUSH_0_PTC_FLUSH_TYPE_ADR
        );

        dev.unmap(domain, &region(addr, 1, &backing), true);
        dev.free_domain(domain);
    }
}
