use crate::address::{Vaddr, VaddrRange};
use crate::config::{
    DEFAULT_TABLE_PAGES, PAGE_SIZE, SMMU_NUM_ASIDS, SMMU_PAGE_SHIFT, SMMU_PAGE_SIZE,
};
use crate::hw::client::{DEFAULT_HWC_MAP, DomainHwcMap, HWC_COUNT, HWC_STATE_INIT, HwcState};
use crate::hw::regs::{self, RegisterIo, mk_pdir, ptb_asid, ptc_flush_all, tlb_flush_all};
use crate::iovmm::{DomainHandle, IoRegion, IovmmDevice, VMM_NAME};
use crate::smmu::space::AddressSpace;
use crate::table::{PDIR_ATTR, TablePool};
use crate::{Ppn, SmmuError, SmmuResult};
use alloc::vec::Vec;
use core::sync::atomic::{Ordering, fence};
use log::{error, info};
use spin::Mutex;

/// Probe-time resources and configuration of one SMMU instance.
///
/// `regs` and `window` model the two memory-mapped resources the platform
/// hands to the driver; probe fails with [`SmmuError::ResourceMissing`] when
/// either is absent.
pub struct SmmuPlatform<R> {
    /// Register window.
    pub regs: Option<R>,
    /// Remappable I/O virtual window.
    pub window: Option<VaddrRange>,
    /// Page size of the hosting CPU; must equal the translation granule.
    pub page_size: usize,
    /// Page budget for translation-table storage.
    pub table_pages: usize,
    /// Consumer-name → hardware-client binding table.
    pub hwc_map: &'static [DomainHwcMap],
    /// First usable ASID; lower slots are reserved for hardware testing.
    pub lowest_asid: usize,
    /// Program the TLB/PTC hit-miss statistics counters at bring-up.
    pub stats: bool,
}

impl<R> SmmuPlatform<R> {
    /// Descriptor with default geometry and the default binding table.
    pub fn new(regs: R, window: VaddrRange) -> Self {
        SmmuPlatform {
            regs: Some(regs),
            window: Some(window),
            page_size: PAGE_SIZE,
            table_pages: DEFAULT_TABLE_PAGES,
            hwc_map: DEFAULT_HWC_MAP,
            lowest_asid: 0,
            stats: false,
        }
    }
}

/// Device-global state guarded by the register spinlock.
#[derive(Debug)]
pub(crate) struct GlobalState {
    /// Steering state of every hardware client, index-matched to the client
    /// enumeration.
    pub(crate) hwc_state: [HwcState; HWC_COUNT],
    // Register images saved across suspend
    pub(crate) translation_enable_0: u32,
    pub(crate) translation_enable_1: u32,
    pub(crate) translation_enable_2: u32,
    pub(crate) asid_security: u32,
    /// Hardware consults the per-ASID tables only while set.
    pub(crate) enable: bool,
    pub(crate) lowest_asid: usize,
}

/// One SMMU instance.
///
/// Constructed by [`SmmuDevice::probe`] and owned by the registration
/// framework; destroyed on remove. Two address spaces can be mutated fully
/// concurrently; the global lock covers only the short sections that touch
/// shared registers and the client claim table, and is never held across
/// an allocation.
#[derive(Debug)]
pub struct SmmuDevice<R: RegisterIo> {
    pub(crate) regs: R,
    pub(crate) iovmm_base: Vaddr,
    pub(crate) page_count: usize,
    pub(crate) hwc_map: &'static [DomainHwcMap],
    pub(crate) stats: bool,
    pub(crate) pool: Mutex<TablePool>,
    pub(crate) global: Mutex<GlobalState>,
    pub(crate) ases: Vec<AddressSpace>,
}

impl<R: RegisterIo> SmmuDevice<R> {
    /// Brings up the device: validates resources and configuration, programs
    /// every register from its initial state and enables translation.
    pub fn probe(platform: SmmuPlatform<R>) -> SmmuResult<Self> {
        if platform.page_size != SMMU_PAGE_SIZE {
            error!("smmu: SMMU and CPU page sizes must match");
            return Err(SmmuError::PageSizeMismatch);
        }
        if HWC_STATE_INIT.len() != HWC_COUNT {
            error!("smmu: client state initializer does not match the client enumeration");
            return Err(SmmuError::HwcTableSizeMismatch);
        }
        let (Some(regs), Some(window)) = (platform.regs, platform.window) else {
            error!("smmu: no register or window resource");
            return Err(SmmuError::ResourceMissing);
        };
        if window.is_empty() {
            error!("smmu: empty remappable window");
            return Err(SmmuError::ResourceMissing);
        }

        let mut hwc_state = [HwcState {
            reg: 0,
            enable_disable: 0,
        }; HWC_COUNT];
        hwc_state.copy_from_slice(HWC_STATE_INIT);

        let dev = SmmuDevice {
            regs,
            iovmm_base: window.start(),
            page_count: window.page_count(),
            hwc_map: platform.hwc_map,
            stats: platform.stats,
            pool: Mutex::new(TablePool::new(platform.table_pages)),
            global: Mutex::new(GlobalState {
                hwc_state,
                translation_enable_0: !0,
                translation_enable_1: !0,
                translation_enable_2: !0,
                asid_security: 0,
                enable: false,
                lowest_asid: platform.lowest_asid,
            }),
            ases: (0..SMMU_NUM_ASIDS).map(AddressSpace::new).collect(),
        };

        dev.setup_regs();
        dev.global.lock().enable = true;
        info!(
            "smmu: {} ready, {} remappable pages, {} address spaces",
            VMM_NAME, dev.page_count, SMMU_NUM_ASIDS
        );
        Ok(dev)
    }

    /// Base of the remappable window.
    pub fn iovmm_base(&self) -> Vaddr {
        self.iovmm_base
    }

    /// Size of the remappable window in granule pages.
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Completes posted register writes: write barrier, then a read-back of
    /// CONFIG.
    pub(crate) fn flush_smmu_regs(&self) {
        fence(Ordering::SeqCst);
        let _ = self.regs.read(regs::MC_SMMU_CONFIG_0);
    }

    /// Invalidates every TLB entry and every PTC entry, optionally
    /// re-asserting the global enable, and waits for completion.
    pub(crate) fn flush_all(&self, enable: bool) {
        self.regs.write(regs::MC_SMMU_TLB_FLUSH_0, tlb_flush_all());
        self.regs.write(regs::MC_SMMU_PTC_FLUSH_0, ptc_flush_all());
        if enable {
            self.regs.write(
                regs::MC_SMMU_CONFIG_0,
                regs::MC_SMMU_CONFIG_0_SMMU_ENABLE_ENABLE,
            );
        }
        self.flush_smmu_regs();
    }

    /// Reprograms every register from driver state: the directory pointer of
    /// each AS, each client's steering, the translation-enable masks and the
    /// security register, then a full flush. Used at bring-up and at resume.
    pub(crate) fn setup_regs(&self) {
        // Set/restore the page directory of each AS
        for as_ in &self.ases {
            let inner = as_.inner.lock();
            let _global = self.global.lock();
            self.regs
                .write(regs::MC_SMMU_PTB_ASID_0, ptb_asid(as_.asid()));
            self.regs.write(
                regs::MC_SMMU_PTB_DATA_0,
                match inner.pdir() {
                    Some(pdir) => mk_pdir(pdir, PDIR_ATTR),
                    None => regs::MC_SMMU_PTB_DATA_0_RESET_VAL,
                },
            );
        }

        let global = self.global.lock();

        // Set/restore the ASID steering of each hardware client
        for hwcst in &global.hwc_state {
            self.regs.write(hwcst.reg, hwcst.enable_disable);
        }

        self.regs.write(
            regs::MC_SMMU_TRANSLATION_ENABLE_0_0,
            global.translation_enable_0,
        );
        self.regs.write(
            regs::MC_SMMU_TRANSLATION_ENABLE_1_0,
            global.translation_enable_1,
        );
        self.regs.write(
            regs::MC_SMMU_TRANSLATION_ENABLE_2_0,
            global.translation_enable_2,
        );
        self.regs
            .write(regs::MC_SMMU_ASID_SECURITY_0, global.asid_security);

        if self.stats {
            self.regs.write(
                regs::MC_SMMU_TLB_CONFIG_0,
                regs::MC_SMMU_TLB_CONFIG_0_TLB_STATS_ENABLE
                    | regs::MC_SMMU_TLB_CONFIG_0_TLB_HIT_UNDER_MISS_ENABLE
                    | regs::MC_SMMU_TLB_CONFIG_0_TLB_ACTIVE_LINES_VALUE,
            );
            self.regs.write(
                regs::MC_SMMU_PTC_CONFIG_0,
                regs::MC_SMMU_PTC_CONFIG_0_PTC_STATS_ENABLE
                    | regs::MC_SMMU_PTC_CONFIG_0_PTC_CACHE_ENABLE
                    | regs::MC_SMMU_PTC_CONFIG_0_PTC_INDEX_MAP_PATTERN,
            );
        } else {
            self.regs.write(
                regs::MC_SMMU_TLB_CONFIG_0,
                regs::MC_SMMU_TLB_CONFIG_0_RESET_VAL,
            );
            self.regs.write(
                regs::MC_SMMU_PTC_CONFIG_0,
                regs::MC_SMMU_PTC_CONFIG_0_RESET_VAL,
            );
        }
        drop(global);

        self.flush_all(true);
    }

    /// Snapshots the registers that do not survive the sleep power state.
    /// The device must be quiesced; the surrounding power-management
    /// framework guarantees no concurrent map/unmap.
    pub fn suspend(&self) {
        let mut global = self.global.lock();
        global.translation_enable_0 = self.regs.read(regs::MC_SMMU_TRANSLATION_ENABLE_0_0);
        global.translation_enable_1 = self.regs.read(regs::MC_SMMU_TRANSLATION_ENABLE_1_0);
        global.translation_enable_2 = self.regs.read(regs::MC_SMMU_TRANSLATION_ENABLE_2_0);
        global.asid_security = self.regs.read(regs::MC_SMMU_ASID_SECURITY_0);
    }

    /// Restores hardware state after sleep. A device that was never enabled
    /// has nothing to restore.
    pub fn resume(&self) {
        if !self.global.lock().enable {
            return;
        }
        self.setup_regs();
    }
}

impl<R: RegisterIo> Drop for SmmuDevice<R> {
    fn drop(&mut self) {
        let enabled = core::mem::replace(&mut self.global.get_mut().enable, false);
        if enabled {
            self.regs.write(
                regs::MC_SMMU_CONFIG_0,
                regs::MC_SMMU_CONFIG_0_SMMU_ENABLE_DISABLE,
            );
        }
        let pool = self.pool.get_mut();
        for as_ in self.ases.iter_mut() {
            as_.inner.get_mut().free_pdir(pool);
        }
    }
}

impl<R: RegisterIo> IovmmDevice for SmmuDevice<R> {
    fn name(&self) -> &'static str {
        VMM_NAME
    }

    fn pgsize_bits(&self) -> usize {
        SMMU_PAGE_SHIFT
    }

    fn alloc_domain(&self, client_name: &str) -> SmmuResult<DomainHandle> {
        SmmuDevice::alloc_domain(self, client_name)
    }

    fn free_domain(&self, domain: DomainHandle) {
        SmmuDevice::free_domain(self, domain)
    }

    fn map(&self, domain: DomainHandle, region: &IoRegion<'_>) -> SmmuResult<()> {
        SmmuDevice::map(self, domain, region)
    }

    fn unmap(&self, domain: DomainHandle, region: &IoRegion<'_>, decommit: bool) {
        SmmuDevice::unmap(self, domain, region, decommit)
    }

    fn map_pfn(&self, domain: DomainHandle, addr: Vaddr, pfn: Ppn) {
        SmmuDevice::map_pfn(self, domain, addr, pfn)
    }

    fn suspend(&self) {
        SmmuDevice::suspend(self)
    }

    fn resume(&self) {
        SmmuDevice::resume(self)
    }
}

#[cfg(test)]
mod device_tests {
    use super::*;
    use crate::hw::RegisterFile;
    use crate::hw::client::HwClient;
    use crate::smmu::tests_common::probe_default;

    fn platform() -> SmmuPlatform<RegisterFile> {
        SmmuPlatform::new(
            RegisterFile::new(),
            VaddrRange::from_start_len(Vaddr(0), 1 << 30),
        )
    }

    // 1. Missing resources abort the probe
    #[test]
    fn test_probe_resource_missing() {
        let mut p = platform();
        p.regs = None;
        assert_eq!(
            SmmuDevice::probe(p).expect_err("no regs"),
            SmmuError::ResourceMissing
        );

        let mut p = platform();
        p.window = None;
        assert_eq!(
            SmmuDevice::probe(p).expect_err("no window"),
            SmmuError::ResourceMissing
        );
    }

    // 2. Page-size contract is checked before anything is touched
    #[test]
    fn test_probe_page_size_mismatch() {
        let mut p = platform();
        p.page_size = 8192;
        assert_eq!(
            SmmuDevice::probe(p).expect_err("mismatched granule"),
            SmmuError::PageSizeMismatch
        );
    }

    // 3. Bring-up programs the initial register image
    #[test]
    fn test_probe_programs_registers() {
        let dev = probe_default();
        assert_eq!(
            dev.regs.read(regs::MC_SMMU_CONFIG_0),
            regs::MC_SMMU_CONFIG_0_SMMU_ENABLE_ENABLE
        );
        assert_eq!(dev.regs.read(regs::MC_SMMU_TRANSLATION_ENABLE_0_0), !0);
        assert_eq!(dev.regs.read(regs::MC_SMMU_TRANSLATION_ENABLE_1_0), !0);
        assert_eq!(dev.regs.read(regs::MC_SMMU_TRANSLATION_ENABLE_2_0), !0);
        assert_eq!(dev.regs.read(regs::MC_SMMU_ASID_SECURITY_0), 0);
        assert_eq!(
            dev.regs.read(regs::MC_SMMU_TLB_CONFIG_0),
            regs::MC_SMMU_TLB_CONFIG_0_RESET_VAL
        );
        assert_eq!(
            dev.regs.read(regs::MC_SMMU_PTC_CONFIG_0),
            regs::MC_SMMU_PTC_CONFIG_0_RESET_VAL
        );
        // No AS has a directory yet
        assert_eq!(
            dev.regs.read(regs::MC_SMMU_PTB_DATA_0),
            regs::MC_SMMU_PTB_DATA_0_RESET_VAL
        );
    }

    // 4. Statistics counters are armed when the platform asks for them
    #[test]
    fn test_probe_with_stats() {
        let mut p = platform();
        p.stats = true;
        let dev = SmmuDevice::probe(p).expect("probe");
        assert_ne!(
            dev.regs.read(regs::MC_SMMU_TLB_CONFIG_0)
                & regs::MC_SMMU_TLB_CONFIG_0_TLB_STATS_ENABLE,
            0
        );
        assert_ne!(
            dev.regs.read(regs::MC_SMMU_PTC_CONFIG_0)
                & regs::MC_SMMU_PTC_CONFIG_0_PTC_STATS_ENABLE,
            0
        );
    }

    // 5. Suspend/resume restores the programmed register image
    #[test]
    fn test_suspend_resume_round_trip() {
        let dev = probe_default();
        let domain = dev.alloc_domain("nvmap").expect("alloc");

        let steering_before = dev.regs.read(HwClient::Dc.steering_reg());
        let ptb_before = {
            dev.regs
                .write(regs::MC_SMMU_PTB_ASID_0, ptb_asid(domain.asid()));
            dev.regs.read(regs::MC_SMMU_PTB_DATA_0)
        };

        dev.suspend();

        // The sleep state loses everything
        dev.regs.write(regs::MC_SMMU_CONFIG_0, 0);
        dev.regs.write(regs::MC_SMMU_TRANSLATION_ENABLE_0_0, 0);
        dev.regs.write(regs::MC_SMMU_TRANSLATION_ENABLE_1_0, 0);
        dev.regs.write(regs::MC_SMMU_TRANSLATION_ENABLE_2_0, 0);
        dev.regs.write(HwClient::Dc.steering_reg(), 0);
        dev.regs.write(regs::MC_SMMU_PTB_DATA_0, 0);

        dev.resume();

        assert_eq!(
            dev.regs.read(regs::MC_SMMU_CONFIG_0),
            regs::MC_SMMU_CONFIG_0_SMMU_ENABLE_ENABLE
        );
        assert_eq!(dev.regs.read(regs::MC_SMMU_TRANSLATION_ENABLE_0_0), !0);
        assert_eq!(
            dev.regs.read(HwClient::Dc.steering_reg()),
            steering_before
        );
        dev.regs
            .write(regs::MC_SMMU_PTB_ASID_0, ptb_asid(domain.asid()));
        assert_eq!(dev.regs.read(regs::MC_SMMU_PTB_DATA_0), ptb_before);

        dev.free_domain(domain);
    }

    // 6. A device that was never enabled resumes as a no-op
    #[test]
    fn test_resume_when_disabled() {
        let dev = probe_default();
        dev.global.lock().enable = false;
        dev.regs.write(regs::MC_SMMU_CONFIG_0, 0);
        dev.resume();
        assert_eq!(dev.regs.read(regs::MC_SMMU_CONFIG_0), 0);
    }

    // 7. Drop disables translation and returns every table page
    #[test]
    fn test_drop_disables_and_frees() {
        let dev = probe_default();
        let _domain = dev.alloc_domain("nvmap").expect("alloc");
        assert!(dev.pool.lock().pages_in_use() > 0);
        // dropping with tables outstanding must tear them down, not panic
        drop(dev);
    }
}
