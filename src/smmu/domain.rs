use crate::hw::client;
use crate::hw::regs::{self, RegisterIo, SMMU_ASID_DISABLE, asid_enable, asid_of, mk_pdir, ptb_asid};
use crate::iovmm::DomainHandle;
use crate::table::PDIR_ATTR;
use crate::{SmmuDevice, SmmuError, SmmuResult};
use log::{error, info};

impl<R: RegisterIo> SmmuDevice<R> {
    /// Claims a free address space for `client_name`.
    ///
    /// Scans the slots from the lowest usable ASID, lazily creates the
    /// directory, resolves the consumer's binding group and switches every
    /// client of the group into the new ASID. Any failure is rolled back
    /// completely before returning: clients claimed earlier in the same call
    /// are restored to disabled and the directory is released.
    pub fn alloc_domain(&self, client_name: &str) -> SmmuResult<DomainHandle> {
        let lowest = self.global.lock().lowest_asid;

        // Look for a free AS, keeping its lock once found
        let mut found = None;
        for as_ in &self.ases[lowest..] {
            let inner = as_.inner.lock();
            if inner.is_free() {
                found = Some((as_, inner));
                break;
            }
        }
        let Some((as_, mut inner)) = found else {
            error!("smmu: no free AS");
            return Err(SmmuError::NoFreeAs);
        };
        let asid = as_.asid();

        {
            let mut pool = self.pool.lock();
            inner.alloc_pdir(&mut pool)?;
        }

        // Look for a matching hardware client group
        let Some(map) = client::lookup(self.hwc_map, client_name) else {
            error!("smmu: no SMMU resource for {}", client_name);
            let mut pool = self.pool.lock();
            inner.free_pdir(&mut pool);
            return Err(SmmuError::NoBindingFound);
        };

        {
            let mut global = self.global.lock();

            // Update the directory pointer for this ASID
            self.regs.write(regs::MC_SMMU_PTB_ASID_0, ptb_asid(asid));
            if let Some(pdir) = inner.pdir() {
                self.regs
                    .write(regs::MC_SMMU_PTB_DATA_0, mk_pdir(pdir, PDIR_ATTR));
            }
            self.flush_smmu_regs();

            // Put each hardware client in the group into the address space
            let enable = asid_enable(asid);
            for (i, &hwc) in map.hwcs.iter().enumerate() {
                let current = global.hwc_state[hwc.index()].enable_disable;
                if current != SMMU_ASID_DISABLE && current != enable {
                    error!(
                        "smmu: client {:?} busy for ASID {} ({} denied)",
                        hwc,
                        asid_of(current),
                        client_name
                    );
                    // Restore the clients claimed earlier in this loop
                    for &prev in &map.hwcs[..i] {
                        let hwcst = &mut global.hwc_state[prev.index()];
                        hwcst.enable_disable = SMMU_ASID_DISABLE;
                        self.regs.write(hwcst.reg, SMMU_ASID_DISABLE);
                    }
                    self.flush_smmu_regs();
                    drop(global);
                    let mut pool = self.pool.lock();
                    inner.free_pdir(&mut pool);
                    return Err(SmmuError::ClientBusy);
                }
                let hwcst = &mut global.hwc_state[hwc.index()];
                hwcst.enable_disable = enable;
                self.regs.write(hwcst.reg, enable);
            }
            self.flush_smmu_regs();
        }

        inner.hwclients = Some(map);
        info!("smmu: ASID {} allocated for {}", asid, client_name);
        Ok(DomainHandle { asid })
    }

    /// Releases an address space: every client of its binding group is
    /// steered back to disabled, the directory pointer register is reset and
    /// the directory with all reachable leaf tables is returned to the pool.
    ///
    /// Releasing a free slot is a caller bug.
    pub fn free_domain(&self, domain: DomainHandle) {
        let as_ = &self.ases[domain.asid()];
        let mut inner = as_.inner.lock();
        let map = inner
            .hwclients
            .take()
            .expect("free_domain on a free address space");

        {
            let mut global = self.global.lock();
            for &hwc in map.hwcs {
                let hwcst = &mut global.hwc_state[hwc.index()];
                hwcst.enable_disable = SMMU_ASID_DISABLE;
                self.regs.write(hwcst.reg, SMMU_ASID_DISABLE);
            }
            self.flush_smmu_regs();
        }

        if inner.pdir().is_some() {
            {
                let _global = self.global.lock();
                self.regs
                    .write(regs::MC_SMMU_PTB_ASID_0, ptb_asid(domain.asid()));
                self.regs
                    .write(regs::MC_SMMU_PTB_DATA_0, regs::MC_SMMU_PTB_DATA_0_RESET_VAL);
                self.flush_smmu_regs();
            }

            let mut pool = self.pool.lock();
            inner.free_pdir(&mut pool);
        }
        info!("smmu: ASID {} released", domain.asid());
    }
}
