//! Debug register access by name.
//!
//! Operational tooling, not part of the translation contract: registers are
//! exposed for inspection and poking under their hardware names, and the
//! lowest usable ASID can be moved to keep low slots clear for hardware
//! testing.

use crate::config::SMMU_NUM_ASIDS;
use crate::hw::regs::{self, RegisterIo};
use crate::smmu::device::SmmuDevice;

static REG_NAME_MAP: &[(&str, usize)] = &[
    ("MC_SMMU_CONFIG", regs::MC_SMMU_CONFIG_0),
    ("MC_SMMU_TLB_CONFIG", regs::MC_SMMU_TLB_CONFIG_0),
    ("MC_SMMU_PTC_CONFIG", regs::MC_SMMU_PTC_CONFIG_0),
    ("MC_SMMU_PTB_ASID", regs::MC_SMMU_PTB_ASID_0),
    ("MC_SMMU_PTB_DATA", regs::MC_SMMU_PTB_DATA_0),
    ("MC_SMMU_TLB_FLUSH", regs::MC_SMMU_TLB_FLUSH_0),
    ("MC_SMMU_PTC_FLUSH", regs::MC_SMMU_PTC_FLUSH_0),
    ("MC_SMMU_ASID_SECURITY", regs::MC_SMMU_ASID_SECURITY_0),
    ("MC_SMMU_STATS_TLB_HIT_COUNT", regs::MC_SMMU_STATS_TLB_HIT_COUNT_0),
    ("MC_SMMU_STATS_TLB_MISS_COUNT", regs::MC_SMMU_STATS_TLB_MISS_COUNT_0),
    ("MC_SMMU_STATS_PTC_HIT_COUNT", regs::MC_SMMU_STATS_PTC_HIT_COUNT_0),
    ("MC_SMMU_STATS_PTC_MISS_COUNT", regs::MC_SMMU_STATS_PTC_MISS_COUNT_0),
    ("MC_SMMU_TRANSLATION_ENABLE_0", regs::MC_SMMU_TRANSLATION_ENABLE_0_0),
    ("MC_SMMU_TRANSLATION_ENABLE_1", regs::MC_SMMU_TRANSLATION_ENABLE_1_0),
    ("MC_SMMU_TRANSLATION_ENABLE_2", regs::MC_SMMU_TRANSLATION_ENABLE_2_0),
    ("MC_SMMU_AFI_ASID", regs::MC_SMMU_AFI_ASID_0),
    ("MC_SMMU_AVPC_ASID", regs::MC_SMMU_AVPC_ASID_0),
    ("MC_SMMU_DC_ASID", regs::MC_SMMU_DC_ASID_0),
    ("MC_SMMU_DCB_ASID", regs::MC_SMMU_DCB_ASID_0),
    ("MC_SMMU_EPP_ASID", regs::MC_SMMU_EPP_ASID_0),
    ("MC_SMMU_G2_ASID", regs::MC_SMMU_G2_ASID_0),
    ("MC_SMMU_HC_ASID", regs::MC_SMMU_HC_ASID_0),
    ("MC_SMMU_HDA_ASID", regs::MC_SMMU_HDA_ASID_0),
    ("MC_SMMU_ISP_ASID", regs::MC_SMMU_ISP_ASID_0),
    ("MC_SMMU_MPE_ASID", regs::MC_SMMU_MPE_ASID_0),
    ("MC_SMMU_NV_ASID", regs::MC_SMMU_NV_ASID_0),
    ("MC_SMMU_NV2_ASID", regs::MC_SMMU_NV2_ASID_0),
    ("MC_SMMU_PPCS_ASID", regs::MC_SMMU_PPCS_ASID_0),
    ("MC_SMMU_SATA_ASID", regs::MC_SMMU_SATA_ASID_0),
    ("MC_SMMU_VDE_ASID", regs::MC_SMMU_VDE_ASID_0),
    ("MC_SMMU_VI_ASID", regs::MC_SMMU_VI_ASID_0),
];

fn lookup_reg(name: &str) -> Option<usize> {
    REG_NAME_MAP
        .iter()
        .find(|(reg_name, _)| *reg_name == name)
        .map(|&(_, offset)| offset)
}

impl<R: RegisterIo> SmmuDevice<R> {
    /// Reads a register by its hardware name. `None` for unknown names.
    pub fn read_register(&self, name: &str) -> Option<u32> {
        lookup_reg(name).map(|offset| self.regs.read(offset))
    }

    /// Writes a register by its hardware name. Returns whether the name was
    /// known.
    pub fn write_register(&self, name: &str, value: u32) -> bool {
        match lookup_reg(name) {
            Some(offset) => {
                self.regs.write(offset, value);
                true
            }
            None => false,
        }
    }

    /// First ASID `alloc_domain` hands out.
    pub fn lowest_asid(&self) -> usize {
        self.global.lock().lowest_asid
    }

    /// Moves the first usable ASID; out-of-range values are rejected.
    pub fn set_lowest_asid(&self, value: usize) -> bool {
        if value < SMMU_NUM_ASIDS {
            self.global.lock().lowest_asid = value;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod debug_tests {
    use super::*;
    use crate::smmu::tests_common::probe_default;

    // 1. Registers are reachable under their hardware names
    #[test]
    fn test_register_access_by_name() {
        let dev = probe_default();
        assert_eq!(
            dev.read_register("MC_SMMU_CONFIG"),
            Some(regs::MC_SMMU_CONFIG_0_SMMU_ENABLE_ENABLE)
        );
        assert!(dev.write_register("MC_SMMU_ASID_SECURITY", 0x5a));
        assert_eq!(dev.read_register("MC_SMMU_ASID_SECURITY"), Some(0x5a));

        assert_eq!(dev.read_register("MC_SMMU_BOGUS"), None);
        assert!(!dev.write_register("MC_SMMU_BOGUS", 1));
    }

    // 2. Statistics counters appear in the name map
    #[test]
    fn test_stats_counters_named() {
        let dev = probe_default();
        assert_eq!(dev.read_register("MC_SMMU_STATS_TLB_HIT_COUNT"), Some(0));
        assert_eq!(dev.read_register("MC_SMMU_STATS_PTC_MISS_COUNT"), Some(0));
    }

    // 3. The lowest usable ASID is bounded by the slot count
    #[test]
    fn test_lowest_asid_bounds() {
        let dev = probe_default();
        assert_eq!(dev.lowest_asid(), 0);
        assert!(dev.set_lowest_asid(SMMU_NUM_ASIDS - 1));
        assert_eq!(dev.lowest_asid(), SMMU_NUM_ASIDS - 1);
        assert!(!dev.set_lowest_asid(SMMU_NUM_ASIDS));
        assert_eq!(dev.lowest_asid(), SMMU_NUM_ASIDS - 1);
    }
}
