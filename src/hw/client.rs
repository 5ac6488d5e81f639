//! Hardware bus-master clients and binding groups.
//!
//! Each client is a fixed-function block with one steering register that
//! selects the ASID its accesses are translated through. A binding group
//! names the set of clients a logical consumer steers into its address
//! space; the groups are fixed at initialization time and never mutated.

use crate::hw::regs::{self, SMMU_ASID_DISABLE};

/// Hardware bus-master clients subject to translation.
// Keep this as a natural enumeration (no assignments); the state initializer
// table below is index-matched and checked at probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum HwClient {
    Afi,
    Avpc,
    Dc,
    Dcb,
    Epp,
    G2,
    Hc,
    Hda,
    Isp,
    Mpe,
    Nv,
    Nv2,
    Ppcs,
    Sata,
    Vde,
    Vi,
}

/// Number of hardware clients.
pub const HWC_COUNT: usize = 16;

impl HwClient {
    /// Every client, in enumeration order.
    pub const ALL: [HwClient; HWC_COUNT] = [
        HwClient::Afi,
        HwClient::Avpc,
        HwClient::Dc,
        HwClient::Dcb,
        HwClient::Epp,
        HwClient::G2,
        HwClient::Hc,
        HwClient::Hda,
        HwClient::Isp,
        HwClient::Mpe,
        HwClient::Nv,
        HwClient::Nv2,
        HwClient::Ppcs,
        HwClient::Sata,
        HwClient::Vde,
        HwClient::Vi,
    ];

    /// Index into the per-client state array.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Offset of the client's ASID steering register.
    pub fn steering_reg(self) -> usize {
        match self {
            HwClient::Afi => regs::MC_SMMU_AFI_ASID_0,
            HwClient::Avpc => regs::MC_SMMU_AVPC_ASID_0,
            HwClient::Dc => regs::MC_SMMU_DC_ASID_0,
            HwClient::Dcb => regs::MC_SMMU_DCB_ASID_0,
            HwClient::Epp => regs::MC_SMMU_EPP_ASID_0,
            HwClient::G2 => regs::MC_SMMU_G2_ASID_0,
            HwClient::Hc => regs::MC_SMMU_HC_ASID_0,
            HwClient::Hda => regs::MC_SMMU_HDA_ASID_0,
            HwClient::Isp => regs::MC_SMMU_ISP_ASID_0,
            HwClient::Mpe => regs::MC_SMMU_MPE_ASID_0,
            HwClient::Nv => regs::MC_SMMU_NV_ASID_0,
            HwClient::Nv2 => regs::MC_SMMU_NV2_ASID_0,
            HwClient::Ppcs => regs::MC_SMMU_PPCS_ASID_0,
            HwClient::Sata => regs::MC_SMMU_SATA_ASID_0,
            HwClient::Vde => regs::MC_SMMU_VDE_ASID_0,
            HwClient::Vi => regs::MC_SMMU_VI_ASID_0,
        }
    }
}

/// Run-time steering state of one hardware client.
#[derive(Debug, Clone, Copy)]
pub struct HwcState {
    /// Steering register offset.
    pub reg: usize,
    /// Current steering value: disabled, or enabled for one ASID.
    pub enable_disable: u32,
}

macro_rules! hwc_init {
    ($($client:ident => $reg:ident),* $(,)?) => {
        &[$(HwcState { reg: regs::$reg, enable_disable: SMMU_ASID_DISABLE }),*]
    };
}

/// Initial (all-disabled) client states, index-matched to [`HwClient`].
///
/// Kept as a slice so the probe-time size check against [`HWC_COUNT`] stays a
/// real check when clients are added to one side and not the other.
pub static HWC_STATE_INIT: &[HwcState] = hwc_init![
    Afi => MC_SMMU_AFI_ASID_0,
    Avpc => MC_SMMU_AVPC_ASID_0,
    Dc => MC_SMMU_DC_ASID_0,
    Dcb => MC_SMMU_DCB_ASID_0,
    Epp => MC_SMMU_EPP_ASID_0,
    G2 => MC_SMMU_G2_ASID_0,
    Hc => MC_SMMU_HC_ASID_0,
    Hda => MC_SMMU_HDA_ASID_0,
    Isp => MC_SMMU_ISP_ASID_0,
    Mpe => MC_SMMU_MPE_ASID_0,
    Nv => MC_SMMU_NV_ASID_0,
    Nv2 => MC_SMMU_NV2_ASID_0,
    Ppcs => MC_SMMU_PPCS_ASID_0,
    Sata => MC_SMMU_SATA_ASID_0,
    Vde => MC_SMMU_VDE_ASID_0,
    Vi => MC_SMMU_VI_ASID_0,
];

/// Binding group: the hardware clients a logical consumer steers into its
/// address space.
#[derive(Debug)]
pub struct DomainHwcMap {
    /// Consumer name matched against `alloc_domain` requests.
    pub dev_name: &'static str,
    /// Clients switched into the consumer's ASID, in claim order.
    pub hwcs: &'static [HwClient],
}

/// Default binding table: every client translated for the "nvmap" consumer.
pub static DEFAULT_HWC_MAP: &[DomainHwcMap] = &[DomainHwcMap {
    dev_name: "nvmap",
    hwcs: &HwClient::ALL,
}];

/// Finds the binding group for `dev_name`. Linear scan; the table is small
/// and fixed.
pub fn lookup<'a>(maps: &'a [DomainHwcMap], dev_name: &str) -> Option<&'a DomainHwcMap> {
    maps.iter().find(|map| map.dev_name == dev_name)
}
