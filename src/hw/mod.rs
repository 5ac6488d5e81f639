//! Hardware access module
//!
//! Everything that touches the device directly: the register map and the
//! MMIO seam ([`regs`]), cache maintenance for table memory shared with the
//! hardware walker ([`cache`]), and the static bus-master client tables
//! ([`client`]).

pub mod cache;
pub mod client;
pub mod regs;

pub use cache::clean_for_device;
pub use client::{DEFAULT_HWC_MAP, DomainHwcMap, HWC_COUNT, HWC_STATE_INIT, HwClient, HwcState};
pub use regs::{MmioRegisters, RegisterFile, RegisterIo};
