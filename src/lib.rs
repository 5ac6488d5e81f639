//! Memory-controller SMMU address-space and page-table manager.
//!
//! The device owns a small pool of hardware address spaces (ASIDs), each
//! backed by a two-level translation table, and a set of fixed-function
//! bus-master clients that are steered into those address spaces. A generic
//! I/O virtual-memory layer drives it through the [`iovmm::IovmmDevice`]
//! surface: claim an address space, map and unmap page-granular regions,
//! and checkpoint the translation-enable state across system sleep.
//!
//! # Components
//!
//! - [`config`]: hardware geometry and limits
//! - [`address`]: typed addresses and page numbers
//! - [`table`]: two-level translation tables and their page pool
//! - [`hw`]: register map, MMIO seam, cache maintenance, client bindings
//! - [`iovmm`]: the generic translation-domain interface
//! - [`smmu`]: the device controller and translation operations

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod address;
pub mod config;
pub mod hw;
pub mod iovmm;
pub mod smmu;
pub mod table;

pub use address::{AlignOps, Paddr, Ppn, UsizeConvert, Vaddr, VaddrRange, Vpn};
pub use iovmm::{DomainHandle, IoRegion, IovmmDevice, RegionBacking, VMM_NAME};
pub use smmu::{SmmuDevice, SmmuPlatform};

/// Errors surfaced by the translation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmmuError {
    /// A required register or window resource was absent at probe.
    ResourceMissing,
    /// The CPU page size does not match the hardware translation granule.
    PageSizeMismatch,
    /// The client state initializer does not cover the client enumeration.
    HwcTableSizeMismatch,
    /// No table-pool page (or no backing frame) could be produced.
    OutOfMemory,
    /// No binding group is registered for the requested consumer name.
    NoBindingFound,
    /// A required hardware client is already steered into another ASID.
    ClientBusy,
    /// Every usable address space is claimed.
    NoFreeAs,
}

/// Result type of the translation layer.
pub type SmmuResult<T> = Result<T, SmmuError>;
