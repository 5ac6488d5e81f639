//! SMMU device module
//!
//! The device controller and everything scoped to one hardware instance:
//! address-space slots, domain allocation, the translation operations and
//! the suspend/resume hooks.
//!
//! # Components
//!
//! - [`SmmuPlatform`]: probe-time resource descriptor
//! - [`SmmuDevice`]: the device controller; implements the provider surface
//!
//! Translation operations (`map`/`unmap`/`map_pfn`), domain allocation and
//! the debug register interface are inherent methods on [`SmmuDevice`].

mod debug;
mod device;
mod domain;
mod space;
mod translate;

pub use device::{SmmuDevice, SmmuPlatform};
