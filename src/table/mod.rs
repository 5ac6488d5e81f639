//! Two-level translation table module
//!
//! The hardware walks a per-ASID page directory whose entries point at leaf
//! page tables; leaf entries hold the physical frame number and attribute
//! bits for one translated page.
//!
//! # Components
//!
//! - [`Pte`] / [`Pde`]: leaf and directory entries
//! - [`PteFlags`]: hardware attribute bits
//! - [`PageTable`] / [`PageDirectory`]: fixed-geometry entry arrays
//! - [`TablePool`]: page budget for table storage

mod entry;
mod table_pool;

pub use entry::{
    PDIR_ATTR, PTE_ATTR, PageDirectory, PageTable, Pde, Pte, PteFlags, addr_to_pdn, addr_to_pfn,
    addr_to_ptn,
};
pub use table_pool::TablePool;
