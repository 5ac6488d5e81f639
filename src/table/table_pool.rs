use crate::table::entry::{PageDirectory, PageTable};
use crate::{SmmuError, SmmuResult};
use alloc::boxed::Box;

/// Page budget for translation-table storage.
///
/// Directory and leaf-table pages are drawn from the same budget; allocation
/// fails with [`SmmuError::OutOfMemory`] once `capacity` pages are
/// outstanding. Every allocated page must come back through the matching
/// `free_*` call so the budget stays balanced.
#[derive(Debug)]
pub struct TablePool {
    capacity: usize,
    in_use: usize,
}

impl TablePool {
    pub fn new(capacity: usize) -> Self {
        TablePool {
            capacity,
            in_use: 0,
        }
    }

    fn take_page(&mut self) -> SmmuResult<()> {
        if self.in_use == self.capacity {
            return Err(SmmuError::OutOfMemory);
        }
        self.in_use += 1;
        Ok(())
    }

    fn put_page(&mut self) {
        debug_assert!(self.in_use > 0, "table pool free without alloc");
        self.in_use -= 1;
    }

    /// Allocates a leaf table with every slot vacant.
    pub fn alloc_table(&mut self) -> SmmuResult<Box<PageTable>> {
        self.take_page()?;
        Ok(Box::new(PageTable::new()))
    }

    /// Releases a leaf table. The caller must have unlinked it from its
    /// directory entry first.
    pub fn free_table(&mut self, table: Box<PageTable>) {
        drop(table);
        self.put_page();
    }

    /// Allocates a page directory with every slot vacant.
    pub fn alloc_directory(&mut self) -> SmmuResult<Box<PageDirectory>> {
        self.take_page()?;
        Ok(Box::new(PageDirectory::new()))
    }

    /// Releases a page directory. All leaf tables reachable from it must
    /// already have been freed.
    pub fn free_directory(&mut self, dir: Box<PageDirectory>) {
        drop(dir);
        self.put_page();
    }

    /// Pages currently outstanding.
    pub fn pages_in_use(&self) -> usize {
        self.in_use
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod table_pool_tests {
    use super::*;

    // 1. Allocation and paired free keep the budget balanced
    #[test]
    fn test_alloc_free_accounting() {
        let mut pool = TablePool::new(4);
        assert_eq!(pool.pages_in_use(), 0);

        let dir = pool.alloc_directory().expect("alloc directory");
        let table = pool.alloc_table().expect("alloc table");
        assert_eq!(pool.pages_in_use(), 2);

        pool.free_table(table);
        pool.free_directory(dir);
        assert_eq!(pool.pages_in_use(), 0);
    }

    // 2. Fresh tables come back fully vacant
    #[test]
    fn test_tables_start_vacant() {
        let mut pool = TablePool::new(2);
        let table = pool.alloc_table().expect("alloc table");
        assert_eq!(table.occupied(), 0);
        for ptn in [0, 511, 1023] {
            assert!(table.entry(ptn).is_vacant());
        }
        pool.free_table(table);
    }

    // 3. The budget is a hard limit
    #[test]
    fn test_out_of_memory_at_capacity() {
        let mut pool = TablePool::new(2);
        let a = pool.alloc_table().expect("first");
        let b = pool.alloc_table().expect("second");
        assert_eq!(
            pool.alloc_table().expect_err("budget exhausted"),
            SmmuError::OutOfMemory
        );

        // Freeing one page makes room again
        pool.free_table(a);
        let c = pool.alloc_directory().expect("after free");
        pool.free_table(b);
        pool.free_directory(c);
    }
}
