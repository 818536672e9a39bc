//! Virtual sequence lists: read-only lazy collections over a sidecar index.
//!
//! A [`VirtualSequenceList`] presents a file's alignment records as an
//! index-addressable collection without holding them in memory. Indexed
//! access resolves the record's [`SequencePointer`] through the sidecar and
//! materializes it via the owning parser's shared record source, keeping the
//! result in a bounded LRU cache. Eviction is automatic when the cache is
//! over capacity, so memory stays bounded regardless of how much of the file
//! is touched; a record evicted between accesses is re-materialized
//! transparently on the next access.
//!
//! The list is a read-only projection over the file: every mutation method
//! fails with `UnsupportedOperation`.

use crate::error::{BampageError, Result};
use crate::io::bam::parser::RecordSource;
use crate::io::bam::record::Record;
use crate::virt::sidecar::SidecarIndex;
use lru::LruCache;
use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::rc::Rc;

/// Read-only, index-addressable collection of lazily materialized records.
///
/// `len()` is fixed at construction to the sidecar's record count,
/// regardless of how many records are currently materialized.
pub struct VirtualSequenceList {
    sidecar: Rc<SidecarIndex>,
    source: Rc<RefCell<RecordSource>>,
    cache: RefCell<LruCache<usize, Rc<Record>>>,
}

impl VirtualSequenceList {
    pub(crate) fn new(
        sidecar: Rc<SidecarIndex>,
        source: Rc<RefCell<RecordSource>>,
        cache_capacity: NonZeroUsize,
    ) -> Self {
        Self {
            sidecar,
            source,
            cache: RefCell::new(LruCache::new(cache_capacity)),
        }
    }

    /// Number of records in the underlying file.
    pub fn len(&self) -> usize {
        self.sidecar.len()
    }

    /// Whether the underlying file has no records.
    pub fn is_empty(&self) -> bool {
        self.sidecar.is_empty()
    }

    /// The sidecar index backing this list.
    pub fn sidecar(&self) -> &SidecarIndex {
        &self.sidecar
    }

    /// The record at `index`, materializing it if needed.
    ///
    /// # Errors
    ///
    /// - [`BampageError::InvalidRange`] for an out-of-range index
    /// - [`BampageError::ResourceDisposed`] if the owning parser has closed
    /// - [`BampageError::InvalidFormat`] if the pointed-to bytes no longer
    ///   decode (the single-writer assumption was violated)
    pub fn get(&self, index: usize) -> Result<Rc<Record>> {
        if index >= self.len() {
            return Err(BampageError::InvalidRange(format!(
                "index {} out of range for list of {}",
                index,
                self.len()
            )));
        }

        if let Some(record) = self.cache.borrow_mut().get(&index) {
            return Ok(Rc::clone(record));
        }

        // Not cached (or evicted since last access): resolve and re-read.
        let pointer = self.sidecar.get(index).expect("index checked above");
        let record = Rc::new(self.source.borrow_mut().read_at(pointer)?);
        self.cache.borrow_mut().put(index, Rc::clone(&record));
        Ok(record)
    }

    /// Lazy, restartable iterator over all records in index order.
    ///
    /// Not a snapshot: each step performs an indexed access, and structural
    /// change to the underlying file during iteration is undefined
    /// (single-writer assumption).
    pub fn iter(&self) -> VirtualIter<'_> {
        VirtualIter {
            list: self,
            index: 0,
        }
    }

    /// Unsupported: the list is a read-only projection over the file.
    pub fn push(&mut self, _record: Record) -> Result<()> {
        Err(BampageError::UnsupportedOperation("push"))
    }

    /// Unsupported: the list is a read-only projection over the file.
    pub fn insert(&mut self, _index: usize, _record: Record) -> Result<()> {
        Err(BampageError::UnsupportedOperation("insert"))
    }

    /// Unsupported: the list is a read-only projection over the file.
    pub fn remove(&mut self, _index: usize) -> Result<Rc<Record>> {
        Err(BampageError::UnsupportedOperation("remove"))
    }

    /// Unsupported: the list is a read-only projection over the file.
    pub fn clear(&mut self) -> Result<()> {
        Err(BampageError::UnsupportedOperation("clear"))
    }

    /// Unsupported: the list is a read-only projection over the file.
    pub fn set(&mut self, _index: usize, _record: Record) -> Result<()> {
        Err(BampageError::UnsupportedOperation("set"))
    }
}

impl std::fmt::Debug for VirtualSequenceList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualSequenceList")
            .field("len", &self.len())
            .field("cached", &self.cache.borrow().len())
            .finish()
    }
}

/// Iterator created by [`VirtualSequenceList::iter`].
pub struct VirtualIter<'a> {
    list: &'a VirtualSequenceList,
    index: usize,
}

impl<'a> Iterator for VirtualIter<'a> {
    type Item = Result<Rc<Record>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.list.len() {
            return None;
        }
        let item = self.list.get(self.index);
        self.index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.list.len() - self.index;
        (remaining, Some(remaining))
    }
}
