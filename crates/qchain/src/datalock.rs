use std::cell::Cell;

/// Scoped flag that marks datafiles as read-only while it is held.
///
/// Scripts compiled under the lock keep existing datafiles untouched, so that a script
/// re-generated for a job that is already queued never changes the data the job reads.
/// The lock nests; it is released when the last guard is dropped.
#[derive(Debug, Default)]
pub struct DataLock {
    depth: Cell<u32>,
}

impl DataLock {
    pub fn enter(&self) -> DataLockGuard<'_> {
        self.depth.set(self.depth.get() + 1);
        DataLockGuard { lock: self }
    }

    pub fn is_locked(&self) -> bool {
        self.depth.get() > 0
    }

    pub fn depth(&self) -> u32 {
        self.depth.get()
    }
}

#[must_use = "the lock is released when the guard is dropped"]
pub struct DataLockGuard<'a> {
    lock: &'a DataLock,
}

impl Drop for DataLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.depth.set(self.lock.depth.get() - 1);
    }
}
